/*
 * Copyright (c) 2025 Clément GRENNERAT
 *
 * This program is free software: you can redistribute it and/or modify it under the terms of the
 * GNU General Public License as published by the Free Software Foundation, version 3.
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
 * even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
 * See the GNU General Public License for more details.
 * You should have received a copy of the GNU General Public License along with this program.
 * If not, see https://www.gnu.org/licenses/.
 *
 */


use indexmap::IndexMap;
use log::{info, warn};
use oar_kao_core::error::ConfigError;
use oar_kao_core::model::configuration::Configuration;
use oar_kao_core::model::job::{Dependency, Job, JobAssignment, JobBuilder, Moldable};
use oar_kao_core::model::resource::{ResourceIdMap, ResourceRow};
use oar_kao_core::platform::{PlatformConfig, PlatformTrait};
use oar_kao_core::scheduler::hierarchy::{HierarchyRequest, HierarchyRequests};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Unable to read snapshot {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// State of the platform at the beginning of a scheduling round, as exported by the persistence layer.
/// Resource ids are the persisted ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub now: i64,
    /// Overrides the configuration file when present.
    #[serde(default)]
    pub config: Option<Configuration>,
    pub queues: Vec<QueueRecord>,
    pub resources: Vec<ResourceRow>,
    #[serde(default)]
    pub scheduled_jobs: Vec<JobRecord>,
    #[serde(default)]
    pub waiting_jobs: Vec<JobRecord>,
}

fn active_state() -> String {
    "Active".to_string()
}
fn default_queue() -> String {
    "default".to_string()
}
fn waiting_state() -> String {
    "Waiting".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub name: String,
    pub priority: i32,
    #[serde(default = "active_state")]
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_queue")]
    pub queue: String,
    /// `key` or `key=value`.
    #[serde(default)]
    pub types: Vec<String>,
    pub moldables: Vec<MoldableRecord>,
    #[serde(default)]
    pub assignment: Option<AssignmentRecord>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRecord>,
    #[serde(default)]
    pub earliest_start_time: Option<i64>,
    #[serde(default)]
    pub submission_time: i64,
    #[serde(default)]
    pub karma: f64,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "waiting_state")]
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoldableRecord {
    pub id: i64,
    pub walltime: i64,
    /// Groups of the request, joined by `+` in the submission.
    pub requests: Vec<RequestRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    /// (level, count) from the outermost level.
    pub levels: Vec<(String, u32)>,
    /// Resources matching the properties of the group. All default resources when absent.
    #[serde(default)]
    pub resources: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub begin: i64,
    /// Included, security time included.
    pub end: i64,
    pub resources: Vec<i64>,
    #[serde(default)]
    pub moldable_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub job_id: i64,
    pub state: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl Snapshot {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Snapshot, SnapshotError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl JobRecord {
    fn to_job(&self, platform_config: &PlatformConfig) -> Job {
        let resource_set = &platform_config.resource_set;
        let id_map = &resource_set.id_map;
        let moldables = self
            .moldables
            .iter()
            .map(|moldable| {
                let requests = moldable
                    .requests
                    .iter()
                    .map(|request| {
                        let filter = match &request.resources {
                            Some(ids) => id_map.to_internal(ids),
                            None => resource_set.default_resources.clone(),
                        };
                        let level_nbs = request.levels.iter().map(|(level, count)| (level.as_str().into(), *count)).collect();
                        HierarchyRequest::new(filter, level_nbs)
                    })
                    .collect();
                Moldable::new(moldable.id, moldable.walltime, HierarchyRequests::from_requests(requests))
            })
            .collect();
        let types = self
            .types
            .iter()
            .map(|t| match t.split_once('=') {
                Some((key, value)) => (key.trim().into(), Some(value.trim().into())),
                None => (t.trim().into(), None),
            })
            .collect::<HashMap<Box<str>, Option<Box<str>>>>();

        JobBuilder::new(self.id)
            .name_opt(self.name.as_deref().map(Box::from))
            .user_opt(self.user.as_deref().map(Box::from))
            .queue(self.queue.as_str().into())
            .types(types)
            .moldables(moldables)
            .assign_opt(self.assignment.as_ref().map(|a| a.to_assignment(id_map)))
            .dependencies(self.dependencies.iter().map(|d| Dependency::new(d.job_id, &d.state, d.exit_code)))
            .earliest_start_time_opt(self.earliest_start_time)
            .submission_time(self.submission_time)
            .karma(self.karma)
            .priority(self.priority)
            .state(self.state.as_str().into())
            .build()
    }
}

impl AssignmentRecord {
    fn to_assignment(&self, id_map: &ResourceIdMap) -> JobAssignment {
        JobAssignment::new(self.begin, self.end, id_map.to_internal(&self.resources), self.moldable_index)
    }
}

/// Platform backed by a [`Snapshot`]. Assignments are kept in memory.
pub struct Platform {
    now: i64,
    platform_config: Rc<PlatformConfig>,
    queues: Vec<QueueRecord>,
    scheduled_jobs: Vec<Job>,
    waiting_jobs: IndexMap<i64, Job>,
}

impl Platform {
    pub fn from_file<P: AsRef<Path>>(path: P, config: Configuration) -> Result<Self, SnapshotError> {
        Self::from_snapshot(Snapshot::from_file(path)?, config)
    }

    pub fn from_snapshot(snapshot: Snapshot, config: Configuration) -> Result<Self, SnapshotError> {
        let config = snapshot.config.unwrap_or(config);
        let platform_config = Rc::new(PlatformConfig::new(config, &snapshot.resources)?);

        let scheduled_jobs = snapshot
            .scheduled_jobs
            .iter()
            .filter_map(|record| {
                if record.assignment.is_none() {
                    warn!("Scheduled job {} has no assignment, ignored.", record.id);
                    return None;
                }
                Some(record.to_job(&platform_config))
            })
            .collect::<Vec<_>>();
        let waiting_jobs = snapshot
            .waiting_jobs
            .iter()
            .map(|record| (record.id, record.to_job(&platform_config)))
            .collect::<IndexMap<i64, Job>>();
        info!(
            "Snapshot loaded: {} resources, {} scheduled jobs, {} waiting jobs.",
            snapshot.resources.len(),
            scheduled_jobs.len(),
            waiting_jobs.len()
        );

        Ok(Platform {
            now: snapshot.now,
            platform_config,
            queues: snapshot.queues,
            scheduled_jobs,
            waiting_jobs,
        })
    }

    /// Names of the active queues, grouped by priority, highest priority first.
    pub fn queues_by_priority(&self) -> Vec<Vec<String>> {
        let mut groups: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for queue in self.queues.iter().filter(|q| q.state.eq_ignore_ascii_case("active")) {
            groups.entry(queue.priority).or_default().push(queue.name.clone());
        }
        groups.into_values().rev().collect()
    }

    pub fn waiting_job_ids(&self) -> Vec<i64> {
        self.waiting_jobs.keys().copied().collect()
    }
}

impl PlatformTrait for Platform {
    fn get_now(&self) -> i64 {
        self.now
    }
    fn get_max_time(&self) -> i64 {
        2i64.pow(31)
    }
    fn get_platform_config(&self) -> &Rc<PlatformConfig> {
        &self.platform_config
    }
    fn get_scheduled_jobs(&self) -> &[Job] {
        &self.scheduled_jobs
    }
    fn get_waiting_jobs(&self, queues: &[String]) -> IndexMap<i64, Job> {
        self.waiting_jobs
            .iter()
            .filter(|(_id, job)| queues.iter().any(|q| q.as_str() == job.queue.as_ref()))
            .map(|(id, job)| (*id, job.clone()))
            .collect()
    }
    fn save_assignments(&mut self, assigned_jobs: IndexMap<i64, Job>) {
        self.waiting_jobs.retain(|id, _job| !assigned_jobs.contains_key(id));
        self.scheduled_jobs.extend(assigned_jobs.into_values());
    }
}
