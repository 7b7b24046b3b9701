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

use crate::model::interval::{ProcSet, ProcSetOp};
use crate::model::resource::ResourceIdMap;
use crate::scheduler::hierarchy::HierarchyRequests;
use log::warn;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub name: Option<Box<str>>,
    pub user: Option<Box<str>>,
    pub queue: Box<str>,
    /// Job types as `key` or `key=value` (`container`, `inner`, `timesharing`, `placeholder`, `allow`, ...).
    pub types: HashMap<Box<str>, Option<Box<str>>>,
    /// Alternative shapes of the job, tried in declaration order.
    pub moldables: Vec<Moldable>,
    /// Placement of the job, `None` while it is waiting.
    pub assignment: Option<JobAssignment>,
    pub time_sharing: Option<TimeSharingType>,
    pub placeholder: PlaceholderType,
    /// Resource matcher, from the `find` type.
    pub find: FindPolicy,
    pub dependencies: Vec<Dependency>,
    /// The job can not start before this time (advance reservations, resubmissions).
    pub earliest_start_time: Option<i64>,
    pub submission_time: i64,
    pub karma: f64,
    pub priority: i64,
    /// Lifecycle state as stored by the persistence layer. Only `Suspended` changes the scheduling of already scheduled jobs.
    pub state: Box<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAssignment {
    pub begin: i64,
    /// Last second occupied by the job, security time included.
    pub end: i64,
    pub resources: ProcSet,
    /// Index of the moldable used for this assignment in the job's moldables vector.
    pub moldable_index: usize,
}

#[derive(Debug, Clone)]
pub struct Moldable {
    pub id: i64,
    pub walltime: i64,
    pub requests: HierarchyRequests,
    /// Built once by [`Moldable::new`] from the walltime and the requests; stale if either is mutated afterwards.
    pub cache_key: Box<str>,
}

/// Placement decision handed back to the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub job_id: i64,
    pub moldable_id: i64,
    pub begin: i64,
    pub end: i64,
    pub resources: ProcSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimeSharingType {
    /// timesharing=\*,\*
    AllAll,
    /// Shares with jobs of the same user: `timesharing=user,*`
    UserAll,
    /// Shares with jobs of the same name: `timesharing=*,name`
    AllName,
    /// timesharing=user,name
    UserName,
}

/// Matcher selecting the resources of a job among the ones free over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FindPolicy {
    /// Greedy scattered matching over the hierarchy levels.
    #[default]
    Scattered,
    /// First run of consecutive free ids long enough: `find=contiguous_1h`.
    Contiguous,
    /// Shortest run of consecutive free ids long enough: `find=contiguous_sorted_1h`.
    ContiguousBestFit,
    /// Outermost groups with the fewest free resources first: `find=local`.
    Local,
}

/// State of the job a dependency points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyState {
    /// Not finished yet: the dependent job starts after its end.
    Waiting,
    Terminated { exit_code: Option<i32> },
    /// Ignored.
    Error,
    /// Any other state blocks the dependent job for this cycle.
    Other(Box<str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub job_id: i64,
    pub state: DependencyState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaceholderType {
    /// The job reserves its resources for the `allow` jobs sharing the same name.
    Placeholder(Box<str>),
    /// The job may use the resources reserved by the placeholder of that name.
    Allow(Box<str>),
    None,
}

impl TimeSharingType {
    pub fn parse(user: &str, name: &str) -> Option<Self> {
        match (user, name) {
            ("*", "*") => Some(TimeSharingType::AllAll),
            ("user", "*") | ("*", "user") => Some(TimeSharingType::UserAll),
            ("name", "*") | ("*", "name") => Some(TimeSharingType::AllName),
            ("user", "name") | ("name", "user") => Some(TimeSharingType::UserName),
            _ => None,
        }
    }
    pub fn from_types(types: &HashMap<Box<str>, Option<Box<str>>>) -> Option<Self> {
        let value = types.get("timesharing")?;
        let parsed = value
            .as_ref()
            .and_then(|value| value.split_once(','))
            .and_then(|(user, name)| TimeSharingType::parse(user.trim(), name.trim()));
        if parsed.is_none() {
            warn!("Invalid time sharing type: {:?}", value);
        }
        parsed
    }
}

impl FindPolicy {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "default" | "scattered" => Some(FindPolicy::Scattered),
            "contiguous" | "contiguous_1h" => Some(FindPolicy::Contiguous),
            "contiguous_sorted" | "contiguous_sorted_1h" => Some(FindPolicy::ContiguousBestFit),
            "local" => Some(FindPolicy::Local),
            _ => None,
        }
    }
    /// Unknown matchers fall back to the scattered one. Arguments after `:` are ignored.
    pub fn from_types(types: &HashMap<Box<str>, Option<Box<str>>>) -> Self {
        let Some(value) = types.get("find") else {
            return FindPolicy::Scattered;
        };
        let parsed = value
            .as_deref()
            .map(|v| v.split_once(':').map_or(v, |(name, _args)| name))
            .and_then(|name| FindPolicy::parse(name.trim()));
        parsed.unwrap_or_else(|| {
            warn!("Unknown find function {:?}, using the scattered matcher.", value);
            FindPolicy::Scattered
        })
    }
    pub fn name(&self) -> &'static str {
        match self {
            FindPolicy::Scattered => "scattered",
            FindPolicy::Contiguous => "contiguous",
            FindPolicy::ContiguousBestFit => "contiguous_sorted",
            FindPolicy::Local => "local",
        }
    }
}

impl DependencyState {
    pub fn parse(state: &str, exit_code: Option<i32>) -> Self {
        match state {
            "Waiting" => DependencyState::Waiting,
            "Terminated" => DependencyState::Terminated { exit_code },
            "Error" => DependencyState::Error,
            other => DependencyState::Other(other.into()),
        }
    }
}

impl Dependency {
    pub fn new(job_id: i64, state: &str, exit_code: Option<i32>) -> Self {
        Dependency {
            job_id,
            state: DependencyState::parse(state, exit_code),
        }
    }
}

impl PlaceholderType {
    pub fn from_types(types: &HashMap<Box<str>, Option<Box<str>>>) -> Self {
        match (types.get("placeholder"), types.get("allow")) {
            (Some(Some(name)), _) => PlaceholderType::Placeholder(name.clone()),
            (_, Some(Some(name))) => PlaceholderType::Allow(name.clone()),
            (None, None) => PlaceholderType::None,
            _ => {
                warn!("Invalid placeholder type: missing name");
                PlaceholderType::None
            }
        }
    }
    pub fn is_none(&self) -> bool {
        matches!(self, PlaceholderType::None)
    }
}

impl Job {
    pub fn is_scheduled(&self) -> bool {
        self.assignment.is_some()
    }
    pub fn begin(&self) -> Option<i64> {
        self.assignment.as_ref().map(|a| a.begin)
    }
    pub fn end(&self) -> Option<i64> {
        self.assignment.as_ref().map(|a| a.end)
    }
    pub fn resource_count(&self) -> Option<u64> {
        self.assignment.as_ref().map(|a| a.resources.cardinality())
    }
    pub fn is_container(&self) -> bool {
        self.types.contains_key("container")
    }
    /// Name of the slot set in which the job is scheduled: the one of its container for inner jobs, `default` otherwise.
    pub fn slot_set_name(&self) -> Box<str> {
        match self.types.get("inner") {
            Some(Some(container)) => container.clone(),
            Some(None) => {
                warn!("Job {} has an inner type without container, using the default slot set.", self.id);
                "default".into()
            }
            None => "default".into(),
        }
    }
    /// Name of the slot set created for the inner jobs of a container job.
    /// Defaults to the job id when the container type has no value.
    pub fn container_slot_set_name(&self) -> Option<Box<str>> {
        self.types
            .get("container")
            .map(|name| name.clone().unwrap_or_else(|| self.id.to_string().into_boxed_str()))
    }

    /// Time sharing and placeholder jobs see other free resources than regular jobs, and custom matchers accept other windows,
    /// so the cache does not apply to them.
    pub fn can_use_cache(&self) -> bool {
        self.time_sharing.is_none() && self.placeholder.is_none() && self.find == FindPolicy::Scattered
    }
    /// A job whose start is constrained by other jobs or by a date does not give a lower bound valid for its siblings.
    pub fn can_set_cache(&self) -> bool {
        self.can_use_cache() && self.dependencies.is_empty() && self.earliest_start_time.is_none()
    }
}

pub struct JobBuilder {
    id: i64,
    name: Option<Box<str>>,
    user: Option<Box<str>>,
    queue: Option<Box<str>>,
    types: HashMap<Box<str>, Option<Box<str>>>,
    moldables: Vec<Moldable>,
    assignment: Option<JobAssignment>,
    time_sharing: Option<TimeSharingType>,
    placeholder: Option<PlaceholderType>,
    find: Option<FindPolicy>,
    dependencies: Vec<Dependency>,
    earliest_start_time: Option<i64>,
    submission_time: i64,
    karma: f64,
    priority: i64,
    state: Box<str>,
}

impl JobBuilder {
    pub fn new(id: i64) -> Self {
        JobBuilder {
            id,
            name: None,
            user: None,
            queue: None,
            types: HashMap::new(),
            moldables: vec![],
            assignment: None,
            time_sharing: None,
            placeholder: None,
            find: None,
            dependencies: Vec::new(),
            earliest_start_time: None,
            submission_time: 0,
            karma: 0.0,
            priority: 0,
            state: "Waiting".into(),
        }
    }
    pub fn moldable_auto(mut self, id: i64, walltime: i64, requests: HierarchyRequests) -> Self {
        self.moldables.push(Moldable::new(id, walltime, requests));
        self
    }
    pub fn moldable(mut self, moldable: Moldable) -> Self {
        self.moldables.push(moldable);
        self
    }
    pub fn moldables(mut self, moldables: Vec<Moldable>) -> Self {
        self.moldables = moldables;
        self
    }
    pub fn time_sharing(mut self, ts_type: TimeSharingType) -> Self {
        self.time_sharing = Some(ts_type);
        self
    }
    pub fn placeholder(mut self, placeholder: PlaceholderType) -> Self {
        self.placeholder = Some(placeholder);
        self
    }
    pub fn find(mut self, find: FindPolicy) -> Self {
        self.find = Some(find);
        self
    }
    pub fn name(mut self, name: Box<str>) -> Self {
        self.name = Some(name);
        self
    }
    pub fn name_opt(mut self, name: Option<Box<str>>) -> Self {
        self.name = name;
        self
    }
    pub fn user(mut self, user: Box<str>) -> Self {
        self.user = Some(user);
        self
    }
    pub fn user_opt(mut self, user: Option<Box<str>>) -> Self {
        self.user = user;
        self
    }
    pub fn queue(mut self, queue: Box<str>) -> Self {
        self.queue = Some(queue);
        self
    }
    pub fn types(mut self, types: HashMap<Box<str>, Option<Box<str>>>) -> Self {
        self.types = types;
        self
    }
    pub fn add_type(mut self, key: Box<str>, value: Box<str>) -> Self {
        self.types.insert(key, Some(value));
        self
    }
    pub fn add_type_key(mut self, key: Box<str>) -> Self {
        self.types.insert(key, None);
        self
    }
    pub fn assign(mut self, assignment: JobAssignment) -> Self {
        self.assignment = Some(assignment);
        self
    }
    pub fn assign_opt(mut self, assignment: Option<JobAssignment>) -> Self {
        self.assignment = assignment;
        self
    }
    pub fn dependencies<I: IntoIterator<Item = Dependency>>(mut self, dependencies: I) -> Self {
        self.dependencies.extend(dependencies);
        self
    }
    pub fn add_dependency(mut self, job_id: i64, state: Box<str>, exit_code: Option<i32>) -> Self {
        self.dependencies.push(Dependency::new(job_id, &state, exit_code));
        self
    }
    /// Depends on a job that is still waiting.
    pub fn add_valid_dependency(mut self, job_id: i64) -> Self {
        self.dependencies.push(Dependency {
            job_id,
            state: DependencyState::Waiting,
        });
        self
    }
    pub fn earliest_start_time(mut self, time: i64) -> Self {
        self.earliest_start_time = Some(time);
        self
    }
    pub fn earliest_start_time_opt(mut self, time: Option<i64>) -> Self {
        self.earliest_start_time = time;
        self
    }
    pub fn submission_time(mut self, submission_time: i64) -> Self {
        self.submission_time = submission_time;
        self
    }
    pub fn karma(mut self, karma: f64) -> Self {
        self.karma = karma;
        self
    }
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
    pub fn state(mut self, state: Box<str>) -> Self {
        self.state = state;
        self
    }
    /// Computes the time-sharing, placeholder and find types from `types` when they were not set explicitly.
    pub fn build(self) -> Job {
        Job {
            id: self.id,
            name: self.name,
            user: self.user,
            queue: self.queue.unwrap_or_else(|| Box::from("default")),
            time_sharing: self.time_sharing.or_else(|| TimeSharingType::from_types(&self.types)),
            placeholder: self.placeholder.unwrap_or_else(|| PlaceholderType::from_types(&self.types)),
            find: self.find.unwrap_or_else(|| FindPolicy::from_types(&self.types)),
            types: self.types,
            moldables: self.moldables,
            assignment: self.assignment,
            dependencies: self.dependencies,
            earliest_start_time: self.earliest_start_time,
            submission_time: self.submission_time,
            karma: self.karma,
            priority: self.priority,
            state: self.state,
        }
    }
}

impl JobAssignment {
    pub fn new(begin: i64, end: i64, resources: ProcSet, moldable_index: usize) -> JobAssignment {
        JobAssignment {
            begin,
            end,
            resources,
            moldable_index,
        }
    }
    /// Assignment of a job starting at `begin` for `walltime` seconds, extended by the security time.
    pub fn from_walltime(begin: i64, walltime: i64, security_time: i64, resources: ProcSet, moldable_index: usize) -> JobAssignment {
        JobAssignment::new(begin, begin + walltime + security_time - 1, resources, moldable_index)
    }
}

impl Moldable {
    pub fn new(id: i64, walltime: i64, requests: HierarchyRequests) -> Moldable {
        Moldable {
            cache_key: format!("{}-{}", walltime, requests.get_cache_key()).into(),
            id,
            walltime,
            requests,
        }
    }
}

impl Allocation {
    /// Returns the allocation of a scheduled job, `None` if the job has no assignment.
    pub fn from_job(job: &Job) -> Option<Allocation> {
        let assignment = job.assignment.as_ref()?;
        let moldable_id = job
            .moldables
            .get(assignment.moldable_index)
            .map(|m| m.id)
            .unwrap_or(assignment.moldable_index as i64);
        Some(Allocation {
            job_id: job.id,
            moldable_id,
            begin: assignment.begin,
            end: assignment.end,
            resources: assignment.resources.clone(),
        })
    }
    /// Resource ids of the allocation, in the persisted numbering.
    pub fn external_resources(&self, id_map: &ResourceIdMap) -> Vec<i64> {
        id_map.to_external(&self.resources)
    }
}
