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

use crate::error::{DiagnosticKind, JobDiagnostic, RequestError};
use crate::model::interval::ProcSet;
use crate::model::job::{DependencyState, Job, JobAssignment, Moldable};
use crate::platform::PlatformConfig;
use crate::scheduler::slot::Slot;
use crate::scheduler::slotset::{SlotSet, Window, MAX_TIME};
use auto_bench_fct::auto_bench_fct_hy;
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use std::collections::HashMap;

/// Schedule loop with support for jobs container - can be recursive.
/// Jobs are placed in the order of `waiting_jobs`, each placement being visible to the next jobs.
/// Returns the jobs that were skipped for another reason than a lack of resources.
pub fn schedule_jobs(
    platform_config: &PlatformConfig,
    slot_sets: &mut HashMap<Box<str>, SlotSet>,
    waiting_jobs: &mut IndexMap<i64, Job>,
) -> Vec<JobDiagnostic> {
    let mut diagnostics = Vec::new();
    let job_ids = waiting_jobs.keys().cloned().collect::<Box<[i64]>>();
    for job_id in job_ids {
        let Some(job) = waiting_jobs.get(&job_id) else {
            continue;
        };
        // Check job dependencies
        let Some(dependencies_min_begin) = dependencies_min_begin(job, waiting_jobs) else {
            info!("Job {} has unsatisfied dependencies and can't be scheduled.", job_id);
            diagnostics.push(JobDiagnostic::new(job_id, DiagnosticKind::UnsatisfiedDependencies));
            continue;
        };
        let min_begin = match (dependencies_min_begin, job.earliest_start_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        if let Err(e) = validate_job(platform_config, job) {
            warn!("Job {} can't be scheduled: {}", job_id, e);
            diagnostics.push(JobDiagnostic::new(job_id, DiagnosticKind::InvalidRequest(e)));
            continue;
        }

        // Schedule job
        let Some(job) = waiting_jobs.get_mut(&job_id) else {
            continue;
        };
        let Some(slot_set) = get_job_slot_set(slot_sets, job) else {
            diagnostics.push(JobDiagnostic::new(job_id, DiagnosticKind::MissingSlotSet(job.slot_set_name())));
            continue;
        };
        schedule_job(platform_config, slot_set, job, min_begin);

        // Manage container jobs
        if job.is_container() {
            update_container_job_slot_set(platform_config, slot_sets, job);
        }
    }
    diagnostics
}

/// Returns `None` if a dependency prevents the job from being scheduled,
/// `Some(min_begin)` otherwise, `min_begin` being the time after which every waiting dependency ends.
fn dependencies_min_begin(job: &Job, waiting_jobs: &IndexMap<i64, Job>) -> Option<Option<i64>> {
    let mut min_begin: Option<i64> = None;
    for dependency in &job.dependencies {
        let dep_job_id = dependency.job_id;
        match &dependency.state {
            DependencyState::Error => {
                info!(
                    "Job {} has a dependency on job {} which is in error state, ignoring dependency.",
                    job.id, dep_job_id
                );
            }
            DependencyState::Waiting => {
                let dep_end = waiting_jobs.get(&dep_job_id).and_then(|dep_job| dep_job.end());
                match dep_end {
                    Some(end) => min_begin = Some(min_begin.map_or(end + 1, |min| min.max(end + 1))),
                    None => {
                        debug!("Job {} depends on job {} which has not been scheduled.", job.id, dep_job_id);
                        return None;
                    }
                }
            }
            DependencyState::Terminated { exit_code: Some(0) | None } => {}
            DependencyState::Terminated { exit_code: Some(code) } => {
                debug!("Job {} depends on job {} which exited with code {}.", job.id, dep_job_id, code);
                return None;
            }
            DependencyState::Other(state) => {
                debug!("Job {} depends on job {} in state {}.", job.id, dep_job_id, state);
                return None;
            }
        }
    }
    Some(min_begin)
}

/// Checks every moldable of the job before looking for slots.
pub fn validate_job(platform_config: &PlatformConfig, job: &Job) -> Result<(), RequestError> {
    if job.moldables.is_empty() {
        return Err(RequestError::NoMoldable);
    }
    let resource_set = &platform_config.resource_set;
    for moldable in &job.moldables {
        if moldable.walltime <= 0 {
            return Err(RequestError::InvalidWalltime {
                moldable_id: moldable.id,
                walltime: moldable.walltime,
            });
        }
        resource_set
            .hierarchy
            .validate(moldable.id, &moldable.requests, &resource_set.default_resources)?;
        resource_set.hierarchy.validate_find(moldable.id, job.find, &moldable.requests)?;
    }
    Ok(())
}

/// According to a Job’s resources and a `SlotSet`, find the time and the resources to launch a job.
/// Moldables are tried in declaration order and the first one that fits is kept.
///
/// This function has two side effects.
///   - Assign the results directly to the `job` (such as start_time, resources, etc.)
///   - Split the slot_set to reflect the new allocation
///
/// Returns true if the job has been scheduled.
#[auto_bench_fct_hy]
pub fn schedule_job(platform_config: &PlatformConfig, slot_set: &mut SlotSet, job: &mut Job, min_begin: Option<i64>) -> bool {
    let found = job
        .moldables
        .iter()
        .enumerate()
        .find_map(|(i, moldable)| find_slots_for_moldable(platform_config, slot_set, job, moldable, min_begin).map(|window| (i, window)));

    match found {
        Some((moldable_index, window)) => {
            job.assignment = Some(JobAssignment::new(window.begin, window.end, window.resources, moldable_index));
            slot_set.split_slots_for_job_and_update_resources(job, true, Some(window.begin_slot_id));
            true
        }
        None => {
            info!("No slot found for job {}", job.id);
            false
        }
    }
}

/// Finds the earliest window in which the moldable fits, its walltime being extended by the security time.
/// Resources are chosen by the job's [`FindPolicy`](crate::model::job::FindPolicy).
#[auto_bench_fct_hy]
pub fn find_slots_for_moldable(
    platform_config: &PlatformConfig,
    slot_set: &mut SlotSet,
    job: &Job,
    moldable: &Moldable,
    min_begin: Option<i64>,
) -> Option<Window> {
    let cache_enabled = platform_config.config.cache_enabled;
    let start_slot_id = if cache_enabled && job.can_use_cache() {
        slot_set.get_cache_first_slot(moldable)
    } else {
        None
    };
    let start_after = min_begin.unwrap_or(slot_set.begin());
    let duration = moldable.walltime + platform_config.config.scheduler_job_security_time;
    let hierarchy = &platform_config.resource_set.hierarchy;
    let time_sharing = job
        .time_sharing
        .as_ref()
        .map(|_| (job.user.as_deref().unwrap_or(""), job.name.as_deref().unwrap_or("")));

    let window = slot_set.find_window(
        start_after,
        duration,
        start_slot_id,
        |slot| slot.available_for(time_sharing, &job.placeholder),
        |free| hierarchy.request_with(job.find, free, &moldable.requests),
    );

    if cache_enabled && job.can_set_cache() {
        if let Some(window) = &window {
            slot_set.insert_cache_entry(moldable.cache_key.clone(), window.begin_slot_id);
        }
    }
    window
}

/// Returns the slot set in which the job is scheduled, see [`Job::slot_set_name`].
pub fn get_job_slot_set<'s>(slot_sets: &'s mut HashMap<Box<str>, SlotSet>, job: &Job) -> Option<&'s mut SlotSet> {
    let slot_set_name = job.slot_set_name();
    let slot_set = slot_sets.get_mut(&slot_set_name);
    if slot_set.is_none() {
        error!(
            "Job {} can't be scheduled, slot set {} is missing. Skip it for this round.",
            job.id, slot_set_name
        );
    }
    slot_set
}

/// Creates or updates the child slot set of a container job.
/// The child slot set is named after the job's "container" type, or defaults to the job ID.
/// The resources of the container are added to it over the container's walltime, security time excluded.
/// Support having multiple container jobs with the same children slot set.
pub fn update_container_job_slot_set(platform_config: &PlatformConfig, slot_sets: &mut HashMap<Box<str>, SlotSet>, job: &Job) {
    let (Some(inner_slot_set_name), Some(assignment)) = (job.container_slot_set_name(), job.assignment.as_ref()) else {
        return;
    };
    let end = assignment.end - platform_config.config.scheduler_job_security_time;
    if end < assignment.begin {
        warn!("Container job {} is shorter than the security time, no inner slot set updated.", job.id);
        return;
    }
    let (begin, slot_set_end) = slot_sets
        .get("default")
        .map(|default| (default.begin(), default.end()))
        .unwrap_or((assignment.begin, MAX_TIME));

    slot_sets
        .entry(inner_slot_set_name)
        .or_insert_with(|| SlotSet::from_slot(Slot::new(1, None, None, begin, slot_set_end, ProcSet::new())))
        .add(&assignment.resources, assignment.begin, end);
}
