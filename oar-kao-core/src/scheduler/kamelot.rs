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

use crate::error::JobDiagnostic;
use crate::model::interval::ProcSet;
use crate::model::job::{Allocation, Job, JobAssignment};
use crate::platform::{PlatformConfig, PlatformTrait};
use crate::scheduler::scheduling::{schedule_jobs, update_container_job_slot_set};
use crate::scheduler::slotset::SlotSet;
use crate::scheduler::sorting::{sort_jobs, JobOrderingPolicy};
use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use std::borrow::Cow;
use std::collections::HashMap;
use std::rc::Rc;

/// Result of a scheduling cycle.
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    /// Placements decided during this cycle, in scheduling order.
    pub allocations: Vec<Allocation>,
    /// Jobs skipped because of their request or their dependencies.
    pub diagnostics: Vec<JobDiagnostic>,
    /// Number of slots of the default slot set at the end of the cycle.
    pub slot_count: usize,
}

/// Schedules the waiting jobs of `queues` on fresh slot sets.
pub fn schedule_cycle<T: PlatformTrait>(platform: &mut T, queues: &[String], policy: &dyn JobOrderingPolicy) -> CycleReport {
    // Scheduled besteffort jobs only block the besteffort queue itself.
    let allow_besteffort = queues.len() == 1 && queues[0] == "besteffort";
    let mut slot_sets = init_slot_sets(platform, allow_besteffort);

    internal_schedule_cycle(platform, &mut slot_sets, queues, policy)
}

/// Schedules the waiting jobs of `queues` on existing slot sets, which keep the new assignments.
pub fn internal_schedule_cycle<T: PlatformTrait>(
    platform: &mut T,
    slot_sets: &mut HashMap<Box<str>, SlotSet>,
    queues: &[String],
    policy: &dyn JobOrderingPolicy,
) -> CycleReport {
    let platform_config = Rc::clone(platform.get_platform_config());
    let mut waiting_jobs = platform.get_waiting_jobs(queues);

    info!(
        "Internal scheduling {} jobs ({} scheduled jobs). Queues: {:?}, ordering: {}",
        waiting_jobs.len(),
        platform.get_scheduled_jobs().len(),
        queues,
        policy.name()
    );
    debug!(
        "job_security_time: {} | cache_enabled: {}",
        platform_config.config.scheduler_job_security_time, platform_config.config.cache_enabled
    );

    if waiting_jobs.is_empty() {
        return CycleReport::default();
    }
    sort_jobs(policy, &mut waiting_jobs);
    let diagnostics = schedule_jobs(&platform_config, slot_sets, &mut waiting_jobs);
    if let Some(slot_set) = slot_sets.get("default") {
        trace!("Default slot set after scheduling:\n{}", slot_set.to_table());
    }

    let assigned_jobs = waiting_jobs
        .into_iter()
        .filter(|(_id, job)| job.assignment.is_some())
        .collect::<IndexMap<i64, Job>>();
    let allocations = assigned_jobs.values().filter_map(Allocation::from_job).collect::<Vec<_>>();
    info!("{} jobs scheduled, {} diagnostics.", allocations.len(), diagnostics.len());
    platform.save_assignments(assigned_jobs);

    CycleReport {
        allocations,
        diagnostics,
        slot_count: slot_sets.get("default").map(SlotSet::slot_count).unwrap_or(0),
    }
}

/// Builds the `default` slot set from `now` to the platform max time, minus unavailable resources and already scheduled jobs.
pub fn init_slot_sets<P>(platform: &P, allow_besteffort: bool) -> HashMap<Box<str>, SlotSet>
where
    P: PlatformTrait,
{
    let now = platform.get_now();
    let max_time = platform.get_max_time();
    let platform_config = platform.get_platform_config();

    let mut initial_slot_set = SlotSet::from_platform_config(platform_config, now, max_time);

    slot_set_integrate_resource_availability(max_time, &platform_config.resource_set.available_upto, &mut initial_slot_set);
    let mut slot_sets = HashMap::from([("default".into(), initial_slot_set)]);
    // Running jobs, advance reservations and higher priority queues.
    add_already_scheduled_jobs_to_slot_set(&mut slot_sets, platform, allow_besteffort, true);

    slot_sets
}

/// Removes the resources of `available_upto` from the slot set after their availability time.
fn slot_set_integrate_resource_availability(max_time: i64, available_upto: &[(i64, ProcSet)], slot_set: &mut SlotSet) {
    for (time, proc_set) in available_upto.iter().filter(|(time, _)| *time < max_time) {
        slot_set.subtract(proc_set, time + 1, max_time);
    }
}

/// Subtracts the resources of the platform's scheduled jobs from their slot sets.
/// `allow_besteffort` and `allow_other` select the besteffort and the non-besteffort jobs respectively.
/// Container jobs first create or extend the slot set of their inner jobs.
pub fn add_already_scheduled_jobs_to_slot_set<T>(slot_sets: &mut HashMap<Box<str>, SlotSet>, platform: &T, allow_besteffort: bool, allow_other: bool)
where
    T: PlatformTrait,
{
    let platform_config = platform.get_platform_config();
    let mut scheduled_jobs = platform
        .get_scheduled_jobs()
        .iter()
        .filter(|j| j.assignment.is_some())
        .filter(|j| if j.queue.as_ref() == "besteffort" { allow_besteffort } else { allow_other })
        .collect::<Vec<&Job>>();
    if scheduled_jobs.is_empty() {
        return;
    }
    scheduled_jobs.sort_by_key(|j| j.begin());

    for job in scheduled_jobs.iter().filter(|j| j.is_container()) {
        update_container_job_slot_set(platform_config, slot_sets, job);
    }

    let occupying_jobs = scheduled_jobs
        .into_iter()
        .map(|job| occupied_resources(platform_config, job))
        .collect::<Vec<Cow<Job>>>();
    let mut slot_set_jobs: IndexMap<Box<str>, Vec<&Job>> = IndexMap::new();
    for job in &occupying_jobs {
        slot_set_jobs.entry(job.slot_set_name()).or_default().push(job.as_ref());
    }
    for (slot_set_name, jobs) in slot_set_jobs {
        match slot_sets.get_mut(&slot_set_name) {
            Some(slot_set) => slot_set.split_slots_for_jobs_and_update_resources(&jobs, true, None),
            None => warn!(
                "Slot set {} does not exist, {} scheduled jobs are not inserted.",
                slot_set_name,
                jobs.len()
            ),
        }
    }
}

/// Suspended jobs do not hold the suspendable resources.
fn occupied_resources<'j>(platform_config: &PlatformConfig, job: &'j Job) -> Cow<'j, Job> {
    match &job.assignment {
        Some(assignment) if job.state.as_ref() == "Suspended" => {
            let mut job = job.clone();
            job.assignment = Some(JobAssignment {
                resources: &assignment.resources - &platform_config.resource_set.suspendable_resources,
                ..assignment.clone()
            });
            Cow::Owned(job)
        }
        _ => Cow::Borrowed(job),
    }
}
