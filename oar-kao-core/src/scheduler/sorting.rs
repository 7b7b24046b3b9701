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

use crate::model::configuration::JobPriority;
use crate::model::job::Job;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Order in which the waiting jobs of a queue are placed.
pub trait JobOrderingPolicy {
    fn name(&self) -> &'static str;
    /// Returns the ids of `jobs` in scheduling order.
    fn order(&self, jobs: &IndexMap<i64, Job>) -> Vec<i64>;
}

/// Submission time, then job id.
pub struct Fifo;
/// Ascending karma, then FIFO. Karma is computed outside of the scheduler.
pub struct Fairshare;
/// Descending priority, then FIFO.
pub struct SimplePriority;

fn fifo_cmp(a: &Job, b: &Job) -> Ordering {
    a.submission_time.cmp(&b.submission_time).then(a.id.cmp(&b.id))
}

fn ordered_ids<F>(jobs: &IndexMap<i64, Job>, mut cmp: F) -> Vec<i64>
where
    F: FnMut(&Job, &Job) -> Ordering,
{
    let mut sorted = jobs.values().collect::<Vec<_>>();
    sorted.sort_by(|a, b| cmp(a, b));
    sorted.into_iter().map(|job| job.id).collect()
}

impl JobOrderingPolicy for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
    }
    fn order(&self, jobs: &IndexMap<i64, Job>) -> Vec<i64> {
        ordered_ids(jobs, fifo_cmp)
    }
}

impl JobOrderingPolicy for Fairshare {
    fn name(&self) -> &'static str {
        "fairshare"
    }
    fn order(&self, jobs: &IndexMap<i64, Job>) -> Vec<i64> {
        ordered_ids(jobs, |a, b| a.karma.total_cmp(&b.karma).then_with(|| fifo_cmp(a, b)))
    }
}

impl JobOrderingPolicy for SimplePriority {
    fn name(&self) -> &'static str {
        "priority"
    }
    fn order(&self, jobs: &IndexMap<i64, Job>) -> Vec<i64> {
        ordered_ids(jobs, |a, b| b.priority.cmp(&a.priority).then_with(|| fifo_cmp(a, b)))
    }
}

pub fn policy_from_config(job_priority: JobPriority) -> Box<dyn JobOrderingPolicy> {
    match job_priority {
        JobPriority::Fifo => Box::new(Fifo),
        JobPriority::Fairshare => Box::new(Fairshare),
        JobPriority::Priority => Box::new(SimplePriority),
    }
}

/// Reorders `waiting_jobs` following `policy`. Jobs left out by the policy keep their relative order, after the others.
pub fn sort_jobs(policy: &dyn JobOrderingPolicy, waiting_jobs: &mut IndexMap<i64, Job>) {
    let rank = policy
        .order(waiting_jobs)
        .into_iter()
        .enumerate()
        .map(|(rank, id)| (id, rank))
        .collect::<HashMap<i64, usize>>();
    waiting_jobs.sort_by(|id1, _job1, id2, _job2| {
        let rank1 = rank.get(id1).copied().unwrap_or(usize::MAX);
        let rank2 = rank.get(id2).copied().unwrap_or(usize::MAX);
        rank1.cmp(&rank2)
    });
}
