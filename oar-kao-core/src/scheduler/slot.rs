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

use crate::model::interval::ProcSet;
use crate::model::job::PlaceholderType;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

/// Free resources over the closed time interval `[begin, end]`. `prev` and `next` link the slot to its neighbours in a [`SlotSet`](crate::scheduler::slotset::SlotSet).
#[derive(Clone)]
pub struct Slot {
    pub id: i32,
    pub prev: Option<i32>,
    pub next: Option<i32>,
    pub proc_set: ProcSet,
    pub begin: i64,
    pub end: i64,
    /// Busy resources that time-sharing jobs may still use, by user (or `*`) then job name (or `*`).
    pub time_shared_proc_sets: HashMap<Box<str>, HashMap<Box<str>, ProcSet>>,
    /// Resources reserved by placeholder jobs and still open to their `allow` jobs, by placeholder name.
    pub placeholder_proc_sets: HashMap<Box<str>, ProcSet>,
}
impl Debug for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Slot {{ id: {}, prev: {:?}, next: {:?}, begin: {}, end: {}, proc_set: {} }}",
            self.id, self.prev, self.next, self.begin, self.end, self.proc_set
        )
    }
}

impl Slot {
    pub fn new(id: i32, prev: Option<i32>, next: Option<i32>, begin: i64, end: i64, proc_set: ProcSet) -> Slot {
        Slot {
            id,
            prev,
            next,
            proc_set,
            begin,
            end,
            time_shared_proc_sets: HashMap::new(),
            placeholder_proc_sets: HashMap::new(),
        }
    }

    pub fn sub_proc_set(&mut self, proc_set: &ProcSet) {
        self.proc_set = &self.proc_set - proc_set;
    }
    pub fn add_proc_set(&mut self, proc_set: &ProcSet) {
        self.proc_set = &self.proc_set | proc_set;
    }

    /// Copy of the slot contents under a new id and time interval.
    pub fn duplicate(&self, id: i32, prev: Option<i32>, next: Option<i32>, begin: i64, end: i64) -> Slot {
        Slot {
            id,
            prev,
            next,
            proc_set: self.proc_set.clone(),
            begin,
            end,
            time_shared_proc_sets: self.time_shared_proc_sets.clone(),
            placeholder_proc_sets: self.placeholder_proc_sets.clone(),
        }
    }

    /// Resources of the slot usable by a job, given its time-sharing identity `(user, job name)` and placeholder type.
    pub fn available_for(&self, time_sharing: Option<(&str, &str)>, placeholder: &PlaceholderType) -> ProcSet {
        let mut proc_set = self.proc_set.clone();
        if let Some((user_name, job_name)) = time_sharing {
            proc_set = proc_set | self.get_time_sharing_proc_set(user_name, job_name);
        }
        if let PlaceholderType::Allow(name) = placeholder {
            if let Some(ph_proc_set) = self.placeholder_proc_sets.get(name) {
                proc_set = proc_set | ph_proc_set;
            }
        }
        proc_set
    }

    /// Busy resources shareable with a job of `user_name` named `job_name`, wildcard entries included.
    pub fn get_time_sharing_proc_set(&self, user_name: &str, job_name: &str) -> ProcSet {
        [user_name, "*"]
            .iter()
            .filter_map(|user| self.time_shared_proc_sets.get(*user))
            .flat_map(|by_name| [job_name, "*"].into_iter().filter_map(move |name| by_name.get(name)))
            .fold(ProcSet::new(), |acc, proc_set| acc | proc_set)
    }

    /// Opens `proc_set` to the time-sharing jobs matching `user_name` and `job_name`, both possibly `*`.
    pub fn add_time_sharing_entry(&mut self, user_name: &str, job_name: &str, proc_set: &ProcSet) {
        self.time_shared_proc_sets
            .entry(user_name.into())
            .or_default()
            .entry(job_name.into())
            .and_modify(|p| *p |= proc_set)
            .or_insert_with(|| proc_set.clone());
    }

    /// Opens `proc_set` to the jobs allowed on the placeholder `name`.
    pub fn add_placeholder_entry(&mut self, name: &str, proc_set: &ProcSet) {
        self.placeholder_proc_sets
            .entry(name.into())
            .and_modify(|p| *p |= proc_set)
            .or_insert_with(|| proc_set.clone());
    }
    /// Removes `proc_set` from the placeholder `name` once an allowed job uses it.
    pub fn sub_placeholder_entry(&mut self, name: &str, proc_set: &ProcSet) {
        if let Some(p) = self.placeholder_proc_sets.get_mut(name) {
            *p = &*p - proc_set;
        }
    }
}
