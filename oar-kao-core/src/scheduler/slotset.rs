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
use crate::model::job::{Job, Moldable, PlaceholderType, TimeSharingType};
use crate::platform::PlatformConfig;
use crate::scheduler::slot::Slot;
use crate::scheduler::window::SlidingIntersection;
use prettytable::{format, row, Table};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

/// End of the last slot of a SlotSet created with [`SlotSet::new`], standing for "no end".
pub const MAX_TIME: i64 = i64::MAX / 4;

/// Availability timeline of a resource pool: slots chained by `prev`/`next` ids and stored in a HashMap for direct access.
/// A SlotSet cannot be empty, and its slots cover `[begin, end]` without gap nor overlap.
#[derive(Clone)]
pub struct SlotSet {
    begin: i64,
    end: i64,
    first_id: i32,
    last_id: i32,
    /// Id given to the next slot created by a split.
    next_id: i32,
    slots: HashMap<i32, Slot>,
    /// Moldable cache key -> slot where the last identical moldable was placed. Nothing fits before that slot.
    cache: HashMap<Box<str>, i32>,
}

/// Time window found by [`SlotSet::find_window`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub begin: i64,
    pub end: i64,
    /// Slot containing `begin`.
    pub begin_slot_id: i32,
    /// Slot containing `end`.
    pub end_slot_id: i32,
    pub resources: ProcSet,
}

impl Debug for SlotSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SlotSet {{ begin: {}, end: {}, first_id: {}, last_id: {}, next_id: {}, slots_count: {} }}",
            self.begin,
            self.end,
            self.first_id,
            self.last_id,
            self.next_id,
            self.slots.len()
        )
    }
}

impl SlotSet {
    /// Create a SlotSet with a single slot `[begin, MAX_TIME]` holding `resources`.
    pub fn new(resources: ProcSet, begin: i64) -> SlotSet {
        SlotSet::from_slot(Slot::new(1, None, None, begin, MAX_TIME, resources))
    }
    /// Create a SlotSet from a HashMap of Slots. Slots must form a contiguous doubly linked list.
    pub fn from_map(slots: HashMap<i32, Slot>, first_slot_id: i32) -> SlotSet {
        let first_slot = slots
            .get(&first_slot_id)
            .unwrap_or_else(|| panic!("SlotSet::from_map: first slot not found, no slot with the id {} found", first_slot_id));
        // Walk the chain up to the last slot
        let mut last_slot = first_slot;
        let mut next_id = first_slot.id + 1;
        while let Some(next_slot_id) = last_slot.next {
            let next_slot = slots
                .get(&next_slot_id)
                .unwrap_or_else(|| panic!("SlotSet::from_map: next slot of id {} not found.", next_slot_id));
            assert_eq!(
                next_slot.id, next_slot_id,
                "SlotSet::from_map: inconsistent map: the key {} is associated with the slot of id {}.",
                next_slot_id, next_slot.id
            );
            next_id = next_id.max(next_slot.id + 1);
            last_slot = next_slot;
        }
        let slot_set = SlotSet {
            begin: first_slot.begin,
            end: last_slot.end,
            first_id: first_slot.id,
            last_id: last_slot.id,
            next_id,
            slots,
            cache: HashMap::new(),
        };
        slot_set.assert_consistency();
        slot_set
    }
    pub fn from_slot(slot: Slot) -> SlotSet {
        SlotSet {
            begin: slot.begin,
            end: slot.end,
            first_id: slot.id,
            last_id: slot.id,
            next_id: slot.id + 1,
            slots: HashMap::from([(slot.id, slot)]),
            cache: HashMap::new(),
        }
    }
    /// Create a `SlotSet` covering `[begin, end]` with the default resources of the platform.
    pub fn from_platform_config(platform_config: &PlatformConfig, begin: i64, end: i64) -> SlotSet {
        let proc_set = platform_config.resource_set.default_resources.clone();
        SlotSet::from_slot(Slot::new(1, None, None, begin, end, proc_set))
    }

    /// One row per slot, in chain order.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_CLEAN);
        table.add_row(row![
            buFc->"Id",
            buFc->"Prev",
            buFc->"Next",
            buFc->"Begin (epoch)",
            buFc->"End (epoch)",
            buFc->"Size (days)",
            buFc->"ProcSet",
            buFc->"Placeholders"
        ]);
        for s in self.iter() {
            let placeholders = s
                .placeholder_proc_sets
                .iter()
                .map(|(name, proc_set)| format!("{}: {}", name, proc_set))
                .collect::<Vec<_>>()
                .join(" ");
            table.add_row(row![
                s.id,
                s.prev.map(|prev| format!("Some({})", prev)).unwrap_or("None".to_string()),
                s.next.map(|next| format!("Some({})", next)).unwrap_or("None".to_string()),
                s.begin,
                s.end,
                format!("{:.2}", (s.end - s.begin) as f64 / 3600f64 / 24f64),
                s.proc_set,
                placeholders,
            ]);
        }
        table
    }

    pub fn first_slot(&self) -> Option<&Slot> {
        self.slots.get(&self.first_id)
    }
    pub fn last_slot(&self) -> Option<&Slot> {
        self.slots.get(&self.last_id)
    }
    pub fn get_slot(&self, slot_id: i32) -> Option<&Slot> {
        self.slots.get(&slot_id)
    }

    /// If there is a cache hit with this moldable, returns the slot id at which the last identical moldable found resources.
    pub fn get_cache_first_slot(&self, moldable: &Moldable) -> Option<i32> {
        self.cache.get(&moldable.cache_key).cloned()
    }
    pub fn insert_cache_entry(&mut self, key: Box<str>, slot_id: i32) {
        self.cache.insert(key, slot_id);
    }
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn slot_id_at(&self, time: i64, starting_id: Option<i32>) -> Option<i32> {
        self.slot_at(time, starting_id).map(|slot| slot.id)
    }
    /// Returns the slot containing the given time, or None if no such slot exists after `starting_id`.
    pub fn slot_at(&self, time: i64, starting_id: Option<i32>) -> Option<&Slot> {
        let start = starting_id.unwrap_or(self.first_id);
        self.iter()
            .start_at(start)
            .take_while(|s| s.begin <= time)
            .find(|s| time <= s.end)
    }
    /// Slots in chronological order. Use [`SlotIterator::start_at`] or [`SlotIterator::between`] to iterate over a sub-chain.
    pub fn iter(&self) -> SlotIterator<'_> {
        SlotIterator {
            slots: &self.slots,
            begin: Some(self.first_id),
            end: Some(self.last_id),
        }
    }

    /// Cuts a slot in two so that a slot begins exactly at `time`.
    /// The left part keeps the id of the slot, the right part gets a fresh id.
    /// ```text
    ///           |                     |       |          |          |
    ///           |       Slot 1        |  -->  |  Slot 1  |  Slot 2  |
    ///           |                     |       |          |          |
    ///         --|---------------------|--   --|----------|----------|--
    ///           |0                  10|       |0   time-1|time    10|
    /// ```
    /// Splitting at the beginning of the slot is a no-op.
    /// Returns the id of the slot beginning at `time`.
    pub fn split_at(&mut self, slot_id: i32, time: i64) -> i32 {
        let new_slot_id = self.next_id;
        let slot = self
            .slots
            .get_mut(&slot_id)
            .unwrap_or_else(|| panic!("SlotSet::split_at: slot of id {} not found", slot_id));
        assert!(
            time >= slot.begin && time <= slot.end,
            "SlotSet::split_at: split time {} not in the slot time range [{}, {}]",
            time,
            slot.begin,
            slot.end
        );
        if time == slot.begin {
            return slot_id;
        }

        let new_slot = slot.duplicate(new_slot_id, Some(slot.id), slot.next, time, slot.end);
        slot.end = time - 1;
        slot.next = Some(new_slot_id);
        match new_slot.next {
            Some(next_id) => {
                if let Some(next) = self.slots.get_mut(&next_id) {
                    next.prev = Some(new_slot_id);
                }
            }
            None => self.last_id = new_slot_id,
        }
        self.slots.insert(new_slot_id, new_slot);
        self.next_id += 1;
        new_slot_id
    }
    /// Find the slot containing the given time and split it right before `time`. See [`Self::split_at`].
    /// Returns None if `time` is outside the SlotSet.
    pub fn find_and_split_at(&mut self, time: i64) -> Option<i32> {
        let slot_id = self.slot_id_at(time, None)?;
        Some(self.split_at(slot_id, time))
    }

    /// Slots containing `begin` and `end`, each bound being clamped to the SlotSet.
    /// None when `[begin, end]` does not meet the SlotSet. `start_slot_id` is a search hint.
    pub fn get_encompassing_range(&self, begin: i64, end: i64, start_slot_id: Option<i32>) -> Option<(&Slot, &Slot)> {
        let begin_slot_opt = if begin < self.begin {
            self.first_slot()
        } else {
            self.slot_at(begin, start_slot_id)
        };
        let end_slot_opt = if end > self.end {
            self.last_slot()
        } else {
            self.slot_at(end, begin_slot_opt.map(|b| b.id))
        };
        begin_slot_opt.zip(end_slot_opt)
    }

    /// Splits the slots so that slot boundaries match `begin` and `end + 1`. The range is clipped to the SlotSet.
    /// Returns the first and last slot ids of the range, or None if the range is disjoint from the SlotSet.
    pub fn split_slots_for_range(&mut self, begin: i64, end: i64, start_slot_id: Option<i32>) -> Option<(i32, i32)> {
        let (begin_slot, end_slot) = self.get_encompassing_range(begin, end, start_slot_id)?;
        let (begin_slot_id, begin_slot_begin) = (begin_slot.id, begin_slot.begin);
        let (end_slot_id, end_slot_end) = (end_slot.id, end_slot.end);

        let first_id = if begin_slot_begin < begin {
            self.split_at(begin_slot_id, begin)
        } else {
            begin_slot_id
        };
        let last_id = if begin_slot_id == end_slot_id { first_id } else { end_slot_id };
        if end_slot_end > end {
            self.split_at(last_id, end + 1);
        }
        #[cfg(debug_assertions)]
        self.assert_consistency();
        Some((first_id, last_id))
    }

    /// Splits the slots to the boundaries of the job assignment, then subtracts (or adds if `sub_resources` is false) its resources.
    /// Time-sharing and placeholder entries of the job are registered in the slots in both cases.
    /// None when the job is not assigned or lies outside the SlotSet.
    pub fn split_slots_for_job_and_update_resources(&mut self, job: &Job, sub_resources: bool, start_slot_id: Option<i32>) -> Option<(i32, i32)> {
        let assignment = job.assignment.as_ref()?;
        let (begin_slot_id, end_slot_id) = self.split_slots_for_range(assignment.begin, assignment.end, start_slot_id)?;
        if !sub_resources {
            self.cache.clear();
        }

        let user: &str = job.user.as_deref().unwrap_or("");
        let job_name: &str = job.name.as_deref().unwrap_or("");
        let time_sharing_key = job.time_sharing.as_ref().map(|ts| match ts {
            TimeSharingType::AllAll => ("*", "*"),
            TimeSharingType::AllName => ("*", job_name),
            TimeSharingType::UserAll => (user, "*"),
            TimeSharingType::UserName => (user, job_name),
        });
        let slot_ids = self.iter().between(begin_slot_id, end_slot_id).map(|slot| slot.id).collect::<Vec<i32>>();
        for slot_id in slot_ids {
            let Some(slot) = self.slots.get_mut(&slot_id) else {
                continue;
            };
            let proc_set = &assignment.resources;
            if sub_resources {
                slot.sub_proc_set(proc_set);
            } else {
                slot.add_proc_set(proc_set);
            }
            if let Some((ts_user, ts_name)) = time_sharing_key {
                slot.add_time_sharing_entry(ts_user, ts_name, proc_set);
            }
            match &job.placeholder {
                PlaceholderType::Placeholder(name) => slot.add_placeholder_entry(name, proc_set),
                PlaceholderType::Allow(name) if sub_resources => slot.sub_placeholder_entry(name, proc_set),
                _ => {}
            }
        }
        Some((begin_slot_id, end_slot_id))
    }

    /// See [`SlotSet::split_slots_for_job_and_update_resources`]. `jobs` should be sorted by start time.
    pub fn split_slots_for_jobs_and_update_resources(&mut self, jobs: &[&Job], sub_resources: bool, mut start_slot_id: Option<i32>) {
        for job in jobs {
            if let Some((begin_slot_id, _end_slot_id)) = self.split_slots_for_job_and_update_resources(job, sub_resources, start_slot_id) {
                start_slot_id = Some(begin_slot_id);
            }
        }
    }

    /// Removes `resources` from every slot overlapping `[begin, end]`, splitting slots at the range boundaries.
    pub fn subtract(&mut self, resources: &ProcSet, begin: i64, end: i64) {
        self.update_range(resources, begin, end, true);
    }
    /// Adds `resources` to every slot overlapping `[begin, end]`, splitting slots at the range boundaries.
    pub fn add(&mut self, resources: &ProcSet, begin: i64, end: i64) {
        self.update_range(resources, begin, end, false);
    }
    /// Records an allocation of `resources` from `start_time` for `duration` seconds.
    pub fn commit(&mut self, start_time: i64, duration: i64, resources: &ProcSet) {
        self.subtract(resources, start_time, start_time + duration - 1);
    }
    fn update_range(&mut self, resources: &ProcSet, begin: i64, end: i64, sub_resources: bool) {
        if begin > end {
            return;
        }
        let Some((begin_slot_id, end_slot_id)) = self.split_slots_for_range(begin, end, None) else {
            return;
        };
        // Cached slots are only lower bounds while resources are removed.
        if !sub_resources {
            self.cache.clear();
        }
        let slot_ids = self.iter().between(begin_slot_id, end_slot_id).map(|slot| slot.id).collect::<Vec<i32>>();
        for slot_id in slot_ids {
            if let Some(slot) = self.slots.get_mut(&slot_id) {
                if sub_resources {
                    slot.sub_proc_set(resources);
                } else {
                    slot.add_proc_set(resources);
                }
            }
        }
    }

    /// Returns the earliest `(start_time, resources)` such that the job fits `duration` seconds from `start_time >= start_after`,
    /// `needed` being called on the resources free over the whole window.
    pub fn find_first_window<N>(&self, start_after: i64, duration: i64, needed: N) -> Option<(i64, ProcSet)>
    where
        N: FnMut(&ProcSet) -> Option<ProcSet>,
    {
        self.find_window(start_after, duration, None, |slot| slot.proc_set.clone(), needed)
            .map(|window| (window.begin, window.resources))
    }

    /// Sliding window search over the slots, starting at `start_slot_id` (or the first slot) and not before `start_after`.
    /// `available` gives the resources of a slot usable by the job, `needed` selects resources among the ones free over a window.
    /// Each slot enters and leaves the window once, the window intersection being maintained incrementally.
    pub fn find_window<A, N>(&self, start_after: i64, duration: i64, start_slot_id: Option<i32>, mut available: A, mut needed: N) -> Option<Window>
    where
        A: FnMut(&Slot) -> ProcSet,
        N: FnMut(&ProcSet) -> Option<ProcSet>,
    {
        if duration <= 0 {
            return None;
        }
        let hint = start_slot_id.and_then(|id| self.slots.get(&id)).or_else(|| self.first_slot())?;
        let mut left = if start_after <= hint.begin {
            hint
        } else {
            self.slot_at(start_after, Some(hint.id))?
        };
        let mut right = left;
        let mut window = SlidingIntersection::new();
        window.push(available(left));
        loop {
            let begin = left.begin.max(start_after);
            let end = begin + duration - 1;
            if end > self.end {
                return None;
            }
            while right.end < end {
                right = self.slots.get(&right.next?)?;
                window.push(available(right));
            }
            let free = window.intersection();
            if !free.is_empty() {
                if let Some(resources) = needed(&free) {
                    return Some(Window {
                        begin,
                        end,
                        begin_slot_id: left.id,
                        end_slot_id: right.id,
                        resources,
                    });
                }
            }
            let next = self.slots.get(&left.next?)?;
            window.pop();
            if left.id == right.id {
                right = next;
                window.push(available(next));
            }
            left = next;
        }
    }

    /// Panics if the chain is broken: unreachable slot, wrong back link, `begin > end`, or gap/overlap between consecutive slots.
    pub fn assert_consistency(&self) {
        let mut count = 0;
        let mut prev: Option<&Slot> = None;
        for slot in self.iter() {
            assert!(slot.begin <= slot.end, "SlotSet: slot {} has begin {} > end {}", slot.id, slot.begin, slot.end);
            assert_eq!(slot.prev, prev.map(|p| p.id), "SlotSet: slot {} has a wrong prev link", slot.id);
            if let Some(prev) = prev {
                assert_eq!(
                    prev.end + 1,
                    slot.begin,
                    "SlotSet: gap or overlap between slot {} (end {}) and slot {} (begin {})",
                    prev.id,
                    prev.end,
                    slot.id,
                    slot.begin
                );
            }
            count += 1;
            prev = Some(slot);
        }
        let first = self.first_slot().expect("SlotSet: first slot missing");
        let last = prev.expect("SlotSet: empty slot set");
        assert_eq!(first.begin, self.begin, "SlotSet: begin does not match the first slot");
        assert_eq!(last.id, self.last_id, "SlotSet: chain does not end at the last slot");
        assert_eq!(last.end, self.end, "SlotSet: end does not match the last slot");
        assert_eq!(count, self.slots.len(), "SlotSet: {} slots are not reachable", self.slots.len() - count);
    }

    pub fn begin(&self) -> i64 {
        self.begin
    }
    pub fn end(&self) -> i64 {
        self.end
    }
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Walks the slot chain from `begin` to `end`, in both directions.
#[derive(Clone)]
pub struct SlotIterator<'a> {
    slots: &'a HashMap<i32, Slot>,
    /// Both are None once the iterator is exhausted.
    begin: Option<i32>,
    end: Option<i32>,
}

impl<'a> DoubleEndedIterator for SlotIterator<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let slot = self.slots.get(&self.end?)?;
        self.end = if Some(slot.id) == self.begin { None } else { slot.prev };
        if self.end.is_none() {
            self.begin = None;
        }
        Some(slot)
    }
}

impl<'a> Iterator for SlotIterator<'a> {
    type Item = &'a Slot;
    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.slots.get(&self.begin?)?;
        self.begin = if Some(slot.id) == self.end { None } else { slot.next };
        if self.begin.is_none() {
            self.end = None;
        }
        Some(slot)
    }
}

impl<'a> SlotIterator<'a> {
    /// Restricts the iterator to the chain `start..=end`.
    pub fn between(self, start: i32, end: i32) -> SlotIterator<'a> {
        SlotIterator {
            slots: self.slots,
            begin: Some(start),
            end: Some(end),
        }
    }
    pub fn start_at(mut self, start_id: i32) -> SlotIterator<'a> {
        self.begin = Some(start_id);
        self
    }
    /// Next slot, without advancing.
    pub fn peek(&self) -> Option<&'a Slot> {
        self.slots.get(&self.begin?)
    }
}
