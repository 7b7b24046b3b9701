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

/// Intersection of a FIFO window of [`ProcSet`]s, with amortized O(1) intersections per push and pop.
///
/// Two stacks are kept: `back` receives pushed sets and the running intersection of all of them,
/// `front` holds suffix intersections of the oldest sets. When `front` is empty on pop, `back` is
/// transferred into it, so each set is intersected a constant number of times overall.
#[derive(Debug, Default, Clone)]
pub struct SlidingIntersection {
    front: Vec<ProcSet>,
    back: Vec<ProcSet>,
    back_intersection: Option<ProcSet>,
}

impl SlidingIntersection {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.front.len() + self.back.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn clear(&mut self) {
        self.front.clear();
        self.back.clear();
        self.back_intersection = None;
    }

    /// Adds the newest set of the window.
    pub fn push(&mut self, proc_set: ProcSet) {
        self.back_intersection = Some(match self.back_intersection.take() {
            Some(intersection) => intersection & &proc_set,
            None => proc_set.clone(),
        });
        self.back.push(proc_set);
    }

    /// Removes the oldest set of the window.
    pub fn pop(&mut self) {
        if self.front.is_empty() {
            let mut suffix: Option<ProcSet> = None;
            while let Some(proc_set) = self.back.pop() {
                let intersection = match suffix {
                    Some(suffix) => proc_set & &suffix,
                    None => proc_set,
                };
                self.front.push(intersection.clone());
                suffix = Some(intersection);
            }
            self.back_intersection = None;
        }
        self.front.pop();
    }

    /// Intersection of every set in the window. Empty if the window is empty.
    pub fn intersection(&self) -> ProcSet {
        match (self.front.last(), &self.back_intersection) {
            (Some(front), Some(back)) => front & back,
            (Some(front), None) => front.clone(),
            (None, Some(back)) => back.clone(),
            (None, None) => ProcSet::new(),
        }
    }
}
