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

use auto_bench_fct::auto_bench_fct_hy;
use range_set_blaze::RangeSetBlaze;

/// Set of internal resource ids, stored as sorted, disjoint and coalesced inclusive ranges.
/// Union (`|`), intersection (`&`), difference (`-`), equality and [`RangeSetBlaze::is_subset`] come from `range_set_blaze`.
pub type ProcSet = RangeSetBlaze<u32>;

/// Extra operations on [`ProcSet`] used by the hierarchy matcher and the slot code.
pub trait ProcSetOp {
    /// Number of resource ids in the set.
    fn cardinality(&self) -> u64;
    /// Returns the `count` lowest ids of the set, or `None` if the set holds fewer than `count` ids.
    fn first_n(&self, count: u32) -> Option<ProcSet>;
    /// Returns true if both sets share at least one id.
    fn overlaps(&self, other: &ProcSet) -> bool;
    /// Builds a set from `(low, high)` inclusive pairs. Fails on the first pair with `low > high`.
    fn try_from_intervals(intervals: &[(u32, u32)]) -> Result<ProcSet, (u32, u32)>;
}

impl ProcSetOp for ProcSet {
    fn cardinality(&self) -> u64 {
        self.len() as u64
    }

    #[auto_bench_fct_hy]
    fn first_n(&self, count: u32) -> Option<ProcSet> {
        if self.cardinality() < count as u64 {
            return None;
        }
        let mut selected = ProcSet::new();
        let mut remaining = count;
        for range in self.ranges() {
            if remaining == 0 {
                break;
            }
            let range_size = range.end() - range.start() + 1;
            if range_size <= remaining {
                selected |= &ProcSet::from_iter([range]);
                remaining -= range_size;
            } else {
                selected |= &ProcSet::from_iter([*range.start()..=(range.start() + remaining - 1)]);
                remaining = 0;
            }
        }
        Some(selected)
    }

    fn overlaps(&self, other: &ProcSet) -> bool {
        !(self & other).is_empty()
    }

    fn try_from_intervals(intervals: &[(u32, u32)]) -> Result<ProcSet, (u32, u32)> {
        if let Some(invalid) = intervals.iter().find(|(low, high)| low > high) {
            return Err(*invalid);
        }
        Ok(ProcSet::from_iter(intervals.iter().map(|(low, high)| *low..=*high)))
    }
}
