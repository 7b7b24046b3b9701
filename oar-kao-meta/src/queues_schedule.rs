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


use crate::platform::Platform;
use log::info;
use oar_kao_core::scheduler::kamelot::{self, CycleReport};
use oar_kao_core::scheduler::sorting::JobOrderingPolicy;

/// Schedules the queues by decreasing priority on shared slot sets: each group of queues sees the placements of the previous ones.
/// Returns one report per group of queues.
pub fn queues_schedule(platform: &mut Platform, policy: &dyn JobOrderingPolicy) -> Vec<CycleReport> {
    let mut slot_sets = kamelot::init_slot_sets(&*platform, false);

    let mut reports = Vec::new();
    for active_queues in platform.queues_by_priority() {
        // Scheduled besteffort jobs are only obstacles for the besteffort queue.
        if active_queues.len() == 1 && active_queues[0] == "besteffort" {
            kamelot::add_already_scheduled_jobs_to_slot_set(&mut slot_sets, &*platform, true, false);
        }

        let report = kamelot::internal_schedule_cycle(&mut *platform, &mut slot_sets, &active_queues, policy);
        info!("Queues {:?}: {} jobs scheduled.", active_queues, report.allocations.len());
        reports.push(report);
    }
    reports
}
