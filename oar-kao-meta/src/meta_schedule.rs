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
use crate::queues_schedule::queues_schedule;
use log::warn;
use oar_kao_core::platform::PlatformTrait;
use oar_kao_core::scheduler::kamelot::CycleReport;
use oar_kao_core::scheduler::sorting::policy_from_config;
use std::rc::Rc;

/// Runs a scheduling round over every queue and merges the reports.
pub fn meta_schedule(platform: &mut Platform) -> CycleReport {
    let platform_config = Rc::clone(platform.get_platform_config());
    let policy = policy_from_config(platform_config.config.job_priority);

    let mut round = CycleReport::default();
    for report in queues_schedule(platform, policy.as_ref()) {
        round.allocations.extend(report.allocations);
        round.diagnostics.extend(report.diagnostics);
        round.slot_count = round.slot_count.max(report.slot_count);
    }
    for diagnostic in &round.diagnostics {
        warn!("{}", diagnostic);
    }
    round
}
