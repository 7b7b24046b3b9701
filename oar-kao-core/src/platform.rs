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

use crate::error::ConfigError;
use crate::model::configuration::Configuration;
use crate::model::interval::ProcSet;
use crate::model::job::Job;
use crate::model::resource::{ResourceIdMap, ResourceOrder, ResourceRow, ResourceState};
use crate::scheduler::hierarchy::Hierarchy;
use indexmap::IndexMap;
use log::debug;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Access to the data of the scheduler outside of the engine (database, snapshot, simulator...).
pub trait PlatformTrait {
    fn get_now(&self) -> i64;
    fn get_max_time(&self) -> i64;
    fn get_platform_config(&self) -> &Rc<PlatformConfig>;

    /// Returns already scheduled jobs (running jobs, advance reservations, jobs of higher priority queues),
    /// with their assignment in internal resource ids.
    fn get_scheduled_jobs(&self) -> &[Job];

    /// Returns the jobs of `queues` waiting to be scheduled.
    /// Submission order is kept, jobs being indexed by id.
    fn get_waiting_jobs(&self, queues: &[String]) -> IndexMap<i64, Job>;

    /// Persists the assignments found during a cycle. Assigned jobs then count as scheduled for the next cycles.
    fn save_assignments(&mut self, assigned_jobs: IndexMap<i64, Job>);
}

pub struct PlatformConfig {
    pub resource_set: ResourceSet,
    pub config: Configuration,
}

impl PlatformConfig {
    pub fn new(config: Configuration, resources: &[ResourceRow]) -> Result<PlatformConfig, ConfigError> {
        let resource_set = ResourceSet::from_inventory(resources, &config)?;
        Ok(PlatformConfig { resource_set, config })
    }
}

/// Resources of the platform in internal numbering: resource `i` is the `i`-th one in `SCHEDULER_RESOURCE_ORDER`.
#[derive(Debug, Clone)]
pub struct ResourceSet {
    pub nb_resources_not_dead: u32,
    pub nb_resources_default_not_dead: u32,
    /// Resources that suspended jobs no longer hold.
    pub suspendable_resources: ProcSet,
    /// Resources schedulable by default, used to initialize slot sets.
    pub default_resources: ProcSet,
    /// Resources that stop being available after the given time.
    pub available_upto: Vec<(i64, ProcSet)>,
    pub hierarchy: Hierarchy,
    pub id_map: ResourceIdMap,
}

impl ResourceSet {
    /// Numbers the resources following `SCHEDULER_RESOURCE_ORDER` and builds the hierarchy of the Alive and Absent ones.
    pub fn from_inventory(resources: &[ResourceRow], config: &Configuration) -> Result<ResourceSet, ConfigError> {
        let order: ResourceOrder = config.scheduler_resource_order.parse()?;
        let mut sorted = resources.iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| order.compare(a, b));
        let id_map = ResourceIdMap::new(sorted.iter().map(|r| r.id).collect())?;

        let suspendable_types = config.suspendable_resource_types();
        let mut nb_resources_not_dead = 0;
        let mut nb_resources_default_not_dead = 0;
        let mut active = Vec::new();
        let mut default_ids = Vec::new();
        let mut suspendable_ids = Vec::new();
        let mut available_upto: BTreeMap<i64, Vec<u32>> = BTreeMap::new();
        for (internal_id, row) in sorted.iter().enumerate() {
            let internal_id = internal_id as u32;
            if row.state != ResourceState::Dead {
                nb_resources_not_dead += 1;
                if row.resource_type == "default" {
                    nb_resources_default_not_dead += 1;
                }
            }
            if !row.state.is_active() {
                continue;
            }
            active.push((internal_id, *row));
            if row.resource_type == "default" {
                default_ids.push(internal_id);
            }
            if suspendable_types.contains(&row.resource_type.as_str()) {
                suspendable_ids.push(internal_id);
            }
            // 0 is the persisted "no limit" value.
            if let Some(time) = row.available_upto.filter(|time| *time > 0) {
                available_upto.entry(time).or_default().push(internal_id);
            }
        }
        let hierarchy = Hierarchy::build(active.iter().copied(), &config.hierarchy_label_list())?;
        debug!(
            "Resource set built: {} resources, {} active, {} default.",
            resources.len(),
            active.len(),
            default_ids.len()
        );

        Ok(ResourceSet {
            nb_resources_not_dead,
            nb_resources_default_not_dead,
            suspendable_resources: ProcSet::from_iter(suspendable_ids),
            default_resources: ProcSet::from_iter(default_ids),
            available_upto: available_upto
                .into_iter()
                .map(|(time, ids)| (time, ProcSet::from_iter(ids)))
                .collect(),
            hierarchy,
            id_map,
        })
    }
}
