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

use crate::error::{ConfigError, RequestError};
use crate::model::interval::{ProcSet, ProcSetOp};
use crate::model::job::FindPolicy;
use crate::model::resource::ResourceRow;
use auto_bench_fct::auto_bench_fct_hy;
use indexmap::IndexMap;
use log::warn;
use std::collections::{HashMap, HashSet};

/// The resource request groups of a moldable (the `+` separated groups of `oarsub -l`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRequests(pub Box<[HierarchyRequest]>);
impl HierarchyRequests {
    pub fn from_requests(requests: Vec<HierarchyRequest>) -> Self {
        HierarchyRequests(requests.into_boxed_slice())
    }
    pub fn new_single(filter: ProcSet, level_nbs: Vec<(Box<str>, u32)>) -> Self {
        HierarchyRequests::from_requests(vec![HierarchyRequest::new(filter, level_nbs)])
    }
    pub fn get_cache_key(&self) -> String {
        self.0
            .iter()
            .map(|req| {
                format!(
                    "{}-{}",
                    req.filter,
                    req.level_nbs
                        .iter()
                        .map(|(name, count)| format!("{}:{}", name, count))
                        .collect::<Vec<_>>()
                        .join(",")
                )
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// One request group: a count per hierarchy level, outermost level first, restricted to the resources of `filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRequest {
    pub filter: ProcSet,
    pub level_nbs: Box<[(Box<str>, u32)]>, // Level name, number of resources requested at that level
}
impl HierarchyRequest {
    pub fn new(filter: ProcSet, level_nbs: Vec<(Box<str>, u32)>) -> Self {
        HierarchyRequest {
            filter,
            level_nbs: level_nbs.into_boxed_slice(),
        }
    }
}

/// One instance of a hierarchy level, e.g. one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyGroup {
    pub value: Box<str>,
    pub resources: ProcSet,
}

/// Partitions of the resources for each hierarchy level.
/// Groups of a level are ordered by their lowest resource id, which fixes the matching order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hierarchy {
    partitions: HashMap<Box<str>, Box<[HierarchyGroup]>>, // Level name, groups of that level
    /// Levels in which every group is a single resource. Matched by taking the lowest free ids.
    /// Virtual ones (see [`Hierarchy::add_unit_partition`]) have no entry in `partitions`.
    unit_partitions: HashSet<Box<str>>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }
    /// Adds a level from its groups. Groups are named after their position.
    pub fn add_partition(self, name: Box<str>, partitions: Box<[ProcSet]>) -> Self {
        let groups = partitions
            .into_vec()
            .into_iter()
            .enumerate()
            .map(|(i, resources)| HierarchyGroup {
                value: i.to_string().into(),
                resources,
            })
            .collect();
        self.add_groups(name, groups)
    }
    pub fn add_groups(mut self, name: Box<str>, mut groups: Vec<HierarchyGroup>) -> Self {
        if self.has_partition(&name) {
            panic!("A partition with the name {} already exists.", name);
        }
        groups.retain(|g| !g.resources.is_empty());
        groups.sort_by_key(|g| g.resources.first());
        self.partitions.insert(name, groups.into_boxed_slice());
        self
    }
    /// Declares a virtual level in which every resource is its own group (e.g. "core" or "resource_id").
    pub fn add_unit_partition(mut self, name: Box<str>) -> Self {
        if self.has_partition(&name) {
            panic!("A partition with the name {} already exists.", name);
        }
        self.unit_partitions.insert(name);
        self
    }
    pub fn has_partition(&self, name: &str) -> bool {
        self.partitions.contains_key(name) || self.unit_partitions.contains(name)
    }
    pub fn is_unit_partition(&self, name: &str) -> bool {
        self.unit_partitions.contains(name)
    }
    /// Groups of a level, ordered by lowest resource id. `None` for unknown levels and virtual unit levels.
    pub fn get_level(&self, name: &str) -> Option<&[HierarchyGroup]> {
        self.partitions.get(name).map(|groups| groups.as_ref())
    }

    /// Builds the hierarchy from active resources given with their internal id, in internal id order.
    /// Each label groups resources sharing the same value of that column.
    pub fn build<'r, I>(resources: I, labels: &[&str]) -> Result<Hierarchy, ConfigError>
    where
        I: IntoIterator<Item = (u32, &'r ResourceRow)>,
    {
        let resources = resources.into_iter().collect::<Vec<_>>();
        let mut hierarchy = Hierarchy::new();
        for label in labels {
            let mut groups: IndexMap<String, Vec<u32>> = IndexMap::new();
            let mut missing = 0;
            for (internal_id, row) in &resources {
                match row.value(label) {
                    Some(value) => groups.entry(value.into_owned()).or_default().push(*internal_id),
                    None => missing += 1,
                }
            }
            if !resources.is_empty() && groups.is_empty() {
                return Err(ConfigError::UnknownHierarchyLabel(label.to_string()));
            }
            if missing > 0 {
                warn!("{} resources have no value for hierarchy label {}, they can't be requested through it.", missing, label);
            }
            let unit = missing == 0 && groups.values().all(|ids| ids.len() == 1);
            let groups = groups
                .into_iter()
                .map(|(value, ids)| HierarchyGroup {
                    value: value.into(),
                    resources: ProcSet::from_iter(ids),
                })
                .collect();
            hierarchy = hierarchy.add_groups((*label).into(), groups);
            if unit {
                hierarchy.unit_partitions.insert((*label).into());
            }
        }
        Ok(hierarchy)
    }

    /// Checks a moldable's request against the hierarchy and the schedulable resources.
    pub fn validate(&self, moldable_id: i64, requests: &HierarchyRequests, resources: &ProcSet) -> Result<(), RequestError> {
        if requests.0.is_empty() {
            return Err(RequestError::EmptyRequest { moldable_id });
        }
        for request in requests.0.iter() {
            if request.level_nbs.is_empty() {
                return Err(RequestError::EmptyRequest { moldable_id });
            }
            for (level, count) in request.level_nbs.iter() {
                if !self.has_partition(level) {
                    return Err(RequestError::UnknownLevel {
                        moldable_id,
                        level: level.to_string(),
                    });
                }
                if *count == 0 {
                    return Err(RequestError::InvalidQuantity {
                        moldable_id,
                        level: level.to_string(),
                        count: 0,
                    });
                }
            }
            if !request.filter.overlaps(resources) {
                return Err(RequestError::EmptyFilter { moldable_id });
            }
        }
        Ok(())
    }

    /// Checks that the request groups have a shape `policy` can match: a single unit level for contiguous matchers,
    /// at most two levels for the local one, the inner one being a unit level.
    pub fn validate_find(&self, moldable_id: i64, policy: FindPolicy, requests: &HierarchyRequests) -> Result<(), RequestError> {
        let supported = |levels: &[(Box<str>, u32)]| match policy {
            FindPolicy::Scattered => true,
            FindPolicy::Contiguous | FindPolicy::ContiguousBestFit => matches!(levels, [(name, _)] if self.is_unit_partition(name)),
            FindPolicy::Local => match levels {
                [_] => true,
                [_, (inner, _)] => self.is_unit_partition(inner),
                _ => false,
            },
        };
        if requests.0.iter().all(|request| supported(&request.level_nbs)) {
            Ok(())
        } else {
            Err(RequestError::UnsupportedFind {
                moldable_id,
                find: policy.name(),
            })
        }
    }

    /// Finds resources for every request group in `available_proc_set`. A group never takes resources already taken by the previous ones.
    /// Returns the union of the groups' resources, or `None` if any group can't be satisfied.
    #[auto_bench_fct_hy]
    pub fn request(&self, available_proc_set: &ProcSet, request: &HierarchyRequests) -> Option<ProcSet> {
        self.request_with(FindPolicy::Scattered, available_proc_set, request)
    }

    /// Same as [`Hierarchy::request`], each group being matched by `policy`.
    pub fn request_with(&self, policy: FindPolicy, available_proc_set: &ProcSet, request: &HierarchyRequests) -> Option<ProcSet> {
        request.0.iter().try_fold(ProcSet::new(), |acc, req| {
            let universe = (available_proc_set & &req.filter) - &acc;
            if universe.is_empty() {
                return None;
            }
            let found = match policy {
                FindPolicy::Scattered => self.find_resource_hierarchies_scattered(&universe, &req.level_nbs),
                FindPolicy::Contiguous => self.find_contiguous(&universe, &req.level_nbs, false),
                FindPolicy::ContiguousBestFit => self.find_contiguous(&universe, &req.level_nbs, true),
                FindPolicy::Local => self.find_resource_hierarchies_local(&universe, &req.level_nbs),
            };
            found.map(|found| found | acc)
        })
    }

    /// Takes the lowest `count` ids of the first run of consecutive free ids holding at least `count` of them,
    /// or of the shortest such run if `best_fit`. Only a single unit level can be requested.
    pub fn find_contiguous(&self, available_proc_set: &ProcSet, level_requests: &[(Box<str>, u32)], best_fit: bool) -> Option<ProcSet> {
        let [(name, count)] = level_requests else {
            return None;
        };
        if !self.is_unit_partition(name) {
            return None;
        }
        let mut runs = available_proc_set.ranges().filter(|run| run.end() - run.start() + 1 >= *count);
        let run = if best_fit {
            runs.min_by_key(|run| run.end() - run.start())
        } else {
            runs.next()
        }?;
        Some(ProcSet::from_iter([*run.start()..=(run.start() + count - 1)]))
    }

    /// Packs a group in as few outer groups as possible: the outer groups with the fewest free resources able to host
    /// the inner count are taken first, then their lowest free ids. One level requests are matched as scattered ones.
    pub fn find_resource_hierarchies_local(&self, available_proc_set: &ProcSet, level_requests: &[(Box<str>, u32)]) -> Option<ProcSet> {
        let [(outer, outer_count), (inner, inner_count)] = level_requests else {
            return match level_requests {
                [_] => self.find_resource_hierarchies_scattered(available_proc_set, level_requests),
                _ => None,
            };
        };
        if !self.is_unit_partition(inner) {
            return None;
        }
        let Some(groups) = self.partitions.get(outer) else {
            // Virtual unit level: every resource is its own group.
            return self.find_resource_hierarchies_scattered(available_proc_set, level_requests);
        };
        let mut candidates = groups
            .iter()
            .map(|group| &group.resources & available_proc_set)
            .filter(|free| free.cardinality() >= *inner_count as u64)
            .collect::<Vec<_>>();
        if candidates.len() < *outer_count as usize {
            return None;
        }
        candidates.sort_by_key(|free| free.cardinality());
        candidates
            .iter()
            .take(*outer_count as usize)
            .try_fold(ProcSet::new(), |acc, free| free.first_n(*inner_count).map(|found| found | acc))
    }

    /// Greedy scattered matching: takes the first groups of the outermost level that can host the nested request, without backtracking.
    /// Groups of the innermost level are taken only when all their resources are available.
    #[auto_bench_fct_hy]
    pub fn find_resource_hierarchies_scattered(&self, available_proc_set: &ProcSet, level_requests: &[(Box<str>, u32)]) -> Option<ProcSet> {
        let ((name, request), inner_requests) = level_requests.split_first()?;
        if self.is_unit_partition(name) {
            if inner_requests.is_empty() {
                return available_proc_set.first_n(*request);
            }
            // Each resource is a group on its own: it must host the whole nested request.
            let found = available_proc_set
                .iter()
                .filter_map(|id| self.find_resource_hierarchies_scattered(&ProcSet::from_iter([id]), inner_requests))
                .take(*request as usize)
                .collect::<Vec<_>>();
            return (found.len() == *request as usize).then(|| found.into_iter().fold(ProcSet::new(), |acc, ps| acc | ps));
        }

        let Some(groups) = self.partitions.get(name) else {
            warn!("No such hierarchy level matching name {}", name);
            return None;
        };
        let mut proc_sets = ProcSet::new();
        let mut count = 0;
        for group in groups.iter() {
            if count == *request {
                break;
            }
            let free = &group.resources & available_proc_set;
            if free.is_empty() {
                continue;
            }
            let found = if inner_requests.is_empty() {
                (free == group.resources).then_some(free)
            } else {
                self.find_resource_hierarchies_scattered(&free, inner_requests)
            };
            if let Some(found) = found {
                proc_sets = proc_sets | found;
                count += 1;
            }
        }
        (count == *request).then_some(proc_sets)
    }
}
