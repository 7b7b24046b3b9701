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
use crate::model::interval::ProcSet;
use log::warn;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    Alive,
    Absent,
    Suspected,
    Dead,
}

impl ResourceState {
    /// Alive and Absent resources are schedulable, Absent ones being expected to come back.
    pub fn is_active(&self) -> bool {
        matches!(self, ResourceState::Alive | ResourceState::Absent)
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Alive => "Alive",
            ResourceState::Absent => "Absent",
            ResourceState::Suspected => "Suspected",
            ResourceState::Dead => "Dead",
        }
    }
}

fn default_resource_type() -> String {
    "default".to_string()
}

/// One row of the resource inventory, as read by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRow {
    /// Persisted (external) resource id.
    pub id: i64,
    #[serde(rename = "type", default = "default_resource_type")]
    pub resource_type: String,
    pub state: ResourceState,
    /// Time after which the resource is no longer available. `None` means forever.
    #[serde(default)]
    pub available_upto: Option<i64>,
    /// Other columns: `network_address`, `cpu`, `core`, properties...
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ResourceRow {
    pub fn new(id: i64, state: ResourceState) -> Self {
        ResourceRow {
            id,
            resource_type: default_resource_type(),
            state,
            available_upto: None,
            labels: HashMap::new(),
        }
    }
    pub fn resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = resource_type.to_string();
        self
    }
    pub fn available_upto(mut self, time: i64) -> Self {
        self.available_upto = Some(time);
        self
    }
    pub fn label(mut self, column: &str, value: &str) -> Self {
        self.labels.insert(column.to_string(), value.to_string());
        self
    }

    /// Value of a column, built-in columns included.
    pub fn value(&self, column: &str) -> Option<Cow<'_, str>> {
        match column {
            "resource_id" | "id" => Some(Cow::Owned(self.id.to_string())),
            "type" => Some(Cow::Borrowed(self.resource_type.as_str())),
            "state" => Some(Cow::Borrowed(self.state.as_str())),
            "available_upto" => self.available_upto.map(|t| Cow::Owned(t.to_string())),
            _ => self.labels.get(column).map(|v| Cow::Borrowed(v.as_str())),
        }
    }
    pub fn has_column(&self, column: &str) -> bool {
        matches!(column, "resource_id" | "id" | "type" | "state" | "available_upto") || self.labels.contains_key(column)
    }
}

/// Ordering of the resources used to assign internal ids, parsed from `SCHEDULER_RESOURCE_ORDER`
/// (`column [ASC|DESC], ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOrder(Vec<(String, bool)>);

impl FromStr for ResourceOrder {
    type Err = ConfigError;

    fn from_str(clause: &str) -> Result<Self, Self::Err> {
        let mut keys = Vec::new();
        for term in clause.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let tokens = term.split_whitespace().collect::<Vec<_>>();
            let descending = match tokens.as_slice() {
                [_] => false,
                [_, direction] if direction.eq_ignore_ascii_case("asc") => false,
                [_, direction] if direction.eq_ignore_ascii_case("desc") => true,
                _ => return Err(ConfigError::InvalidResourceOrder(clause.to_string())),
            };
            keys.push((tokens[0].to_string(), descending));
        }
        if keys.is_empty() {
            keys.push(("resource_id".to_string(), false));
        }
        Ok(ResourceOrder(keys))
    }
}

impl ResourceOrder {
    /// Values are compared as integers when both parse, as strings otherwise. Missing values come first.
    /// Rows equal on every key are ordered by external id.
    pub fn compare(&self, a: &ResourceRow, b: &ResourceRow) -> Ordering {
        self.0
            .iter()
            .map(|(column, descending)| {
                let ordering = compare_values(a.value(column).as_deref(), b.value(column).as_deref());
                if *descending { ordering.reverse() } else { ordering }
            })
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.id.cmp(&b.id))
    }
}

fn compare_values(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => a.cmp(b),
        },
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

/// Bidirectional mapping between persisted resource ids and the dense internal ids used in every [`ProcSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceIdMap {
    i2o: Vec<i64>,
    o2i: HashMap<i64, u32>,
}

impl ResourceIdMap {
    /// Internal ids are the positions of the external ids in `ordered_external_ids`.
    pub fn new(ordered_external_ids: Vec<i64>) -> Result<Self, ConfigError> {
        let mut o2i = HashMap::with_capacity(ordered_external_ids.len());
        for (internal, external) in ordered_external_ids.iter().enumerate() {
            if o2i.insert(*external, internal as u32).is_some() {
                return Err(ConfigError::DuplicateResource(*external));
            }
        }
        Ok(ResourceIdMap {
            i2o: ordered_external_ids,
            o2i,
        })
    }
    pub fn len(&self) -> usize {
        self.i2o.len()
    }
    pub fn is_empty(&self) -> bool {
        self.i2o.is_empty()
    }
    pub fn internal_id(&self, external: i64) -> Option<u32> {
        self.o2i.get(&external).copied()
    }
    pub fn external_id(&self, internal: u32) -> Option<i64> {
        self.i2o.get(internal as usize).copied()
    }
    /// Converts an unordered list of external ids. Unknown ids are dropped with a warning.
    pub fn to_internal(&self, external_ids: &[i64]) -> ProcSet {
        ProcSet::from_iter(external_ids.iter().filter_map(|id| {
            let internal = self.internal_id(*id);
            if internal.is_none() {
                warn!("Unknown resource id {}, ignored.", id);
            }
            internal
        }))
    }
    pub fn to_external(&self, proc_set: &ProcSet) -> Vec<i64> {
        proc_set.iter().filter_map(|id| self.external_id(id)).collect()
    }
}
