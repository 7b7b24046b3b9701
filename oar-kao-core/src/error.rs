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

use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Errors in the configuration or in the resource inventory. They are fatal for the scheduling cycle
/// and are raised before any job is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid value {value:?} for configuration key {key}")]
    InvalidValue { key: String, value: String },
    #[error("Hierarchy label {0} is not a column of any resource")]
    UnknownHierarchyLabel(String),
    #[error("Invalid SCHEDULER_RESOURCE_ORDER clause: {0:?}")]
    InvalidResourceOrder(String),
    #[error("Resource {0} appears twice in the inventory")]
    DuplicateResource(i64),
}

/// Malformed resource request of a single job. Only the job owning the request is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("job has no moldable")]
    NoMoldable,
    #[error("moldable {moldable_id} has no resource request")]
    EmptyRequest { moldable_id: i64 },
    #[error("moldable {moldable_id} requests unknown hierarchy level {level}")]
    UnknownLevel { moldable_id: i64, level: String },
    #[error("moldable {moldable_id} requests {count} of level {level}")]
    InvalidQuantity { moldable_id: i64, level: String, count: i64 },
    #[error("moldable {moldable_id} has a non positive walltime {walltime}")]
    InvalidWalltime { moldable_id: i64, walltime: i64 },
    #[error("moldable {moldable_id} has a property filter matching no resource")]
    EmptyFilter { moldable_id: i64 },
    #[error("moldable {moldable_id} requests levels the {find} matcher can't handle")]
    UnsupportedFind { moldable_id: i64, find: &'static str },
}

/// Reason for which a job was left unplaced for another reason than the lack of free resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    InvalidRequest(RequestError),
    UnsatisfiedDependencies,
    MissingSlotSet(Box<str>),
}

/// Per-job diagnostic returned alongside the allocations of a scheduling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDiagnostic {
    pub job_id: i64,
    pub kind: DiagnosticKind,
}

impl JobDiagnostic {
    pub fn new(job_id: i64, kind: DiagnosticKind) -> Self {
        JobDiagnostic { job_id, kind }
    }
}

impl Display for JobDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            DiagnosticKind::InvalidRequest(e) => write!(f, "job {}: invalid request: {}", self.job_id, e),
            DiagnosticKind::UnsatisfiedDependencies => write!(f, "job {}: unsatisfied dependencies", self.job_id),
            DiagnosticKind::MissingSlotSet(name) => write!(f, "job {}: slot set {} is missing", self.job_id, name),
        }
    }
}
