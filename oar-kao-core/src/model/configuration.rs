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
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/oar/oar.conf";
/// Environment variable overriding [`DEFAULT_CONFIG_FILE`].
pub const CONFIG_FILE_ENV: &str = "OARCONFFILE";

/// Scheduler related keys of `oar.conf`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Configuration {
    /// Seconds added to every walltime.
    pub scheduler_job_security_time: i64,
    /// Comma separated resource columns used as hierarchy levels.
    pub hierarchy_labels: String,
    /// `ORDER BY`-like clause used to number resources.
    pub scheduler_resource_order: String,
    /// Space separated resource types that suspended jobs release.
    pub scheduler_available_suspended_resource_type: String,
    pub cache_enabled: bool,
    pub job_priority: JobPriority,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            scheduler_job_security_time: 60, // 1 minute
            hierarchy_labels: "resource_id,network_address".to_string(),
            scheduler_resource_order: "resource_id ASC".to_string(),
            scheduler_available_suspended_resource_type: "default".to_string(),
            cache_enabled: true,
            job_priority: JobPriority::Fifo,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPriority {
    /// Submission order.
    Fifo,
    /// Ascending karma.
    Fairshare,
    /// Descending job priority.
    Priority,
}

impl FromStr for JobPriority {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FIFO" => Ok(JobPriority::Fifo),
            "FAIRSHARE" | "KARMA" => Ok(JobPriority::Fairshare),
            "PRIORITY" => Ok(JobPriority::Priority),
            _ => Err(ConfigError::InvalidValue {
                key: "JOB_PRIORITY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl Configuration {
    /// Loads the configuration from the file named by `$OARCONFFILE`, or [`DEFAULT_CONFIG_FILE`].
    /// A missing file is not an error: the defaults are returned.
    pub fn load() -> Result<Configuration, ConfigError> {
        let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Configuration, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Configuration file {} not found, using default values.", path.display());
            return Ok(Configuration::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_conf_str(&content)
    }

    /// Parses `KEY="value"` lines. Comments start with `#`, unknown keys are ignored.
    pub fn from_conf_str(content: &str) -> Result<Configuration, ConfigError> {
        let mut config = Configuration::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                debug!("Ignoring configuration line {:?}", line);
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            config.set(key.trim(), value)?;
        }
        Ok(config)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "SCHEDULER_JOB_SECURITY_TIME" => {
                self.scheduler_job_security_time = value.parse::<i64>().ok().filter(|t| *t >= 0).ok_or_else(invalid)?;
            }
            "HIERARCHY_LABELS" => self.hierarchy_labels = value.to_string(),
            "SCHEDULER_RESOURCE_ORDER" => self.scheduler_resource_order = value.to_string(),
            "SCHEDULER_AVAILABLE_SUSPENDED_RESOURCE_TYPE" => self.scheduler_available_suspended_resource_type = value.to_string(),
            "CACHE_ENABLED" => {
                self.cache_enabled = match value.to_lowercase().as_str() {
                    "yes" | "true" | "1" => true,
                    "no" | "false" | "0" => false,
                    _ => return Err(invalid()),
                }
            }
            "JOB_PRIORITY" => self.job_priority = value.parse()?,
            _ => {}
        }
        Ok(())
    }

    /// Hierarchy level names, in configured order.
    pub fn hierarchy_label_list(&self) -> Vec<&str> {
        self.hierarchy_labels.split(',').map(str::trim).filter(|l| !l.is_empty()).collect()
    }

    pub fn suspendable_resource_types(&self) -> Vec<&str> {
        self.scheduler_available_suspended_resource_type.split_whitespace().collect()
    }
}
