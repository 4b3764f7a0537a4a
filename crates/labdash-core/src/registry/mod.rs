// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity records and the keyed registries that hold them.
//!
//! A [`Registry`] keeps the current record for every known entity of one kind,
//! keyed by identifier, and lists them in first-insertion order. Records handed
//! out of the registry are clones; callers never hold live references into it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry kinds that can hold a UI selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Robot,
    Experiment,
    Metric,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Robot => write!(f, "robot"),
            Self::Experiment => write!(f, "experiment"),
            Self::Metric => write!(f, "metric"),
        }
    }
}

/// Robot link state as reported by the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    Busy,
    Disconnected,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Busy => write!(f, "busy"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Status of a single metric, also used as the overall system health.
///
/// Variants are ordered by severity so the worst status is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Good,
    Warning,
    Critical,
}

impl fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Anything stored in a [`Registry`].
pub trait Keyed {
    /// Identifier the record is stored under.
    fn key(&self) -> &str;
}

/// Current state of one robot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotRecord {
    pub id: String,
    pub name: String,
    pub connectivity: Connectivity,
    /// Battery charge, 0-100.
    pub battery_percent: f64,
    /// Link quality, 0-100. Always 0 while disconnected.
    pub signal_percent: f64,
    pub temperature_c: f64,
    /// Seconds since the robot last reported activity.
    pub last_activity_age_secs: u64,
    /// When the last update for this robot was applied.
    pub observed_at: DateTime<Utc>,
}

impl RobotRecord {
    pub(crate) fn new(id: String, observed_at: DateTime<Utc>) -> Self {
        Self {
            name: id.clone(),
            id,
            connectivity: Connectivity::Disconnected,
            battery_percent: 0.0,
            signal_percent: 0.0,
            temperature_c: 0.0,
            last_activity_age_secs: 0,
            observed_at,
        }
    }

    /// Copy of this record with the activity age advanced to `now`.
    ///
    /// Stale robots keep their record; only the age keeps growing until the
    /// next update resets it.
    #[must_use]
    pub fn aged(&self, now: DateTime<Utc>) -> Self {
        let elapsed = u64::try_from((now - self.observed_at).num_seconds()).unwrap_or(0);
        Self {
            last_activity_age_secs: self.last_activity_age_secs.saturating_add(elapsed),
            observed_at: now,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connectivity == Connectivity::Connected
    }
}

impl Keyed for RobotRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A running or paused experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRecord {
    pub id: String,
    pub owner_name: String,
    pub title: String,
    /// Robot the experiment runs on. Not checked against the robot registry.
    pub robot_id: String,
    pub progress_percent: f64,
    pub execution_state: ExecutionState,
    pub priority: Priority,
    pub elapsed_secs: u64,
    pub estimated_total_secs: u64,
    pub error_count: u32,
}

impl ExperimentRecord {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            owner_name: String::new(),
            title: String::new(),
            robot_id: String::new(),
            progress_percent: 0.0,
            execution_state: ExecutionState::Running,
            priority: Priority::Medium,
            elapsed_secs: 0,
            estimated_total_secs: 0,
            error_count: 0,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.execution_state == ExecutionState::Running
    }
}

impl Keyed for ExperimentRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Latest sample for one system metric. A new sample replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub label: String,
    /// Display value, e.g. "45ms" or "2.1GB/8GB".
    pub current_value: String,
    pub status: MetricStatus,
    #[serde(default)]
    pub progress_percent: Option<f64>,
    pub trend: Trend,
    /// Display delta, e.g. "-12%" or "+3".
    #[serde(default)]
    pub change: String,
}

impl Keyed for MetricSample {
    fn key(&self) -> &str {
        &self.label
    }
}

/// Keyed collection of current records, listed in first-insertion order.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    records: HashMap<String, T>,
    order: Vec<String>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Keyed + Clone> Registry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record. Replacing keeps the existing list position.
    pub fn insert(&mut self, record: T) -> Option<T> {
        let key = record.key().to_string();
        let previous = self.records.insert(key.clone(), record);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let removed = self.records.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.records.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|key| self.records.get(key))
    }

    /// Owned copy of every record in listing order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
