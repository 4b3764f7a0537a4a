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

//! Telemetry event types and parsing.
//!
//! The core is transport-agnostic: whatever delivers status updates only has
//! to hand over tagged events. This module defines those events and a
//! trait-based parser abstraction, with a JSON-lines implementation.
//!
//! Wire shape of one event:
//! ```text
//! {"kind": "robot", "payload": {"id": "3", "connectivityState": "disconnected", "signalPercent": 0}}
//! ```

mod json_lines;

pub use json_lines::JsonLinesParser;

use serde::Deserialize;
use thiserror::Error;

use crate::notify::NotificationRequest;
use crate::registry::{Connectivity, ExecutionState, MetricSample, Priority};

/// Errors that can occur while parsing telemetry input.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("invalid event: {0}")]
    InvalidEvent(#[from] serde_json::Error),
}

/// Partial robot update. Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotUpdate {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    #[serde(alias = "connectivityState", alias = "status")]
    pub connectivity: Option<Connectivity>,
    #[serde(alias = "battery")]
    pub battery_percent: Option<f64>,
    #[serde(alias = "signal")]
    pub signal_percent: Option<f64>,
    #[serde(alias = "temperature")]
    pub temperature_c: Option<f64>,
    #[serde(alias = "lastActivityAgeSeconds")]
    pub last_activity_age_secs: Option<i64>,
}

impl RobotUpdate {
    /// Start an update for the given robot id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Partial experiment update. Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentUpdate {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "user")]
    pub owner_name: Option<String>,
    #[serde(alias = "name")]
    pub title: Option<String>,
    #[serde(alias = "robot")]
    pub robot_id: Option<String>,
    #[serde(alias = "progress")]
    pub progress_percent: Option<f64>,
    #[serde(alias = "status")]
    pub execution_state: Option<ExecutionState>,
    pub priority: Option<Priority>,
    #[serde(alias = "elapsedSeconds")]
    pub elapsed_secs: Option<i64>,
    #[serde(alias = "estimatedTotalSeconds")]
    pub estimated_total_secs: Option<i64>,
    #[serde(alias = "errors")]
    pub error_count: Option<i64>,
    /// Allows progress to move backwards while running.
    #[serde(default)]
    pub reset: bool,
}

impl ExperimentUpdate {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Partial update for the lab video stream health.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpdate {
    pub connected: Option<bool>,
    pub latency_ms: Option<i64>,
    #[serde(alias = "fps")]
    pub frames_per_second: Option<f64>,
    #[serde(alias = "quality")]
    pub resolution: Option<String>,
    pub signal_bars: Option<i64>,
}

/// How an experiment left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExperimentFinished {
    pub id: String,
    pub outcome: ExperimentOutcome,
}

/// A single-entity update routed to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityUpdate {
    Robot(RobotUpdate),
    Experiment(ExperimentUpdate),
    Metric(MetricSample),
    Video(VideoUpdate),
}

/// One tagged event from the telemetry input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Robot(RobotUpdate),
    Experiment(ExperimentUpdate),
    Metric(MetricSample),
    Video(VideoUpdate),
    ExperimentFinished(ExperimentFinished),
    Notification(NotificationRequest),
}

impl TelemetryEvent {
    /// The entity update carried by this event, if it is one.
    #[must_use]
    pub fn into_update(self) -> Option<EntityUpdate> {
        match self {
            Self::Robot(update) => Some(EntityUpdate::Robot(update)),
            Self::Experiment(update) => Some(EntityUpdate::Experiment(update)),
            Self::Metric(sample) => Some(EntityUpdate::Metric(sample)),
            Self::Video(update) => Some(EntityUpdate::Video(update)),
            Self::ExperimentFinished(_) | Self::Notification(_) => None,
        }
    }
}

/// Trait for telemetry parsers.
///
/// Implement this trait to accept another input encoding.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}
