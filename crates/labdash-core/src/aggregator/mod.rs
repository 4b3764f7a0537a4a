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

//! Status aggregation over the entity registries.
//!
//! The aggregator merges single-entity updates into the robot, experiment and
//! metric registries, keeps the latest video stream health, and reports the
//! status changes each update caused. Derived values (counts, averages, overall
//! health) are recomputed from the registries on every read.
//!
//! Updates are validated in full against a merged copy of the record before
//! anything is written, so a rejected update leaves every registry untouched.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{Error, ValidationError};
use crate::protocol::{
    EntityUpdate, ExperimentOutcome, ExperimentUpdate, RobotUpdate, VideoUpdate,
};
use crate::registry::{
    Connectivity, ExperimentRecord, MetricSample, MetricStatus, Registry, RobotRecord,
};

const TEMPERATURE_MIN_C: f64 = -50.0;
const TEMPERATURE_MAX_C: f64 = 150.0;
const MAX_SIGNAL_BARS: i64 = 4;

/// Latest known health of the lab video stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoHealth {
    pub connected: bool,
    pub latency_ms: u32,
    pub frames_per_second: f64,
    pub resolution: String,
    /// Connection quality, 0-4 bars.
    pub signal_bars: u8,
}

impl Default for VideoHealth {
    fn default() -> Self {
        Self {
            connected: false,
            latency_ms: 0,
            frames_per_second: 0.0,
            resolution: String::new(),
            signal_bars: 0,
        }
    }
}

/// A change worth telling someone about, produced by an accepted update.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// First update seen for a robot.
    RobotAdded { id: String, name: String },
    ConnectivityChanged {
        id: String,
        name: String,
        from: Connectivity,
        to: Connectivity,
    },
    /// Battery dropped to or below the low-battery threshold.
    BatteryLow {
        id: String,
        name: String,
        battery_percent: f64,
    },
    ExperimentStarted { id: String, title: String },
    /// Error count of an experiment increased.
    ExperimentErrors {
        id: String,
        title: String,
        error_count: u32,
        added: u32,
    },
    ExperimentFinished {
        id: String,
        title: String,
        outcome: ExperimentOutcome,
    },
    MetricStatusChanged {
        label: String,
        from: Option<MetricStatus>,
        to: MetricStatus,
    },
    VideoConnectivityChanged { connected: bool },
}

/// Configuration for the status aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Battery level at or below which a robot is reported as low.
    pub low_battery_percent: f64,
    /// Broadcast channel capacity for status changes.
    pub event_channel_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            low_battery_percent: 20.0,
            event_channel_capacity: 256,
        }
    }
}

/// Derived fleet-wide values, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub connected_robots: usize,
    pub total_robots: usize,
    pub battery_average: Option<f64>,
    pub temperature_average: Option<f64>,
    pub running_experiments: usize,
    pub total_errors: u64,
    pub health: MetricStatus,
}

/// Merges updates into the registries and computes derived views.
pub struct StatusAggregator {
    robots: Registry<RobotRecord>,
    experiments: Registry<ExperimentRecord>,
    metrics: Registry<MetricSample>,
    video: VideoHealth,
    low_battery_percent: f64,
    event_tx: broadcast::Sender<StatusChange>,
}

impl std::fmt::Debug for StatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAggregator")
            .field("robots", &self.robots.len())
            .field("experiments", &self.experiments.len())
            .field("metrics", &self.metrics.len())
            .field("low_battery_percent", &self.low_battery_percent)
            .finish_non_exhaustive()
    }
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl StatusAggregator {
    #[must_use]
    pub fn new(config: AggregatorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Self {
            robots: Registry::new(),
            experiments: Registry::new(),
            metrics: Registry::new(),
            video: VideoHealth::default(),
            low_battery_percent: config.low_battery_percent,
            event_tx,
        }
    }

    /// Merge one update into the matching registry.
    ///
    /// Existing records are overwritten field by field for every field the
    /// update sets; unknown ids are inserted. Invalid updates are rejected and
    /// leave state unchanged.
    pub fn apply_update(&mut self, update: EntityUpdate) -> Result<Vec<StatusChange>, ValidationError> {
        self.apply_update_at(update, Utc::now())
    }

    /// Same as [`apply_update`](Self::apply_update) with an explicit clock.
    pub fn apply_update_at(
        &mut self,
        update: EntityUpdate,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusChange>, ValidationError> {
        let result = match update {
            EntityUpdate::Robot(update) => self.apply_robot(update, now),
            EntityUpdate::Experiment(update) => self.apply_experiment(update),
            EntityUpdate::Metric(sample) => self.apply_metric(sample),
            EntityUpdate::Video(update) => self.apply_video(update),
        };

        match &result {
            Ok(changes) => {
                for change in changes {
                    let _ = self.event_tx.send(change.clone());
                }
            }
            Err(e) => warn!("Rejected update: {e}"),
        }

        result
    }

    fn apply_robot(
        &mut self,
        update: RobotUpdate,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusChange>, ValidationError> {
        if update.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ValidationError::MissingField("name"));
        }

        let battery = check_optional_range("batteryPercent", update.battery_percent, 0.0, 100.0)?;
        let signal = check_optional_range("signalPercent", update.signal_percent, 0.0, 100.0)?;
        let temperature = check_optional_range(
            "temperatureC",
            update.temperature_c,
            TEMPERATURE_MIN_C,
            TEMPERATURE_MAX_C,
        )?;
        let age = update
            .last_activity_age_secs
            .map(|v| check_non_negative("lastActivityAgeSecs", v))
            .transpose()?;

        let previous = self.robots.get(&update.id).cloned();
        let mut record = previous
            .as_ref()
            .map_or_else(|| RobotRecord::new(update.id.clone(), now), |r| r.aged(now));

        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(connectivity) = update.connectivity {
            record.connectivity = connectivity;
        }
        if let Some(battery) = battery {
            record.battery_percent = battery;
        }
        if let Some(signal) = signal {
            record.signal_percent = signal;
        }
        if let Some(temperature) = temperature {
            record.temperature_c = temperature;
        }
        if let Some(age) = age {
            record.last_activity_age_secs = age;
        }
        record.observed_at = now;

        // Disconnected robots have no link; a sent signal must agree
        if record.connectivity == Connectivity::Disconnected {
            match signal {
                Some(s) if s > 0.0 => {
                    return Err(ValidationError::InconsistentSignal {
                        id: record.id,
                        signal: s,
                    });
                }
                Some(_) => {}
                None => record.signal_percent = 0.0,
            }
        }

        let mut changes = Vec::new();
        match &previous {
            None => {
                info!("Tracking new robot {} ({})", record.name, record.id);
                changes.push(StatusChange::RobotAdded {
                    id: record.id.clone(),
                    name: record.name.clone(),
                });
            }
            Some(prev) if prev.connectivity != record.connectivity => {
                info!(
                    "Robot {} connectivity {} -> {}",
                    record.name, prev.connectivity, record.connectivity
                );
                changes.push(StatusChange::ConnectivityChanged {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    from: prev.connectivity,
                    to: record.connectivity,
                });
            }
            Some(_) => {}
        }

        let was_low = previous
            .as_ref()
            .is_some_and(|p| p.battery_percent <= self.low_battery_percent);
        let battery_known = previous.is_some() || battery.is_some();
        if battery_known && !was_low && record.battery_percent <= self.low_battery_percent {
            changes.push(StatusChange::BatteryLow {
                id: record.id.clone(),
                name: record.name.clone(),
                battery_percent: record.battery_percent,
            });
        }

        debug!("Applied robot update for {}", record.id);
        self.robots.insert(record);
        Ok(changes)
    }

    fn apply_experiment(&mut self, update: ExperimentUpdate) -> Result<Vec<StatusChange>, ValidationError> {
        if update.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id"));
        }

        let progress = check_optional_range("progressPercent", update.progress_percent, 0.0, 100.0)?;
        let elapsed = update
            .elapsed_secs
            .map(|v| check_non_negative("elapsedSecs", v))
            .transpose()?;
        let estimated = update
            .estimated_total_secs
            .map(|v| check_non_negative("estimatedTotalSecs", v))
            .transpose()?;
        let errors = update
            .error_count
            .map(|v| {
                check_non_negative("errorCount", v).and_then(|n| {
                    u32::try_from(n).map_err(|e| {
                        debug!("Error count {n} does not fit: {e}");
                        ValidationError::OutOfRange {
                            field: "errorCount",
                            value: v as f64,
                            min: 0.0,
                            max: f64::from(u32::MAX),
                        }
                    })
                })
            })
            .transpose()?;

        let previous = self.experiments.get(&update.id).cloned();
        let mut record = previous
            .clone()
            .unwrap_or_else(|| ExperimentRecord::new(update.id.clone()));

        if let Some(owner) = update.owner_name {
            record.owner_name = owner;
        }
        if let Some(title) = update.title {
            record.title = title;
        }
        if let Some(robot_id) = update.robot_id {
            record.robot_id = robot_id;
        }
        if let Some(progress) = progress {
            record.progress_percent = progress;
        }
        if let Some(state) = update.execution_state {
            record.execution_state = state;
        }
        if let Some(priority) = update.priority {
            record.priority = priority;
        }
        if let Some(elapsed) = elapsed {
            record.elapsed_secs = elapsed;
        }
        if let Some(estimated) = estimated {
            record.estimated_total_secs = estimated;
        }
        if let Some(errors) = errors {
            record.error_count = errors;
        }

        if let Some(prev) = &previous {
            let regressed = prev.is_running()
                && record.is_running()
                && record.progress_percent < prev.progress_percent;
            if regressed && !update.reset {
                return Err(ValidationError::ProgressRegression {
                    id: record.id,
                    from: prev.progress_percent,
                    to: record.progress_percent,
                });
            }
        }

        let mut changes = Vec::new();
        match &previous {
            None => {
                info!("Experiment started: {} ({})", record.title, record.id);
                changes.push(StatusChange::ExperimentStarted {
                    id: record.id.clone(),
                    title: record.title.clone(),
                });
                if record.error_count > 0 {
                    changes.push(StatusChange::ExperimentErrors {
                        id: record.id.clone(),
                        title: record.title.clone(),
                        error_count: record.error_count,
                        added: record.error_count,
                    });
                }
            }
            Some(prev) if record.error_count > prev.error_count => {
                changes.push(StatusChange::ExperimentErrors {
                    id: record.id.clone(),
                    title: record.title.clone(),
                    error_count: record.error_count,
                    added: record.error_count - prev.error_count,
                });
            }
            Some(_) => {}
        }

        debug!("Applied experiment update for {}", record.id);
        self.experiments.insert(record);
        Ok(changes)
    }

    fn apply_metric(&mut self, sample: MetricSample) -> Result<Vec<StatusChange>, ValidationError> {
        if sample.label.trim().is_empty() {
            return Err(ValidationError::MissingField("label"));
        }
        check_optional_range("progressPercent", sample.progress_percent, 0.0, 100.0)?;

        let from = self.metrics.get(&sample.label).map(|m| m.status);
        let mut changes = Vec::new();
        let changed = match from {
            Some(previous) => previous != sample.status,
            None => sample.status != MetricStatus::Good,
        };
        if changed {
            info!("Metric '{}' is now {}", sample.label, sample.status);
            changes.push(StatusChange::MetricStatusChanged {
                label: sample.label.clone(),
                from,
                to: sample.status,
            });
        }

        self.metrics.insert(sample);
        Ok(changes)
    }

    fn apply_video(&mut self, update: VideoUpdate) -> Result<Vec<StatusChange>, ValidationError> {
        let latency = update
            .latency_ms
            .map(|v| {
                check_non_negative("latencyMs", v)
                    .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            })
            .transpose()?;
        let fps = check_optional_range("framesPerSecond", update.frames_per_second, 0.0, 1000.0)?;
        let bars = update
            .signal_bars
            .map(|v| {
                if (0..=MAX_SIGNAL_BARS).contains(&v) {
                    Ok(u8::try_from(v).unwrap_or(0))
                } else {
                    Err(ValidationError::OutOfRange {
                        field: "signalBars",
                        value: v as f64,
                        min: 0.0,
                        max: MAX_SIGNAL_BARS as f64,
                    })
                }
            })
            .transpose()?;
        if update.resolution.as_deref().is_some_and(|r| r.trim().is_empty()) {
            return Err(ValidationError::MissingField("resolution"));
        }

        let mut video = self.video.clone();
        if let Some(connected) = update.connected {
            video.connected = connected;
        }
        if let Some(latency) = latency {
            video.latency_ms = latency;
        }
        if let Some(fps) = fps {
            video.frames_per_second = fps;
        }
        if let Some(resolution) = update.resolution {
            video.resolution = resolution;
        }
        if let Some(bars) = bars {
            video.signal_bars = bars;
        }
        if !video.connected {
            video.signal_bars = 0;
        }

        let mut changes = Vec::new();
        if video.connected != self.video.connected {
            info!(
                "Video stream {}",
                if video.connected { "connected" } else { "lost" }
            );
            changes.push(StatusChange::VideoConnectivityChanged {
                connected: video.connected,
            });
        }

        self.video = video;
        Ok(changes)
    }

    /// Remove an experiment that completed or was cancelled.
    pub fn finish_experiment(
        &mut self,
        id: &str,
        outcome: ExperimentOutcome,
    ) -> Result<ExperimentRecord, Error> {
        let record = self.experiments.remove(id).ok_or_else(|| Error::NotFound {
            kind: "experiment",
            id: id.to_string(),
        })?;

        info!("Experiment {} finished: {:?}", record.id, outcome);
        let _ = self.event_tx.send(StatusChange::ExperimentFinished {
            id: record.id.clone(),
            title: record.title.clone(),
            outcome,
        });
        Ok(record)
    }

    // ===== Snapshots =====

    /// All robots, with activity ages advanced to the current time.
    #[must_use]
    pub fn list_robots(&self) -> Vec<RobotRecord> {
        self.list_robots_at(Utc::now())
    }

    #[must_use]
    pub fn list_robots_at(&self, now: DateTime<Utc>) -> Vec<RobotRecord> {
        self.robots.iter().map(|r| r.aged(now)).collect()
    }

    #[must_use]
    pub fn robot(&self, id: &str) -> Option<RobotRecord> {
        self.robots.get(id).map(|r| r.aged(Utc::now()))
    }

    #[must_use]
    pub fn list_experiments(&self) -> Vec<ExperimentRecord> {
        self.experiments.snapshot()
    }

    #[must_use]
    pub fn experiment(&self, id: &str) -> Option<ExperimentRecord> {
        self.experiments.get(id).cloned()
    }

    #[must_use]
    pub fn list_metrics(&self) -> Vec<MetricSample> {
        self.metrics.snapshot()
    }

    #[must_use]
    pub fn metric(&self, label: &str) -> Option<MetricSample> {
        self.metrics.get(label).cloned()
    }

    #[must_use]
    pub fn video_health(&self) -> VideoHealth {
        self.video.clone()
    }

    // ===== Derived views =====

    #[must_use]
    pub fn connected_robot_count(&self) -> usize {
        self.robots.iter().filter(|r| r.is_connected()).count()
    }

    #[must_use]
    pub fn battery_average(&self) -> Option<f64> {
        average(self.robots.iter().map(|r| r.battery_percent))
    }

    #[must_use]
    pub fn temperature_average(&self) -> Option<f64> {
        average(self.robots.iter().map(|r| r.temperature_c))
    }

    #[must_use]
    pub fn running_experiment_count(&self) -> usize {
        self.experiments.iter().filter(|e| e.is_running()).count()
    }

    #[must_use]
    pub fn total_error_count(&self) -> u64 {
        self.experiments.iter().map(|e| u64::from(e.error_count)).sum()
    }

    /// Worst status across all metrics; `Good` when there are none.
    #[must_use]
    pub fn overall_health(&self) -> MetricStatus {
        self.metrics
            .iter()
            .map(|m| m.status)
            .max()
            .unwrap_or(MetricStatus::Good)
    }

    #[must_use]
    pub fn fleet_summary(&self) -> FleetSummary {
        FleetSummary {
            connected_robots: self.connected_robot_count(),
            total_robots: self.robots.len(),
            battery_average: self.battery_average(),
            temperature_average: self.temperature_average(),
            running_experiments: self.running_experiment_count(),
            total_errors: self.total_error_count(),
            health: self.overall_health(),
        }
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.event_tx.subscribe()
    }
}

fn check_optional_range(
    field: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> Result<Option<f64>, ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < min || v > max => Err(ValidationError::OutOfRange {
            field,
            value: v,
            min,
            max,
        }),
        other => Ok(other),
    }
}

fn check_non_negative(field: &'static str, value: i64) -> Result<u64, ValidationError> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field,
            value: value as f64,
            min: 0.0,
            max: f64::MAX,
        });
    }
    Ok(value.unsigned_abs())
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_u32), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ExecutionState, Trend};

    fn robot_update(id: &str) -> RobotUpdate {
        RobotUpdate::new(id)
    }

    fn metric(label: &str, status: MetricStatus) -> MetricSample {
        MetricSample {
            label: label.to_string(),
            current_value: "1".to_string(),
            status,
            progress_percent: None,
            trend: Trend::Stable,
            change: "0%".to_string(),
        }
    }

    fn seed_robot(aggregator: &mut StatusAggregator, id: &str, connectivity: Connectivity, battery: f64) {
        aggregator
            .apply_update(EntityUpdate::Robot(RobotUpdate {
                name: Some(format!("RVR-00{id}")),
                connectivity: Some(connectivity),
                battery_percent: Some(battery),
                signal_percent: Some(if connectivity == Connectivity::Disconnected { 0.0 } else { 80.0 }),
                temperature_c: Some(40.0),
                ..robot_update(id)
            }))
            .unwrap();
    }

    #[test]
    fn test_merge_keeps_omitted_fields() {
        let mut aggregator = StatusAggregator::default();
        let now = Utc::now();

        aggregator
            .apply_update_at(
                EntityUpdate::Robot(RobotUpdate {
                    name: Some("RVR-001".to_string()),
                    connectivity: Some(Connectivity::Connected),
                    battery_percent: Some(82.0),
                    signal_percent: Some(85.0),
                    temperature_c: Some(42.0),
                    last_activity_age_secs: Some(120),
                    ..robot_update("1")
                }),
                now,
            )
            .unwrap();
        aggregator
            .apply_update_at(
                EntityUpdate::Robot(RobotUpdate {
                    battery_percent: Some(80.0),
                    temperature_c: Some(43.5),
                    ..robot_update("1")
                }),
                now,
            )
            .unwrap();

        let robots = aggregator.list_robots_at(now);
        assert_eq!(robots.len(), 1);
        let robot = &robots[0];
        assert_eq!(robot.name, "RVR-001");
        assert_eq!(robot.connectivity, Connectivity::Connected);
        assert!((robot.battery_percent - 80.0).abs() < f64::EPSILON);
        assert!((robot.signal_percent - 85.0).abs() < f64::EPSILON);
        assert!((robot.temperature_c - 43.5).abs() < f64::EPSILON);
        assert_eq!(robot.last_activity_age_secs, 120);
    }

    #[test]
    fn test_new_robot_defaults_name_to_id() {
        let mut aggregator = StatusAggregator::default();
        let changes = aggregator
            .apply_update(EntityUpdate::Robot(robot_update("7")))
            .unwrap();

        assert_eq!(
            changes,
            vec![StatusChange::RobotAdded {
                id: "7".to_string(),
                name: "7".to_string()
            }]
        );
        assert_eq!(aggregator.robot("7").unwrap().name, "7");
    }

    #[test]
    fn test_battery_out_of_range_rejected() {
        let mut aggregator = StatusAggregator::default();
        seed_robot(&mut aggregator, "1", Connectivity::Connected, 82.0);
        let before = aggregator.list_robots();

        for battery in [-1.0, 101.0, f64::NAN] {
            let result = aggregator.apply_update(EntityUpdate::Robot(RobotUpdate {
                battery_percent: Some(battery),
                ..robot_update("1")
            }));
            assert!(matches!(
                result,
                Err(ValidationError::OutOfRange { field: "batteryPercent", .. })
            ));
        }

        // Rejected insert of an unknown robot leaves the registry alone too
        let result = aggregator.apply_update(EntityUpdate::Robot(RobotUpdate {
            battery_percent: Some(101.0),
            ..robot_update("9")
        }));
        assert!(result.is_err());

        let after = aggregator.list_robots();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].battery_percent, before[0].battery_percent);
    }

    #[test]
    fn test_battery_bounds_accepted() {
        let mut aggregator = StatusAggregator::default();
        for (id, battery) in [("1", 0.0), ("2", 100.0)] {
            let result = aggregator.apply_update(EntityUpdate::Robot(RobotUpdate {
                battery_percent: Some(battery),
                ..robot_update(id)
            }));
            assert!(result.is_ok());
        }
    }

    #[test]
    fn test_missing_id_rejected() {
        let mut aggregator = StatusAggregator::default();
        let result = aggregator.apply_update(EntityUpdate::Robot(robot_update("  ")));
        assert_eq!(result, Err(ValidationError::MissingField("id")));
        assert!(aggregator.list_robots().is_empty());
    }

    #[test]
    fn test_disconnect_forces_signal_to_zero() {
        let mut aggregator = StatusAggregator::default();
        seed_robot(&mut aggregator, "3", Connectivity::Connected, 60.0);

        let changes = aggregator
            .apply_update(EntityUpdate::Robot(RobotUpdate {
                connectivity: Some(Connectivity::Disconnected),
                ..robot_update("3")
            }))
            .unwrap();

        let robot = aggregator.robot("3").unwrap();
        assert_eq!(robot.signal_percent, 0.0);
        assert!(matches!(
            changes.as_slice(),
            [StatusChange::ConnectivityChanged { from: Connectivity::Connected, to: Connectivity::Disconnected, .. }]
        ));
    }

    #[test]
    fn test_disconnected_with_signal_rejected() {
        let mut aggregator = StatusAggregator::default();
        seed_robot(&mut aggregator, "3", Connectivity::Disconnected, 60.0);

        let result = aggregator.apply_update(EntityUpdate::Robot(RobotUpdate {
            signal_percent: Some(40.0),
            ..robot_update("3")
        }));
        assert!(matches!(result, Err(ValidationError::InconsistentSignal { .. })));
        assert_eq!(aggregator.robot("3").unwrap().signal_percent, 0.0);
    }

    #[test]
    fn test_battery_low_reported_once_on_crossing() {
        let mut aggregator = StatusAggregator::default();
        seed_robot(&mut aggregator, "1", Connectivity::Connected, 50.0);

        let low = |battery| {
            EntityUpdate::Robot(RobotUpdate {
                battery_percent: Some(battery),
                ..robot_update("1")
            })
        };

        let changes = aggregator.apply_update(low(18.0)).unwrap();
        assert!(matches!(changes.as_slice(), [StatusChange::BatteryLow { .. }]));

        // Still low, no repeat
        let changes = aggregator.apply_update(low(15.0)).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_overall_health() {
        let mut aggregator = StatusAggregator::default();
        assert_eq!(aggregator.overall_health(), MetricStatus::Good);

        aggregator.apply_update(EntityUpdate::Metric(metric("Latencia", MetricStatus::Good))).unwrap();
        aggregator.apply_update(EntityUpdate::Metric(metric("CPU", MetricStatus::Warning))).unwrap();
        assert_eq!(aggregator.overall_health(), MetricStatus::Warning);

        aggregator.apply_update(EntityUpdate::Metric(metric("Memoria", MetricStatus::Critical))).unwrap();
        assert_eq!(aggregator.overall_health(), MetricStatus::Critical);

        // A new sample replaces the old one for the same label
        aggregator.apply_update(EntityUpdate::Metric(metric("Memoria", MetricStatus::Good))).unwrap();
        assert_eq!(aggregator.overall_health(), MetricStatus::Warning);
        assert_eq!(aggregator.list_metrics().len(), 3);
    }

    #[test]
    fn test_disconnect_then_health_critical() {
        let mut aggregator = StatusAggregator::default();
        for id in ["1", "2", "3"] {
            seed_robot(&mut aggregator, id, Connectivity::Connected, 70.0);
        }
        for (label, status) in [
            ("Latencia Promedio", MetricStatus::Good),
            ("Conexiones Activas", MetricStatus::Good),
            ("CPU Servidor", MetricStatus::Critical),
            ("Memoria", MetricStatus::Good),
        ] {
            aggregator.apply_update(EntityUpdate::Metric(metric(label, status))).unwrap();
        }

        aggregator
            .apply_update(EntityUpdate::Robot(RobotUpdate {
                connectivity: Some(Connectivity::Disconnected),
                signal_percent: Some(0.0),
                ..robot_update("3")
            }))
            .unwrap();

        assert_eq!(aggregator.overall_health(), MetricStatus::Critical);
        assert_eq!(aggregator.connected_robot_count(), 2);
    }

    #[test]
    fn test_fleet_averages() {
        let mut aggregator = StatusAggregator::default();
        assert_eq!(aggregator.battery_average(), None);

        seed_robot(&mut aggregator, "1", Connectivity::Connected, 80.0);
        seed_robot(&mut aggregator, "2", Connectivity::Busy, 40.0);

        let summary = aggregator.fleet_summary();
        assert_eq!(summary.total_robots, 2);
        assert_eq!(summary.connected_robots, 1);
        assert_eq!(summary.battery_average, Some(60.0));
        assert_eq!(summary.temperature_average, Some(40.0));
    }

    #[test]
    fn test_progress_regression_rejected_unless_reset() {
        let mut aggregator = StatusAggregator::default();
        aggregator
            .apply_update(EntityUpdate::Experiment(ExperimentUpdate {
                title: Some("Detección de obstáculos".to_string()),
                progress_percent: Some(65.0),
                ..ExperimentUpdate::new("1")
            }))
            .unwrap();

        let result = aggregator.apply_update(EntityUpdate::Experiment(ExperimentUpdate {
            progress_percent: Some(40.0),
            ..ExperimentUpdate::new("1")
        }));
        assert!(matches!(result, Err(ValidationError::ProgressRegression { .. })));
        assert_eq!(aggregator.experiment("1").unwrap().progress_percent, 65.0);

        aggregator
            .apply_update(EntityUpdate::Experiment(ExperimentUpdate {
                progress_percent: Some(0.0),
                reset: true,
                ..ExperimentUpdate::new("1")
            }))
            .unwrap();
        assert_eq!(aggregator.experiment("1").unwrap().progress_percent, 0.0);
    }

    #[test]
    fn test_paused_progress_may_move_back() {
        let mut aggregator = StatusAggregator::default();
        aggregator
            .apply_update(EntityUpdate::Experiment(ExperimentUpdate {
                progress_percent: Some(90.0),
                execution_state: Some(ExecutionState::Paused),
                ..ExperimentUpdate::new("3")
            }))
            .unwrap();

        let result = aggregator.apply_update(EntityUpdate::Experiment(ExperimentUpdate {
            progress_percent: Some(85.0),
            ..ExperimentUpdate::new("3")
        }));
        assert!(result.is_ok());
    }

    #[test]
    fn test_experiment_counts_and_errors() {
        let mut aggregator = StatusAggregator::default();
        aggregator
            .apply_update(EntityUpdate::Experiment(ExperimentUpdate {
                error_count: Some(0),
                ..ExperimentUpdate::new("1")
            }))
            .unwrap();
        aggregator
            .apply_update(EntityUpdate::Experiment(ExperimentUpdate {
                error_count: Some(1),
                execution_state: Some(ExecutionState::Paused),
                ..ExperimentUpdate::new("3")
            }))
            .unwrap();

        let changes = aggregator
            .apply_update(EntityUpdate::Experiment(ExperimentUpdate {
                error_count: Some(2),
                ..ExperimentUpdate::new("1")
            }))
            .unwrap();
        assert!(matches!(
            changes.as_slice(),
            [StatusChange::ExperimentErrors { added: 2, error_count: 2, .. }]
        ));

        assert_eq!(aggregator.running_experiment_count(), 1);
        assert_eq!(aggregator.total_error_count(), 3);

        let negative = aggregator.apply_update(EntityUpdate::Experiment(ExperimentUpdate {
            error_count: Some(-1),
            ..ExperimentUpdate::new("1")
        }));
        assert!(negative.is_err());
    }

    #[test]
    fn test_finish_experiment() {
        let mut aggregator = StatusAggregator::default();
        aggregator
            .apply_update(EntityUpdate::Experiment(ExperimentUpdate::new("1")))
            .unwrap();

        let mut events = aggregator.subscribe();
        let removed = aggregator
            .finish_experiment("1", ExperimentOutcome::Completed)
            .unwrap();
        assert_eq!(removed.id, "1");
        assert!(aggregator.list_experiments().is_empty());
        assert!(matches!(
            events.try_recv(),
            Ok(StatusChange::ExperimentFinished { outcome: ExperimentOutcome::Completed, .. })
        ));

        let missing = aggregator.finish_experiment("1", ExperimentOutcome::Cancelled);
        assert!(matches!(missing, Err(Error::NotFound { kind: "experiment", .. })));
    }

    #[test]
    fn test_video_health_updates() {
        let mut aggregator = StatusAggregator::default();
        let changes = aggregator
            .apply_update(EntityUpdate::Video(VideoUpdate {
                connected: Some(true),
                latency_ms: Some(86),
                frames_per_second: Some(30.0),
                resolution: Some("1080p".to_string()),
                signal_bars: Some(3),
            }))
            .unwrap();
        assert_eq!(changes, vec![StatusChange::VideoConnectivityChanged { connected: true }]);
        assert_eq!(aggregator.video_health().signal_bars, 3);

        let result = aggregator.apply_update(EntityUpdate::Video(VideoUpdate {
            signal_bars: Some(5),
            ..Default::default()
        }));
        assert!(result.is_err());

        aggregator
            .apply_update(EntityUpdate::Video(VideoUpdate {
                connected: Some(false),
                ..Default::default()
            }))
            .unwrap();
        let video = aggregator.video_health();
        assert!(!video.connected);
        assert_eq!(video.signal_bars, 0);
        assert_eq!(video.latency_ms, 86);
    }

    #[test]
    fn test_changes_are_broadcast() {
        let mut aggregator = StatusAggregator::default();
        let mut events = aggregator.subscribe();
        aggregator
            .apply_update(EntityUpdate::Robot(robot_update("1")))
            .unwrap();
        assert!(matches!(events.try_recv(), Ok(StatusChange::RobotAdded { .. })));
    }
}
