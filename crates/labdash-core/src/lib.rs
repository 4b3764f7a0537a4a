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

//! State core for a robotics lab dashboard.
//!
//! This library keeps the live state behind a lab dashboard: robot fleet
//! status, running experiments, system metrics, video stream health, and the
//! transient toast notifications shown on top. It is built from layers that
//! can be used independently or composed together:
//!
//! - **Protocol layer**: tagged JSON-lines telemetry events
//! - **Registry layer**: keyed, insertion-ordered entity records
//! - **Aggregator layer**: validated partial updates, status changes and
//!   derived fleet values
//! - **Notification layer**: an ordered toast queue with independent,
//!   cancellable expiry timers
//! - **View layer**: per-kind selection and pure UI state
//!
//! # Quick Start
//!
//! Use the [`Dashboard`] type for full-stack operation. It is owned by a
//! single task; expiry is driven by awaiting [`Dashboard::next_expired`]:
//!
//! ```no_run
//! use labdash_core::{Dashboard, DashboardConfig, JsonLinesParser, Protocol};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut dashboard = Dashboard::new(DashboardConfig::default());
//!     let mut parser = JsonLinesParser::new();
//!
//!     let line = br#"{"kind":"robot","payload":{"id":"3","connectivityState":"disconnected","signalPercent":0}}"#;
//!     if let Ok(Some(event)) = parser.parse(line) {
//!         let _ = dashboard.handle_event(event);
//!     }
//!
//!     loop {
//!         let expired = dashboard.next_expired().await;
//!         println!("{} expired", expired.title);
//!     }
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ## Aggregator Only
//!
//! ```
//! use labdash_core::aggregator::StatusAggregator;
//! use labdash_core::protocol::{EntityUpdate, RobotUpdate};
//! use labdash_core::registry::Connectivity;
//!
//! let mut aggregator = StatusAggregator::default();
//! aggregator
//!     .apply_update(EntityUpdate::Robot(RobotUpdate {
//!         connectivity: Some(Connectivity::Connected),
//!         battery_percent: Some(85.0),
//!         signal_percent: Some(92.0),
//!         ..RobotUpdate::new("1")
//!     }))
//!     .unwrap();
//!
//! assert_eq!(aggregator.connected_robot_count(), 1);
//! ```
//!
//! ## View State Only
//!
//! ```
//! use labdash_core::registry::EntityKind;
//! use labdash_core::view::ViewState;
//!
//! let mut view = ViewState::new();
//! view.select(EntityKind::Robot, "1");
//! view.select(EntityKind::Robot, "1");
//! assert_eq!(view.selected_id(EntityKind::Robot), None);
//! ```

pub mod aggregator;
pub mod alert;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod registry;
pub mod view;

use log::{debug, warn};
use tokio::sync::broadcast;

pub use aggregator::{AggregatorConfig, FleetSummary, StatusAggregator, StatusChange, VideoHealth};
pub use alert::{AlertLifetimes, AlertPolicy};
pub use error::{Error, ValidationError};
pub use notify::{Notification, NotificationQueue, NotificationRequest, Severity};
pub use protocol::{
    EntityUpdate, ExperimentOutcome, JsonLinesParser, ParseError, Protocol, TelemetryEvent,
};
pub use registry::{
    Connectivity, EntityKind, ExecutionState, ExperimentRecord, MetricSample, MetricStatus,
    Priority, RobotRecord, Trend,
};
pub use view::{PlayerControls, Theme, ViewState};

/// Configuration for the full-stack dashboard.
#[derive(Debug, Clone, Default)]
pub struct DashboardConfig {
    /// Aggregator configuration.
    pub aggregator: AggregatorConfig,
    /// Which status changes become notifications.
    pub alerts: AlertPolicy,
    /// Initial UI state.
    pub view: ViewState,
}

/// Full-stack dashboard state that wires all layers together.
///
/// Accepted updates go through the aggregator; the status changes they cause
/// are turned into notifications by the alert policy. Every mutation takes
/// `&mut self`, so the owning task serializes updates, dismissals and timer
/// expiry.
///
/// Alerts and notifications with a lifetime arm tokio timers, so the owning
/// task must run inside a tokio runtime with the time driver enabled.
pub struct Dashboard {
    aggregator: StatusAggregator,
    notifications: NotificationQueue,
    view: ViewState,
    alerts: AlertPolicy,
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("aggregator", &self.aggregator)
            .field("notifications", &self.notifications.len())
            .finish_non_exhaustive()
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(DashboardConfig::default())
    }
}

impl Dashboard {
    #[must_use]
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            aggregator: StatusAggregator::new(config.aggregator),
            notifications: NotificationQueue::new(),
            view: config.view,
            alerts: config.alerts,
        }
    }

    /// Route one telemetry event.
    pub fn handle_event(&mut self, event: TelemetryEvent) -> Result<(), Error> {
        match event {
            TelemetryEvent::ExperimentFinished(finished) => {
                self.finish_experiment(&finished.id, finished.outcome)?;
            }
            TelemetryEvent::Notification(request) => {
                self.notify(request);
            }
            other => {
                if let Some(update) = other.into_update() {
                    self.apply_update(update)?;
                }
            }
        }
        Ok(())
    }

    /// Merge an entity update and raise the alerts it causes.
    ///
    /// A rejected update changes nothing, apart from an optional warning
    /// notification when the alert policy surfaces rejections.
    pub fn apply_update(
        &mut self,
        update: EntityUpdate,
    ) -> Result<Vec<StatusChange>, ValidationError> {
        match self.aggregator.apply_update(update) {
            Ok(changes) => {
                for change in &changes {
                    if let Some(request) = self.alerts.alert_for(change) {
                        self.notifications.enqueue(request);
                    }
                }
                Ok(changes)
            }
            Err(e) => {
                if let Some(request) = self.alerts.rejection_alert(&e) {
                    self.notifications.enqueue(request);
                }
                Err(e)
            }
        }
    }

    /// Remove an experiment that completed or was cancelled.
    pub fn finish_experiment(
        &mut self,
        id: &str,
        outcome: ExperimentOutcome,
    ) -> Result<ExperimentRecord, Error> {
        let record = self.aggregator.finish_experiment(id, outcome)?;
        let change = StatusChange::ExperimentFinished {
            id: record.id.clone(),
            title: record.title.clone(),
            outcome,
        };
        if let Some(request) = self.alerts.alert_for(&change) {
            self.notifications.enqueue(request);
        }
        Ok(record)
    }

    // ===== Notifications =====

    /// Show a notification. Returns the id it was stored under.
    pub fn notify(&mut self, request: NotificationRequest) -> String {
        self.notifications.enqueue(request)
    }

    /// Dismiss a notification early. Unknown ids are a no-op.
    pub fn dismiss_notification(&mut self, id: &str) -> bool {
        let removed = self.notifications.dismiss(id);
        if !removed {
            debug!("Dismiss for inactive notification {id} ignored");
        }
        removed
    }

    pub fn clear_notifications(&mut self) {
        self.notifications.clear();
    }

    /// Wait for the next notification to expire and remove it.
    ///
    /// Never resolves while no notification has a pending timer.
    pub async fn next_expired(&mut self) -> Notification {
        self.notifications.next_expired().await
    }

    /// Active notifications, newest first.
    #[must_use]
    pub fn list_active_notifications(&self) -> Vec<Notification> {
        self.notifications.list()
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    // ===== Selection / view =====

    /// Toggle the selection for `kind`. Returns the selection after the call.
    ///
    /// Selections are not tied to the registries: one that points at a
    /// finished experiment stays in place until toggled or cleared.
    pub fn select(&mut self, kind: EntityKind, id: &str) -> Option<&str> {
        let known = match kind {
            EntityKind::Robot => self.aggregator.robot(id).is_some(),
            EntityKind::Experiment => self.aggregator.experiment(id).is_some(),
            EntityKind::Metric => self.aggregator.metric(id).is_some(),
        };
        if !known {
            warn!("Selecting unknown {kind} {id}");
        }
        self.view.select(kind, id)
    }

    #[must_use]
    pub fn selected_id(&self, kind: EntityKind) -> Option<&str> {
        self.view.selected_id(kind)
    }

    #[must_use]
    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn view_state_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    // ===== Queries =====

    #[must_use]
    pub fn list_robots(&self) -> Vec<RobotRecord> {
        self.aggregator.list_robots()
    }

    #[must_use]
    pub fn list_experiments(&self) -> Vec<ExperimentRecord> {
        self.aggregator.list_experiments()
    }

    #[must_use]
    pub fn list_metrics(&self) -> Vec<MetricSample> {
        self.aggregator.list_metrics()
    }

    #[must_use]
    pub fn overall_health(&self) -> MetricStatus {
        self.aggregator.overall_health()
    }

    #[must_use]
    pub fn fleet_summary(&self) -> FleetSummary {
        self.aggregator.fleet_summary()
    }

    #[must_use]
    pub fn video_health(&self) -> VideoHealth {
        self.aggregator.video_health()
    }

    #[must_use]
    pub fn aggregator(&self) -> &StatusAggregator {
        &self.aggregator
    }

    /// Subscribe to status changes from accepted updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.aggregator.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{advance, timeout};

    use super::*;
    use crate::protocol::{ExperimentUpdate, RobotUpdate};

    fn metric(label: &str, status: MetricStatus) -> EntityUpdate {
        EntityUpdate::Metric(MetricSample {
            label: label.to_string(),
            current_value: "34%".to_string(),
            status,
            progress_percent: Some(34.0),
            trend: Trend::Stable,
            change: "0%".to_string(),
        })
    }

    fn robot(id: &str, connectivity: Connectivity, signal: f64) -> EntityUpdate {
        EntityUpdate::Robot(RobotUpdate {
            name: Some(format!("RVR-00{id}")),
            connectivity: Some(connectivity),
            battery_percent: Some(80.0),
            signal_percent: Some(signal),
            ..RobotUpdate::new(id)
        })
    }

    async fn nothing_expired(dashboard: &mut Dashboard) -> bool {
        timeout(Duration::ZERO, dashboard.next_expired()).await.is_err()
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_expires_after_lifetime() {
        let mut dashboard = Dashboard::default();
        let id = dashboard.notify(
            NotificationRequest::new(Severity::Error, "Robot desconectado", "RVR-003 desconectado")
                .expires_after(Duration::from_millis(8000)),
        );
        assert_eq!(dashboard.list_active_notifications()[0].id, id);

        advance(Duration::from_millis(7999)).await;
        assert!(nothing_expired(&mut dashboard).await);
        assert_eq!(dashboard.list_active_notifications().len(), 1);

        advance(Duration::from_millis(2)).await;
        let expired = dashboard.next_expired().await;
        assert_eq!(expired.id, id);
        assert!(dashboard.list_active_notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissed_notification_never_returns() {
        let mut dashboard = Dashboard::default();
        let id = dashboard.notify(
            NotificationRequest::new(Severity::Success, "Despliegue completado", "cluster-a")
                .expires_after(Duration::from_millis(5000)),
        );
        assert!(dashboard.dismiss_notification(&id));
        assert!(!dashboard.dismiss_notification(&id));

        advance(Duration::from_secs(10)).await;
        assert!(nothing_expired(&mut dashboard).await);
        assert!(dashboard.list_active_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_makes_health_critical() {
        let mut dashboard = Dashboard::default();
        dashboard.apply_update(robot("3", Connectivity::Connected, 70.0)).unwrap();
        dashboard.apply_update(metric("CPU Servidor", MetricStatus::Good)).unwrap();
        dashboard.apply_update(metric("Memoria", MetricStatus::Good)).unwrap();
        dashboard.apply_update(metric("Red", MetricStatus::Warning)).unwrap();
        dashboard.apply_update(metric("Temperatura", MetricStatus::Critical)).unwrap();

        let update = EntityUpdate::Robot(RobotUpdate {
            connectivity: Some(Connectivity::Disconnected),
            signal_percent: Some(0.0),
            ..RobotUpdate::new("3")
        });
        dashboard.apply_update(update).unwrap();

        let robots = dashboard.list_robots();
        assert_eq!(robots[0].connectivity, Connectivity::Disconnected);
        assert!(robots[0].signal_percent.abs() < f64::EPSILON);
        assert_eq!(dashboard.overall_health(), MetricStatus::Critical);
    }

    #[test]
    fn test_select_toggles() {
        let mut dashboard = Dashboard::default();
        dashboard.apply_update(robot("1", Connectivity::Connected, 90.0)).unwrap();

        assert_eq!(dashboard.selected_id(EntityKind::Robot), None);
        assert_eq!(dashboard.select(EntityKind::Robot, "1"), Some("1"));
        assert_eq!(dashboard.select(EntityKind::Robot, "1"), None);
        assert_eq!(dashboard.selected_id(EntityKind::Robot), None);
    }

    #[tokio::test]
    async fn test_disconnect_raises_alert() {
        let mut dashboard = Dashboard::default();
        dashboard.apply_update(robot("3", Connectivity::Connected, 70.0)).unwrap();
        assert!(dashboard.list_active_notifications().is_empty());

        dashboard.apply_update(robot("3", Connectivity::Disconnected, 0.0)).unwrap();
        let active = dashboard.list_active_notifications();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, Severity::Error);
        assert_eq!(active[0].body, "RVR-003 desconectado");
        assert_eq!(active[0].expires_after_ms, Some(8000));
    }

    #[test]
    fn test_invalid_update_leaves_dashboard_usable() {
        let mut dashboard = Dashboard::default();
        dashboard.apply_update(robot("1", Connectivity::Connected, 90.0)).unwrap();

        let bad = EntityUpdate::Robot(RobotUpdate {
            battery_percent: Some(140.0),
            ..RobotUpdate::new("1")
        });
        assert!(matches!(
            dashboard.apply_update(bad),
            Err(ValidationError::OutOfRange { field: "batteryPercent", .. })
        ));
        assert!((dashboard.list_robots()[0].battery_percent - 80.0).abs() < f64::EPSILON);
        assert!(dashboard.list_active_notifications().is_empty());

        dashboard.apply_update(robot("2", Connectivity::Busy, 50.0)).unwrap();
        assert_eq!(dashboard.list_robots().len(), 2);
    }

    #[tokio::test]
    async fn test_rejections_surface_when_enabled() {
        let mut dashboard = Dashboard::new(DashboardConfig {
            alerts: AlertPolicy {
                surface_rejections: true,
                ..Default::default()
            },
            ..Default::default()
        });

        let result = dashboard.apply_update(EntityUpdate::Robot(RobotUpdate::new("")));
        assert!(result.is_err());
        let active = dashboard.list_active_notifications();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_handle_event_routes_every_kind() {
        let mut dashboard = Dashboard::default();
        let mut parser = JsonLinesParser::new();
        let lines: [&[u8]; 4] = [
            r#"{"kind":"experiment","payload":{"id":"1","user":"Dr. García","name":"Navegación autónoma","robot":"RVR-001","progress":67}}"#.as_bytes(),
            br#"{"kind":"video","payload":{"connected":true,"latencyMs":45,"fps":30,"quality":"1080p","signalBars":4}}"#,
            br#"{"kind":"notification","payload":{"id":"n1","type":"info","title":"Hola","message":"Bienvenido"}}"#,
            br#"{"kind":"experiment_finished","payload":{"id":"1","outcome":"completed"}}"#,
        ];
        for line in lines {
            let event = parser.parse(line).unwrap().unwrap();
            dashboard.handle_event(event).unwrap();
        }

        assert!(dashboard.list_experiments().is_empty());
        assert!(dashboard.video_health().connected);
        let titles: Vec<String> = dashboard
            .list_active_notifications()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(
            titles,
            vec!["Experimento completado", "Hola", "Video restablecido"]
        );
    }

    #[test]
    fn test_finish_unknown_experiment() {
        let mut dashboard = Dashboard::default();
        let result = dashboard.finish_experiment("404", ExperimentOutcome::Cancelled);
        assert!(matches!(result, Err(Error::NotFound { kind: "experiment", .. })));
    }

    #[tokio::test]
    async fn test_finish_keeps_experiment_selection() {
        let mut dashboard = Dashboard::default();
        dashboard
            .apply_update(EntityUpdate::Experiment(ExperimentUpdate {
                title: Some("Mapeo".to_string()),
                ..ExperimentUpdate::new("2")
            }))
            .unwrap();
        dashboard.select(EntityKind::Experiment, "2");

        dashboard.finish_experiment("2", ExperimentOutcome::Completed).unwrap();
        assert!(dashboard.list_experiments().is_empty());
        assert_eq!(dashboard.selected_id(EntityKind::Experiment), Some("2"));
        assert_eq!(dashboard.select(EntityKind::Experiment, "2"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_feed_lifetime_is_kept_until_dismissed() {
        let mut dashboard = Dashboard::default();
        let mut parser = JsonLinesParser::new();
        let line = br#"{"kind":"notification","payload":{"id":"n9","severity":"info","title":"Aviso","body":"Sin caducidad","expiresAfterMs":18446744073709551615}}"#;
        let event = parser.parse(line).unwrap().unwrap();
        dashboard.handle_event(event).unwrap();

        let active = dashboard.list_active_notifications();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].expires_after_ms, None);
        assert_eq!(dashboard.notifications().pending_timers(), 0);
        assert!(dashboard.dismiss_notification("n9"));
    }
}
