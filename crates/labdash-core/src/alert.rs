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

//! Alert policy: which status changes become notifications.
//!
//! The policy is plain data so it can live inside the application config. A
//! lifetime of `0` ms means the notification stays until dismissed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregator::StatusChange;
use crate::error::ValidationError;
use crate::notify::{NotificationRequest, Severity};
use crate::protocol::ExperimentOutcome;
use crate::registry::{Connectivity, MetricStatus};

/// Lifetime per severity, in milliseconds. `0` disables auto-expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertLifetimes {
    pub success_ms: u64,
    pub info_ms: u64,
    pub warning_ms: u64,
    pub error_ms: u64,
}

impl Default for AlertLifetimes {
    fn default() -> Self {
        Self {
            success_ms: 5000,
            info_ms: 5000,
            warning_ms: 8000,
            error_ms: 8000,
        }
    }
}

impl AlertLifetimes {
    #[must_use]
    pub fn for_severity(&self, severity: Severity) -> Option<Duration> {
        let ms = match severity {
            Severity::Success => self.success_ms,
            Severity::Info => self.info_ms,
            Severity::Warning => self.warning_ms,
            Severity::Error => self.error_ms,
        };
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

/// Which derived alerts are raised, and for how long they stay visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools, reason = "one switch per alert family")]
pub struct AlertPolicy {
    pub lifetimes: AlertLifetimes,
    pub robot_connectivity: bool,
    pub battery_low: bool,
    pub metric_status: bool,
    pub experiment_errors: bool,
    pub experiment_finished: bool,
    pub video: bool,
    /// Show rejected updates as warnings.
    pub surface_rejections: bool,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            lifetimes: AlertLifetimes::default(),
            robot_connectivity: true,
            battery_low: true,
            metric_status: true,
            experiment_errors: true,
            experiment_finished: true,
            video: true,
            surface_rejections: false,
        }
    }
}

impl AlertPolicy {
    /// Notification for a status change, or `None` if it is not alert-worthy.
    #[must_use]
    pub fn alert_for(&self, change: &StatusChange) -> Option<NotificationRequest> {
        let (severity, title, body) = match change {
            StatusChange::ConnectivityChanged { name, to, .. } if self.robot_connectivity => {
                match to {
                    Connectivity::Disconnected => (
                        Severity::Error,
                        "Robot desconectado".to_string(),
                        format!("{name} desconectado"),
                    ),
                    Connectivity::Connected => (
                        Severity::Success,
                        "Robot conectado".to_string(),
                        format!("{name} conectado"),
                    ),
                    Connectivity::Busy => return None,
                }
            }
            StatusChange::BatteryLow {
                name,
                battery_percent,
                ..
            } if self.battery_low => (
                Severity::Warning,
                "Batería baja".to_string(),
                format!("{name} al {battery_percent:.0}%"),
            ),
            StatusChange::MetricStatusChanged { label, to, .. } if self.metric_status => match to {
                MetricStatus::Critical => (
                    Severity::Error,
                    "Métrica crítica".to_string(),
                    format!("{label} en estado crítico"),
                ),
                MetricStatus::Warning => (
                    Severity::Warning,
                    "Métrica en advertencia".to_string(),
                    format!("{label} en advertencia"),
                ),
                MetricStatus::Good => return None,
            },
            StatusChange::ExperimentErrors {
                title,
                error_count,
                added,
                ..
            } if self.experiment_errors && *added > 0 => (
                Severity::Warning,
                "Errores en experimento".to_string(),
                format!("{title}: {error_count} errores"),
            ),
            StatusChange::ExperimentFinished { title, outcome, .. } if self.experiment_finished => {
                match outcome {
                    ExperimentOutcome::Completed => (
                        Severity::Success,
                        "Experimento completado".to_string(),
                        title.clone(),
                    ),
                    ExperimentOutcome::Cancelled => (
                        Severity::Info,
                        "Experimento cancelado".to_string(),
                        title.clone(),
                    ),
                }
            }
            StatusChange::VideoConnectivityChanged { connected } if self.video => {
                if *connected {
                    (
                        Severity::Success,
                        "Video restablecido".to_string(),
                        "Transmisión del laboratorio en línea".to_string(),
                    )
                } else {
                    (
                        Severity::Error,
                        "Video perdido".to_string(),
                        "Transmisión del laboratorio desconectada".to_string(),
                    )
                }
            }
            _ => return None,
        };

        Some(self.request(severity, title, body))
    }

    /// Warning for a rejected update, if rejections are surfaced.
    #[must_use]
    pub fn rejection_alert(&self, error: &ValidationError) -> Option<NotificationRequest> {
        self.surface_rejections.then(|| {
            self.request(
                Severity::Warning,
                "Actualización rechazada".to_string(),
                error.to_string(),
            )
        })
    }

    fn request(&self, severity: Severity, title: String, body: String) -> NotificationRequest {
        let request = NotificationRequest::new(severity, title, body);
        match self.lifetimes.for_severity(severity) {
            Some(lifetime) => request.expires_after(lifetime),
            None => request,
        }
    }
}
