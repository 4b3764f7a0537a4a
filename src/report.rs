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

//! Plain-text dashboard snapshots.

use std::fmt::Write as _;

use labdash_core::{
    Connectivity, Dashboard, EntityKind, ExecutionState, MetricStatus, Priority, Severity, Theme,
};
use ringbuf::{HeapRb, Rb};

use crate::status::{DiagnosticLevel, FeedState, FeedStatus};

/// Number of video latency samples kept for the sparkline
const LATENCY_HISTORY: usize = 30;

/// Diagnostics shown under the feed line
const RECENT_DIAGNOSTICS: usize = 3;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Renders dashboard snapshots and keeps presentation-only history.
pub struct Reporter {
    max_visible_toasts: usize,
    latency_history: HeapRb<u32>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("max_visible_toasts", &self.max_visible_toasts)
            .field("latency_samples", &self.latency_history.len())
            .finish_non_exhaustive()
    }
}

impl Reporter {
    pub fn new(max_visible_toasts: usize) -> Self {
        Self {
            max_visible_toasts,
            latency_history: HeapRb::new(LATENCY_HISTORY),
        }
    }

    /// Remember the latest video latency; the oldest sample is dropped when full.
    pub fn record_latency(&mut self, latency_ms: u32) {
        self.latency_history.push_overwrite(latency_ms);
    }

    /// Latency history as a unicode sparkline, oldest first.
    pub fn sparkline(&self) -> String {
        let samples: Vec<u32> = self.latency_history.iter().copied().collect();
        let (Some(&min), Some(&max)) = (samples.iter().min(), samples.iter().max()) else {
            return String::new();
        };
        let span = u64::from((max - min).max(1));
        let top = SPARK_LEVELS.len() - 1;
        let steps = top as u64;

        samples
            .iter()
            .map(|&v| {
                let scaled = u64::from(v - min) * steps / span;
                let level = usize::try_from(scaled).map_or(top, |l| l.min(top));
                SPARK_LEVELS[level]
            })
            .collect()
    }

    /// Full text snapshot of the dashboard.
    pub fn render(&self, dashboard: &Dashboard, status: &FeedStatus) -> String {
        let mut out = String::new();
        let view = dashboard.view_state();
        let summary = dashboard.fleet_summary();

        let _ = writeln!(
            out,
            "== Laboratorio ==  salud: {}  tema: {}  panel lateral: {}",
            health_label(summary.health),
            theme_label(view.theme),
            if view.sidebar_open { "abierto" } else { "cerrado" },
        );

        // Robots
        let _ = writeln!(
            out,
            "\nRobots Activos ({}/{} conectados)",
            summary.connected_robots, summary.total_robots
        );
        let selected_robot = dashboard.selected_id(EntityKind::Robot);
        for robot in dashboard.list_robots() {
            let _ = writeln!(
                out,
                "{} {:<8} {:<12} bat {:>3.0}%  señal {:>3.0}%  {:>4.1}°C  hace {}",
                marker(selected_robot == Some(robot.id.as_str())),
                robot.name,
                connectivity_label(robot.connectivity),
                robot.battery_percent,
                robot.signal_percent,
                robot.temperature_c,
                format_age(robot.last_activity_age_secs),
            );
        }
        if let (Some(battery), Some(temperature)) =
            (summary.battery_average, summary.temperature_average)
        {
            let _ = writeln!(
                out,
                "  batería media {battery:.0}%  temperatura media {temperature:.1}°C"
            );
        }

        // Experiments
        let _ = writeln!(
            out,
            "\nExperimentos ({} en curso, {} errores)",
            summary.running_experiments, summary.total_errors
        );
        let selected_experiment = dashboard.selected_id(EntityKind::Experiment);
        for experiment in dashboard.list_experiments() {
            let _ = writeln!(
                out,
                "{} {} [{}] {} · {} · {:.0}% {} / {} {} · errores {}",
                marker(selected_experiment == Some(experiment.id.as_str())),
                experiment.title,
                priority_label(experiment.priority),
                experiment.owner_name,
                experiment.robot_id,
                experiment.progress_percent,
                format_clock(experiment.elapsed_secs),
                format_clock(experiment.estimated_total_secs),
                match experiment.execution_state {
                    ExecutionState::Running => "en curso",
                    ExecutionState::Paused => "pausado",
                },
                experiment.error_count,
            );
        }

        // Metrics
        let _ = writeln!(out, "\nMétricas del Sistema");
        let selected_metric = dashboard.selected_id(EntityKind::Metric);
        for metric in dashboard.list_metrics() {
            let progress = metric
                .progress_percent
                .map(|p| format!(" ({p:.0}%)"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{} {:<20} {:>10}{}  {}  {}",
                marker(selected_metric == Some(metric.label.as_str())),
                metric.label,
                metric.current_value,
                progress,
                health_label(metric.status),
                metric.change,
            );
        }

        // Video
        let video = dashboard.video_health();
        let player = &view.player;
        let _ = writeln!(
            out,
            "\nVideo: {}  {}ms  {:.0} fps  {}  señal {}/4  {}",
            if video.connected { "en línea" } else { "sin señal" },
            video.latency_ms,
            video.frames_per_second,
            video.resolution,
            video.signal_bars,
            self.sparkline(),
        );
        let _ = writeln!(
            out,
            "  {}{}{}{} vol {}",
            if player.playing { "▶ reproduciendo" } else { "⏸ pausado" },
            if player.muted { " · silencio" } else { "" },
            if player.recording { " · grabando" } else { "" },
            if player.fullscreen { " · pantalla completa" } else { "" },
            player.volume,
        );

        // Notifications
        let active = dashboard.list_active_notifications();
        let _ = writeln!(out, "\nNotificaciones ({})", active.len());
        for notification in active.iter().take(self.max_visible_toasts) {
            let _ = writeln!(
                out,
                "  [{}] {}: {}",
                severity_label(notification.severity),
                notification.title,
                notification.body,
            );
        }
        let hidden = active.len().saturating_sub(self.max_visible_toasts);
        if hidden > 0 {
            let _ = writeln!(out, "  +{hidden} más");
        }

        // Feed
        let _ = writeln!(
            out,
            "\nFuente: {} ({})  líneas {}  aplicadas {}  rechazadas {}  ilegibles {}  expiradas {}  activo {}s",
            status.source,
            feed_state_label(status.state),
            status.lines_received,
            status.events_applied,
            status.rejected_updates,
            status.parse_errors,
            status.notifications_expired,
            status.uptime_seconds(),
        );
        if let Some(error) = &status.last_error {
            let _ = writeln!(out, "  último error: {error}");
        }
        let skip = status.diagnostics.len().saturating_sub(RECENT_DIAGNOSTICS);
        for diagnostic in status.diagnostics.iter().skip(skip) {
            let _ = writeln!(
                out,
                "  {} {:<5} {}",
                diagnostic.timestamp.format("%H:%M:%S"),
                diagnostic_label(diagnostic.level),
                diagnostic.message,
            );
        }

        out
    }
}

fn marker(selected: bool) -> char {
    if selected {
        '>'
    } else {
        ' '
    }
}

fn format_age(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}

fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn connectivity_label(connectivity: Connectivity) -> &'static str {
    match connectivity {
        Connectivity::Connected => "Conectado",
        Connectivity::Busy => "Ocupado",
        Connectivity::Disconnected => "Desconectado",
    }
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "Alta",
        Priority::Medium => "Media",
        Priority::Low => "Baja",
    }
}

fn health_label(status: MetricStatus) -> &'static str {
    match status {
        MetricStatus::Good => "óptimo",
        MetricStatus::Warning => "advertencia",
        MetricStatus::Critical => "crítico",
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => "ok",
        Severity::Info => "info",
        Severity::Warning => "aviso",
        Severity::Error => "error",
    }
}

fn theme_label(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "claro",
        Theme::Dark => "oscuro",
        Theme::System => "sistema",
    }
}

fn diagnostic_label(level: DiagnosticLevel) -> &'static str {
    match level {
        DiagnosticLevel::Info => "INFO",
        DiagnosticLevel::Warning => "WARN",
        DiagnosticLevel::Error => "ERROR",
    }
}

fn feed_state_label(state: FeedState) -> &'static str {
    match state {
        FeedState::Idle => "inactiva",
        FeedState::Reading => "leyendo",
        FeedState::Finished => "terminada",
        FeedState::Error => "error",
    }
}
