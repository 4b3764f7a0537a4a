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

//! Built-in demo fleet for running without a live feed.

use std::time::Duration;

use labdash_core::protocol::{ExperimentUpdate, RobotUpdate, VideoUpdate};
use labdash_core::{
    Connectivity, ExecutionState, MetricSample, MetricStatus, NotificationRequest, Priority,
    Severity, TelemetryEvent, Trend,
};

struct MockRobot {
    id: &'static str,
    name: &'static str,
    connectivity: Connectivity,
    battery: f64,
    last_activity_mins: i64,
    signal: f64,
    temperature: f64,
}

const ROBOTS: [MockRobot; 6] = [
    MockRobot {
        id: "1",
        name: "RVR-001",
        connectivity: Connectivity::Connected,
        battery: 82.0,
        last_activity_mins: 2,
        signal: 85.0,
        temperature: 42.0,
    },
    MockRobot {
        id: "2",
        name: "RVR-002",
        connectivity: Connectivity::Busy,
        battery: 55.0,
        last_activity_mins: 5,
        signal: 72.0,
        temperature: 38.0,
    },
    MockRobot {
        id: "3",
        name: "RVR-003",
        connectivity: Connectivity::Disconnected,
        battery: 12.0,
        last_activity_mins: 9,
        signal: 0.0,
        temperature: 0.0,
    },
    MockRobot {
        id: "4",
        name: "RVR-004",
        connectivity: Connectivity::Connected,
        battery: 68.0,
        last_activity_mins: 1,
        signal: 91.0,
        temperature: 45.0,
    },
    MockRobot {
        id: "5",
        name: "RVR-005",
        connectivity: Connectivity::Busy,
        battery: 44.0,
        last_activity_mins: 3,
        signal: 68.0,
        temperature: 41.0,
    },
    MockRobot {
        id: "6",
        name: "RVR-006",
        connectivity: Connectivity::Connected,
        battery: 91.0,
        last_activity_mins: 0,
        signal: 95.0,
        temperature: 39.0,
    },
];

#[allow(clippy::too_many_arguments, reason = "mirrors one row of the demo table")]
fn experiment(
    id: &str,
    owner: &str,
    title: &str,
    robot: &str,
    progress: f64,
    (elapsed_mins, elapsed_secs): (i64, i64),
    state: ExecutionState,
    priority: Priority,
    (estimated_mins, estimated_secs): (i64, i64),
    errors: i64,
) -> TelemetryEvent {
    TelemetryEvent::Experiment(ExperimentUpdate {
        owner_name: Some(owner.to_string()),
        title: Some(title.to_string()),
        robot_id: Some(robot.to_string()),
        progress_percent: Some(progress),
        execution_state: Some(state),
        priority: Some(priority),
        elapsed_secs: Some(elapsed_mins * 60 + elapsed_secs),
        estimated_total_secs: Some(estimated_mins * 60 + estimated_secs),
        error_count: Some(errors),
        ..ExperimentUpdate::new(id)
    })
}

fn metric(
    label: &str,
    value: &str,
    progress: Option<f64>,
    trend: Trend,
    change: &str,
) -> TelemetryEvent {
    TelemetryEvent::Metric(MetricSample {
        label: label.to_string(),
        current_value: value.to_string(),
        status: MetricStatus::Good,
        progress_percent: progress,
        trend,
        change: change.to_string(),
    })
}

/// Demo fleet as telemetry events, in the order they should be applied.
pub fn mock_events() -> Vec<TelemetryEvent> {
    let mut events: Vec<TelemetryEvent> = ROBOTS
        .iter()
        .map(|r| {
            TelemetryEvent::Robot(RobotUpdate {
                name: Some(r.name.to_string()),
                connectivity: Some(r.connectivity),
                battery_percent: Some(r.battery),
                signal_percent: Some(r.signal),
                temperature_c: Some(r.temperature),
                last_activity_age_secs: Some(r.last_activity_mins * 60),
                ..RobotUpdate::new(r.id)
            })
        })
        .collect();

    events.extend([
        experiment(
            "1",
            "Dr. García",
            "Navegación autónoma en enjambre",
            "RVR-002",
            65.0,
            (12, 34),
            ExecutionState::Running,
            Priority::High,
            (18, 0),
            0,
        ),
        experiment(
            "2",
            "Ing. López",
            "Algoritmo de formación",
            "RVR-005",
            28.0,
            (4, 10),
            ExecutionState::Running,
            Priority::Medium,
            (15, 30),
            2,
        ),
        experiment(
            "3",
            "Dra. Martínez",
            "Detección de obstáculos",
            "RVR-001",
            90.0,
            (19, 2),
            ExecutionState::Paused,
            Priority::Low,
            (21, 0),
            1,
        ),
    ]);

    events.extend([
        metric("Latencia Promedio", "45ms", None, Trend::Down, "-12%"),
        metric("Conexiones Activas", "12/50", Some(24.0), Trend::Up, "+3"),
        metric("CPU Servidor", "34%", Some(34.0), Trend::Stable, "0%"),
        metric("Memoria", "2.1GB/8GB", Some(26.0), Trend::Up, "+0.2GB"),
    ]);

    events.push(TelemetryEvent::Video(VideoUpdate {
        connected: Some(true),
        latency_ms: Some(86),
        frames_per_second: Some(30.0),
        resolution: Some("1080p".to_string()),
        signal_bars: Some(4),
    }));

    events.extend([
        TelemetryEvent::Notification(
            NotificationRequest::new(
                Severity::Success,
                "Despliegue completado",
                "Despliegue completado en cluster-a",
            )
            .with_id("1")
            .expires_after(Duration::from_millis(5000)),
        ),
        TelemetryEvent::Notification(
            NotificationRequest::new(Severity::Error, "Robot desconectado", "RVR-003 desconectado")
                .with_id("2")
                .expires_after(Duration::from_millis(8000)),
        ),
    ]);

    events
}
