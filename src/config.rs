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

//! Application configuration management.
//!
//! This module handles persistent configuration storage using TOML format:
//! the telemetry feed source, alert policy, and presentation preferences.

use std::path::PathBuf;
use std::time::Duration;

use labdash_core::{AggregatorConfig, AlertPolicy, DashboardConfig, Theme, ViewState};
use log::warn;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "labdash";
const CONFIG_NAME: &str = "config";

/// Current configuration schema version
const CONFIG_VERSION: u32 = 1;

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// JSON-lines telemetry file; `-` or unset reads stdin
    #[serde(default)]
    pub feed_path: Option<String>,

    /// Pause between replayed feed lines, in milliseconds
    #[serde(default)]
    pub replay_delay_ms: u64,

    /// Seconds between printed snapshots (0 disables periodic snapshots)
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Load the built-in demo fleet before reading the feed
    #[serde(default)]
    pub seed_mock: bool,

    /// Battery level at or below which a robot is reported as low
    #[serde(default = "default_low_battery")]
    pub low_battery_percent: f64,

    /// Which status changes become notifications
    #[serde(default)]
    pub alerts: AlertPolicy,

    /// Toasts shown at once; the rest are summarised as a count
    #[serde(default = "default_max_visible_toasts")]
    pub max_visible_toasts: usize,

    #[serde(default)]
    pub theme: Theme,

    #[serde(default = "default_true")]
    pub sidebar_open: bool,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_snapshot_interval() -> u64 {
    5
}

fn default_low_battery() -> f64 {
    20.0
}

fn default_max_visible_toasts() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            feed_path: None,
            replay_delay_ms: 0,
            snapshot_interval_secs: default_snapshot_interval(),
            seed_mock: false,
            low_battery_percent: default_low_battery(),
            alerts: AlertPolicy::default(),
            max_visible_toasts: default_max_visible_toasts(),
            theme: Theme::default(),
            sidebar_open: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        let config: AppConfig = confy::load(APP_NAME, CONFIG_NAME)?;

        if config.config_version > CONFIG_VERSION {
            warn!(
                "Config version {} is newer than supported version {}; unknown fields are ignored",
                config.config_version, CONFIG_VERSION
            );
        }

        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Feed file path; `None` means stdin
    pub fn feed_file(&self) -> Option<PathBuf> {
        self.feed_path
            .as_deref()
            .filter(|p| !p.is_empty() && *p != "-")
            .map(PathBuf::from)
    }

    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }

    pub fn snapshot_interval(&self) -> Option<Duration> {
        (self.snapshot_interval_secs > 0).then(|| Duration::from_secs(self.snapshot_interval_secs))
    }

    /// Core configuration derived from the stored settings
    pub fn dashboard_config(&self) -> DashboardConfig {
        let mut view = ViewState::new();
        view.theme = self.theme;
        view.sidebar_open = self.sidebar_open;

        DashboardConfig {
            aggregator: AggregatorConfig {
                low_battery_percent: self.low_battery_percent,
                ..Default::default()
            },
            alerts: self.alerts.clone(),
            view,
        }
    }
}
