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

//! Presentation-side view state.
//!
//! Pure UI state: which entity is expanded per registry kind, theme, sidebar
//! and the video player controls. Nothing here touches entity records, and a
//! selection pointing at an entity that no longer exists is simply inert.

use serde::{Deserialize, Serialize};

use crate::registry::EntityKind;

const DEFAULT_VOLUME: u8 = 80;
const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    System,
}

/// Local state of the lab video player controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerControls {
    pub playing: bool,
    pub muted: bool,
    pub fullscreen: bool,
    pub recording: bool,
    /// 0-100
    pub volume: u8,
}

impl Default for PlayerControls {
    fn default() -> Self {
        Self {
            playing: false,
            muted: false,
            fullscreen: false,
            recording: false,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl PlayerControls {
    pub fn toggle_playing(&mut self) -> bool {
        self.playing = !self.playing;
        self.playing
    }

    pub fn toggle_muted(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.fullscreen = !self.fullscreen;
        self.fullscreen
    }

    pub fn toggle_recording(&mut self) -> bool {
        self.recording = !self.recording;
        self.recording
    }

    /// Set the volume, clamped to 0-100.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
    }
}

/// Serializable UI state read by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    selected_robot: Option<String>,
    selected_experiment: Option<String>,
    selected_metric: Option<String>,
    pub theme: Theme,
    pub sidebar_open: bool,
    pub player: PlayerControls,
}

impl ViewState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle the selection for `kind`.
    ///
    /// Selecting the already selected id clears it; any other id replaces
    /// the current selection. Returns the selection after the call.
    pub fn select(&mut self, kind: EntityKind, id: &str) -> Option<&str> {
        let slot = self.slot_mut(kind);
        if slot.as_deref() == Some(id) {
            *slot = None;
        } else {
            *slot = Some(id.to_string());
        }
        self.selected_id(kind)
    }

    #[must_use]
    pub fn selected_id(&self, kind: EntityKind) -> Option<&str> {
        match kind {
            EntityKind::Robot => self.selected_robot.as_deref(),
            EntityKind::Experiment => self.selected_experiment.as_deref(),
            EntityKind::Metric => self.selected_metric.as_deref(),
        }
    }

    pub fn clear_selection(&mut self, kind: EntityKind) {
        *self.slot_mut(kind) = None;
    }

    pub fn toggle_sidebar(&mut self) -> bool {
        self.sidebar_open = !self.sidebar_open;
        self.sidebar_open
    }

    fn slot_mut(&mut self, kind: EntityKind) -> &mut Option<String> {
        match kind {
            EntityKind::Robot => &mut self.selected_robot,
            EntityKind::Experiment => &mut self.selected_experiment,
            EntityKind::Metric => &mut self.selected_metric,
        }
    }
}
