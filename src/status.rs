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

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

const MAX_DIAGNOSTICS: usize = 50;

/// State of the telemetry feed reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Reading,
    Finished,
    Error,
}

/// Diagnostic message with timestamp
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    pub timestamp: DateTime<Utc>,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// Feed statistics and diagnostics shown alongside the dashboard
#[derive(Debug)]
pub struct FeedStatus {
    pub state: FeedState,
    pub source: String,
    pub started_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,

    // Message statistics
    pub lines_received: u64,
    pub events_applied: u64,
    pub rejected_updates: u64,
    pub parse_errors: u64,
    pub notifications_expired: u64,
    pub last_error: Option<String>,

    // Diagnostic messages (keep last 50)
    pub diagnostics: VecDeque<DiagnosticMessage>,
    max_diagnostics: usize,
}

impl FeedStatus {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            state: FeedState::Idle,
            source: source.into(),
            started_at: None,
            last_event_at: None,
            lines_received: 0,
            events_applied: 0,
            rejected_updates: 0,
            parse_errors: 0,
            notifications_expired: 0,
            last_error: None,
            diagnostics: VecDeque::with_capacity(MAX_DIAGNOSTICS),
            max_diagnostics: MAX_DIAGNOSTICS,
        }
    }

    /// Update feed state
    pub fn set_state(&mut self, state: FeedState) {
        if self.state == state {
            return;
        }
        self.state = state;

        match state {
            FeedState::Reading => {
                self.started_at = Some(Utc::now());
                self.add_diagnostic(DiagnosticLevel::Info, format!("Reading feed from {}", self.source));
            }
            FeedState::Finished => {
                self.add_diagnostic(
                    DiagnosticLevel::Info,
                    format!("Feed {} finished after {} lines", self.source, self.lines_received),
                );
            }
            FeedState::Idle | FeedState::Error => {}
        }
    }

    /// Record a feed read error
    pub fn set_feed_error(&mut self, error: String) {
        self.state = FeedState::Error;
        self.add_diagnostic(DiagnosticLevel::Error, format!("Feed error: {error}"));
        self.last_error = Some(error);
    }

    pub fn record_line(&mut self) {
        self.lines_received += 1;
        self.last_event_at = Some(Utc::now());
    }

    pub fn record_applied(&mut self) {
        self.events_applied += 1;
    }

    pub fn record_rejection(&mut self, error: String) {
        self.rejected_updates += 1;
        self.add_diagnostic(DiagnosticLevel::Warning, format!("Rejected update: {error}"));
        self.last_error = Some(error);
    }

    pub fn record_parse_error(&mut self, error: String) {
        self.parse_errors += 1;
        self.add_diagnostic(DiagnosticLevel::Warning, format!("Unparseable line: {error}"));
        self.last_error = Some(error);
    }

    pub fn record_expired(&mut self) {
        self.notifications_expired += 1;
    }

    /// Add a diagnostic message
    pub fn add_diagnostic(&mut self, level: DiagnosticLevel, message: String) {
        let diagnostic = DiagnosticMessage {
            timestamp: Utc::now(),
            level,
            message,
        };

        self.diagnostics.push_back(diagnostic);

        // Keep only the last N messages
        while self.diagnostics.len() > self.max_diagnostics {
            self.diagnostics.pop_front();
        }
    }

    /// Seconds since the feed started reading
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at
            .map_or(0, |started| (Utc::now() - started).num_seconds().max(0).unsigned_abs())
    }
}
