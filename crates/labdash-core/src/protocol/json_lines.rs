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

//! JSON-lines telemetry parser.
//!
//! One JSON document per line. Blank lines and lines starting with `#` are
//! skipped so recorded feeds can carry comments.

use super::{ParseError, Protocol, TelemetryEvent};

/// Parser for newline-delimited JSON telemetry events.
#[derive(Debug, Default)]
pub struct JsonLinesParser {
    events_parsed: u64,
}

impl JsonLinesParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events successfully parsed so far.
    #[must_use]
    pub fn events_parsed(&self) -> u64 {
        self.events_parsed
    }
}

impl Protocol for JsonLinesParser {
    type Message = TelemetryEvent;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<TelemetryEvent>, ParseError> {
        let line = std::str::from_utf8(input)
            .map_err(|e| ParseError::InvalidFormat(format!("invalid UTF-8: {e}")))?
            .trim();

        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let event = serde_json::from_str(line)?;
        self.events_parsed += 1;
        Ok(Some(event))
    }
}
