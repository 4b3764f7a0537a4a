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

//! Error types shared across the crate.

use thiserror::Error;

use crate::protocol::ParseError;

/// Reasons an update is rejected. A rejected update never mutates state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("value {value} for field '{field}' outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("robot {id} is disconnected but reports signal {signal}")]
    InconsistentSignal { id: String, signal: f64 },

    #[error("running experiment {id} progress went from {from} to {to} without a reset")]
    ProgressRegression { id: String, from: f64, to: f64 },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("update rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("telemetry parse error: {0}")]
    Parse(#[from] ParseError),
}
