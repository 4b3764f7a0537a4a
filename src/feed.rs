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

//! Async telemetry feed reader.
//!
//! Reads JSON-lines telemetry from a file or stdin in a background task and
//! hands each line to the owner over a channel. The reader never touches
//! dashboard state; the owning task parses and applies what it receives.

use std::path::PathBuf;
use std::time::Duration;

use log::{error, info};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::status::FeedState;

/// Configuration for the feed reader.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// JSON-lines file to replay. `None` reads stdin.
    pub path: Option<PathBuf>,
    /// Pause after each forwarded line.
    pub replay_delay: Duration,
    /// Channel buffer size for received lines.
    pub buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: None,
            replay_delay: Duration::ZERO,
            buffer_size: 1024,
        }
    }
}

impl FeedConfig {
    /// Display name of the source.
    pub fn source_name(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| "stdin".to_string(), |p| p.display().to_string())
    }
}

/// Events emitted by the feed reader.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Reader state changed.
    StateChanged(FeedState),
    /// One raw line.
    LineReceived(Vec<u8>),
    /// The source could not be opened or read.
    Failed(String),
}

/// Handle to a background feed reader.
///
/// Dropping the handle cancels the reader.
pub struct Feed {
    event_rx: mpsc::Receiver<FeedEvent>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Feed {
    /// Spawn a reader task for the configured source.
    pub fn spawn(config: FeedConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.buffer_size.max(1));
        let cancel_token = CancellationToken::new();

        let task_cancel = cancel_token.clone();
        tokio::spawn(async move {
            feed_loop(config, event_tx, task_cancel).await;
        });

        Self {
            event_rx,
            cancel_token,
        }
    }

    /// Receive the next event from the reader.
    ///
    /// Returns `None` once the reader has stopped and all events are drained.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.event_rx.recv().await
    }

    /// Stop the reader.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

enum ReadEnd {
    Exhausted,
    Cancelled,
}

async fn feed_loop(
    config: FeedConfig,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel_token: CancellationToken,
) {
    let source = config.source_name();
    if event_tx
        .send(FeedEvent::StateChanged(FeedState::Reading))
        .await
        .is_err()
    {
        return; // Receiver dropped
    }
    info!("Reading telemetry from {source}");

    let result = match &config.path {
        Some(path) => match File::open(path).await {
            Ok(file) => {
                read_lines(BufReader::new(file), &event_tx, &cancel_token, config.replay_delay).await
            }
            Err(e) => Err(e),
        },
        None => {
            read_lines(
                BufReader::new(tokio::io::stdin()),
                &event_tx,
                &cancel_token,
                config.replay_delay,
            )
            .await
        }
    };

    match result {
        Ok(ReadEnd::Exhausted) => {
            info!("Feed {source} finished");
            let _ = event_tx
                .send(FeedEvent::StateChanged(FeedState::Finished))
                .await;
        }
        Ok(ReadEnd::Cancelled) => {
            info!("Feed reader cancelled");
        }
        Err(e) => {
            error!("Feed error on {source}: {e}");
            let _ = event_tx.send(FeedEvent::Failed(e.to_string())).await;
        }
    }
}

/// Forward raw lines without the trailing `\n` or `\r\n`. Bytes are passed
/// through untouched so that malformed lines reach the parser and are
/// reported there instead of ending the feed.
async fn read_lines<R>(
    mut reader: R,
    event_tx: &mpsc::Sender<FeedEvent>,
    cancel_token: &CancellationToken,
    replay_delay: Duration,
) -> std::io::Result<ReadEnd>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => {
                if read? == 0 {
                    return Ok(ReadEnd::Exhausted);
                }
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                if event_tx
                    .send(FeedEvent::LineReceived(std::mem::take(&mut buf)))
                    .await
                    .is_err()
                {
                    return Ok(ReadEnd::Cancelled);
                }
            }

            () = cancel_token.cancelled() => {
                return Ok(ReadEnd::Cancelled);
            }
        }

        if !replay_delay.is_zero() {
            tokio::select! {
                () = sleep(replay_delay) => {}
                () = cancel_token.cancelled() => return Ok(ReadEnd::Cancelled),
            }
        }
    }
}
