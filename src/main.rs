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

//! labdash entry point.
//!
//! Replays a JSON-lines telemetry feed into the dashboard core, drives
//! notification expiry, and prints text snapshots.

mod config;
mod feed;
mod mock;
mod report;
mod status;

use std::time::Duration;

use clap::Parser;
use config::AppConfig;
use feed::{Feed, FeedConfig, FeedEvent};
use labdash_core::{Dashboard, EntityKind, JsonLinesParser, Protocol, TelemetryEvent};
use log::{debug, info, warn};
use report::Reporter;
use status::{FeedState, FeedStatus};

#[derive(Parser, Debug)]
#[command(name = "labdash")]
#[command(version, about = "Headless robotics lab dashboard")]
struct Args {
    /// JSON-lines telemetry file (`-` reads stdin)
    #[arg(short, long)]
    feed: Option<String>,

    /// Do not read any feed
    #[arg(long, conflicts_with = "feed")]
    no_feed: bool,

    /// Load the built-in demo fleet first
    #[arg(long)]
    mock: bool,

    /// Seconds between snapshots (0 disables periodic snapshots)
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Pause between replayed feed lines, in milliseconds
    #[arg(long)]
    replay_delay: Option<u64>,

    /// Exit after the feed ends, printing one final snapshot
    #[arg(long)]
    once: bool,

    /// Select an entity before the first snapshot, e.g. `robot:1`
    #[arg(long, value_parser = parse_selection)]
    select: Vec<(EntityKind, String)>,

    /// Show rejected updates as warning notifications
    #[arg(long)]
    surface_rejections: bool,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    /// Print the config file path and exit
    #[arg(long)]
    config_path: bool,
}

impl Args {
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(feed) = &self.feed {
            config.feed_path = Some(feed.clone());
        }
        if self.mock {
            config.seed_mock = true;
        }
        if let Some(secs) = self.snapshot_interval {
            config.snapshot_interval_secs = secs;
        }
        if let Some(ms) = self.replay_delay {
            config.replay_delay_ms = ms;
        }
        if self.surface_rejections {
            config.alerts.surface_rejections = true;
        }
    }
}

fn parse_selection(value: &str) -> Result<(EntityKind, String), String> {
    let (kind, id) = value
        .split_once(':')
        .ok_or_else(|| format!("expected <kind>:<id>, got '{value}'"))?;
    let kind = match kind {
        "robot" => EntityKind::Robot,
        "experiment" => EntityKind::Experiment,
        "metric" => EntityKind::Metric,
        other => return Err(format!("unknown entity kind '{other}'")),
    };
    if id.is_empty() {
        return Err("empty id".to_string());
    }
    Ok((kind, id.to_string()))
}

/// Parse and apply one feed line, keeping feed statistics current.
fn process_line(
    dashboard: &mut Dashboard,
    parser: &mut JsonLinesParser,
    status: &mut FeedStatus,
    reporter: &mut Reporter,
    line: &[u8],
) {
    status.record_line();
    match parser.parse(line) {
        Ok(Some(event)) => apply_event(dashboard, status, reporter, event),
        Ok(None) => {}
        Err(e) => {
            warn!("Parse error: {e}");
            status.record_parse_error(e.to_string());
        }
    }
}

fn apply_event(
    dashboard: &mut Dashboard,
    status: &mut FeedStatus,
    reporter: &mut Reporter,
    event: TelemetryEvent,
) {
    let is_video = matches!(event, TelemetryEvent::Video(_));
    match dashboard.handle_event(event) {
        Ok(()) => {
            status.record_applied();
            if is_video {
                reporter.record_latency(dashboard.video_health().latency_ms);
            }
        }
        Err(e) => {
            debug!("Event not applied: {e}");
            status.record_rejection(e.to_string());
        }
    }
}

async fn next_feed_event(feed: &mut Option<Feed>) -> Option<FeedEvent> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.config_path {
        println!("{}", AppConfig::get_config_path()?.display());
        return Ok(());
    }

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });
    args.apply_to(&mut config);

    if args.save_config {
        config.save()?;
        info!("Configuration saved to {}", AppConfig::get_config_path()?.display());
    }

    let mut dashboard = Dashboard::new(config.dashboard_config());
    let mut reporter = Reporter::new(config.max_visible_toasts);
    let mut parser = JsonLinesParser::new();

    let feed_config = FeedConfig {
        path: config.feed_file(),
        replay_delay: config.replay_delay(),
        ..Default::default()
    };
    let mut status = FeedStatus::new(if args.no_feed {
        "none".to_string()
    } else {
        feed_config.source_name()
    });

    if config.seed_mock {
        let events = mock::mock_events();
        info!("Seeding {} demo events", events.len());
        for event in events {
            apply_event(&mut dashboard, &mut status, &mut reporter, event);
        }
    }

    for (kind, id) in &args.select {
        dashboard.select(*kind, id);
    }

    let mut feed = (!args.no_feed).then(|| Feed::spawn(feed_config));

    let snapshots = config.snapshot_interval();
    let mut ticker = tokio::time::interval(snapshots.unwrap_or(Duration::from_secs(3600)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    if feed.is_none() && args.once {
        print!("{}", reporter.render(&dashboard, &status));
        return Ok(());
    }

    loop {
        tokio::select! {
            event = next_feed_event(&mut feed) => match event {
                Some(FeedEvent::StateChanged(state)) => {
                    status.set_state(state);
                    if state == FeedState::Finished && args.once {
                        break;
                    }
                }
                Some(FeedEvent::LineReceived(line)) => {
                    process_line(&mut dashboard, &mut parser, &mut status, &mut reporter, &line);
                }
                Some(FeedEvent::Failed(error)) => {
                    status.set_feed_error(error);
                    if args.once {
                        break;
                    }
                }
                None => {
                    debug!("Feed reader stopped");
                    feed = None;
                }
            },

            expired = dashboard.next_expired() => {
                info!("Notification expired: {} ({})", expired.title, expired.id);
                status.record_expired();
            }

            _ = ticker.tick(), if snapshots.is_some() => {
                print!("{}", reporter.render(&dashboard, &status));
            }

            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for shutdown signal: {e}");
                }
                info!("Shutting down");
                if let Some(feed) = &feed {
                    feed.shutdown();
                }
                break;
            }
        }
    }

    print!("{}", reporter.render(&dashboard, &status));
    info!("Parsed {} telemetry events", parser.events_parsed());
    Ok(())
}
