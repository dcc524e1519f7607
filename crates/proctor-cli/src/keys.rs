//! `proctor keys`: replay a recorded key event log.
//!
//! The log holds one browser key event per line, as JSON. Recorded
//! timestamps (milliseconds) drive the cooldown clock, so a replay raises
//! exactly the warnings the live session would have.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use proctor_core::{KeyEvent, KeyboardConfig, KeyboardPolicyTracker};
use serde::Serialize;

#[derive(Args)]
pub struct KeysArgs {
    /// JSON-lines file of {"type", "key", "timestamp"} events
    log: PathBuf,
    /// Replace the default allow-list (repeatable)
    #[arg(long = "allowed")]
    allowed: Vec<String>,
    #[arg(long, default_value_t = 2)]
    cooldown_secs: u64,
    #[arg(long, default_value_t = 20)]
    history_size: usize,
    /// Drop held keys older than this many seconds
    #[arg(long)]
    stale_key_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct KeyLine {
    line: usize,
    key: String,
    warnings: Option<Vec<String>>,
}

pub fn run(args: KeysArgs) -> Result<()> {
    let mut tracker = KeyboardPolicyTracker::new(KeyboardConfig {
        history_size: args.history_size,
        warning_cooldown: Duration::from_secs(args.cooldown_secs),
        stale_key_timeout: args.stale_key_secs.map(Duration::from_secs),
    })
    .context("invalid keyboard configuration")?;
    if !args.allowed.is_empty() {
        tracker.set_allowed_keys(args.allowed.iter().cloned());
    }

    let file = File::open(&args.log)
        .with_context(|| format!("failed to open {}", args.log.display()))?;
    for line in replay(&mut tracker, BufReader::new(file))? {
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

/// Feed every event through `tracker`. The replay clock never runs
/// backwards: an event stamped earlier than its predecessor reuses the
/// predecessor's clock reading.
fn replay<R: BufRead>(tracker: &mut KeyboardPolicyTracker, reader: R) -> Result<Vec<KeyLine>> {
    let start = Instant::now();
    let mut clock = start;
    let mut first_timestamp = None;
    let mut out = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: KeyEvent = serde_json::from_str(&line)
            .with_context(|| format!("line {line_no}: malformed key event"))?;

        let first = *first_timestamp.get_or_insert(event.timestamp);
        let now = elapsed_since(first, event.timestamp)
            .and_then(|offset| start.checked_add(offset))
            .with_context(|| {
                format!("line {line_no}: timestamp {} is out of range", event.timestamp)
            })?;
        clock = clock.max(now);
        let warnings = tracker.track_at(&event, clock);
        out.push(KeyLine {
            line: line_no,
            key: event.key,
            warnings,
        });
    }

    Ok(out)
}

/// Clock offset of `timestamp` from `first`, both in milliseconds.
/// Timestamps at or before `first`, and non-finite ones, map to a zero
/// offset. `None` when the offset does not fit a `Duration`.
fn elapsed_since(first: f64, timestamp: f64) -> Option<Duration> {
    let ms = timestamp - first;
    if ms.is_finite() && ms > 0.0 {
        Duration::try_from_secs_f64(ms / 1000.0).ok()
    } else {
        Some(Duration::ZERO)
    }
}
