//! CLI command definitions for the `chatvault` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod metrics;
pub mod session;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

/// Inspect and administer persisted chat sessions.
#[derive(Parser)]
#[command(name = "chatvault", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database (if needed) and its indexes.
    Init,

    /// Browse, inspect and end sessions.
    Sessions {
        #[command(subcommand)]
        action: session::SessionCommand,
    },

    /// Usage metrics for sessions started in a time window.
    Metrics {
        #[command(flatten)]
        window: TimeWindow,
    },

    /// Total tokens used by sessions started in a time window.
    Tokens {
        #[command(flatten)]
        window: TimeWindow,
    },
}

/// `--from` / `--to` pair; defaults to the last 24 hours.
#[derive(clap::Args, Debug, Clone)]
pub struct TimeWindow {
    /// Window start (RFC 3339). Defaults to 24 hours before `--to`.
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Window end (RFC 3339). Defaults to now.
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let to = self.to.unwrap_or(now);
        let from = self.from.unwrap_or(to - chrono::Duration::hours(24));
        (from, to)
    }
}

/// Human-readable duration, e.g. `1h 5m`, `12m`, `40s`.
pub fn format_duration(duration: chrono::TimeDelta) -> String {
    let total_secs = duration.num_seconds().max(0);
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", total_secs)
    }
}
