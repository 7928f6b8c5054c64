//! Usage metrics CLI commands.

use anyhow::{Context, Result};
use chatvault_core::repository::MetricsRepository;
use chatvault_types::metrics::Metrics;
use chrono::Utc;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use super::TimeWindow;
use crate::state::AppState;

/// Print aggregate session metrics for the window.
pub async fn show_metrics(state: &AppState, window: &TimeWindow, json: bool) -> Result<()> {
    let (from, to) = window.resolve(Utc::now());
    let metrics = state
        .metrics
        .session_metrics(from, to)
        .await
        .context("failed to compute session metrics")?;

    if json {
        let out = serde_json::json!({
            "from": from,
            "to": to,
            "metrics": metrics,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  Sessions from {} to {}",
        style(from.format("%Y-%m-%d %H:%M")).cyan(),
        style(to.format("%Y-%m-%d %H:%M")).cyan()
    );
    println!();
    println!("{}", metrics_table(&metrics));
    if metrics.truncated {
        println!();
        println!(
            "  {} Scan limit of {} sessions reached; figures cover a sample.",
            style("!").yellow().bold(),
            state.config.metrics.max_scan_documents
        );
    }
    println!();
    Ok(())
}

/// Print total token usage for the window.
pub async fn show_tokens(state: &AppState, window: &TimeWindow, json: bool) -> Result<()> {
    let (from, to) = window.resolve(Utc::now());
    let tokens = state
        .metrics
        .token_usage(from, to)
        .await
        .context("failed to compute token usage")?;

    if json {
        let out = serde_json::json!({ "from": from, "to": to, "total_tokens": tokens });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("  {} tokens", style(tokens).bold());
        println!();
    }
    Ok(())
}

fn metrics_table(metrics: &Metrics) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Metric").fg(Color::White),
        Cell::new("Value").fg(Color::White),
    ]);

    let rows = [
        ("Total sessions", metrics.total_sessions.to_string()),
        ("Active sessions", metrics.active_sessions.to_string()),
        ("Admin assisted", metrics.admin_assisted_count.to_string()),
        ("Total tokens", metrics.total_tokens.to_string()),
        ("Avg response", format!("{} ms", metrics.avg_response_ms)),
        ("Max response", format!("{} ms", metrics.max_response_ms)),
        ("Peak concurrent", metrics.max_concurrent.to_string()),
        ("Avg concurrent", format!("{:.2}", metrics.avg_concurrent)),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value).fg(Color::Cyan)]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_table_lists_every_figure() {
        let metrics = Metrics {
            total_sessions: 12,
            avg_concurrent: 1.5,
            ..Default::default()
        };
        let rendered = metrics_table(&metrics).to_string();
        assert!(rendered.contains("Total sessions"));
        assert!(rendered.contains("12"));
        assert!(rendered.contains("1.50"));
    }
}
