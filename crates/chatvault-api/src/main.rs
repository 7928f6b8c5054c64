//! ChatVault admin CLI entry point.
//!
//! Binary name: `chatvault`
//!
//! Parses CLI arguments, initializes tracing, the database and the session
//! store, then dispatches to the command handler.

mod cli;
mod state;

use anyhow::Context;
use chatvault_core::repository::SessionRepository;
use chatvault_observe::tracing_setup::{init_tracing, shutdown_tracing};
use clap::Parser;
use console::style;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info,chatvault_infra=debug,chatvault_core=debug",
        _ => "trace",
    };
    if let Err(e) = init_tracing(filter, cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let state = AppState::init().await?;

    // Ctrl+C cancels whatever store operation is in flight.
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let result = match cli.command {
        Commands::Init => init(&state, cli.json).await,
        Commands::Sessions { action } => cli::session::run(&state, action, cli.json).await,
        Commands::Metrics { window } => cli::metrics::show_metrics(&state, &window, cli.json).await,
        Commands::Tokens { window } => cli::metrics::show_tokens(&state, &window, cli.json).await,
    };

    state.db_pool.close().await;
    shutdown_tracing();
    result
}

async fn init(state: &AppState, json: bool) -> anyhow::Result<()> {
    state
        .store
        .ensure_indexes()
        .await
        .context("failed to create indexes")?;

    if json {
        let out = serde_json::json!({
            "data_dir": state.data_dir,
            "initialized": true,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Session store ready in {}",
            style("✓").green().bold(),
            style(state.data_dir.display()).cyan()
        );
        println!();
    }
    Ok(())
}
