//! Session CLI commands: list, active, show, end.

use anyhow::{Context, Result};
use chatvault_core::repository::SessionRepository;
use chatvault_types::listing::{SessionListOptions, SessionMetadata, SortField, SortOrder};
use chatvault_types::session::{Sender, Session};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use super::format_duration;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum SessionCommand {
    /// List sessions with filters, sorting and pagination.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show sessions that have not ended.
    Active,

    /// Show a session with its decrypted transcript.
    Show {
        /// Session ID.
        id: String,
    },

    /// Mark a session as ended now.
    End {
        /// Session ID.
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only sessions of this user.
    #[arg(long)]
    pub user: Option<String>,

    /// Only sessions started at or after this time (RFC 3339).
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Only sessions started at or before this time (RFC 3339).
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,

    /// Filter on the admin-assisted flag.
    #[arg(long)]
    pub admin_assisted: Option<bool>,

    /// true for sessions still running, false for ended ones.
    #[arg(long)]
    pub active: Option<bool>,

    /// Sort field: ts, endTs, message_count, totalTokens, uid.
    #[arg(long, default_value = "ts")]
    pub sort: SortField,

    /// Sort order: asc or desc.
    #[arg(long, default_value = "desc")]
    pub order: SortOrder,

    /// Page size (0 uses the configured default).
    #[arg(long, default_value_t = 0)]
    pub limit: u32,

    /// Number of sessions to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

impl From<ListArgs> for SessionListOptions {
    fn from(args: ListArgs) -> Self {
        SessionListOptions {
            limit: args.limit,
            offset: args.offset,
            user_id: args.user,
            start_time_from: args.from,
            start_time_to: args.to,
            admin_assisted: args.admin_assisted,
            active: args.active,
            sort_by: args.sort,
            sort_order: args.order,
        }
    }
}

pub async fn run(state: &AppState, command: SessionCommand, json: bool) -> Result<()> {
    match command {
        SessionCommand::List(args) => list_sessions(state, args, json).await,
        SessionCommand::Active => active_sessions(state, json).await,
        SessionCommand::Show { id } => show_session(state, &id, json).await,
        SessionCommand::End { id } => end_session(state, &id, json).await,
    }
}

/// List sessions as a table.
///
/// # Examples
///
/// ```bash
/// chatvault sessions list --user alice --sort message_count
/// chatvault sessions list --active true --json
/// ```
async fn list_sessions(state: &AppState, args: ListArgs, json: bool) -> Result<()> {
    let options = SessionListOptions::from(args);
    let sessions = state
        .store
        .list_sessions(&options)
        .await
        .context("failed to list sessions")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!("  {} No sessions found.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    println!();
    println!("{}", metadata_table(&sessions));
    println!();
    println!(
        "  {} session{} (offset {})",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" },
        options.offset
    );
    println!();

    Ok(())
}

async fn active_sessions(state: &AppState, json: bool) -> Result<()> {
    let sessions = state
        .store
        .load_active_sessions()
        .await
        .context("failed to load active sessions")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!("  {} No active sessions.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("User").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Running").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Last activity").fg(Color::White),
    ]);

    let now = Utc::now();
    for session in &sessions {
        table.add_row(vec![
            Cell::new(&session.id).fg(Color::Cyan),
            Cell::new(&session.user_id),
            Cell::new(session.start_time.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(format_duration(now - session.start_time)).fg(Color::DarkGrey),
            Cell::new(session.messages.len().to_string()),
            Cell::new(session.last_activity.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn show_session(state: &AppState, id: &str, json: bool) -> Result<()> {
    let session = state
        .store
        .get_session(id)
        .await
        .with_context(|| format!("failed to load session '{id}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    print_transcript(&session);
    Ok(())
}

async fn end_session(state: &AppState, id: &str, json: bool) -> Result<()> {
    let now = Utc::now();
    state
        .store
        .end_session(id, now)
        .await
        .with_context(|| format!("failed to end session '{id}'"))?;

    if json {
        let out = serde_json::json!({ "id": id, "ended": true, "end_time": now });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Session {} ended.",
            style("✓").green().bold(),
            style(id).cyan()
        );
        println!();
    }
    Ok(())
}

fn metadata_table(sessions: &[SessionMetadata]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("User").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Duration").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Tokens").fg(Color::White),
        Cell::new("Admin").fg(Color::White),
    ]);

    for session in sessions {
        let name = if session.name.chars().count() > 30 {
            let truncated: String = session.name.chars().take(27).collect();
            format!("{truncated}...")
        } else {
            session.name.clone()
        };

        let duration = match session.end_time {
            Some(ended) => Cell::new(format_duration(ended - session.start_time)).fg(Color::DarkGrey),
            None => Cell::new("active").fg(Color::Green),
        };

        let admin = if session.admin_assisted {
            Cell::new("yes").fg(Color::Yellow)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(&session.id).fg(Color::Cyan),
            Cell::new(&session.user_id),
            Cell::new(name),
            Cell::new(session.start_time.format("%Y-%m-%d %H:%M").to_string()),
            duration,
            Cell::new(session.message_count.to_string()),
            Cell::new(session.total_tokens.to_string()),
            admin,
        ]);
    }

    table
}

fn print_transcript(session: &Session) {
    let title = if session.name.is_empty() {
        "Untitled Session"
    } else {
        session.name.as_str()
    };

    println!("# {title}");
    println!();
    println!("- **ID:** {}", session.id);
    println!("- **User:** {}", session.user_id);
    if !session.model_id.is_empty() {
        println!("- **Model:** {}", session.model_id);
    }
    println!(
        "- **Started:** {}",
        session.start_time.format("%Y-%m-%d %H:%M UTC")
    );
    if let Some(ended) = session.end_time {
        println!("- **Ended:** {}", ended.format("%Y-%m-%d %H:%M UTC"));
        println!(
            "- **Duration:** {}",
            format_duration(ended - session.start_time)
        );
    }
    println!("- **Messages:** {}", session.messages.len());
    println!("- **Tokens:** {}", session.total_tokens);
    if let Some(admin) = &session.assisting_admin_name {
        println!("- **Assisted by:** {admin}");
    }
    println!();
    println!("---");
    println!();

    for msg in &session.messages {
        let label = match msg.sender {
            Sender::User => "**User**",
            Sender::Ai => "**Assistant**",
            Sender::Admin => "**Admin**",
        };
        println!("### {label} ({})", msg.timestamp.format("%H:%M"));
        println!();
        println!("{}", msg.content);
        if let Some(url) = &msg.file_url {
            println!();
            println!("_Attachment:_ {url}");
        }
        println!();
    }
}
