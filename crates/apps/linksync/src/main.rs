//! linksync - keep a local link collection in sync with the link service
//!
//! This is the command-line entry point. Every command works on the local
//! SQLite store; `sync` and the passes requested after `add`/`delete` talk
//! to the remote.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::error;

mod app;

use app::LinkSyncApp;

#[derive(Parser)]
#[command(name = "linksync")]
#[command(about = "Keep a link collection in sync across devices")]
#[command(version)]
struct Cli {
    /// Account to sync (defaults to $LINKSYNC_ACCOUNT)
    #[arg(long, global = true, value_name = "EMAIL")]
    account: Option<String>,

    /// Don't run the upload requested after add/delete
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a link
    Add { url: String },
    /// Delete a link by sha
    Delete { sha: String },
    /// List saved links, newest first
    List {
        /// Include deleted links not yet propagated
        #[arg(long)]
        all: bool,
    },
    /// Run one sync pass
    Sync {
        /// Only push local changes
        #[arg(long)]
        upload_only: bool,
        /// Forget the cursor and download a full snapshot
        #[arg(long)]
        reset: bool,
    },
    /// Feed a push payload to the engine, as key=value pairs
    Push {
        #[arg(required = true, value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Show local sync state
    Status,
    /// Store a refresh token for the account
    Login {
        #[arg(long)]
        refresh_token: String,
    },
}

fn parse_fields(fields: &[String]) -> Result<HashMap<String, String>> {
    fields
        .iter()
        .map(|field| {
            let (key, value) = field
                .split_once('=')
                .with_context(|| format!("Expected KEY=VALUE, got {field:?}"))?;
            Ok((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

fn resolve_account(account: Option<String>) -> Result<String> {
    match account.or_else(|| std::env::var("LINKSYNC_ACCOUNT").ok()) {
        Some(account) if !account.trim().is_empty() => Ok(account.trim().to_string()),
        _ => bail!("No account given; pass --account or set LINKSYNC_ACCOUNT"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let account = resolve_account(cli.account)?;
    let app = LinkSyncApp::open(account, !cli.offline)?;

    match cli.command {
        Commands::Add { url } => app.add(&url),
        Commands::Delete { sha } => app.delete(&sha),
        Commands::List { all } => app.list(all),
        Commands::Sync { upload_only, reset } => app.sync(upload_only, reset),
        Commands::Push { fields } => app.push(parse_fields(&fields)?),
        Commands::Status => app.status(),
        Commands::Login { refresh_token } => app.login(&refresh_token),
    }
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    if let Err(e) = run(Cli::parse()) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
