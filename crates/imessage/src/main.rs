//! `imessage` - browse and reply to iMessage conversations from the terminal.
//!
//! One-shot commands print and exit; `imessage tui` opens a live view that
//! follows new messages as they arrive.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod commands;
mod tui;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use imessage_core::{AppleScriptSender, ChatDb, Config, ContactResolver};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use commands::Printer;

const DEFAULT_FILTER: &str = "imessage=info,imessage_core=info";
const DEBUG_FILTER: &str = "imessage=debug,imessage_core=debug";
const DEFAULT_TUI_LOG: &str = "/tmp/imessage-tui.log";

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command();
    init_logging(&command)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Could not start the async runtime")?;
    runtime.block_on(run(cli.config, command))
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into())
}

/// The terminal UI owns the screen, so it logs to a file; everything else
/// logs to stderr.
fn init_logging(command: &Command) -> Result<()> {
    let registry = tracing_subscriber::registry();
    if let Command::Tui { debug, log_file } = command {
        let path = log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TUI_LOG));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Unable to open log file {}", path.display()))?;
        let default = if *debug { DEBUG_FILTER } else { DEFAULT_FILTER };
        registry
            .with(filter(default))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(filter(DEFAULT_FILTER))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

async fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(Config::default_path);
    let config = Config::load_from(&path)
        .await
        .with_context(|| format!("Could not load settings from {}", path.display()))?;
    Ok((config, path))
}

fn open_store(config: &Config) -> ChatDb {
    ChatDb::new(
        config.database_path.clone(),
        Arc::new(ContactResolver::discover()),
    )
}

async fn run(config_path: Option<PathBuf>, command: Command) -> Result<()> {
    let (config, config_path) = load_config(config_path).await?;
    let mut out = Printer::stdout();

    match command {
        Command::List { limit } => commands::list(&open_store(&config), limit, &mut out).await,
        Command::Read {
            conversation,
            limit,
        } => commands::read(&open_store(&config), &conversation, limit, &mut out).await,
        Command::Send {
            recipient,
            message,
            yes,
        } => {
            let sender = AppleScriptSender::new().with_timeout(config.send_timeout());
            let mut input = tokio::io::BufReader::new(tokio::io::stdin());
            commands::send(&sender, &recipient, &message, yes, &mut input, &mut out).await
        }
        Command::Chat { contact } => {
            let sender = AppleScriptSender::new().with_timeout(config.send_timeout());
            let mut input = tokio::io::BufReader::new(tokio::io::stdin());
            commands::chat(&open_store(&config), &sender, &contact, &mut input, &mut out).await
        }
        Command::Status => status(&config, &config_path, &mut out).await,
        Command::Tui { .. } => {
            info!(database = %config.database_path.display(), "Starting terminal interface");
            tui::run(&config).await
        }
        Command::Version => commands::version(&mut out),
    }
}

async fn status(
    config: &Config,
    config_path: &Path,
    out: &mut Printer<std::io::Stdout>,
) -> Result<()> {
    let store = open_store(config);
    let sender = AppleScriptSender::new();
    commands::status(config, config_path, &store, store.contacts(), &sender, out).await
}
