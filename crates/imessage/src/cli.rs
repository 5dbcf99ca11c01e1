//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Rows shown by `list` and `read` when `-n` is not given.
pub const DEFAULT_LIMIT: u32 = 20;

/// Browse and reply to iMessage conversations from the terminal.
#[derive(Debug, Parser)]
#[command(name = "imessage", version, about)]
pub struct Cli {
    /// Settings file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The requested command, `list` when none was given.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::List { limit: DEFAULT_LIMIT })
    }
}

/// Subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List recent conversations.
    #[command(alias = "ls")]
    List {
        /// Number of conversations to show.
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },
    /// Show messages from a conversation.
    Read {
        /// Number from `list`, or a phone number, email or chat identifier.
        conversation: String,
        /// Number of messages to show.
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },
    /// Send a message.
    Send {
        /// Phone number, email or chat identifier.
        recipient: String,
        /// Text to send.
        message: String,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Chat with a contact: show recent messages and send each line typed.
    #[command(alias = "c")]
    Chat {
        /// Number from `list`, or a phone number, email or chat identifier.
        contact: String,
    },
    /// Check database access, contacts and Messages.app.
    Status,
    /// Open the interactive terminal interface.
    #[command(visible_aliases = ["ui", "watch"])]
    Tui {
        /// Log at debug level.
        #[arg(long)]
        debug: bool,
        /// Log file path.
        #[arg(long, value_name = "PATH")]
        log_file: Option<PathBuf>,
    },
    /// Print version information.
    Version,
}
