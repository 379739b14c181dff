//! Command-line definitions. Dispatch lives in `commands`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(
    name = "sched",
    version = env!("CARGO_PKG_VERSION"),
    about = "Sends a random message from the pool to every subscribed contact, on a timer."
)]
pub(crate) struct Cli {
    /// Settings file (defaults to $SCHED_SETTINGS, then ./sched.json).
    #[clap(long, global = true)]
    pub settings: Option<PathBuf>,
    /// Human-readable log lines instead of JSON.
    #[clap(long, global = true)]
    pub plain_logs: bool,
    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run the webhook server and the broadcast scheduler (default)
    Serve,
    /// Send one broadcast now and exit
    Broadcast,
    /// Load messages from a text file, one per non-empty line
    Seed {
        #[clap(long)]
        file: PathBuf,
    },
    /// Manage the message pool
    Messages {
        #[clap(subcommand)]
        command: MessagesCommand,
    },
    /// Inspect the subscriber directory
    Contacts {
        #[clap(subcommand)]
        command: ContactsCommand,
    },
    /// Show persisted warnings and errors, newest first
    Logs {
        /// Only this level (warn or error).
        #[clap(long)]
        level: Option<String>,
        /// Only records about this phone.
        #[clap(long)]
        phone: Option<String>,
        /// Only records from this broadcast tick.
        #[clap(long)]
        tick: Option<String>,
        #[clap(long, default_value_t = 50)]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum MessagesCommand {
    List,
    Add {
        /// Message text (at most 1000 characters).
        text: String,
    },
    Remove {
        /// Message id as shown by `messages list`.
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum ContactsCommand {
    List,
}
