use clap::{Parser, Subcommand};

/// efnotify: EventFlow notification client
#[derive(Parser)]
#[command(name = "efnotify", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the notification stream and present toasts until Ctrl-C
    Listen,

    /// Print the unread count (local or server, per EF_NOTIFICATIONS_MODE)
    Unread,

    /// Manage the local inbox
    Inbox {
        #[command(subcommand)]
        command: InboxCommands,
    },

    /// Print the stored resume cursor
    Cursor,
}

#[derive(Subcommand)]
pub enum InboxCommands {
    /// List active notifications, newest first
    List {
        /// all, unread, last24h or today
        #[arg(short, long, default_value = "all")]
        filter: String,
    },
    /// Mark one notification read
    Read { id: String },
    /// Flip read/unread on one notification
    Toggle { id: String },
    /// Dismiss one or more notifications
    Dismiss {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Mark every active notification read
    ReadAll,
    /// Dismiss every active notification
    DismissAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}
