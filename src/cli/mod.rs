// Warden — CLI Module
//
// Command-line interface using clap derive macros. Global options build the
// runtime `Settings`; subcommands map one-to-one onto service operations,
// plus `init` and `serve`.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::SettingsArgs;

pub use commands::execute;

/// Warden: an approval-gated secret vault with an append-only audit trail.
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Warden: create the master key and the database.
    Init,

    /// Store a new secret.
    Add {
        /// Unique secret name (e.g., "db-prod").
        name: String,

        /// What the secret is for.
        #[arg(long, default_value = "")]
        description: String,

        /// One of: database, api_key, ssh_key, certificate, other.
        #[arg(long, default_value = "other")]
        kind: String,

        /// The secret value. Read from stdin when omitted, which keeps it out
        /// of shell history.
        #[arg(long)]
        value: Option<String>,
    },

    /// Show a secret's metadata (never its value).
    Show {
        name: String,
    },

    /// Print a secret's value. Requires an approved request or the admin role.
    Get {
        name: String,
    },

    /// List stored secrets (metadata only).
    List,

    /// Ask for read access to a secret.
    Request {
        /// The secret to request.
        secret: String,

        /// Why access is needed.
        #[arg(long, default_value = "")]
        justification: String,
    },

    /// Approve a pending access request (admin only).
    Approve {
        /// The UUID of the request.
        request_id: String,
    },

    /// Reject a pending access request (admin only).
    Reject {
        /// The UUID of the request.
        request_id: String,
    },

    /// List access requests, newest first.
    Requests {
        /// Only requests in this state: pending, approved, rejected.
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        requester: Option<String>,

        /// Only requests for this secret.
        #[arg(long)]
        secret: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one access request.
    Status {
        /// The UUID of the request.
        request_id: String,
    },

    /// Per-status request counts for an identity (default: the caller).
    Stats {
        requester: Option<String>,
    },

    /// View the audit trail, most recent first.
    Audit {
        /// Maximum number of entries.
        #[arg(long, default_value = "50")]
        limit: usize,

        /// Only entries strictly older than this RFC 3339 timestamp.
        #[arg(long)]
        before: Option<String>,

        /// Only entries about this secret name or request id.
        #[arg(long)]
        resource: Option<String>,
    },

    /// Start the JSON-RPC gateway on a Unix domain socket.
    Serve {
        /// Socket path (default: $XDG_RUNTIME_DIR/warden/warden.sock).
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

// ─── Tests ───────────────────────────────────────────────────────────────────
