//! cli::args
//!
//! Command-line argument definitions for the `pw` ops binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operations CLI for the partnership document lifecycle engine.
#[derive(Debug, Parser)]
#[command(name = "pw", version, about)]
pub struct Cli {
    /// Path to the configuration file (overrides discovery).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the auto-transition sweep once.
    Sweep,

    /// Recompute partner assurance aggregates.
    Hact {
        /// Partner id; omit to recompute every partner.
        #[arg(long)]
        partner: Option<String>,
    },

    /// Drain pending downstream uploads.
    Outbox,

    /// Print one entity as JSON.
    Show {
        /// Entity kind: partner, agreement, intervention, amendment.
        kind: String,
        /// Entity id.
        id: String,
    },
}
