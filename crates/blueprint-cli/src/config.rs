use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "blueprint")]
#[command(
    author,
    version,
    about = "Search sync, addon scanning and user functions for Blueprint Create"
)]
#[command(after_help = "Examples:
  blueprint serve --port 3000
  blueprint sync --force-full
  blueprint scan --quick --batch-size 20
  blueprint search-health --text")]
pub struct Config {
    /// Path to functions.toml (defaults to the user config directory)
    #[arg(long, global = true, env = "BLUEPRINT_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server exposing every function
    #[command(after_help = "Example: blueprint serve --bind 0.0.0.0 --port 8080")]
    Serve {
        /// Address to bind
        #[arg(long, env = "BLUEPRINT_BIND", default_value = "127.0.0.1")]
        bind: IpAddr,
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value = "3000")]
        port: u16,
    },
    /// Reconcile every configured search index with its collection
    #[command(after_help = "Examples:
  blueprint sync                # Incremental: upsert and drop obsolete ids
  blueprint sync --force-full   # Clear each index, then upsert everything
  blueprint sync --delete-all   # Clear each index only")]
    Sync {
        /// Clear each index before upserting
        #[arg(long)]
        force_full: bool,
        /// Clear each index and stop
        #[arg(long)]
        delete_all: bool,
    },
    /// Scan CurseForge and Modrinth into the addons collection
    #[command(after_help = "Examples:
  blueprint scan                         # Full scan with configured limits
  blueprint scan --quick                 # Short scan
  blueprint scan --offset 200            # One page of each catalog at offset 200
  blueprint scan --health                # Check services and environment")]
    Scan {
        /// Run the short scan profile
        #[arg(long, conflicts_with_all = ["health", "offset"])]
        quick: bool,
        /// Only check the scan dependencies
        #[arg(long, conflicts_with = "offset")]
        health: bool,
        /// Fetch a single page of each catalog at this offset
        #[arg(long, value_name = "N")]
        offset: Option<u32>,
        /// Maximum number of iterations
        #[arg(long, value_name = "N")]
        max_iterations: Option<u32>,
        /// Mods requested per catalog page
        #[arg(long, value_name = "N")]
        batch_size: Option<u32>,
        /// Catalog search term
        #[arg(long, value_name = "TEXT")]
        search_query: Option<String>,
    },
    /// Report search engine and index health
    SearchHealth {
        /// Print a human-readable report instead of JSON
        #[arg(long)]
        text: bool,
    },
}
