//! ll-repo - linglong package repository tool
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Front-end over `ll-core`: commit, check out, pull and push package trees,
//! resolve latest versions, and pack layer archives.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.ll/
//! ├── config.yaml   # remotes and default remote
//! ├── repo/         # content store (objects, refs, config.toml)
//! ├── layers/       # legacy direct checkouts
//! └── cache/        # push staging, isolated pulls
//! ```

pub mod cmd;
pub mod context;
pub mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use ll_core::USER_AGENT;

#[derive(Debug, Parser)]
#[command(name = "ll-repo")]
#[command(author, version, about = "ll-repo - linglong package repository tool")]
pub struct Cli {
    /// Data root (defaults to $LL_ROOT, then ~/.ll)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List stored references
    List {
        /// Only references whose app id contains this text
        filter: Option<String>,
    },
    /// Commit a directory under a reference
    Import {
        /// Directory holding the package tree
        path: PathBuf,
        /// Reference ([channel:]appId/version/arch[/module])
        reference: String,
    },
    /// Store the tree of one reference under another
    Tag {
        /// Existing reference
        source: String,
        /// New reference
        target: String,
    },
    /// Check a reference out into a directory
    Checkout {
        /// Reference to check out
        reference: String,
        /// Target directory
        target: PathBuf,
        /// Only this path inside the tree
        #[arg(long, default_value = "")]
        subpath: String,
        /// Also check out the devel module when present
        #[arg(long)]
        all: bool,
    },
    /// Mirror a reference from the default remote
    Pull {
        /// Reference to pull
        reference: String,
        /// Also pull the devel module when present
        #[arg(long)]
        all: bool,
        /// Transfer even if the local ref is current
        #[arg(long, short)]
        force: bool,
    },
    /// Pull from a URL through a disposable staging store
    #[command(name = "pull-isolated")]
    PullIsolated {
        /// Store URL (http(s):// or file://)
        url: String,
        /// Reference to pull
        reference: String,
    },
    /// Upload a reference to the remote repository service
    Push {
        /// Reference to push
        reference: String,
        /// Seconds between upload status polls
        #[arg(long, default_value_t = 1)]
        poll_interval: u64,
    },
    /// Resolve the newest version of an app
    Latest {
        /// [channel:]appId[/version[/arch]]
        query: String,
        /// Only look at stored references
        #[arg(long, conflicts_with = "remote")]
        local: bool,
        /// Ask the remote catalog
        #[arg(long)]
        remote: bool,
    },
    /// Resolve the newest version checked out under layers/
    #[command(name = "latest-layer")]
    LatestLayer {
        /// App id
        app_id: String,
        /// Version prefix ("latest" or empty for any)
        #[arg(default_value = "")]
        prefix: String,
        /// Channel directory to scan
        #[arg(long, default_value = ll_schema::DEFAULT_CHANNEL)]
        channel: String,
    },
    /// Delete a reference and the objects only it used
    Prune {
        /// Reference to delete
        reference: String,
    },
    /// List configured store remotes
    Remotes,
    /// Show the URL of a store remote
    #[command(name = "remote-url")]
    RemoteUrl {
        /// Remote name (default remote when omitted)
        name: Option<String>,
    },
    /// Inspect or change config.yaml
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Show info.json of a checked-out or unpacked directory
    Info {
        /// Package directory
        path: PathBuf,
        /// Print the raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Layer archive commands
    Layer {
        #[command(subcommand)]
        command: LayerCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the configuration
    Show,
    /// Choose the default remote
    SetDefault {
        /// Remote name; must already be configured
        name: String,
    },
    /// Add or replace a remote
    Add {
        /// Remote name
        name: String,
        /// Endpoint URL
        url: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum LayerCommands {
    /// Pack a package directory into a layer archive
    Pack {
        /// Package directory (must contain info.json)
        source: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Unpack a layer archive into a directory
    Unpack {
        /// Layer archive
        layer: PathBuf,
        /// Destination directory
        dest: PathBuf,
    },
    /// Print the metadata of a layer archive
    Inspect {
        /// Layer archive
        layer: PathBuf,
    },
}
