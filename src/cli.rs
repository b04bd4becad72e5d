use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Batch-install Windows applications through winget
#[derive(Parser, Debug)]
#[command(name = "winstall", author, version, about, long_about = None)]
pub struct Cli {
    /// Activate debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Use a config file other than the default
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Relaunch with elevated privileges before running the command
    #[arg(long, global = true)]
    pub elevate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report package manager availability, version and elevation
    Check,

    /// Search the package manager's sources
    Search {
        /// Search text; empty lists everything
        #[arg(default_value = "")]
        query: String,
    },

    /// Install packages one after another
    Install {
        /// Package ids to install
        ids: Vec<String>,
        /// Also install the ids saved in this profile
        #[arg(short, long)]
        profile: Option<String>,
        /// Let installers show their own UI
        #[arg(long)]
        no_silent: bool,
        /// Stop after the first package that does not install
        #[arg(long)]
        stop_on_failure: bool,
        /// Extra attempts per package after the first
        #[arg(long, value_name = "N")]
        retries: Option<u32>,
    },

    /// Browse the application catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },

    /// Manage saved selections
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Write a batch script that installs the selection
    Export {
        ids: Vec<String>,
        #[arg(short, long)]
        profile: Option<String>,
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommands {
    /// List catalog applications
    List {
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List categories in catalog order
    Categories,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Save (or replace) a profile
    Save {
        name: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print the ids in a profile
    Show { name: String },
    /// List saved profiles
    List,
    /// Delete a profile
    Delete { name: String },
}
