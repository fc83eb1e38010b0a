//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{load::LoadArgs, lookup::LookupArgs, watch::WatchArgs};

#[derive(Parser, Debug)]
#[command(name = "entity-graph")]
#[command(about = "In-memory entity graph over relational tables", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file, merged above .entity-graph/config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Source database URL, overriding the configured one
    #[arg(long, global = true)]
    pub database: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a graph once and print its statistics
    Load(LoadArgs),

    /// Load a graph and find a record by an identifier field
    Lookup(LookupArgs),

    /// Load a graph and keep it refreshed until interrupted
    Watch(WatchArgs),
}
