//! CLI argument parsing and command dispatch

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::commands;

/// Catalog Compiler - Compile hierarchical cluster configuration catalogs
#[derive(Parser, Debug)]
#[command(name = "catalog-compiler")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile the catalog for one cluster
    Compile(commands::compile::CompileArgs),

    /// Resolve and print the merged inventory for a set of facts
    Inventory(commands::inventory::InventoryArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let level: LevelFilter = self
            .log_level
            .parse()
            .with_context(|| format!("Invalid log level '{}'", self.log_level))?;
        env_logger::Builder::from_default_env()
            .filter_level(level)
            .format_timestamp(None)
            .init();

        match self.command {
            Commands::Compile(args) => commands::compile::execute(args),
            Commands::Inventory(args) => commands::inventory::execute(args),
        }
    }
}
