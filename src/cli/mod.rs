//! CLI command definitions for conf-resolver
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod resolve;
pub mod schema;

use crate::format::OutputFormat;
use crate::settings::Settings;
use clap::{Parser, Subcommand};
use resolve::ResolveArgs;
use schema::SchemaArgs;
use std::path::PathBuf;

/// Resolve hierarchical prototxt configs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Common include directory (repeatable; replaces configured directories)
    #[arg(long = "common-dir", value_name = "DIR", global = true)]
    pub common_dirs: Vec<PathBuf>,

    /// Path to settings file (skips project and user settings)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub settings: Option<PathBuf>,

    /// Output format: text or json (overrides settings)
    #[arg(short, long, value_name = "FORMAT", global = true)]
    pub format: Option<OutputFormat>,

    /// Also print fields that only carry schema defaults
    #[arg(long, global = true)]
    pub show_defaults: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Apply command-line options on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if !self.common_dirs.is_empty() {
            settings.search.common_dirs = self.common_dirs.clone();
        }
        if let Some(format) = self.format {
            settings.output.format = format;
        }
        if self.show_defaults {
            settings.output.show_defaults = true;
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a config and print the result
    Resolve(ResolveArgs),

    /// Resolve a config and report whether it is valid
    Validate(ResolveArgs),

    /// Describe schema messages and enums
    Schema(SchemaArgs),

    /// Resolve a config again whenever one of its files changes
    Watch(ResolveArgs),
}
