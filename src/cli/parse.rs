//! CLI parse: clap types for studyplayer. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Studyplayer CLI - resolve experiment structures and upload recordings
#[derive(Parser)]
#[command(name = "studyplayer")]
#[command(about = "Resolve experiment structures and upload session recordings")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve an experiment structure into its concrete frame list
    Parse {
        /// Experiment structure JSON file ({"frames": ..., "sequence": [...]})
        #[arg(long)]
        experiment: PathBuf,

        /// Past sessions JSON file (array, most recent first)
        #[arg(long)]
        past_sessions: Option<PathBuf>,

        /// Participant age in days, for age-bracketed parameter sets
        #[arg(long)]
        age_days: Option<u32>,

        /// Seed for reproducible randomization
        #[arg(long)]
        seed: Option<u64>,

        /// Fail on unresolved placeholders instead of leaving them literal
        #[arg(long)]
        strict: bool,
    },
    /// Upload a recorded file through the chunked multipart pipeline
    Upload {
        /// File to upload
        #[arg(long)]
        file: PathBuf,

        /// Video filename; the object key is <name>.webm
        #[arg(long)]
        name: String,

        /// Size of the chunks fed to the upload manager
        #[arg(long, default_value = "1048576")]
        chunk_bytes: usize,

        /// Upload into an in-memory store instead of the configured endpoint
        #[arg(long)]
        dry_run: bool,
    },
}
