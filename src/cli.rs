use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipweave")]
#[command(author, version, about = "Normalize and join video clips into one file")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Geometry and timeout overrides shared by `merge` and `plan`.
#[derive(clap::Args, Clone, Debug, Default)]
pub struct MergeOverrides {
    /// Canonical output width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Canonical output height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Engine timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge clips, in the given order, into one output file
    Merge {
        /// Input clips, in join order
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        overrides: MergeOverrides,

        /// Print the finished job as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the filter graph and engine command without running it
    Plan {
        /// Input clips, in join order
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        overrides: MergeOverrides,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe a media file and display what the merger sees
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
