use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelforge")]
#[command(author, version, about = "Media upload and transcoding service")]
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

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Start {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Transcode a single file through the job pipeline
    Transcode {
        /// Input file to transcode
        #[arg(required = true)]
        input: PathBuf,

        /// Named preset (see `reelforge presets`)
        #[arg(long, conflicts_with = "params", required_unless_present = "params")]
        preset: Option<String>,

        /// Transcoding parameters as JSON, e.g. '{"format":"webm"}'
        #[arg(long)]
        params: Option<String>,

        /// Copy the result here instead of leaving it in the outputs directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the built-in transcoding presets
    Presets,

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
