use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelforge")]
#[command(author, version, about = "Chunked video upload, HLS segmentation and publishing service")]
pub struct Cli {
    /// Path to config file (TOML, or JSON with a .json extension)
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
    /// Start the HTTP server and pipeline workers
    Start {
        /// Host to bind to (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Publish leftover segments and re-queue interrupted uploads, then exit
    Sweep,

    /// Print an identity token for a user, signed with auth.secret
    IssueToken {
        /// User id to sign
        user: String,
    },

    /// Display version information
    Version,
}
