use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod status;
pub use status::StatusDisplay;

/// Streaming Ogg Vorbis player
#[derive(Parser)]
#[command(name = "vorbis-player")]
#[command(about = "Decode Ogg Vorbis streams into fixed-size PCM frames and play them")]
#[command(version = "0.1.0")]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand, PartialEq)]
pub enum Commands {
    /// Print stream information and comments
    Info {
        /// Ogg Vorbis file, or "-" for standard input
        path: String,
    },
    /// Play a stream through an audio output device
    Play {
        /// Ogg Vorbis file, or "-" for standard input
        path: String,
        /// Output device name (default device if omitted)
        #[arg(short, long)]
        device: Option<String>,
        /// Samples per channel in each decoded frame
        #[arg(short, long)]
        samples_per_channel: Option<usize>,
    },
    /// Decode a stream to raw interleaved 32-bit float PCM
    Decode {
        /// Ogg Vorbis file, or "-" for standard input
        path: String,
        /// Output file for little-endian f32 samples
        output: PathBuf,
        /// Samples per channel in each decoded frame
        #[arg(short, long)]
        samples_per_channel: Option<usize>,
    },
    /// List available audio output devices
    Devices,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(rest)
            } else {
                PathBuf::from(path)
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// True when `path` names standard input
    pub fn is_stdin(path: &str) -> bool {
        path == "-"
    }
}
