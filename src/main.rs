// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camwatch")]
#[command(about = "Camera monitoring with motion detection and recording")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a camera, detect motion and record
    Monitor {
        /// Source locator (file path, rtsp://, http://, ...); overrides the configured one
        source: Option<String>,

        /// Configured camera id (default: first configured camera)
        #[arg(short, long)]
        camera: Option<String>,

        /// Configuration file (default: ~/.config/camwatch/config.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for recordings
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recording mode: off, always, on_motion, on_trigger
        #[arg(short, long)]
        mode: Option<String>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Encode into memory instead of writing files
        #[arg(long)]
        dry_run: bool,
    },

    /// List video and audio encoders
    Encoders,

    /// Decode an audio source to raw PCM (S16LE, 22.05 kHz mono)
    Audio {
        /// Source locator
        locator: String,

        /// Output file path
        #[arg(short, long, default_value = "audio.pcm")]
        output: PathBuf,

        /// Filter list: name|args|key;...
        #[arg(short, long)]
        filters: Option<String>,

        /// Stop after this many seconds of audio
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Print the configuration as JSON
    Config {
        /// Configuration file to load (default: print built-in defaults)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control the log level, e.g. RUST_LOG=camwatch=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor {
            source,
            camera,
            config,
            output,
            mode,
            duration,
            dry_run,
        } => cli::monitor(cli::MonitorArgs {
            source,
            camera,
            config,
            output,
            mode,
            duration,
            dry_run,
        }),
        Commands::Encoders => cli::list_encoders(),
        Commands::Audio {
            locator,
            output,
            filters,
            duration,
        } => cli::decode_audio(&locator, &output, filters.as_deref(), duration),
        Commands::Config { path } => cli::print_config(path.as_deref()),
    }
}
