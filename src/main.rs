// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-scan")]
#[command(about = "Scan barcodes and QR codes through a live capture pipeline")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: ~/.config/camera-scan/config.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan image files (or directories of images)
    Scan {
        /// Images or directories to scan
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Also try light-on-dark codes
        #[arg(long)]
        invert: bool,

        /// Also try codes rotated by 90°
        #[arg(long)]
        vertical: bool,

        /// Scan the whole image instead of the centered scan square
        #[arg(long)]
        full_screen: bool,

        /// Save a JPEG thumbnail of each decoded region next to the image
        #[arg(long)]
        thumbnail: bool,

        /// Seconds to wait for a result per image
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        /// Keep scanning all images in a loop until Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_scan=trace
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
        Commands::Scan {
            inputs,
            invert,
            vertical,
            full_screen,
            thumbnail,
            timeout,
            watch,
        } => cli::scan(
            &inputs,
            cli::ScanOptions {
                config: cli.config,
                invert,
                vertical,
                full_screen,
                thumbnail,
                timeout,
                watch,
            },
        ),
        Commands::Config => cli::print_config(cli.config.as_deref()),
    }
}
