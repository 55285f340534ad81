// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Scanning image files through the capture pipeline
//! - Printing the effective configuration

use camera_scan::backends::source::StillImageSource;
use camera_scan::config::ScanConfig;
use camera_scan::errors::CaptureError;
use camera_scan::scan::{CaptureCoordinator, CaptureListener, DecodeSuccess};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Flags of the `scan` command
pub struct ScanOptions {
    pub config: Option<PathBuf>,
    pub invert: bool,
    pub vertical: bool,
    pub full_screen: bool,
    pub thumbnail: bool,
    pub timeout: u64,
    pub watch: bool,
}

enum ScanEvent {
    Decoded(DecodeSuccess),
    Failed(CaptureError),
}

/// Forwards session callbacks to the command's thread
struct ChannelListener {
    events: Sender<ScanEvent>,
}

impl CaptureListener for ChannelListener {
    fn on_decode_success(&self, success: &DecodeSuccess) {
        let _ = self.events.send(ScanEvent::Decoded(success.clone()));
    }

    fn on_capture_error(&self, error: &CaptureError) {
        let _ = self.events.send(ScanEvent::Failed(error.clone()));
    }
}

/// Scan images and print every decoded symbol
pub fn scan(inputs: &[PathBuf], options: ScanOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ScanConfig::load_or_default(options.config.as_deref())?;
    config.support_luminance_invert |= options.invert;
    config.support_vertical_code |= options.vertical;
    config.full_screen_scan |= options.full_screen;
    config.return_thumbnail |= options.thumbnail;

    let paths = collect_image_paths(inputs)?;
    if paths.is_empty() {
        return Err("No images found".into());
    }

    // Hosts the deferred autofocus tasks
    let runtime = tokio::runtime::Runtime::new()?;

    if options.watch {
        return watch(&paths, config, &runtime);
    }

    let timeout = Duration::from_secs(options.timeout);
    let mut found = 0;
    for path in &paths {
        let source = StillImageSource::open(std::slice::from_ref(path))?.with_frame_limit(1);
        let (events, received) = mpsc::channel();
        let coordinator =
            CaptureCoordinator::builder(Box::new(source), Arc::new(ChannelListener { events }))
                .config(config.clone())
                .runtime(runtime.handle().clone())
                .build()?;
        coordinator.start()?;

        match received.recv_timeout(timeout) {
            Ok(ScanEvent::Decoded(success)) => {
                found += 1;
                print_success(&path.display().to_string(), &success);
                if options.thumbnail {
                    save_thumbnail(&success, &thumbnail_path(path))?;
                }
            }
            // The only frame was used up without a result
            Ok(ScanEvent::Failed(_)) => println!("{}: no code found", path.display()),
            Err(_) => println!("{}: timed out", path.display()),
        }
        coordinator.stop();
    }

    println!();
    println!("Decoded {} of {} images", found, paths.len());
    Ok(())
}

/// Cycle through all images, resuming after every result, until Ctrl+C
fn watch(
    paths: &[PathBuf],
    config: ScanConfig,
    runtime: &tokio::runtime::Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    let thumbnails = config.return_thumbnail;
    let source = StillImageSource::open(paths)?;
    let (events, received) = mpsc::channel();
    let coordinator =
        CaptureCoordinator::builder(Box::new(source), Arc::new(ChannelListener { events }))
            .config(config)
            .runtime(runtime.handle().clone())
            .build()?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Scanning {} images... (press Ctrl+C to stop)", paths.len());
    coordinator.start()?;

    let mut count = 0u64;
    let result = watch_loop(&coordinator, &received, &stop_flag, |success| {
        count += 1;
        print_success(&format!("#{}", count), success);
        if thumbnails {
            save_thumbnail(success, Path::new(&format!("scan-{}.thumb.jpg", count)))?;
        }
        Ok(())
    });

    coordinator.stop();
    println!();
    println!("Stopped after {} results", count);
    result
}

fn watch_loop(
    coordinator: &CaptureCoordinator,
    received: &Receiver<ScanEvent>,
    stop_flag: &AtomicBool,
    mut on_success: impl FnMut(&DecodeSuccess) -> Result<(), Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    while !stop_flag.load(Ordering::SeqCst) {
        match received.recv_timeout(Duration::from_millis(100)) {
            Ok(ScanEvent::Decoded(success)) => {
                on_success(&success)?;
                coordinator.resume();
            }
            Ok(ScanEvent::Failed(error)) => return Err(error.into()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

/// Print the effective configuration
pub fn print_config(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ScanConfig::load_or_default(path)?;
    match path.map(Path::to_path_buf).or_else(ScanConfig::default_path) {
        Some(path) if path.exists() => println!("# {}", path.display()),
        _ => println!("# defaults"),
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn print_success(label: &str, success: &DecodeSuccess) {
    match success.text() {
        Some(text) => println!("{}: [{}] {}", label, success.format, text),
        None => {
            let hex: String = success.payload.iter().map(|b| format!("{:02x}", b)).collect();
            println!("{}: [{}] 0x{}", label, success.format, hex);
        }
    }
}

fn save_thumbnail(success: &DecodeSuccess, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(thumbnail) = &success.thumbnail {
        std::fs::write(path, &thumbnail.jpeg)?;
        println!(
            "  thumbnail: {} ({}x{}, scale {:.2})",
            path.display(),
            thumbnail.width,
            thumbnail.height,
            thumbnail.scale_factor
        );
    }
    Ok(())
}

fn thumbnail_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scan".to_string());
    image.with_file_name(format!("{}.thumb.jpg", stem))
}

/// Collect all image paths from input (files or directories)
fn collect_image_paths(input: &[PathBuf]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();

    for path in input {
        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let file_path = entry?.path();
                if is_supported_image(&file_path) {
                    paths.push(file_path);
                }
            }
        } else if is_supported_image(path) {
            paths.push(path.clone());
        }
    }

    // Sort by filename for consistent ordering
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(paths)
}

/// Check if a path is a supported image file (thumbnails excluded)
fn is_supported_image(path: &Path) -> bool {
    let name = path.to_string_lossy();
    if name.ends_with(".thumb.jpg") {
        return false;
    }
    path.extension()
        .map(|ext| {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            matches!(
                ext_lower.as_str(),
                "png" | "jpg" | "jpeg" | "bmp" | "gif" | "webp" | "tif" | "tiff" | "pgm"
            )
        })
        .unwrap_or(false)
}
