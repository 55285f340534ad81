// SPDX-License-Identifier: GPL-3.0-only

//! Still-image frame source
//!
//! Serves the luma plane of decoded image files as frames, one per request,
//! cycling through the list. Used for offline scanning from the command line
//! and as a deterministic source in tests.

use super::{FocusCallback, FocusMode, Frame, FrameCallback, FrameSource, ZoomCapability};
use crate::errors::{SourceError, SourceResult};
use crate::scan::geometry::Resolution;
use image::GrayImage;
use std::path::Path;
use tracing::{debug, info};

/// Zoom range reported by still sources (no effect on the delivered frames)
const SIMULATED_MAX_ZOOM: u32 = 50;

pub struct StillImageSource {
    name: String,
    frames: Vec<Frame>,
    next: usize,
    /// Stop serving after this many frames
    frame_limit: Option<usize>,
    delivered: usize,
    screen: Resolution,
    zoom: ZoomCapability,
    torch: bool,
    previewing: bool,
}

impl StillImageSource {
    /// Build a source from grayscale images
    pub fn new(name: impl Into<String>, images: Vec<GrayImage>) -> SourceResult<Self> {
        let frames: Vec<Frame> = images
            .into_iter()
            .map(|image| {
                let (width, height) = image.dimensions();
                Frame::new(image.into_raw(), width, height)
            })
            .collect();

        let Some(first) = frames.first() else {
            return Err(SourceError::NotAvailable("no images to scan".into()));
        };
        // Landscape display, so the first pass reads the images upright
        let resolution = first.resolution();
        let screen = if resolution.is_portrait() {
            resolution.transposed()
        } else {
            resolution
        };

        Ok(Self {
            name: name.into(),
            frames,
            next: 0,
            frame_limit: None,
            delivered: 0,
            screen,
            zoom: ZoomCapability {
                supported: true,
                current: 0,
                max: SIMULATED_MAX_ZOOM,
            },
            torch: false,
            previewing: false,
        })
    }

    /// Load image files and convert them to 8-bit luma
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> SourceResult<Self> {
        let mut images = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let image = image::open(path)
                .map_err(|e| SourceError::OpenFailed(format!("{}: {}", path.display(), e)))?;
            debug!(path = %path.display(), width = image.width(), height = image.height(), "Loaded image");
            images.push(image.to_luma8());
        }

        let name = match paths {
            [single] => single.as_ref().display().to_string(),
            _ => format!("{} images", paths.len()),
        };
        Self::new(name, images)
    }

    /// Refuse frame requests after `limit` deliveries
    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Pretend the preview is shown on a display of the given size
    pub fn with_screen(mut self, screen: Resolution) -> Self {
        self.screen = screen;
        self
    }

    pub fn torch(&self) -> bool {
        self.torch
    }

    fn current(&self) -> &Frame {
        &self.frames[self.next % self.frames.len()]
    }
}

impl FrameSource for StillImageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_preview(&mut self) -> SourceResult<()> {
        info!(source = %self.name, frames = self.frames.len(), "Starting still image preview");
        self.previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) -> SourceResult<()> {
        self.previewing = false;
        Ok(())
    }

    fn request_frame(&mut self, callback: FrameCallback) -> SourceResult<()> {
        if !self.previewing {
            return Err(SourceError::RequestFailed("preview not started".into()));
        }
        if self.frame_limit.is_some_and(|limit| self.delivered >= limit) {
            return Err(SourceError::RequestFailed("no more frames".into()));
        }

        let mut frame = self.current().clone();
        frame.captured_at = std::time::Instant::now();
        self.next = (self.next + 1) % self.frames.len();
        self.delivered += 1;
        callback(Ok(frame));
        Ok(())
    }

    fn source_resolution(&self) -> Resolution {
        self.current().resolution()
    }

    fn screen_resolution(&self) -> Resolution {
        self.screen
    }

    fn focus_mode(&self) -> FocusMode {
        FocusMode::Auto
    }

    fn trigger_focus(&mut self, callback: FocusCallback) -> SourceResult<()> {
        callback(true);
        Ok(())
    }

    fn cancel_focus(&mut self) -> SourceResult<()> {
        Ok(())
    }

    fn zoom_capability(&self) -> ZoomCapability {
        self.zoom
    }

    fn set_zoom(&mut self, level: u32) -> SourceResult<()> {
        self.zoom.current = level.min(self.zoom.max);
        Ok(())
    }

    fn set_torch(&mut self, on: bool) -> SourceResult<()> {
        self.torch = on;
        Ok(())
    }
}
