// SPDX-License-Identifier: GPL-3.0-only

//! Shared geometry for the scan pipeline
//!
//! Resolutions, result points, the scan region within a source frame, and
//! the remap of decoder coordinates into display space.

use crate::config::RegionSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Taller than wide
    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }

    /// Same resolution with the axes exchanged
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn min_dimension(&self) -> u32 {
        self.width.min(self.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A point reported by the decoder (finder pattern center, corner, ...)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResultPoint {
    pub x: f32,
    pub y: f32,
}

impl ResultPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance between two points
    pub fn distance(&self, other: &ResultPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Largest pairwise distance among the first three points
///
/// Used as a proxy for the symbol's size in frame pixels. Returns `None`
/// when fewer than three points were reported.
pub fn symbol_extent(points: &[ResultPoint]) -> Option<f32> {
    let [a, b, c] = points.get(..3)? else {
        return None;
    };
    Some(a.distance(b).max(b.distance(c)).max(a.distance(c)))
}

/// Rectangle of a frame that is handed to the decoder
///
/// Expressed in source-frame pixel coordinates and always fully contained
/// in the frame it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl ScanRegion {
    /// Compute the scan region for a frame
    ///
    /// Full-screen scanning uses the whole frame. Otherwise the region is a
    /// centered square whose side is `ratio` of the frame's smaller dimension,
    /// shifted by the configured offsets and clamped back inside the frame.
    /// Returns `None` when the resulting square is empty.
    pub fn compute(frame: Resolution, settings: &RegionSettings, full_screen: bool) -> Option<Self> {
        if frame.width == 0 || frame.height == 0 {
            return None;
        }

        if full_screen {
            return Some(Self {
                left: 0,
                top: 0,
                width: frame.width,
                height: frame.height,
            });
        }

        let ratio = settings.ratio.clamp(0.0, 1.0);
        let size = (frame.min_dimension() as f32 * ratio) as u32;
        if size == 0 {
            return None;
        }

        let left = (frame.width - size) as i64 / 2 + settings.horizontal_offset as i64;
        let top = (frame.height - size) as i64 / 2 + settings.vertical_offset as i64;

        Some(Self {
            left: left.clamp(0, (frame.width - size) as i64) as u32,
            top: top.clamp(0, (frame.height - size) as i64) as u32,
            width: size,
            height: size,
        })
    }

    #[cfg(test)]
    fn right(&self) -> u32 {
        self.left + self.width
    }

    #[cfg(test)]
    fn bottom(&self) -> u32 {
        self.top + self.height
    }

    /// Whether the region lies fully inside a frame of the given size
    #[cfg(test)]
    fn fits(&self, frame: Resolution) -> bool {
        self.right() <= frame.width && self.bottom() <= frame.height
    }
}

/// Scan regions cached per (frame resolution, screen resolution)
///
/// The region only changes when either resolution changes, so it is
/// computed once per pair. In practice at most two entries exist: one per
/// rotation hypothesis.
#[derive(Debug)]
pub struct RegionCache {
    settings: RegionSettings,
    full_screen: bool,
    entries: HashMap<(Resolution, Resolution), Option<ScanRegion>>,
}

impl RegionCache {
    pub fn new(settings: RegionSettings, full_screen: bool) -> Self {
        Self {
            settings,
            full_screen,
            entries: HashMap::new(),
        }
    }

    /// Region for a frame, computing it on first use
    pub fn region_for(&mut self, frame: Resolution, screen: Resolution) -> Option<ScanRegion> {
        let settings = &self.settings;
        let full_screen = self.full_screen;
        *self
            .entries
            .entry((frame, screen))
            .or_insert_with(|| ScanRegion::compute(frame, settings, full_screen))
    }

    /// Number of cached regions
    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Map a point from source-frame space into display space
///
/// The source is a landscape sensor. On a portrait display the source X
/// axis runs along the display's Y axis and vice versa; each axis is
/// scaled by display size over source size, then shifted by half of the
/// larger (or smaller) dimension of the pair. The half offsets are
/// integer halves, matching the pixel grid of the viewfinder overlay.
pub fn to_display(point: ResultPoint, screen: Resolution, source: Resolution) -> ResultPoint {
    let (sw, sh) = (screen.width, screen.height);
    let (cw, ch) = (source.width, source.height);

    if screen.is_portrait() {
        let scale_x = sw as f32 / ch as f32;
        let scale_y = sh as f32 / cw as f32;
        ResultPoint::new(
            point.x * scale_x - (sw.max(ch) / 2) as f32,
            point.y * scale_y - (sh.min(cw) / 2) as f32,
        )
    } else {
        let scale_x = sw as f32 / cw as f32;
        let scale_y = sh as f32 / ch as f32;
        ResultPoint::new(
            point.x * scale_x - (sh.min(ch) / 2) as f32,
            point.y * scale_y - (sw.max(cw) / 2) as f32,
        )
    }
}
