// SPDX-License-Identifier: GPL-3.0-only
// Shared types for frame sources

//! Shared types for frame sources

use crate::constants::focus;
use crate::scan::geometry::Resolution;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A raw frame delivered by a source
///
/// The first `width * height` bytes are the luma plane (Y of NV21/YUV420,
/// or plain 8-bit grayscale). Anything after that (chroma planes) is ignored
/// by the scan pipeline.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Luma plane, or `None` when the buffer is shorter than `width * height`
    pub fn luma(&self) -> Option<&[u8]> {
        let len = self.width as usize * self.height as usize;
        self.data.get(..len)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Focus mode reported by a source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMode {
    Auto,
    Macro,
    ContinuousPicture,
    ContinuousVideo,
    Fixed,
    Infinity,
    Edof,
    /// Driver-specific mode name
    Other(String),
}

impl FocusMode {
    /// Parse a driver mode name; unknown names are kept verbatim
    pub fn from_name(name: &str) -> Self {
        match name {
            "auto" => FocusMode::Auto,
            "macro" => FocusMode::Macro,
            "continuous-picture" => FocusMode::ContinuousPicture,
            "continuous-video" => FocusMode::ContinuousVideo,
            "fixed" => FocusMode::Fixed,
            "infinity" => FocusMode::Infinity,
            "edof" => FocusMode::Edof,
            other => FocusMode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FocusMode::Auto => "auto",
            FocusMode::Macro => "macro",
            FocusMode::ContinuousPicture => "continuous-picture",
            FocusMode::ContinuousVideo => "continuous-video",
            FocusMode::Fixed => "fixed",
            FocusMode::Infinity => "infinity",
            FocusMode::Edof => "edof",
            FocusMode::Other(name) => name,
        }
    }

    /// Whether this mode only focuses when explicitly asked to
    pub fn needs_focus_calls(&self) -> bool {
        focus::MODES_CALLING_AUTO_FOCUS.contains(&self.as_str())
    }
}

impl std::fmt::Display for FocusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zoom range of a source
///
/// Levels are driver units from 0 (no zoom) to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZoomCapability {
    pub supported: bool,
    pub current: u32,
    pub max: u32,
}

impl ZoomCapability {
    pub const UNSUPPORTED: Self = Self {
        supported: false,
        current: 0,
        max: 0,
    };
}
