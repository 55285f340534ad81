// SPDX-License-Identifier: GPL-3.0-only

//! Auto zoom
//!
//! Zooms in when a decoded QR code occupies a small part of the frame, so
//! the following scans of the same code run on more pixels per module.

use crate::backends::source::{SourceLease, ZoomCapability};
use crate::constants::zoom;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one auto zoom evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDecision {
    /// A zoom change happened less than a cooldown ago
    Cooldown,
    /// Zoom level changed
    Zoomed { from: u32, to: u32 },
    /// The source cannot zoom
    Unsupported,
    /// The symbol is large enough already
    LargeEnough,
    /// The source rejected the request
    Failed,
}

impl ZoomDecision {
    /// Whether the caller should treat the zoom as applied
    ///
    /// A cooldown hit counts as applied: the previous change may still be
    /// settling.
    pub fn applied(&self) -> bool {
        matches!(self, ZoomDecision::Cooldown | ZoomDecision::Zoomed { .. })
    }
}

/// Whether a symbol of `extent` pixels is small in a frame `frame_width` wide
pub fn is_small_symbol(extent: f32, frame_width: u32) -> bool {
    (extent as u32) < frame_width / zoom::SMALL_SYMBOL_DIVISOR
}

/// Next zoom level: one step of a fifth of the range, clamped to the maximum
pub fn next_level(capability: ZoomCapability) -> u32 {
    capability
        .current
        .saturating_add(capability.max / zoom::STEP_DIVISOR)
        .min(capability.max)
}

pub struct ZoomController {
    lease: SourceLease,
    last_zoom: Option<Instant>,
    cooldown: Duration,
}

impl ZoomController {
    pub fn new(lease: SourceLease) -> Self {
        Self {
            lease,
            last_zoom: None,
            cooldown: zoom::COOLDOWN,
        }
    }

    /// Evaluate a symbol of `extent` pixels found in a frame `frame_width` wide
    pub fn adjust(&mut self, extent: f32, frame_width: u32, now: Instant) -> ZoomDecision {
        if self
            .last_zoom
            .is_some_and(|last| now.duration_since(last) < self.cooldown)
        {
            return ZoomDecision::Cooldown;
        }

        if !is_small_symbol(extent, frame_width) {
            return ZoomDecision::LargeEnough;
        }

        let capability = match self.lease.zoom_capability() {
            Ok(capability) => capability,
            Err(e) => {
                warn!(error = %e, "Failed to query zoom");
                return ZoomDecision::Failed;
            }
        };
        if !capability.supported {
            info!("Zoom not supported");
            return ZoomDecision::Unsupported;
        }

        let level = next_level(capability);
        if let Err(e) = self.lease.set_zoom(level) {
            warn!(error = %e, level, "Failed to set zoom");
            return ZoomDecision::Failed;
        }

        debug!(extent, frame_width, from = capability.current, to = level, "Zoomed in on small symbol");
        self.last_zoom = Some(now);
        ZoomDecision::Zoomed {
            from: capability.current,
            to: level,
        }
    }
}
