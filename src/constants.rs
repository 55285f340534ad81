// SPDX-License-Identifier: GPL-3.0-only

//! Scan pipeline constants
//!
//! Timing values for the focus and zoom controllers, and the fixed
//! geometry used when building luminance sources and thumbnails.

use std::time::Duration;

/// Autofocus timing
pub mod focus {
    use super::Duration;

    /// Delay between a focus completion and the next focus request
    pub const AUTO_FOCUS_INTERVAL: Duration = Duration::from_millis(1200);

    /// Focus modes that require on-demand autofocus calls
    pub const MODES_CALLING_AUTO_FOCUS: [&str; 2] = ["auto", "macro"];
}

/// Auto zoom heuristic
pub mod zoom {
    use super::Duration;

    /// Minimum time between two zoom adjustments
    pub const COOLDOWN: Duration = Duration::from_millis(1000);

    /// Default delay applied to a success notification after zooming,
    /// giving the source time to settle focus and exposure
    pub const SETTLE_DELAY_MS: u64 = 300;

    /// A symbol smaller than `frame_width / SMALL_SYMBOL_DIVISOR` triggers zoom
    pub const SMALL_SYMBOL_DIVISOR: u32 = 5;

    /// Each adjustment adds `max_zoom / STEP_DIVISOR`
    pub const STEP_DIVISOR: u32 = 5;
}

/// Decode worker
pub mod worker {
    use super::Duration;

    /// Upper bound on waiting for the worker (and control loop) to acknowledge shutdown
    pub const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_millis(100);

    /// Thread name of the decode worker
    pub const THREAD_NAME: &str = "decode-worker";

    /// Thread name of the coordinator control loop
    pub const CONTROL_THREAD_NAME: &str = "capture-control";
}

/// Scan region defaults
pub mod region {
    /// Default side of the scan square as a fraction of the frame's min dimension
    pub const DEFAULT_RATIO: f32 = 0.625;
}

/// Thumbnail rendering
pub mod thumbnail {
    /// Every n-th pixel (per axis) of the luminance grid is sampled
    pub const SCALE_FACTOR: u32 = 2;

    /// JPEG quality for encoded thumbnails
    pub const JPEG_QUALITY: u8 = 50;
}
