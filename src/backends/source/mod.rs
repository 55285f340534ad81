// SPDX-License-Identifier: GPL-3.0-only

//! Frame source abstraction
//!
//! A frame source is the device the scanner reads from: a camera, or a
//! set of still images for offline scanning.
//!
//! ```text
//! ┌─────────────────────┐
//! │ CaptureCoordinator  │
//! └──────────┬──────────┘
//!            │ owns
//!            ▼
//! ┌─────────────────────┐      ┌─────────────────────┐
//! │    SourceManager    │─────▶│     SourceLease     │ ← AutoFocusScheduler,
//! └──────────┬──────────┘      └─────────────────────┘   ZoomController
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  FrameSource trait  │
//! └─────────────────────┘
//! ```
//!
//! Frames are delivered one per request. A source never re-arms itself:
//! after each delivery the caller must request again.

pub mod manager;
pub mod still;
pub mod types;

pub use manager::{SourceLease, SourceManager};
pub use still::StillImageSource;
pub use types::*;

use crate::errors::{SourceError, SourceResult};
use crate::scan::geometry::Resolution;

/// Receives the single frame produced for one request
///
/// May be invoked on any thread, including synchronously from inside
/// [`FrameSource::request_frame`].
pub type FrameCallback = Box<dyn FnOnce(SourceResult<Frame>) + Send>;

/// Receives the outcome of one focus request (`true` when focus locked)
pub type FocusCallback = Box<dyn FnOnce(bool) + Send>;

/// Device-facing side of the scan pipeline
pub trait FrameSource: Send {
    /// Human readable name for logging
    fn name(&self) -> &str;

    // ===== Preview =====

    /// Begin continuous preview; frames can be requested afterwards
    fn start_preview(&mut self) -> SourceResult<()>;

    /// Stop preview; pending frame requests may be dropped
    fn stop_preview(&mut self) -> SourceResult<()>;

    /// Request exactly one frame
    fn request_frame(&mut self, callback: FrameCallback) -> SourceResult<()>;

    // ===== Geometry =====

    /// Resolution of delivered frames
    fn source_resolution(&self) -> Resolution;

    /// Resolution of the display the preview is shown on
    fn screen_resolution(&self) -> Resolution;

    // ===== Focus =====

    fn focus_mode(&self) -> FocusMode;

    /// Start one focus cycle; `callback` fires when it completes or fails
    fn trigger_focus(&mut self, callback: FocusCallback) -> SourceResult<()>;

    /// Abort an in-flight focus cycle
    fn cancel_focus(&mut self) -> SourceResult<()>;

    // ===== Zoom & torch =====

    fn zoom_capability(&self) -> ZoomCapability;

    fn set_zoom(&mut self, level: u32) -> SourceResult<()>;

    fn set_torch(&mut self, _on: bool) -> SourceResult<()> {
        Err(SourceError::Unsupported("torch"))
    }
}
