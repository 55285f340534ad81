// SPDX-License-Identifier: GPL-3.0-only

//! Camera Scan - live barcode and QR code capture
//!
//! This library drives a frame source, a dedicated decode worker, and the
//! focus and zoom controllers that keep the source usable while scanning.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Frame source abstraction and the still-image source
//! - [`scan`]: Capture state machine, decode worker, focus and zoom control
//! - [`config`]: Scan session configuration
//! - [`errors`]: Error types
//!
//! # Example
//!
//! ```ignore
//! let source = StillImageSource::open(&["code.png"])?;
//! let coordinator = CaptureCoordinator::builder(Box::new(source), listener)
//!     .config(ScanConfig::default())
//!     .build()?;
//! coordinator.start()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod scan;

// Re-export commonly used types
pub use backends::source::{Frame, FrameSource, StillImageSource};
pub use config::ScanConfig;
pub use errors::{CaptureError, CaptureResult, SourceError};
pub use scan::{CaptureCoordinator, CaptureListener, CaptureState, DecodeSuccess};
