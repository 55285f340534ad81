// SPDX-License-Identifier: GPL-3.0-only

//! Live scan pipeline
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐  request   ┌─────────────┐
//! │ CaptureCoordinator │───────────▶│ FrameSource │
//! └─────────▲──────────┘            └──────┬──────┘
//!           │ DecodeReport                 │ Frame
//!           │                              ▼
//!           │            ┌──────────────────────────────────────┐
//!           └────────────│ DecodeWorker                         │
//!                        │  LuminanceSourceBuilder → Binarizer  │
//!                        │  → SymbolReader → ZoomController     │
//!                        └──────────────────────────────────────┘
//!
//! AutoFocusScheduler runs beside the loop on the same source.
//! ```
//!
//! - [`geometry`]: resolutions, scan region, display transform
//! - [`luminance`]: rotation, cropping, thumbnails
//! - [`binarizer`]: hybrid and global histogram binarization
//! - [`reader`]: formats, decode hints, the reader capability
//! - [`zoom`]: auto zoom heuristic
//! - [`autofocus`]: periodic autofocus
//! - [`worker`]: decode thread and multi-pass strategy
//! - [`coordinator`]: session state machine

pub mod autofocus;
pub mod binarizer;
pub mod coordinator;
pub mod geometry;
pub mod luminance;
pub mod reader;
pub mod worker;
pub mod zoom;

pub use coordinator::{CaptureCoordinator, CaptureCoordinatorBuilder, CaptureListener, CaptureState};
pub use geometry::{Resolution, ResultPoint, ScanRegion};
pub use reader::{BarcodeFormat, DecodeHints, RqrrReader, Symbol, SymbolReader};
pub use worker::{DecodeOutcome, DecodeSuccess};
