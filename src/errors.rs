// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the scan pipeline
//!
//! Per-frame decode misses never surface here: they are absorbed by the
//! decode worker's fallback chain. Only source-level failures and
//! configuration problems reach the caller.

use std::fmt;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Result type alias using SourceError
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors reported by a frame source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// No usable source on this system
    NotAvailable(String),
    /// The source handle could not be opened or preview could not start
    OpenFailed(String),
    /// The source refused a frame request
    RequestFailed(String),
    /// The source does not support the operation (focus cancel, torch, zoom)
    Unsupported(&'static str),
    /// Access through a lease after the capture session ended
    Inactive,
    /// Other errors
    Other(String),
}

/// Errors crossing the capture coordinator boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Source-level failure
    Source(SourceError),
    /// The session was stopped and cannot be restarted
    Closed,
    /// The decode worker could not be started
    Worker(String),
    /// Invalid configuration
    Config(ConfigError),
}

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read
    Io(String),
    /// The file is not valid JSON for the configuration schema
    Parse(String),
    /// A value is out of range
    Invalid(String),
}

/// Decode pass failures (internal to the decode worker)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// No symbol located in the image
    NotFound,
    /// A symbol was located but error correction failed
    Checksum,
    /// A symbol was located but its content is malformed
    Format(String),
    /// None of the hinted formats can be read by this reader
    Unsupported,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotAvailable(msg) => write!(f, "Source not available: {}", msg),
            SourceError::OpenFailed(msg) => write!(f, "Failed to open source: {}", msg),
            SourceError::RequestFailed(msg) => write!(f, "Frame request failed: {}", msg),
            SourceError::Unsupported(op) => write!(f, "Operation not supported: {}", op),
            SourceError::Inactive => write!(f, "Capture session is no longer active"),
            SourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Source(e) => write!(f, "Source error: {}", e),
            CaptureError::Closed => write!(f, "Capture session already stopped"),
            CaptureError::Worker(msg) => write!(f, "Decode worker error: {}", msg),
            CaptureError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Cannot read configuration: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Cannot parse configuration: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::NotFound => write!(f, "No symbol found"),
            ReadError::Checksum => write!(f, "Error correction failed"),
            ReadError::Format(msg) => write!(f, "Malformed symbol: {}", msg),
            ReadError::Unsupported => write!(f, "No supported format requested"),
        }
    }
}

impl std::error::Error for SourceError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ReadError {}

impl From<SourceError> for CaptureError {
    fn from(err: SourceError) -> Self {
        CaptureError::Source(err)
    }
}

impl From<ConfigError> for CaptureError {
    fn from(err: ConfigError) -> Self {
        CaptureError::Config(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
