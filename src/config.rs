// SPDX-License-Identifier: GPL-3.0-only

//! Scan session configuration
//!
//! The configuration is read once when a capture session is built and is
//! frozen into the decode hints and worker flags. Changing it requires a
//! new session.

use crate::constants::{region, zoom};
use crate::errors::ConfigError;
use crate::scan::reader::{BarcodeFormat, format_groups};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Placement of the scan square inside the frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Side of the scan square as a fraction (0.0 to 1.0) of the frame's smaller dimension
    pub ratio: f32,
    /// Horizontal shift in source pixels (positive moves right)
    pub horizontal_offset: i32,
    /// Vertical shift in source pixels (positive moves down)
    pub vertical_offset: i32,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            ratio: region::DEFAULT_RATIO,
            horizontal_offset: 0,
            vertical_offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Candidate symbol formats
    pub formats: BTreeSet<BarcodeFormat>,
    /// Character set hint for byte-mode payloads
    pub character_set: Option<String>,
    /// Scan square placement
    pub region: RegionSettings,
    /// Scan the whole frame instead of the scan square
    pub full_screen_scan: bool,
    /// Retry with the opposite rotation hypothesis (vertical 1D codes)
    pub support_vertical_code: bool,
    /// Retry with inverted luminance (light-on-dark codes)
    pub support_luminance_invert: bool,
    /// Zoom in when a QR code is small relative to the frame
    pub support_auto_zoom: bool,
    /// Attach a thumbnail of the decoded region to results
    pub return_thumbnail: bool,
    /// Allow periodic autofocus when the source's focus mode needs it
    pub auto_focus: bool,
    /// Delay of the success notification after a zoom change, in milliseconds
    pub zoom_settle_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let mut formats = BTreeSet::new();
        formats.extend(format_groups::PRODUCT);
        formats.extend(format_groups::INDUSTRIAL);
        formats.extend(format_groups::QR_CODE);
        formats.extend(format_groups::DATA_MATRIX);

        Self {
            formats,
            character_set: None,
            region: RegionSettings::default(),
            full_screen_scan: false,
            support_vertical_code: false,
            support_luminance_invert: false,
            support_auto_zoom: true,
            return_thumbnail: false,
            auto_focus: true,
            zoom_settle_delay_ms: zoom::SETTLE_DELAY_MS,
        }
    }
}

impl ScanConfig {
    /// Default location: `<config dir>/camera-scan/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("camera-scan").join("config.json"))
    }

    /// Load and validate a JSON configuration file
    ///
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading scan configuration");
        let text = std::fs::read_to_string(path)?;
        let config: ScanConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from the default location if it exists,
    /// else fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.region.ratio) {
            return Err(ConfigError::Invalid(format!(
                "region ratio {} is outside 0.0..=1.0",
                self.region.ratio
            )));
        }
        if self.formats.is_empty() {
            return Err(ConfigError::Invalid("no symbol formats enabled".into()));
        }
        Ok(())
    }

    pub fn zoom_settle_delay(&self) -> Duration {
        Duration::from_millis(self.zoom_settle_delay_ms)
    }
}
