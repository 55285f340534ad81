// SPDX-License-Identifier: GPL-3.0-only

//! Symbol readers
//!
//! A reader turns a binarized grid into a symbol. The decode worker owns
//! exactly one reader and never calls it concurrently, so readers may keep
//! internal state between calls (cleared by [`SymbolReader::reset`]).

use crate::config::ScanConfig;
use crate::errors::ReadError;
use crate::scan::binarizer::BitMatrix;
use crate::scan::geometry::ResultPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

/// Symbologies a reader may be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarcodeFormat {
    Aztec,
    Codabar,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "CODE_93")]
    Code93,
    #[serde(rename = "CODE_128")]
    Code128,
    DataMatrix,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "EAN_13")]
    Ean13,
    Itf,
    #[serde(rename = "PDF_417")]
    Pdf417,
    QrCode,
    #[serde(rename = "RSS_14")]
    Rss14,
    RssExpanded,
    UpcA,
    UpcE,
}

impl BarcodeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFormat::Aztec => "AZTEC",
            BarcodeFormat::Codabar => "CODABAR",
            BarcodeFormat::Code39 => "CODE_39",
            BarcodeFormat::Code93 => "CODE_93",
            BarcodeFormat::Code128 => "CODE_128",
            BarcodeFormat::DataMatrix => "DATA_MATRIX",
            BarcodeFormat::Ean8 => "EAN_8",
            BarcodeFormat::Ean13 => "EAN_13",
            BarcodeFormat::Itf => "ITF",
            BarcodeFormat::Pdf417 => "PDF_417",
            BarcodeFormat::QrCode => "QR_CODE",
            BarcodeFormat::Rss14 => "RSS_14",
            BarcodeFormat::RssExpanded => "RSS_EXPANDED",
            BarcodeFormat::UpcA => "UPC_A",
            BarcodeFormat::UpcE => "UPC_E",
        }
    }
}

impl std::fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format groups that are switched on and off together
pub mod format_groups {
    use super::BarcodeFormat::{self, *};

    /// Retail product codes
    pub const PRODUCT: [BarcodeFormat; 6] = [UpcA, UpcE, Ean13, Ean8, Rss14, RssExpanded];

    /// Logistics and industrial 1D codes
    pub const INDUSTRIAL: [BarcodeFormat; 5] = [Code39, Code93, Code128, Itf, Codabar];

    pub const QR_CODE: [BarcodeFormat; 1] = [QrCode];

    pub const DATA_MATRIX: [BarcodeFormat; 1] = [DataMatrix];

    pub const AZTEC: [BarcodeFormat; 1] = [Aztec];

    pub const PDF417: [BarcodeFormat; 1] = [Pdf417];
}

/// Receives points of candidate symbols while a decode is still running
pub trait ResultPointCallback: Send + Sync {
    fn found_possible_result_point(&self, point: ResultPoint);
}

/// Decoder configuration, fixed for the lifetime of one decode worker
#[derive(Clone, Default)]
pub struct DecodeHints {
    pub formats: BTreeSet<BarcodeFormat>,
    pub character_set: Option<String>,
    pub result_point_callback: Option<Arc<dyn ResultPointCallback>>,
}

impl DecodeHints {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            formats: config.formats.clone(),
            character_set: config.character_set.clone(),
            result_point_callback: None,
        }
    }

    pub fn with_result_point_callback(mut self, callback: Arc<dyn ResultPointCallback>) -> Self {
        self.result_point_callback = Some(callback);
        self
    }

    fn report_point(&self, point: ResultPoint) {
        if let Some(callback) = &self.result_point_callback {
            callback.found_possible_result_point(point);
        }
    }
}

impl std::fmt::Debug for DecodeHints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeHints")
            .field("formats", &self.formats)
            .field("character_set", &self.character_set)
            .field("result_point_callback", &self.result_point_callback.is_some())
            .finish()
    }
}

/// A decoded symbol, in the coordinates of the grid it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub payload: Vec<u8>,
    pub format: BarcodeFormat,
    pub points: Vec<ResultPoint>,
}

/// The decode capability
pub trait SymbolReader: Send {
    fn decode(&mut self, image: &BitMatrix) -> Result<Symbol, ReadError>;

    /// Clear state carried over from the previous attempt
    fn reset(&mut self) {}
}

/// Builds the worker's reader from the session's hints
pub type ReaderFactory = Box<dyn FnOnce(DecodeHints) -> Box<dyn SymbolReader> + Send>;

/// QR code reader backed by `rqrr`
pub struct RqrrReader {
    hints: DecodeHints,
}

impl RqrrReader {
    pub fn new(hints: DecodeHints) -> Self {
        Self { hints }
    }

    pub fn factory() -> ReaderFactory {
        Box::new(|hints| Box::new(RqrrReader::new(hints)))
    }
}

impl SymbolReader for RqrrReader {
    fn decode(&mut self, image: &BitMatrix) -> Result<Symbol, ReadError> {
        if !self.hints.formats.contains(&BarcodeFormat::QrCode) {
            return Err(ReadError::Unsupported);
        }

        let mut prepared =
            rqrr::PreparedImage::prepare_from_bitmap(image.width(), image.height(), |x, y| {
                image.get(x, y)
            });
        let grids = prepared.detect_grids();
        if grids.is_empty() {
            return Err(ReadError::NotFound);
        }
        trace!(candidates = grids.len(), "Located QR grids");

        // Corners go out before decoding so the viewfinder can show them
        // even when error correction fails
        for grid in &grids {
            for corner in &grid.bounds {
                self.hints
                    .report_point(ResultPoint::new(corner.x as f32, corner.y as f32));
            }
        }

        let mut error = ReadError::NotFound;
        for grid in &grids {
            match grid.decode() {
                Ok((_meta, content)) => {
                    let points = grid.bounds[..3]
                        .iter()
                        .map(|p| ResultPoint::new(p.x as f32, p.y as f32))
                        .collect();
                    return Ok(Symbol {
                        payload: content.into_bytes(),
                        format: BarcodeFormat::QrCode,
                        points,
                    });
                }
                Err(e @ (rqrr::DeQRError::DataEcc | rqrr::DeQRError::FormatEcc)) => {
                    trace!(error = ?e, "QR error correction failed");
                    error = ReadError::Checksum;
                }
                Err(e) => {
                    trace!(error = ?e, "QR content malformed");
                    error = ReadError::Format(format!("{:?}", e));
                }
            }
        }
        Err(error)
    }
}
