// SPDX-License-Identifier: GPL-3.0-only

//! Luminance sources
//!
//! A luminance source is the grayscale grid a decode pass binarizes. It is
//! cut from the luma plane of a raw frame over the scan region, optionally
//! after rotating the frame by 90°.

use crate::backends::source::Frame;
use crate::constants::thumbnail;
use crate::scan::geometry::{RegionCache, Resolution};
use image::GrayImage;
use image::codecs::jpeg::JpegEncoder;
use tracing::{trace, warn};

/// Rotate a luma plane by 90° clockwise
///
/// Every input sample at `(x, y)` lands at `x * height + height - y - 1`;
/// the returned plane is `height` wide and `width` tall.
///
/// # Panics
///
/// Panics if `data` holds fewer than `width * height` samples.
pub fn rotate_clockwise(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut rotated = vec![0u8; width * height];
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        for (x, &value) in row.iter().enumerate() {
            rotated[x * height + height - y - 1] = value;
        }
    }
    rotated
}

/// A grayscale grid ready for binarization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuminanceSource {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
}

impl LuminanceSource {
    /// Wrap an already cropped grid
    pub fn new(pixels: Vec<u8>, width: usize, height: usize) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        Self {
            pixels,
            width,
            height,
        }
    }

    /// Crop a `data_width` × `data_height` luma plane to the given rectangle
    ///
    /// Returns `None` when the rectangle does not fit inside the plane or the
    /// plane is shorter than its declared size.
    pub fn crop(
        data: &[u8],
        data_width: usize,
        data_height: usize,
        left: usize,
        top: usize,
        width: usize,
        height: usize,
    ) -> Option<Self> {
        if left + width > data_width
            || top + height > data_height
            || data.len() < data_width * data_height
        {
            return None;
        }

        let mut pixels = Vec::with_capacity(width * height);
        for y in top..top + height {
            let start = y * data_width + left;
            pixels.extend_from_slice(&data[start..start + width]);
        }
        Some(Self::new(pixels, width, height))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }

    /// Same grid with every sample replaced by `255 - sample`
    pub fn invert(&self) -> Self {
        Self::new(
            self.pixels.iter().map(|&v| 255 - v).collect(),
            self.width,
            self.height,
        )
    }

    /// Downsampled preview of the grid, encoded as JPEG
    ///
    /// Samples every `SCALE_FACTOR`-th pixel on each axis. Returns `None`
    /// when the grid is too small to sample or encoding fails.
    pub fn render_thumbnail(&self) -> Option<Thumbnail> {
        let step = thumbnail::SCALE_FACTOR as usize;
        let thumb_width = self.width / step;
        let thumb_height = self.height / step;
        if thumb_width == 0 || thumb_height == 0 {
            return None;
        }

        let mut samples = Vec::with_capacity(thumb_width * thumb_height);
        for y in 0..thumb_height {
            let row = self.row(y * step);
            samples.extend((0..thumb_width).map(|x| row[x * step]));
        }

        let image = GrayImage::from_raw(thumb_width as u32, thumb_height as u32, samples)?;
        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, thumbnail::JPEG_QUALITY);
        if let Err(e) = encoder.encode_image(&image) {
            warn!(error = %e, "Failed to encode thumbnail");
            return None;
        }

        Some(Thumbnail {
            width: thumb_width as u32,
            height: thumb_height as u32,
            scale_factor: thumb_width as f32 / self.width as f32,
            jpeg,
        })
    }
}

/// JPEG preview of the region a symbol was decoded from
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    /// Thumbnail width divided by luminance source width
    pub scale_factor: f32,
    /// Encoded JPEG bytes
    pub jpeg: Vec<u8>,
}

/// Builds luminance sources over the configured scan region
///
/// Regions are cached per frame/screen resolution pair.
#[derive(Debug)]
pub struct LuminanceSourceBuilder {
    regions: RegionCache,
}

impl LuminanceSourceBuilder {
    pub fn new(regions: RegionCache) -> Self {
        Self { regions }
    }

    /// Build a source from a frame, rotated by 90° when `rotate` is set
    pub fn build(&mut self, frame: &Frame, rotate: bool, screen: Resolution) -> Option<LuminanceSource> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let luma = frame.luma()?;

        let rotated;
        let (data, resolution) = if rotate {
            rotated = rotate_clockwise(luma, width, height);
            (rotated.as_slice(), frame.resolution().transposed())
        } else {
            (luma, frame.resolution())
        };

        let Some(region) = self.regions.region_for(resolution, screen) else {
            trace!(%resolution, "No scan region for frame");
            return None;
        };

        LuminanceSource::crop(
            data,
            resolution.width as usize,
            resolution.height as usize,
            region.left as usize,
            region.top as usize,
            region.width as usize,
            region.height as usize,
        )
    }
}
