// SPDX-License-Identifier: GPL-3.0-only

//! Decode worker
//!
//! A dedicated thread that owns the symbol reader and decodes one frame per
//! message. Each frame goes through up to four passes, first success wins:
//!
//! 1. hybrid binarization, rotation matching the display
//! 2. hybrid binarization of the inverted grid (if enabled)
//! 3. global histogram binarization
//! 4. hybrid binarization, opposite rotation (if enabled)
//!
//! Pass failures never leave the worker. A frame yields exactly one
//! [`DecodeReport`].

use crate::backends::source::Frame;
use crate::config::ScanConfig;
use crate::constants::worker;
use crate::scan::binarizer::Binarization;
use crate::scan::geometry::{RegionCache, Resolution, ResultPoint, symbol_extent};
use crate::scan::luminance::{LuminanceSource, LuminanceSourceBuilder, Thumbnail};
use crate::scan::reader::{BarcodeFormat, Symbol, SymbolReader};
use crate::scan::zoom::ZoomController;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Messages consumed by the worker loop, in FIFO order
#[derive(Debug)]
pub enum WorkerMessage {
    Decode(Frame),
    /// Exit at the next message boundary
    Terminate,
}

/// A successful decode
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeSuccess {
    pub payload: Vec<u8>,
    pub format: BarcodeFormat,
    /// Result points in luminance-grid coordinates
    pub points: Vec<ResultPoint>,
    pub thumbnail: Option<Thumbnail>,
    /// Thumbnail width over luminance width (1.0 without a thumbnail)
    pub scale_factor: f32,
}

impl DecodeSuccess {
    /// Payload as text, when it is valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Success(DecodeSuccess),
    Failure,
}

/// Worker output for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeReport {
    pub outcome: DecodeOutcome,
    /// Hold the success notification back this long (a zoom is settling)
    pub notify_after: Option<Duration>,
}

/// Worker behavior flags, frozen from the session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub luminance_invert: bool,
    pub vertical_code: bool,
    pub auto_zoom: bool,
    pub return_thumbnail: bool,
    pub zoom_settle_delay: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            luminance_invert: config.support_luminance_invert,
            vertical_code: config.support_vertical_code,
            auto_zoom: config.support_auto_zoom,
            return_thumbnail: config.return_thumbnail,
            zoom_settle_delay: config.zoom_settle_delay(),
        }
    }
}

/// The pass that produced a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePass {
    Hybrid,
    Inverted,
    GlobalHistogram,
    Vertical,
}

pub struct DecodeWorker {
    reader: Box<dyn SymbolReader>,
    builder: LuminanceSourceBuilder,
    zoom: Option<ZoomController>,
    options: WorkerOptions,
    screen: Resolution,
}

impl DecodeWorker {
    /// Create a worker; `zoom` is required for auto zoom to take effect
    pub fn new(
        reader: Box<dyn SymbolReader>,
        regions: RegionCache,
        zoom: Option<ZoomController>,
        options: WorkerOptions,
        screen: Resolution,
    ) -> Self {
        Self {
            reader,
            builder: LuminanceSourceBuilder::new(regions),
            zoom,
            options,
            screen,
        }
    }

    /// Run the worker loop on its own thread
    ///
    /// `report` is called once per decoded frame. `ack` receives a unit
    /// value when the loop exits on [`WorkerMessage::Terminate`].
    pub fn spawn(
        self,
        messages: Receiver<WorkerMessage>,
        report: impl Fn(DecodeReport) + Send + 'static,
        ack: Sender<()>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(worker::THREAD_NAME.to_string())
            .spawn(move || self.run(messages, report, ack))
    }

    fn run(mut self, messages: Receiver<WorkerMessage>, report: impl Fn(DecodeReport), ack: Sender<()>) {
        info!("Decode worker started");
        while let Ok(message) = messages.recv() {
            match message {
                WorkerMessage::Decode(frame) => report(self.process(&frame)),
                WorkerMessage::Terminate => {
                    let _ = ack.send(());
                    break;
                }
            }
        }
        info!("Decode worker exiting");
    }

    /// Decode one frame and evaluate auto zoom on the result
    pub fn process(&mut self, frame: &Frame) -> DecodeReport {
        let start = Instant::now();
        let Some((pass, symbol, source)) = self.decode(frame) else {
            trace!(
                width = frame.width,
                height = frame.height,
                elapsed_us = start.elapsed().as_micros() as u64,
                "No symbol in frame"
            );
            return DecodeReport {
                outcome: DecodeOutcome::Failure,
                notify_after: None,
            };
        };

        debug!(
            format = %symbol.format,
            pass = ?pass,
            bytes = symbol.payload.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Found symbol"
        );

        let notify_after = self.auto_zoom(&symbol, frame.width);

        let thumbnail = if self.options.return_thumbnail {
            source.render_thumbnail()
        } else {
            None
        };
        let scale_factor = thumbnail.as_ref().map_or(1.0, |t| t.scale_factor);

        DecodeReport {
            outcome: DecodeOutcome::Success(DecodeSuccess {
                payload: symbol.payload,
                format: symbol.format,
                points: symbol.points,
                thumbnail,
                scale_factor,
            }),
            notify_after,
        }
    }

    /// Run the decode passes
    ///
    /// Returns the winning pass, the symbol and the luminance grid to render
    /// a thumbnail from (the non-inverted grid for the inverted pass).
    pub fn decode(&mut self, frame: &Frame) -> Option<(DecodePass, Symbol, LuminanceSource)> {
        let rotate = self.screen.is_portrait();
        let source = self.builder.build(frame, rotate, self.screen)?;

        if let Some(symbol) = self.attempt(&source, Binarization::Hybrid) {
            return Some((DecodePass::Hybrid, symbol, source));
        }

        if self.options.luminance_invert {
            let inverted = source.invert();
            if let Some(symbol) = self.attempt(&inverted, Binarization::Hybrid) {
                return Some((DecodePass::Inverted, symbol, source));
            }
        }

        if let Some(symbol) = self.attempt(&source, Binarization::GlobalHistogram) {
            return Some((DecodePass::GlobalHistogram, symbol, source));
        }

        if self.options.vertical_code {
            let vertical = self.builder.build(frame, !rotate, self.screen)?;
            if let Some(symbol) = self.attempt(&vertical, Binarization::Hybrid) {
                return Some((DecodePass::Vertical, symbol, vertical));
            }
        }

        None
    }

    fn attempt(&mut self, source: &LuminanceSource, binarization: Binarization) -> Option<Symbol> {
        let result = binarization
            .black_matrix(source)
            .and_then(|matrix| self.reader.decode(&matrix));
        self.reader.reset();

        match result {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                trace!(binarizer = binarization.name(), error = %e, "Decode pass failed");
                None
            }
        }
    }

    /// Zoom in on small QR codes; returns the notification delay if a zoom
    /// was applied (or is still settling)
    fn auto_zoom(&mut self, symbol: &Symbol, frame_width: u32) -> Option<Duration> {
        if !self.options.auto_zoom || symbol.format != BarcodeFormat::QrCode {
            return None;
        }
        let zoom = self.zoom.as_mut()?;
        let extent = symbol_extent(&symbol.points)?;

        let decision = zoom.adjust(extent, frame_width, Instant::now());
        trace!(extent, frame_width, decision = ?decision, "Auto zoom evaluated");
        decision
            .applied()
            .then_some(self.options.zoom_settle_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionSettings;
    use crate::errors::ReadError;
    use crate::scan::binarizer::BitMatrix;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    /// Fails a fixed number of attempts, then succeeds; records each grid
    struct ScriptedReader {
        failures: usize,
        seen: Arc<Mutex<Vec<(usize, usize, usize)>>>,
    }

    impl SymbolReader for ScriptedReader {
        fn decode(&mut self, image: &BitMatrix) -> Result<Symbol, ReadError> {
            self.seen
                .lock()
                .unwrap()
                .push((image.width(), image.height(), image.count_black()));
            if self.failures > 0 {
                self.failures -= 1;
                return Err(ReadError::NotFound);
            }
            Ok(Symbol {
                payload: b"hello".to_vec(),
                format: BarcodeFormat::Ean13,
                points: Vec::new(),
            })
        }
    }

    fn options(invert: bool, vertical: bool) -> WorkerOptions {
        WorkerOptions {
            luminance_invert: invert,
            vertical_code: vertical,
            auto_zoom: false,
            return_thumbnail: false,
            zoom_settle_delay: Duration::from_millis(300),
        }
    }

    fn worker(failures: usize, options: WorkerOptions) -> (DecodeWorker, Arc<Mutex<Vec<(usize, usize, usize)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reader = ScriptedReader {
            failures,
            seen: Arc::clone(&seen),
        };
        let regions = RegionCache::new(RegionSettings::default(), true);
        let worker = DecodeWorker::new(Box::new(reader), regions, None, options, Resolution::new(80, 60));
        (worker, seen)
    }

    /// Left half dark, right half light
    fn frame() -> Frame {
        let (w, h) = (80u32, 60u32);
        let data = (0..w * h)
            .map(|i| if i % w < w / 2 { 20 } else { 220 })
            .collect();
        Frame::new(data, w, h)
    }

    #[test]
    fn test_first_pass_success() {
        let (mut worker, seen) = worker(0, options(true, true));
        let (pass, symbol, _) = worker.decode(&frame()).unwrap();
        assert_eq!(pass, DecodePass::Hybrid);
        assert_eq!(symbol.payload, b"hello");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_passes_are_skipped() {
        // Only hybrid and global histogram run
        let (mut worker, seen) = worker(10, options(false, false));
        assert!(worker.decode(&frame()).is_none());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_all_four_passes_in_order() {
        let (mut worker, seen) = worker(3, options(true, true));
        let (pass, _, source) = worker.decode(&frame()).unwrap();
        assert_eq!(pass, DecodePass::Vertical);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        // Landscape screen: upright grid for the first three passes, the
        // vertical pass is transposed
        let sizes: Vec<_> = seen.iter().map(|&(w, h, _)| (w, h)).collect();
        assert_eq!(sizes, vec![(80, 60), (80, 60), (80, 60), (60, 80)]);
        assert_eq!((source.width(), source.height()), (60, 80));
    }

    #[test]
    fn test_inverted_pass_keeps_upright_source_for_thumbnail() {
        let (mut worker, _) = worker(1, options(true, false));
        let (pass, _, source) = worker.decode(&frame()).unwrap();
        assert_eq!(pass, DecodePass::Inverted);
        assert_eq!(source.get(0, 0), 20);
    }

    #[test]
    fn test_thread_reports_each_frame_then_acks_terminate() {
        let mut opts = options(false, false);
        opts.return_thumbnail = true;
        let (worker, _) = worker(2, opts);

        let (tx, rx) = mpsc::channel();
        let (report_tx, report_rx) = mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::channel();
        let handle = worker
            .spawn(rx, move |report| report_tx.send(report).unwrap(), ack_tx)
            .unwrap();

        tx.send(WorkerMessage::Decode(frame())).unwrap();
        tx.send(WorkerMessage::Decode(frame())).unwrap();
        tx.send(WorkerMessage::Terminate).unwrap();

        // Hybrid + global fail on the first frame, hybrid succeeds on the second
        let first = report_rx.recv().unwrap();
        assert_eq!(first.outcome, DecodeOutcome::Failure);
        let second = report_rx.recv().unwrap();
        let DecodeOutcome::Success(success) = second.outcome else {
            panic!("expected success");
        };
        assert_eq!(success.text(), Some("hello"));
        assert_eq!(success.scale_factor, 0.5);
        assert!(success.thumbnail.is_some());
        assert_eq!(second.notify_after, None);

        ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        handle.join().unwrap();
    }
}
