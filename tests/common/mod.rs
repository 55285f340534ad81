// SPDX-License-Identifier: GPL-3.0-only

//! Fake collaborators shared by the integration tests

#![allow(dead_code)]

use camera_scan::backends::source::{
    FocusCallback, FocusMode, Frame, FrameCallback, FrameSource, ZoomCapability,
};
use camera_scan::errors::{CaptureError, ReadError, SourceError, SourceResult};
use camera_scan::scan::binarizer::BitMatrix;
use camera_scan::scan::geometry::{Resolution, ResultPoint};
use camera_scan::scan::reader::{BarcodeFormat, DecodeHints, Symbol, SymbolReader};
use camera_scan::scan::{CaptureCoordinator, CaptureListener, DecodeSuccess};
use camera_scan::ScanConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const FRAME_SIZE: u32 = 64;

/// Two-level frame: left half dark, right half light
pub fn test_frame() -> Frame {
    let data = (0..FRAME_SIZE * FRAME_SIZE)
        .map(|i| if i % FRAME_SIZE < FRAME_SIZE / 2 { 30 } else { 210 })
        .collect();
    Frame::new(data, FRAME_SIZE, FRAME_SIZE)
}

// ===== Frame source =====

#[derive(Default)]
pub struct ManualState {
    pub pending: VecDeque<FrameCallback>,
    pub requests: usize,
    pub zoom_calls: Vec<u32>,
    pub zoom: ZoomCapability,
    pub focus_triggers: usize,
    pub focus_cancels: usize,
    pub torch: bool,
    pub previewing: bool,
    pub fail_preview: bool,
    pub fail_requests: bool,
}

/// Test-side handle on a [`ManualSource`]
#[derive(Clone)]
pub struct ManualControl(Arc<Mutex<ManualState>>);

impl ManualControl {
    pub fn with<T>(&self, f: impl FnOnce(&mut ManualState) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }

    pub fn requests(&self) -> usize {
        self.with(|s| s.requests)
    }

    /// Answer the oldest pending request with `frame`
    pub fn deliver(&self, frame: Frame) -> bool {
        let callback = self.with(|s| s.pending.pop_front());
        match callback {
            Some(callback) => {
                callback(Ok(frame));
                true
            }
            None => false,
        }
    }

    /// Answer the oldest pending request with an error
    pub fn fail(&self, error: SourceError) -> bool {
        let callback = self.with(|s| s.pending.pop_front());
        match callback {
            Some(callback) => {
                callback(Err(error));
                true
            }
            None => false,
        }
    }

    /// Poll until `count` requests were made or `timeout` passed
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.requests() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.requests() >= count
    }
}

/// Source that holds frame requests until the test answers them
pub struct ManualSource {
    state: Arc<Mutex<ManualState>>,
    focus_mode: FocusMode,
}

impl ManualSource {
    pub fn new(focus_mode: FocusMode) -> (Self, ManualControl) {
        let state = Arc::new(Mutex::new(ManualState {
            zoom: ZoomCapability {
                supported: true,
                current: 0,
                max: 50,
            },
            ..ManualState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
                focus_mode,
            },
            ManualControl(state),
        )
    }
}

impl FrameSource for ManualSource {
    fn name(&self) -> &str {
        "manual"
    }

    fn start_preview(&mut self) -> SourceResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_preview {
            return Err(SourceError::OpenFailed("device busy".into()));
        }
        state.previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) -> SourceResult<()> {
        self.state.lock().unwrap().previewing = false;
        Ok(())
    }

    fn request_frame(&mut self, callback: FrameCallback) -> SourceResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_requests {
            return Err(SourceError::RequestFailed("stream ended".into()));
        }
        state.requests += 1;
        state.pending.push_back(callback);
        Ok(())
    }

    fn source_resolution(&self) -> Resolution {
        Resolution::new(FRAME_SIZE, FRAME_SIZE)
    }

    fn screen_resolution(&self) -> Resolution {
        Resolution::new(FRAME_SIZE, FRAME_SIZE)
    }

    fn focus_mode(&self) -> FocusMode {
        self.focus_mode.clone()
    }

    fn trigger_focus(&mut self, callback: FocusCallback) -> SourceResult<()> {
        self.state.lock().unwrap().focus_triggers += 1;
        callback(true);
        Ok(())
    }

    fn cancel_focus(&mut self) -> SourceResult<()> {
        self.state.lock().unwrap().focus_cancels += 1;
        Ok(())
    }

    fn zoom_capability(&self) -> ZoomCapability {
        self.state.lock().unwrap().zoom
    }

    fn set_zoom(&mut self, level: u32) -> SourceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.zoom_calls.push(level);
        state.zoom.current = level;
        Ok(())
    }

    fn set_torch(&mut self, on: bool) -> SourceResult<()> {
        self.state.lock().unwrap().torch = on;
        Ok(())
    }
}

// ===== Reader =====

/// Results handed out one per decode attempt; an empty script fails
#[derive(Clone, Default)]
pub struct Script {
    results: Arc<Mutex<VecDeque<Symbol>>>,
    pub attempts: Arc<AtomicUsize>,
    pub overlapped: Arc<AtomicBool>,
    /// Point reported through the hints before every attempt
    pub possible_point: Arc<Mutex<Option<ResultPoint>>>,
    /// Time each attempt takes
    pub decode_time: Arc<Mutex<Duration>>,
}

impl Script {
    pub fn push(&self, symbol: Symbol) {
        self.results.lock().unwrap().push_back(symbol);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

pub fn ean13(text: &str) -> Symbol {
    Symbol {
        payload: text.as_bytes().to_vec(),
        format: BarcodeFormat::Ean13,
        points: Vec::new(),
    }
}

/// A QR code whose extent (about 7 px) is small in a 64 px wide frame
pub fn small_qr(text: &str) -> Symbol {
    Symbol {
        payload: text.as_bytes().to_vec(),
        format: BarcodeFormat::QrCode,
        points: vec![
            ResultPoint::new(10.0, 10.0),
            ResultPoint::new(15.0, 10.0),
            ResultPoint::new(10.0, 15.0),
        ],
    }
}

pub struct ScriptedReader {
    script: Script,
    hints: DecodeHints,
    busy: AtomicBool,
}

impl ScriptedReader {
    pub fn new(script: Script, hints: DecodeHints) -> Self {
        Self {
            script,
            hints,
            busy: AtomicBool::new(false),
        }
    }
}

impl SymbolReader for ScriptedReader {
    fn decode(&mut self, _image: &BitMatrix) -> Result<Symbol, ReadError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.script.overlapped.store(true, Ordering::SeqCst);
        }
        self.script.attempts.fetch_add(1, Ordering::SeqCst);

        if let (Some(point), Some(callback)) = (
            *self.script.possible_point.lock().unwrap(),
            &self.hints.result_point_callback,
        ) {
            callback.found_possible_result_point(point);
        }

        // Simulate work so overlapping calls would be caught
        let decode_time = *self.script.decode_time.lock().unwrap();
        std::thread::sleep(decode_time.max(Duration::from_millis(1)));
        let result = self
            .script
            .results
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ReadError::NotFound);
        self.busy.store(false, Ordering::SeqCst);
        result
    }
}

// ===== Listener =====

#[derive(Debug)]
pub enum Event {
    Success {
        success: DecodeSuccess,
        thread: Option<String>,
    },
    Point(ResultPoint),
    Error(CaptureError),
    Torch(bool),
}

pub struct RecordingListener {
    events: Sender<Event>,
    /// Time spent in each success callback after recording it
    hold: Arc<Mutex<Duration>>,
}

impl CaptureListener for RecordingListener {
    fn on_decode_success(&self, success: &DecodeSuccess) {
        let _ = self.events.send(Event::Success {
            success: success.clone(),
            thread: std::thread::current().name().map(str::to_string),
        });
        let hold = *self.hold.lock().unwrap();
        std::thread::sleep(hold);
    }

    fn on_possible_result_point(&self, point: ResultPoint) {
        let _ = self.events.send(Event::Point(point));
    }

    fn on_capture_error(&self, error: &CaptureError) {
        let _ = self.events.send(Event::Error(error.clone()));
    }

    fn on_torch_changed(&self, on: bool) {
        let _ = self.events.send(Event::Torch(on));
    }
}

// ===== Harness =====

pub struct Harness {
    pub coordinator: CaptureCoordinator,
    pub source: ManualControl,
    pub script: Script,
    pub events: Receiver<Event>,
    pub listener_hold: Arc<Mutex<Duration>>,
    // Dropped last: the coordinator's autofocus tasks run on it
    _runtime: tokio::runtime::Runtime,
}

impl Harness {
    /// Next listener event that is not a result point
    pub fn next_event(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(Event::Point(_)) => continue,
                Ok(event) => return Some(event),
                Err(_) => return None,
            }
        }
    }
}

/// Config scanning the whole 64x64 test frame, no auto zoom
pub fn test_config() -> ScanConfig {
    ScanConfig {
        full_screen_scan: true,
        support_auto_zoom: false,
        ..ScanConfig::default()
    }
}

pub fn harness(config: ScanConfig, focus_mode: FocusMode) -> Harness {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (source, control) = ManualSource::new(focus_mode);
    let (events, received) = mpsc::channel();
    let script = Script::default();
    let listener_hold = Arc::new(Mutex::new(Duration::ZERO));

    let reader_script = script.clone();
    let coordinator = CaptureCoordinator::builder(
        Box::new(source),
        Arc::new(RecordingListener {
            events,
            hold: Arc::clone(&listener_hold),
        }),
    )
    .config(config)
    .reader_factory(move |hints| Box::new(ScriptedReader::new(reader_script, hints)))
    .runtime(runtime.handle().clone())
    .build()
    .unwrap();

    Harness {
        coordinator,
        source: control,
        script,
        events: received,
        listener_hold,
        _runtime: runtime,
    }
}
