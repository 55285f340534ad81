// SPDX-License-Identifier: GPL-3.0-only

//! Capture coordinator
//!
//! The top-level state machine of a scan session:
//!
//! ```text
//!   Idle ──start()──▶ Preview ──decode success──▶ Success
//!    │                 │  ▲ ▲                          │
//!    │                 │  │ └────────resume()──────────┘
//!    │                 │  └─decode failure: request next frame
//!    └──stop()─────────┴──────────stop()───────────────┴──▶ Done
//! ```
//!
//! Three threads take part: the caller, the decode worker, and a control
//! thread that serializes worker reports and drives the listener. Listener
//! callbacks only ever run on the control thread, never while the session
//! lock is held, and never after `stop()` has marked the session done.

use crate::backends::source::{FrameSource, SourceLease, SourceManager};
use crate::config::ScanConfig;
use crate::constants::worker;
use crate::errors::{CaptureError, CaptureResult, SourceError, SourceResult};
use crate::scan::autofocus::AutoFocusScheduler;
use crate::scan::geometry::{RegionCache, ResultPoint, to_display};
use crate::scan::reader::{DecodeHints, ReaderFactory, ResultPointCallback, RqrrReader, SymbolReader};
use crate::scan::worker::{
    DecodeOutcome, DecodeReport, DecodeSuccess, DecodeWorker, WorkerMessage, WorkerOptions,
};
use crate::scan::zoom::ZoomController;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Built, not started
    Idle,
    /// Requesting and decoding frames
    Preview,
    /// A result was delivered; frame requests paused until `resume()`
    Success,
    /// Stopped; no further requests or notifications
    Done,
}

/// Receives the results of a capture session
///
/// All methods are called on the session's control thread.
pub trait CaptureListener: Send + Sync {
    fn on_decode_success(&self, success: &DecodeSuccess);

    /// Point of a candidate symbol, in display coordinates
    fn on_possible_result_point(&self, _point: ResultPoint) {}

    /// The source failed after the session started
    fn on_capture_error(&self, _error: &CaptureError) {}

    fn on_torch_changed(&self, _on: bool) {}
}

/// Events handled by the control thread
enum ControlEvent {
    Decoded(DecodeReport),
    PossiblePoint(ResultPoint),
    FrameError(SourceError),
    TorchChanged(bool),
    Shutdown,
}

/// Forwards reader result points to the control thread
struct PointForwarder {
    events: Sender<ControlEvent>,
}

impl ResultPointCallback for PointForwarder {
    fn found_possible_result_point(&self, point: ResultPoint) {
        let _ = self.events.send(ControlEvent::PossiblePoint(point));
    }
}

/// A helper thread and the channel its shutdown acknowledgement arrives on
struct Thread {
    handle: JoinHandle<()>,
    ack: Receiver<()>,
}

impl Thread {
    /// Wait for the acknowledgement until `deadline`, then join
    fn finish(self, name: &str, deadline: Instant) {
        if self.handle.thread().id() == thread::current().id() {
            // Stopped from a listener callback; the loop exits once it returns
            return;
        }
        match self
            .ack
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
        {
            Ok(()) => {
                let _ = self.handle.join();
            }
            Err(_) => warn!(thread = name, "Thread did not acknowledge shutdown in time"),
        }
    }
}

struct Session {
    state: CaptureState,
    reader_factory: Option<ReaderFactory>,
    worker_tx: Option<Sender<WorkerMessage>>,
    control_tx: Option<Sender<ControlEvent>>,
    worker: Option<Thread>,
    control: Option<Thread>,
    autofocus: Option<AutoFocusScheduler>,
}

impl Session {
    fn transition(&mut self, next: CaptureState) {
        debug!(from = ?self.state, to = ?next, "Capture state transition");
        self.state = next;
    }
}

struct Inner {
    manager: SourceManager,
    lease: SourceLease,
    listener: Arc<dyn CaptureListener>,
    config: ScanConfig,
    runtime: Handle,
    session: Mutex<Session>,
}

/// Builder for [`CaptureCoordinator`]
pub struct CaptureCoordinatorBuilder {
    source: Box<dyn FrameSource>,
    listener: Arc<dyn CaptureListener>,
    config: ScanConfig,
    reader_factory: Option<ReaderFactory>,
    runtime: Option<Handle>,
}

impl CaptureCoordinatorBuilder {
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Reader used by the decode worker (defaults to [`RqrrReader`])
    pub fn reader_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(DecodeHints) -> Box<dyn SymbolReader> + Send + 'static,
    {
        self.reader_factory = Some(Box::new(factory));
        self
    }

    /// Runtime that runs deferred autofocus tasks (defaults to the current one)
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> CaptureResult<CaptureCoordinator> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| {
                CaptureError::Worker("no tokio runtime available for focus scheduling".into())
            })?,
        };

        let manager = SourceManager::new(self.source);
        let lease = manager.lease();
        Ok(CaptureCoordinator {
            inner: Arc::new(Inner {
                manager,
                lease,
                listener: self.listener,
                config: self.config,
                runtime,
                session: Mutex::new(Session {
                    state: CaptureState::Idle,
                    reader_factory: self.reader_factory,
                    worker_tx: None,
                    control_tx: None,
                    worker: None,
                    control: None,
                    autofocus: None,
                }),
            }),
        })
    }
}

/// Drives one scan session over a frame source
pub struct CaptureCoordinator {
    inner: Arc<Inner>,
}

impl CaptureCoordinator {
    pub fn builder(source: Box<dyn FrameSource>, listener: Arc<dyn CaptureListener>) -> CaptureCoordinatorBuilder {
        CaptureCoordinatorBuilder {
            source,
            listener,
            config: ScanConfig::default(),
            reader_factory: None,
            runtime: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().state
    }

    /// Start preview, the decode worker and autofocus, and request the first frame
    ///
    /// Does nothing when already started. Fails with [`CaptureError::Closed`]
    /// after `stop()`, and with the source error when the source cannot
    /// preview or refuses the first request (the session is then stopped).
    pub fn start(&self) -> CaptureResult<()> {
        {
            let mut session = self.inner.lock();
            match session.state {
                CaptureState::Preview | CaptureState::Success => return Ok(()),
                CaptureState::Done => return Err(CaptureError::Closed),
                CaptureState::Idle => {}
            }

            self.inner.lease.start_preview()?;
            if let Err(e) = self.inner.launch(&mut session) {
                if let Err(stop_err) = self.inner.lease.stop_preview() {
                    warn!(error = %stop_err, "Failed to stop preview");
                }
                return Err(e);
            }
            session.transition(CaptureState::Preview);

            let autofocus = AutoFocusScheduler::new(
                self.inner.lease.clone(),
                self.inner.runtime.clone(),
                self.inner.config.auto_focus,
            );
            autofocus.start();
            session.autofocus = Some(autofocus);
        }

        info!("Capture session started");
        if let Err(e) = self.inner.request_frame() {
            warn!(error = %e, "First frame request failed");
            self.stop();
            return Err(e.into());
        }
        Ok(())
    }

    /// Leave `Success` and request the next frame; no-op in any other state
    pub fn resume(&self) {
        {
            let mut session = self.inner.lock();
            if session.state != CaptureState::Success {
                trace!(state = ?session.state, "Ignoring resume");
                return;
            }
            session.transition(CaptureState::Preview);
        }
        self.inner.request_next_frame();
    }

    /// Switch the torch, restarting autofocus around the change
    pub fn set_torch(&self, on: bool) -> CaptureResult<()> {
        let mut session = self.inner.lock();
        if session.state == CaptureState::Done {
            return Err(CaptureError::Closed);
        }

        if let Some(autofocus) = session.autofocus.take() {
            autofocus.stop();
        }
        let result = self.inner.lease.set_torch(on);
        if matches!(session.state, CaptureState::Preview | CaptureState::Success) {
            let autofocus = AutoFocusScheduler::new(
                self.inner.lease.clone(),
                self.inner.runtime.clone(),
                self.inner.config.auto_focus,
            );
            autofocus.start();
            session.autofocus = Some(autofocus);
        }
        result?;

        debug!(on, "Torch switched");
        if let Some(events) = &session.control_tx {
            let _ = events.send(ControlEvent::TorchChanged(on));
        }
        Ok(())
    }

    /// End the session
    ///
    /// Stops frame requests and autofocus, asks the worker and control
    /// threads to exit and waits for both within one shared bound, then
    /// releases the source. Calling it again has no effect.
    pub fn stop(&self) {
        let (worker_tx, control_tx, worker, control, autofocus) = {
            let mut session = self.inner.lock();
            if session.state == CaptureState::Done {
                return;
            }
            let started = session.state != CaptureState::Idle;
            session.transition(CaptureState::Done);
            if !started {
                drop(session);
                self.inner.manager.release();
                return;
            }
            (
                session.worker_tx.take(),
                session.control_tx.take(),
                session.worker.take(),
                session.control.take(),
                session.autofocus.take(),
            )
        };

        if let Some(autofocus) = autofocus {
            autofocus.stop();
        }
        if let Err(e) = self.inner.lease.stop_preview() {
            warn!(error = %e, "Failed to stop preview");
        }

        // One bound covers both threads
        let deadline = Instant::now() + worker::SHUTDOWN_ACK_TIMEOUT;
        if let Some(tx) = worker_tx {
            let _ = tx.send(WorkerMessage::Terminate);
        }
        if let Some(tx) = control_tx {
            let _ = tx.send(ControlEvent::Shutdown);
        }
        if let Some(worker) = worker {
            worker.finish(worker::THREAD_NAME, deadline);
        }
        if let Some(control) = control {
            control.finish(worker::CONTROL_THREAD_NAME, deadline);
        }

        self.inner.manager.release();
        info!("Capture session stopped");
    }
}

impl Drop for CaptureCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the decode worker and the control thread
    fn launch(self: &Arc<Self>, session: &mut Session) -> CaptureResult<()> {
        let (control_tx, control_rx) = mpsc::channel();
        let (worker_tx, worker_rx) = mpsc::channel();

        let hints = DecodeHints::from_config(&self.config).with_result_point_callback(Arc::new(
            PointForwarder {
                events: control_tx.clone(),
            },
        ));
        let factory = session
            .reader_factory
            .take()
            .unwrap_or_else(RqrrReader::factory);
        let reader = factory(hints);

        let screen = self.lease.screen_resolution()?;
        let regions = RegionCache::new(self.config.region.clone(), self.config.full_screen_scan);
        let zoom = self
            .config
            .support_auto_zoom
            .then(|| ZoomController::new(self.lease.clone()));
        let decode_worker = DecodeWorker::new(
            reader,
            regions,
            zoom,
            WorkerOptions::from_config(&self.config),
            screen,
        );

        let (worker_ack_tx, worker_ack_rx) = mpsc::channel();
        let reports = control_tx.clone();
        let worker_handle = decode_worker
            .spawn(
                worker_rx,
                move |report| {
                    let _ = reports.send(ControlEvent::Decoded(report));
                },
                worker_ack_tx,
            )
            .map_err(|e| CaptureError::Worker(e.to_string()))?;

        let (control_ack_tx, control_ack_rx) = mpsc::channel();
        let inner = Arc::clone(self);
        let control_handle = thread::Builder::new()
            .name(worker::CONTROL_THREAD_NAME.to_string())
            .spawn(move || inner.control_loop(control_rx, control_ack_tx))
            .map_err(|e| CaptureError::Worker(e.to_string()))?;

        session.worker_tx = Some(worker_tx);
        session.control_tx = Some(control_tx);
        session.worker = Some(Thread {
            handle: worker_handle,
            ack: worker_ack_rx,
        });
        session.control = Some(Thread {
            handle: control_handle,
            ack: control_ack_rx,
        });
        Ok(())
    }

    fn control_loop(self: Arc<Self>, events: Receiver<ControlEvent>, ack: Sender<()>) {
        debug!("Capture control loop started");
        // Success held back while a zoom settles
        let mut pending: Option<(Instant, DecodeSuccess)> = None;

        loop {
            let deadline = pending.as_ref().map(|(deadline, _)| *deadline);
            let event = if let Some(deadline) = deadline {
                let wait = deadline.saturating_duration_since(Instant::now());
                match events.recv_timeout(wait) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some((_, success)) = pending.take() {
                            self.on_decode_success(success);
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match events.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                }
            };

            match event {
                ControlEvent::Decoded(report) => match report.outcome {
                    DecodeOutcome::Failure => self.on_decode_failure(),
                    DecodeOutcome::Success(success) => match report.notify_after {
                        Some(delay) if !delay.is_zero() => {
                            trace!(delay_ms = delay.as_millis() as u64, "Delaying decode result");
                            pending = Some((Instant::now() + delay, success));
                        }
                        _ => self.on_decode_success(success),
                    },
                },
                ControlEvent::PossiblePoint(point) => self.found_possible_result_point(point),
                ControlEvent::FrameError(e) => self.on_frame_error(e),
                ControlEvent::TorchChanged(on) => {
                    if self.lock().state != CaptureState::Done {
                        self.listener.on_torch_changed(on);
                    }
                }
                ControlEvent::Shutdown => {
                    if pending.is_some() {
                        trace!("Discarding delayed decode result");
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }
        debug!("Capture control loop exiting");
    }

    fn on_decode_success(&self, success: DecodeSuccess) {
        {
            let mut session = self.lock();
            if session.state == CaptureState::Done {
                trace!("Discarding decode result after stop");
                return;
            }
            session.transition(CaptureState::Success);
        }
        self.listener.on_decode_success(&success);
    }

    fn on_decode_failure(&self) {
        let state = self.lock().state;
        if state == CaptureState::Preview {
            self.request_next_frame();
        } else {
            trace!(state = ?state, "Decode failure outside preview, not requesting");
        }
    }

    fn on_frame_error(&self, error: SourceError) {
        if self.lock().state == CaptureState::Done {
            trace!(error = %error, "Discarding source error after stop");
            return;
        }
        self.listener.on_capture_error(&CaptureError::Source(error));
    }

    fn found_possible_result_point(&self, point: ResultPoint) {
        if self.lock().state == CaptureState::Done {
            return;
        }
        let (Ok(screen), Ok(source)) = (self.lease.screen_resolution(), self.lease.source_resolution())
        else {
            return;
        };
        self.listener
            .on_possible_result_point(to_display(point, screen, source));
    }

    /// Ask the source for one frame, routed to the worker on delivery
    fn request_frame(&self) -> SourceResult<()> {
        let (worker_tx, control_tx) = {
            let session = self.lock();
            match (&session.worker_tx, &session.control_tx) {
                (Some(worker_tx), Some(control_tx)) => (worker_tx.clone(), control_tx.clone()),
                _ => return Err(SourceError::Inactive),
            }
        };

        self.lease.request_frame(move |result| match result {
            Ok(frame) => {
                if worker_tx.send(WorkerMessage::Decode(frame)).is_err() {
                    trace!("Decode worker gone, dropping frame");
                }
            }
            Err(e) => {
                let _ = control_tx.send(ControlEvent::FrameError(e));
            }
        })
    }

    /// Request a frame; failures reach the listener through the control thread
    fn request_next_frame(&self) {
        match self.request_frame() {
            Ok(()) => {}
            Err(SourceError::Inactive) => trace!("Session ended, not requesting"),
            Err(e) => {
                warn!(error = %e, "Frame request failed");
                if let Some(events) = &self.lock().control_tx {
                    let _ = events.send(ControlEvent::FrameError(e));
                }
            }
        }
    }
}
