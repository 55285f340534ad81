// SPDX-License-Identifier: GPL-3.0-only

//! Periodic autofocus
//!
//! Sources in `auto` or `macro` focus mode only focus when asked. While a
//! capture session is previewing, the scheduler asks for a focus cycle,
//! waits for it to complete, then asks again after a fixed interval.
//!
//! At most one focus cycle and one deferred re-focus exist at any time.
//! Deferred re-focus tasks carry the generation they were scheduled in and
//! re-check it, the stop flag, and the source lease right before acting.

use crate::backends::source::SourceLease;
use crate::constants::focus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

#[derive(Default)]
struct FocusState {
    stopped: bool,
    focusing: bool,
    outstanding: Option<JoinHandle<()>>,
    /// Bumped whenever pending deferred tasks become stale
    generation: u64,
}

struct FocusShared {
    lease: SourceLease,
    runtime: Handle,
    use_auto_focus: bool,
    interval: Duration,
    state: Mutex<FocusState>,
}

/// Autofocus scheduler for one preview session
pub struct AutoFocusScheduler {
    shared: Arc<FocusShared>,
}

impl AutoFocusScheduler {
    /// Create a scheduler for the source behind `lease`
    ///
    /// Whether autofocus applies is decided once, here: the configuration
    /// must allow it and the source's focus mode must need explicit calls.
    pub fn new(lease: SourceLease, runtime: Handle, enabled: bool) -> Self {
        let use_auto_focus = match lease.focus_mode() {
            Ok(mode) => {
                let use_auto_focus = enabled && mode.needs_focus_calls();
                info!(mode = %mode, use_auto_focus, "Current focus mode; use auto focus?");
                use_auto_focus
            }
            Err(e) => {
                warn!(error = %e, "Cannot read focus mode, autofocus disabled");
                false
            }
        };

        Self {
            shared: Arc::new(FocusShared {
                lease,
                runtime,
                use_auto_focus,
                interval: focus::AUTO_FOCUS_INTERVAL,
                state: Mutex::new(FocusState::default()),
            }),
        }
    }

    pub fn uses_auto_focus(&self) -> bool {
        self.shared.use_auto_focus
    }

    /// Issue a focus request unless stopped or already focusing
    pub fn start(&self) {
        self.shared.start();
    }

    /// Stop focusing and cancel the pending re-focus
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_focusing(&self) -> bool {
        self.shared.lock().focusing
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    /// Whether a deferred re-focus is scheduled
    pub fn has_outstanding_task(&self) -> bool {
        self.shared.lock().outstanding.is_some()
    }
}

impl FocusShared {
    fn lock(&self) -> MutexGuard<'_, FocusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: &Arc<Self>) {
        if !self.use_auto_focus {
            return;
        }

        {
            let mut state = self.lock();
            // A task still pending from before is superseded by this call
            state.outstanding = None;
            state.generation += 1;
            if state.stopped || state.focusing {
                return;
            }
            state.focusing = true;
        }

        // The source may complete focus synchronously, so no lock is held here
        let weak = Arc::downgrade(self);
        let result = self.lease.trigger_focus(move |success| {
            if let Some(shared) = weak.upgrade() {
                shared.on_focus_complete(success);
            }
        });

        if let Err(e) = result {
            warn!(error = %e, "Unexpected exception while focusing");
            let mut state = self.lock();
            state.focusing = false;
            self.schedule_again(&mut state);
        }
    }

    fn on_focus_complete(self: &Arc<Self>, success: bool) {
        trace!(success, "Focus cycle completed");
        let mut state = self.lock();
        state.focusing = false;
        self.schedule_again(&mut state);
    }

    fn schedule_again(self: &Arc<Self>, state: &mut FocusState) {
        if state.stopped || state.outstanding.is_some() {
            return;
        }

        let generation = state.generation;
        let interval = self.interval;
        let weak: Weak<Self> = Arc::downgrade(self);
        state.outstanding = Some(self.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(shared) = weak.upgrade() {
                shared.run_deferred(generation);
            }
        }));
    }

    fn run_deferred(self: &Arc<Self>, generation: u64) {
        // Checked before taking the focus lock: the lease lock is held while
        // focus callbacks run
        if !self.lease.is_active() {
            trace!("Source released, skipping deferred focus");
            return;
        }

        {
            let mut state = self.lock();
            if state.stopped || state.generation != generation {
                trace!("Deferred focus is stale");
                return;
            }
            state.outstanding = None;
        }
        self.start();
    }

    fn stop(&self) {
        {
            let mut state = self.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.generation += 1;
            if let Some(task) = state.outstanding.take() {
                task.abort();
            }
        }

        if self.use_auto_focus {
            debug!("Cancelling auto focus");
            if let Err(e) = self.lease.cancel_focus() {
                warn!(error = %e, "Unexpected exception while cancelling focusing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::source::{
        FocusCallback, FocusMode, FrameCallback, FrameSource, SourceManager, ZoomCapability,
    };
    use crate::errors::{SourceError, SourceResult};
    use crate::scan::geometry::Resolution;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// How the fake source answers focus calls
    #[derive(Clone, Copy)]
    enum FocusBehavior {
        /// Completes every cycle immediately with this outcome
        Complete(bool),
        /// Refuses both focus and cancel calls
        Refuse,
    }

    struct InstantFocus {
        mode: FocusMode,
        behavior: FocusBehavior,
        triggers: Arc<AtomicU32>,
        cancels: Arc<AtomicU32>,
    }

    impl FrameSource for InstantFocus {
        fn name(&self) -> &str {
            "instant-focus"
        }
        fn start_preview(&mut self) -> SourceResult<()> {
            Ok(())
        }
        fn stop_preview(&mut self) -> SourceResult<()> {
            Ok(())
        }
        fn request_frame(&mut self, _callback: FrameCallback) -> SourceResult<()> {
            Ok(())
        }
        fn source_resolution(&self) -> Resolution {
            Resolution::new(640, 480)
        }
        fn screen_resolution(&self) -> Resolution {
            Resolution::new(640, 480)
        }
        fn focus_mode(&self) -> FocusMode {
            self.mode.clone()
        }
        fn trigger_focus(&mut self, callback: FocusCallback) -> SourceResult<()> {
            self.triggers.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                FocusBehavior::Complete(success) => {
                    callback(success);
                    Ok(())
                }
                FocusBehavior::Refuse => Err(SourceError::Other("focus busy".into())),
            }
        }
        fn cancel_focus(&mut self) -> SourceResult<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                FocusBehavior::Complete(_) => Ok(()),
                FocusBehavior::Refuse => Err(SourceError::Unsupported("focus cancel")),
            }
        }
        fn zoom_capability(&self) -> ZoomCapability {
            ZoomCapability::UNSUPPORTED
        }
        fn set_zoom(&mut self, _level: u32) -> SourceResult<()> {
            Ok(())
        }
    }

    fn setup(mode: FocusMode) -> (SourceManager, Arc<AtomicU32>, Arc<AtomicU32>) {
        setup_with(mode, FocusBehavior::Complete(true))
    }

    fn setup_with(
        mode: FocusMode,
        behavior: FocusBehavior,
    ) -> (SourceManager, Arc<AtomicU32>, Arc<AtomicU32>) {
        let triggers = Arc::new(AtomicU32::new(0));
        let cancels = Arc::new(AtomicU32::new(0));
        let manager = SourceManager::new(Box::new(InstantFocus {
            mode,
            behavior,
            triggers: Arc::clone(&triggers),
            cancels: Arc::clone(&cancels),
        }));
        (manager, triggers, cancels)
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_mode_never_focuses() {
        let (manager, triggers, cancels) = setup(FocusMode::ContinuousPicture);
        let scheduler = AutoFocusScheduler::new(manager.lease(), Handle::current(), true);
        assert!(!scheduler.uses_auto_focus());

        for _ in 0..5 {
            scheduler.start();
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        scheduler.stop();

        assert_eq!(triggers.load(Ordering::SeqCst), 0);
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_by_config() {
        let (manager, triggers, _) = setup(FocusMode::Auto);
        let scheduler = AutoFocusScheduler::new(manager.lease(), Handle::current(), false);
        scheduler.start();
        assert_eq!(triggers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refocus_after_interval_until_stopped() {
        let (manager, triggers, cancels) = setup(FocusMode::Macro);
        let scheduler = AutoFocusScheduler::new(manager.lease(), Handle::current(), true);

        scheduler.start();
        assert_eq!(triggers.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_focusing());
        assert!(scheduler.has_outstanding_task());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(triggers.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(triggers.load(Ordering::SeqCst), 2);

        scheduler.stop();
        assert!(scheduler.is_stopped());
        assert!(!scheduler.has_outstanding_task());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(triggers.load(Ordering::SeqCst), 2);

        // Second stop is a no-op
        scheduler.stop();
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_source_stops_refocus() {
        let (manager, triggers, _) = setup(FocusMode::Auto);
        let scheduler = AutoFocusScheduler::new(manager.lease(), Handle::current(), true);

        scheduler.start();
        manager.release();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(triggers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_focus_retries_until_stopped() {
        let (manager, triggers, cancels) = setup_with(FocusMode::Auto, FocusBehavior::Refuse);
        let scheduler = AutoFocusScheduler::new(manager.lease(), Handle::current(), true);

        scheduler.start();
        assert_eq!(triggers.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_focusing());
        assert!(scheduler.has_outstanding_task());

        tokio::time::sleep(Duration::from_millis(3700)).await;
        assert_eq!(triggers.load(Ordering::SeqCst), 4);

        // A failing cancel is logged, not propagated
        scheduler.stop();
        assert!(scheduler.is_stopped());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(triggers.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_focus_cycle_reschedules_like_success() {
        let (failing, failed_triggers, _) =
            setup_with(FocusMode::Macro, FocusBehavior::Complete(false));
        let (succeeding, succeeded_triggers, _) = setup(FocusMode::Macro);
        let first = AutoFocusScheduler::new(failing.lease(), Handle::current(), true);
        let second = AutoFocusScheduler::new(succeeding.lease(), Handle::current(), true);

        first.start();
        second.start();
        assert!(!first.is_focusing());
        assert!(first.has_outstanding_task());

        // Check between cycles, not on the re-focus deadlines
        tokio::time::sleep(Duration::from_millis(100)).await;
        for expected in 2..=4 {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            assert_eq!(failed_triggers.load(Ordering::SeqCst), expected);
            assert_eq!(
                failed_triggers.load(Ordering::SeqCst),
                succeeded_triggers.load(Ordering::SeqCst)
            );
        }

        first.stop();
        second.stop();
    }
}
