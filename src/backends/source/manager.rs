// SPDX-License-Identifier: GPL-3.0-only

//! Source ownership
//!
//! The manager provides:
//! - Exclusive ownership of the frame source
//! - Leases that lend control access to the focus and zoom controllers
//! - Release on session end: every lease fails with `Inactive` afterwards

use super::{FocusCallback, FocusMode, Frame, FrameCallback, FrameSource, ZoomCapability};
use crate::errors::{SourceError, SourceResult};
use crate::scan::geometry::Resolution;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Internal manager state
struct ManagerState {
    /// The source instance
    source: Box<dyn FrameSource>,
    /// Cleared when the session ends
    active: bool,
}

/// Owner of a frame source
///
/// Created by the capture coordinator; dropping or releasing it ends all
/// access through leases.
pub struct SourceManager {
    state: Arc<Mutex<ManagerState>>,
}

impl SourceManager {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        info!(source = source.name(), "Creating source manager");
        Self {
            state: Arc::new(Mutex::new(ManagerState {
                source,
                active: true,
            })),
        }
    }

    /// Lend access to the source
    pub fn lease(&self) -> SourceLease {
        SourceLease {
            state: Arc::clone(&self.state),
        }
    }

    /// End the session
    ///
    /// Waits for any operation in progress through a lease, then turns every
    /// lease inactive.
    pub fn release(&self) {
        let mut state = lock(&self.state);
        if state.active {
            debug!(source = state.source.name(), "Releasing source");
            state.active = false;
        }
    }
}

impl Drop for SourceManager {
    fn drop(&mut self) {
        self.release();
    }
}

/// Shared control access to a managed source
///
/// Operations fail with [`SourceError::Inactive`] once the manager has been
/// released.
#[derive(Clone)]
pub struct SourceLease {
    state: Arc<Mutex<ManagerState>>,
}

impl SourceLease {
    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    /// Run `f` against the source if the session is still active
    fn with_source<T>(&self, f: impl FnOnce(&mut dyn FrameSource) -> SourceResult<T>) -> SourceResult<T> {
        let mut state = lock(&self.state);
        if !state.active {
            return Err(SourceError::Inactive);
        }
        f(state.source.as_mut())
    }

    pub fn start_preview(&self) -> SourceResult<()> {
        self.with_source(|s| s.start_preview())
    }

    pub fn stop_preview(&self) -> SourceResult<()> {
        self.with_source(|s| s.stop_preview())
    }

    pub fn request_frame(&self, callback: impl FnOnce(SourceResult<Frame>) + Send + 'static) -> SourceResult<()> {
        let callback: FrameCallback = Box::new(callback);
        self.with_source(|s| s.request_frame(callback))
    }

    pub fn source_resolution(&self) -> SourceResult<Resolution> {
        self.with_source(|s| Ok(s.source_resolution()))
    }

    pub fn screen_resolution(&self) -> SourceResult<Resolution> {
        self.with_source(|s| Ok(s.screen_resolution()))
    }

    pub fn focus_mode(&self) -> SourceResult<FocusMode> {
        self.with_source(|s| Ok(s.focus_mode()))
    }

    pub fn trigger_focus(&self, callback: impl FnOnce(bool) + Send + 'static) -> SourceResult<()> {
        let callback: FocusCallback = Box::new(callback);
        self.with_source(|s| s.trigger_focus(callback))
    }

    pub fn cancel_focus(&self) -> SourceResult<()> {
        self.with_source(|s| s.cancel_focus())
    }

    pub fn zoom_capability(&self) -> SourceResult<ZoomCapability> {
        self.with_source(|s| Ok(s.zoom_capability()))
    }

    pub fn set_zoom(&self, level: u32) -> SourceResult<()> {
        self.with_source(|s| s.set_zoom(level))
    }

    pub fn set_torch(&self, on: bool) -> SourceResult<()> {
        self.with_source(|s| s.set_torch(on))
    }
}

fn lock(state: &Mutex<ManagerState>) -> MutexGuard<'_, ManagerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSource {
        requests: Arc<Mutex<u32>>,
    }

    impl FrameSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }
        fn start_preview(&mut self) -> SourceResult<()> {
            Ok(())
        }
        fn stop_preview(&mut self) -> SourceResult<()> {
            Ok(())
        }
        fn request_frame(&mut self, callback: FrameCallback) -> SourceResult<()> {
            *self.requests.lock().unwrap() += 1;
            callback(Ok(Frame::new(vec![0; 4], 2, 2)));
            Ok(())
        }
        fn source_resolution(&self) -> Resolution {
            Resolution::new(2, 2)
        }
        fn screen_resolution(&self) -> Resolution {
            Resolution::new(2, 2)
        }
        fn focus_mode(&self) -> FocusMode {
            FocusMode::Fixed
        }
        fn trigger_focus(&mut self, callback: FocusCallback) -> SourceResult<()> {
            callback(true);
            Ok(())
        }
        fn cancel_focus(&mut self) -> SourceResult<()> {
            Ok(())
        }
        fn zoom_capability(&self) -> ZoomCapability {
            ZoomCapability::UNSUPPORTED
        }
        fn set_zoom(&mut self, _level: u32) -> SourceResult<()> {
            Err(SourceError::Unsupported("zoom"))
        }
    }

    #[test]
    fn test_lease_inactive_after_release() {
        let requests = Arc::new(Mutex::new(0));
        let manager = SourceManager::new(Box::new(CountingSource {
            requests: Arc::clone(&requests),
        }));
        let lease = manager.lease();

        assert!(lease.request_frame(|frame| assert!(frame.is_ok())).is_ok());
        assert_eq!(*requests.lock().unwrap(), 1);

        manager.release();
        assert!(!lease.is_active());
        assert_eq!(lease.request_frame(|_| {}), Err(SourceError::Inactive));
        assert_eq!(lease.cancel_focus(), Err(SourceError::Inactive));
        assert_eq!(*requests.lock().unwrap(), 1);
    }

    #[test]
    fn test_torch_defaults_to_unsupported() {
        let manager = SourceManager::new(Box::new(CountingSource {
            requests: Arc::new(Mutex::new(0)),
        }));
        assert_eq!(
            manager.lease().set_torch(true),
            Err(SourceError::Unsupported("torch"))
        );
    }
}
