// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use camera_scan::backends::source::FocusMode;
use camera_scan::constants::{focus, worker, zoom};
use std::time::Duration;

#[test]
fn test_focus_modes_calling_auto_focus() {
    for name in focus::MODES_CALLING_AUTO_FOCUS {
        assert!(FocusMode::from_name(name).needs_focus_calls(), "{}", name);
    }
    assert!(!FocusMode::from_name("continuous-picture").needs_focus_calls());
}

#[test]
fn test_timing_constants() {
    assert_eq!(focus::AUTO_FOCUS_INTERVAL, Duration::from_millis(1200));
    assert_eq!(zoom::COOLDOWN, Duration::from_millis(1000));
    assert_eq!(zoom::SETTLE_DELAY_MS, 300);
    // Shutdown waits must stay short enough for a UI thread
    assert!(worker::SHUTDOWN_ACK_TIMEOUT <= Duration::from_millis(100));
}

#[test]
fn test_thread_names_are_distinct() {
    assert_ne!(worker::THREAD_NAME, worker::CONTROL_THREAD_NAME);
}
