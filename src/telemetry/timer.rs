// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{
    sync::Mutex,
    time::Instant,
};

use crate::core::domain::StreamHandle;

/// Abstraction over a pair of stream-tied start/end events.
///
/// `start`/`stop` never block; `synchronize` blocks until the end event has
/// been signaled; `elapsed_seconds` reads the gap once both are complete.
/// The production device-runtime implementation (real on-device events) is
/// out of this crate's scope (§1); [`HostClock`] is the fallback this crate
/// ships, selected whenever no device clock is registered (§4.8).
pub trait DeviceClock: Send + Sync {
    fn start(&self, stream: StreamHandle);
    fn stop(&self, stream: StreamHandle);
    fn synchronize(&self);
    fn elapsed_seconds(&self) -> f64;
}

/// Host monotonic-clock fallback; stream arguments are accepted but ignored
/// since `std::time::Instant` has no notion of a device stream.
#[derive(Default)]
pub struct HostClock {
    start: Mutex<Option<Instant>>,
    end: Mutex<Option<Instant>>,
}

impl DeviceClock for HostClock {
    fn start(&self, _stream: StreamHandle) {
        *self.start.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn stop(&self, _stream: StreamHandle) {
        *self.end.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn synchronize(&self) {
        // Host timestamps are already settled the instant they're recorded.
    }

    fn elapsed_seconds(&self) -> f64 {
        let start = *self.start.lock().unwrap_or_else(|e| e.into_inner());
        let end = *self.end.lock().unwrap_or_else(|e| e.into_inner());
        match (start, end) {
            (Some(s), Some(e)) if e >= s => (e - s).as_secs_f64(),
            _ => 0.0,
        }
    }
}

/// A reusable, stream-tied start/end event pair.
///
/// A subsequent `start` overwrites the previous recording (§4.8); the crate
/// never allocates a new `Timer` per launch, it reuses the one the owning
/// [`crate::core::domain::Domain`] holds.
pub struct Timer {
    clock: Box<dyn DeviceClock>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self::with_clock(Box::new(HostClock::default()))
    }

    pub fn with_clock(clock: Box<dyn DeviceClock>) -> Self {
        Self { clock }
    }

    pub fn start(&self, stream: StreamHandle) {
        self.clock.start(stream);
    }

    pub fn stop(&self, stream: StreamHandle) {
        self.clock.stop(stream);
    }

    pub fn synchronize(&self) {
        self.clock.synchronize();
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.clock.elapsed_seconds()
    }
}
