//! Cooperative cancellation primitives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A shared stop flag consulted at evaluation boundaries.
///
/// Monotone: once stopped, never un-stops. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Wall-clock budget sampled at search start and checked per iteration.
#[derive(Clone, Debug)]
pub struct Timer {
    start_time: Instant,
    limit: Duration,
}

impl Timer {
    /// `max_seconds == u32::MAX` means unlimited.
    pub fn start(max_seconds: u32) -> Self {
        Self {
            start_time: Instant::now(),
            limit: Duration::from_secs(u64::from(max_seconds)),
        }
    }

    pub fn elapsed(&self) -> Duration {
        Instant::now().duration_since(self.start_time)
    }

    pub fn expired(&self) -> bool {
        self.elapsed() > self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_monotone() {
        let token = StopToken::new();
        assert!(!token.stop_requested());
        token.request_stop();
        assert!(token.stop_requested());
        token.request_stop();
        assert!(token.stop_requested());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = StopToken::new();
        let other = token.clone();
        other.request_stop();
        assert!(token.stop_requested());
    }

    #[test]
    fn unlimited_timer_never_expires() {
        let timer = Timer::start(u32::MAX);
        assert!(!timer.expired());
    }
}
