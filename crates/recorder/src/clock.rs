#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Time source for the engine. Sample timestamps are expected to be in the
/// same millisecond domain as [`Clock::now_ms`].
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds since the clock's origin.
    fn now_ms(&self) -> u64;
    fn wall_time(&self) -> SystemTime;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn wall_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when told to. Used for replays and tests.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
    wall_origin: SystemTime,
}

impl ManualClock {
    pub fn new(wall_origin: SystemTime) -> Self {
        Self {
            now_ms: AtomicU64::new(0),
            wall_origin,
        }
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.fetch_max(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn wall_time(&self) -> SystemTime {
        self.wall_origin + Duration::from_millis(self.now_ms())
    }

    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::default();
        clock.set_ms(5_000);
        clock.set_ms(3_000);
        assert_eq!(clock.now_ms(), 5_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 7_000);
        assert_eq!(
            clock.wall_time(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(7)
        );
    }
}
