// Deterministic clock for tests

use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Clock that only moves when told to, in milliseconds since epoch.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub(crate) struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub(crate) fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub(crate) fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub(crate) fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.utc().timestamp_millis(), 15);
        other.set(3);
        assert_eq!(clock.utc().timestamp_millis(), 3);
    }
}
