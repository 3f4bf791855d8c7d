// Time Provider Port (for testability)

use chrono::{DateTime, NaiveDate, Utc};

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;

    /// Current UTC calendar date
    fn today(&self) -> NaiveDate {
        DateTime::<Utc>::from_timestamp_millis(self.now_millis())
            .unwrap_or_default()
            .date_naive()
    }
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use super::*;

    /// Clock frozen at a fixed instant
    pub struct FixedTimeProvider {
        pub current_time: i64,
    }

    impl FixedTimeProvider {
        pub fn new(current_time: i64) -> Self {
            Self { current_time }
        }
    }

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.current_time
        }
    }
}
