//! Defines the clock used by the engine to read the current time.
//!
//! No component reads the wall clock directly. The session manager and the mastery aggregator
//! receive a clock at construction, which lets tests drive review schedules days into the future
//! without waiting for real time to pass.

use chrono::{DateTime, Utc};

/// A trait exposing the current time to the engine.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// A clock that reads the system time. This is the clock used outside of tests.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
