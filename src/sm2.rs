//! Implements the SM-2 spaced-repetition scheduling algorithm.
//!
//! SM-2 tracks three values per item: the easiness factor, which scales how quickly the review
//! interval grows, the repetition number, which counts the current streak of successful reviews,
//! and the interval in days until the next review. A quality rating between 0 and 5 drives each
//! transition. Ratings below 3 are failures that reset the streak, while ratings of 3 and above
//! walk the interval through the well-known 1, 6, round(interval × EF) progression.
//!
//! The function in this module is pure. It performs no I/O and reads no clocks other than the
//! `now` timestamp supplied by the caller, which makes its behavior fully reproducible in tests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The easiness factor assigned to an item that has never been reviewed.
pub const INITIAL_EASINESS_FACTOR: f64 = 2.5;

/// The minimum value of the easiness factor. SM-2 clamps the factor here so that difficult items
/// do not collapse into being reviewed every day forever.
pub const MIN_EASINESS_FACTOR: f64 = 1.3;

/// The maximum value of the easiness factor.
pub const MAX_EASINESS_FACTOR: f64 = 2.5;

/// The lowest quality rating that counts as a successful review.
pub const PASSING_QUALITY: u8 = 3;

/// The maximum quality rating.
pub const MAX_QUALITY: u8 = 5;

/// The interval in days assigned after the first successful review.
const FIRST_INTERVAL_DAYS: u32 = 1;

/// The interval in days assigned after the second successful review.
const SECOND_INTERVAL_DAYS: u32 = 6;

/// The scheduling state of a single item.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Sm2State {
    /// The easiness factor, always in the range
    /// [[`MIN_EASINESS_FACTOR`], [`MAX_EASINESS_FACTOR`]].
    pub easiness_factor: f64,

    /// The number of consecutive successful reviews.
    pub repetition_number: u32,

    /// The current review interval in days.
    pub interval_days: u32,
}

impl Default for Sm2State {
    fn default() -> Self {
        Self {
            easiness_factor: INITIAL_EASINESS_FACTOR,
            repetition_number: 0,
            interval_days: 0,
        }
    }
}

/// The result of scheduling a review.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sm2Update {
    /// The state after the review.
    pub state: Sm2State,

    /// The time at which the item is due for review again.
    pub next_review: DateTime<Utc>,
}

/// Returns the delta applied to the easiness factor for the given quality rating.
fn easiness_delta(quality: u8) -> f64 {
    let q = f64::from(quality);
    0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02)
}

/// Applies one SM-2 transition to the given state.
///
/// The quality rating is clamped to the valid range before use. A failing rating resets the
/// repetition streak and schedules the item for review the next day without touching the easiness
/// factor. A passing rating grows the interval and adjusts the easiness factor, clamped to its
/// valid range.
#[must_use]
pub fn schedule(state: Sm2State, quality: u8, now: DateTime<Utc>) -> Sm2Update {
    let quality = quality.min(MAX_QUALITY);

    let new_state = if quality < PASSING_QUALITY {
        // A failure resets the streak. The easiness factor is left untouched so that a single bad
        // day does not permanently slow down an otherwise well-known item.
        Sm2State {
            easiness_factor: state.easiness_factor,
            repetition_number: 0,
            interval_days: FIRST_INTERVAL_DAYS,
        }
    } else {
        let interval_days = match state.repetition_number {
            0 => FIRST_INTERVAL_DAYS,
            1 => SECOND_INTERVAL_DAYS,
            _ => {
                let scaled = f64::from(state.interval_days) * state.easiness_factor;
                scaled.round().max(1.0) as u32
            }
        };
        let easiness_factor = (state.easiness_factor + easiness_delta(quality))
            .clamp(MIN_EASINESS_FACTOR, MAX_EASINESS_FACTOR);
        Sm2State {
            easiness_factor,
            repetition_number: state.repetition_number + 1,
            interval_days,
        }
    };

    Sm2Update {
        state: new_state,
        next_review: now + Duration::days(i64::from(new_state.interval_days)),
    }
}
