//! Maps answer scores onto SM-2 quality ratings.
//!
//! The answer evaluator produces a score between 0.0 and 1.0, while SM-2 expects an integer
//! quality between 0 and 5. The mapping is a simple band table with two cumulative penalties: one
//! for requesting a hint and one for taking much longer than expected. The penalties never push
//! the quality below zero.

/// The minimum score mapped to a quality of five.
const QUALITY_FIVE_SCORE: f64 = 0.95;

/// The minimum score mapped to a quality of four.
const QUALITY_FOUR_SCORE: f64 = 0.85;

/// The minimum score mapped to a quality of three.
const QUALITY_THREE_SCORE: f64 = 0.70;

/// The minimum score mapped to a quality of two.
const QUALITY_TWO_SCORE: f64 = 0.50;

/// The minimum score mapped to a quality of one. Anything below maps to zero.
const QUALITY_ONE_SCORE: f64 = 0.20;

/// The ratio of actual to expected time above which the answer is considered slow.
pub const SLOW_TIME_RATIO: f64 = 2.0;

/// Returns the base quality for the given score, before any penalties.
fn base_quality(score: f64) -> u8 {
    if score >= QUALITY_FIVE_SCORE {
        5
    } else if score >= QUALITY_FOUR_SCORE {
        4
    } else if score >= QUALITY_THREE_SCORE {
        3
    } else if score >= QUALITY_TWO_SCORE {
        2
    } else if score >= QUALITY_ONE_SCORE {
        1
    } else {
        0
    }
}

/// Maps an answer score onto an SM-2 quality rating.
///
/// The score is clamped to [0.0, 1.0] first. Using a hint costs one quality point, as does taking
/// more than [`SLOW_TIME_RATIO`] times the expected time. The time ratio is optional because some
/// callers do not track timing.
#[must_use]
pub fn map_quality(score: f64, hint_used: bool, time_ratio: Option<f64>) -> u8 {
    let score = score.clamp(0.0, 1.0);
    let mut quality = base_quality(score);
    if hint_used {
        quality = quality.saturating_sub(1);
    }
    if let Some(ratio) = time_ratio {
        if ratio > SLOW_TIME_RATIO {
            quality = quality.saturating_sub(1);
        }
    }
    quality
}
