//! Implements the mastery cascade triggered by every answered question.
//!
//! An answer affects more than the single core loop it was primarily testing. Every core loop
//! linked to the exercise advances its SM-2 schedule with the same quality rating, but the
//! mastery score moves by a reduced weight for the secondary loops, since the exercise only
//! exercised them in passing. The aggregator plans the new review state rows; the mastery store
//! executes the plan in one transaction together with the topic and course recomputations.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use ustr::{Ustr, UstrMap};

use crate::data::{EngineOptions, Exercise, ReviewState};
use crate::error::MasteryStoreError;
use crate::mastery_store::{CascadeUpdate, MasteryStore};
use crate::{quality, sm2};

/// Advances a single review state by one attempt with the given outcome.
///
/// The SM-2 schedule moves according to the quality rating, the mastery score moves as an
/// exponentially weighted moving average of the raw score with the given weight, and the attempt
/// counters advance according to the correctness threshold.
fn advance_state(
    state: &ReviewState,
    score: f64,
    sm2_quality: u8,
    ewma_alpha: f64,
    correct_threshold: f64,
    now: DateTime<Utc>,
) -> ReviewState {
    let update = sm2::schedule(state.sm2_state(), sm2_quality, now);
    let correct = score >= correct_threshold;
    ReviewState {
        student_id: state.student_id,
        core_loop_id: state.core_loop_id,
        easiness_factor: update.state.easiness_factor,
        repetition_number: update.state.repetition_number,
        interval_days: update.state.interval_days,
        next_review: Some(update.next_review),
        last_reviewed: Some(now),
        total_attempts: state.total_attempts + 1,
        correct_attempts: state.correct_attempts + u32::from(correct),
        mastery_score: (1.0 - ewma_alpha) * state.mastery_score + ewma_alpha * score,
    }
}

/// Plans the cascade update for an answer against the given exercise. The primary core loop uses
/// the full EWMA weight; the remaining loops use the reduced secondary weight. Loops with no
/// existing review state start from the defaults.
#[must_use]
pub fn plan_cascade(
    student_id: Ustr,
    exercise: &Exercise,
    current_states: &UstrMap<ReviewState>,
    score: f64,
    sm2_quality: u8,
    options: &EngineOptions,
    now: DateTime<Utc>,
) -> CascadeUpdate {
    let mut states = Vec::with_capacity(exercise.core_loop_ids.len());
    for (position, core_loop_id) in exercise.core_loop_ids.iter().enumerate() {
        let ewma_alpha = if position == 0 {
            options.primary_ewma_alpha
        } else {
            options.secondary_ewma_alpha
        };
        let current = current_states
            .get(core_loop_id)
            .cloned()
            .unwrap_or_else(|| ReviewState::new(student_id, *core_loop_id));
        states.push(advance_state(
            &current,
            score,
            sm2_quality,
            ewma_alpha,
            options.correct_score_threshold,
            now,
        ));
    }
    CascadeUpdate {
        student_id,
        states,
        timestamp: now,
    }
}

/// Cascades answered questions into the mastery store.
pub struct MasteryAggregator {
    /// The store holding review state and aggregates.
    mastery_store: Arc<RwLock<dyn MasteryStore>>,

    /// The options controlling the cascade weights.
    options: EngineOptions,
}

impl MasteryAggregator {
    /// Creates a new aggregator writing through the given store.
    #[must_use]
    pub fn new(mastery_store: Arc<RwLock<dyn MasteryStore>>, options: EngineOptions) -> Self {
        Self {
            mastery_store,
            options,
        }
    }

    /// Maps an answer score onto an SM-2 quality rating using the engine's expected-time table.
    #[must_use]
    pub fn map_quality(
        &self,
        exercise: &Exercise,
        score: f64,
        hint_used: bool,
        time_taken_s: Option<f64>,
    ) -> u8 {
        let time_ratio =
            time_taken_s.map(|taken| taken / self.options.expected_seconds(exercise.difficulty));
        quality::map_quality(score, hint_used, time_ratio)
    }

    /// Plans the cascade for an answer without applying it.
    pub fn plan_answer(
        &self,
        student_id: Ustr,
        exercise: &Exercise,
        score: f64,
        sm2_quality: u8,
        now: DateTime<Utc>,
    ) -> Result<CascadeUpdate, MasteryStoreError> {
        let current_states = self
            .mastery_store
            .read()
            .get_review_states(student_id, &exercise.core_loop_ids)?;
        Ok(plan_cascade(
            student_id,
            exercise,
            &current_states,
            score,
            sm2_quality,
            &self.options,
            now,
        ))
    }

}

/// Returns the first state of the update, which belongs to the primary core loop.
pub(crate) fn primary_state(update: &CascadeUpdate) -> Result<ReviewState, MasteryStoreError> {
    update.states.first().cloned().ok_or_else(|| {
        MasteryStoreError::InternalInvariantViolated(
            "cascade update contains no review states".to_string(),
        )
    })
}
