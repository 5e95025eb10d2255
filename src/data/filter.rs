//! Defines the filters used to narrow down the pool of exercises considered for a quiz.

use serde::{Deserialize, Serialize};
use ustr::Ustr;

use crate::data::{Difficulty, Exercise, ExerciseType};

/// A filter on the exercises of a course. All fields are optional and combined with a logical
/// AND. The filter is persisted with the session that used it so that sessions can be inspected
/// after the fact.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct QuizFilter {
    /// Only include exercises belonging to this topic.
    pub topic_id: Option<Ustr>,

    /// Only include exercises linked to this core loop, in any position.
    pub core_loop_id: Option<Ustr>,

    /// Only include exercises of this difficulty.
    pub difficulty: Option<Difficulty>,

    /// Only include exercises of this type.
    pub exercise_type: Option<ExerciseType>,
}

impl QuizFilter {
    /// Returns a filter that matches every exercise in the course.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Returns a filter on a single topic.
    #[must_use]
    pub fn topic(topic_id: Ustr) -> Self {
        Self {
            topic_id: Some(topic_id),
            ..Self::default()
        }
    }

    /// Returns a filter on a single core loop.
    #[must_use]
    pub fn core_loop(core_loop_id: Ustr) -> Self {
        Self {
            core_loop_id: Some(core_loop_id),
            ..Self::default()
        }
    }

    /// Applies the filter to the given exercise.
    #[must_use]
    pub fn matches(&self, exercise: &Exercise) -> bool {
        if let Some(topic_id) = self.topic_id {
            if exercise.topic_id != topic_id {
                return false;
            }
        }
        if let Some(core_loop_id) = self.core_loop_id {
            if !exercise.core_loop_ids.contains(&core_loop_id) {
                return false;
            }
        }
        if let Some(difficulty) = self.difficulty {
            if exercise.difficulty != difficulty {
                return false;
            }
        }
        if let Some(exercise_type) = self.exercise_type {
            if exercise.exercise_type != exercise_type {
                return false;
            }
        }
        true
    }
}
