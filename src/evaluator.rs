//! Defines the interface to the external answer evaluator.
//!
//! Scoring a free-form answer requires understanding the material, which is outside the scope of
//! this engine. The evaluator is typically an LLM-backed service that may be slow, fail, or time
//! out. The engine treats it as a black box behind this trait: the session manager calls it
//! before opening any database transaction, so evaluator latency never holds locks, and a failed
//! or canceled call mutates no state unless the caller explicitly opted into the zero-score
//! fallback.

use ustr::Ustr;

use crate::error::EvaluatorError;

/// The judgment of the evaluator on a single answer.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// The score of the answer, between 0.0 and 1.0.
    pub score: f64,

    /// Feedback for the student.
    pub feedback: String,

    /// Whether the answer is considered correct.
    pub correct: bool,
}

/// A trait exposing a function to score a student's answer to an exercise.
pub trait AnswerEvaluator: Send + Sync {
    /// Returns the score and feedback for the given answer. The language is the language of the
    /// material, which evaluators use to respond in kind.
    fn evaluate(
        &self,
        exercise_id: Ustr,
        user_answer: &str,
        language: &str,
    ) -> Result<Evaluation, EvaluatorError>;
}
