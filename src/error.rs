//! Contains the errors returned by the engine.
//!
//! Each component exposes its own error enum so that callers can match on the exact failure
//! instead of inspecting strings. Internal helpers return `anyhow::Result` and are wrapped into
//! these typed variants at the public trait boundaries.

use thiserror::Error;
use ustr::Ustr;
use uuid::Uuid;

/// An error returned when ingesting or querying exercises, topics, and core loops.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum LibraryError {
    #[error("topic with ID {0} already exists")]
    DuplicateTopic(Ustr),

    #[error("core loop with ID {0} already exists")]
    DuplicateCoreLoop(Ustr),

    #[error("exercise with ID {0} already exists")]
    DuplicateExercise(Ustr),

    #[error("cannot find topic with ID {0}")]
    UnknownTopic(Ustr),

    #[error("cannot find core loop with ID {0}")]
    UnknownCoreLoop(Ustr),

    #[error("exercise with ID {0} must reference at least one core loop")]
    EmptyCoreLoops(Ustr),

    #[error("failed to access the exercise library")]
    Storage(#[source] anyhow::Error),
}

/// An error returned when reading or updating review state and mastery aggregates.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum MasteryStoreError {
    #[error("failed to retrieve review state for student {0} and core loop {1}")]
    GetReviewState(Ustr, Ustr, #[source] anyhow::Error),

    #[error("failed to apply the mastery cascade for student {0}")]
    Cascade(Ustr, #[source] anyhow::Error),

    #[error("failed to reset review state for student {0} and core loop {1}")]
    Reset(Ustr, Ustr, #[source] anyhow::Error),

    #[error("failed to query the mastery store")]
    Query(#[source] anyhow::Error),

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolated(String),
}

/// An error returned when selecting the exercises for a quiz.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum SelectorError {
    #[error("no exercises match the given course and filters")]
    NoCandidates,

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("failed to select exercises")]
    Internal(#[source] anyhow::Error),
}

/// An error returned by the answer evaluator.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum EvaluatorError {
    #[error("the answer evaluator failed or timed out")]
    Unavailable(#[source] anyhow::Error),

    #[error("the answer evaluation was canceled before it returned")]
    Canceled,
}

/// An error returned when operating on quiz sessions.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum SessionError {
    #[error("cannot find session with ID {0}")]
    SessionNotFound(Uuid),

    #[error("session with ID {0} is being mutated by another caller")]
    SessionBusy(Uuid),

    #[error("session with ID {0} is no longer open")]
    SessionComplete(Uuid),

    #[error("question at index {1} of session {0} has already been answered")]
    AlreadyAnswered(Uuid, usize),

    #[error("expected an answer for exercise {expected} but got one for exercise {submitted}")]
    OutOfOrderSubmission { expected: Ustr, submitted: Ustr },

    #[error("the answer evaluator is unavailable")]
    EvaluatorUnavailable(#[source] EvaluatorError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    MasteryStore(#[from] MasteryStoreError),

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolated(String),

    #[error("failed to access the session store")]
    Storage(#[source] anyhow::Error),
}

/// An error returned when updating or querying the prerequisite graph.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum GraphError {
    #[error("adding an edge from {prereq} to {dependent} would create a cycle")]
    WouldCreateCycle { prereq: Ustr, dependent: Ustr },

    #[error("core loop {0} cannot be a prerequisite of itself")]
    SelfDependency(Ustr),

    #[error("failed to access the prerequisite graph")]
    Storage(#[source] anyhow::Error),
}

/// An error returned by the adaptive advisor.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum AdvisorError {
    #[error("core loops {weak_prereqs:?} must be reviewed before studying this material")]
    PrerequisiteBlocked { weak_prereqs: Vec<Ustr> },

    #[error("failed to query the advisor state")]
    Query(#[source] anyhow::Error),
}
