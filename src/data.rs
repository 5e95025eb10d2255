//! Defines the basic data structures used by the engine to describe exercises, core loops, and
//! topics, store the review state of a student's spaced repetition schedule, describe quiz
//! sessions and their answers, and control the behavior of the selector and the mastery cascade.

pub mod filter;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumString};
use ustr::Ustr;
use uuid::Uuid;

use crate::data::filter::QuizFilter;
use crate::sm2::{self, Sm2State};

/// The difficulty of an exercise, declared at ingest time. The ordering of the variants is
/// meaningful: easier difficulties sort first.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// The type of an exercise.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExerciseType {
    /// An exercise that asks the student to carry out a procedure.
    Procedural,

    /// An exercise that tests declarative knowledge.
    Theory,

    /// An exercise that asks the student to prove a statement.
    Proof,

    /// An exercise mixing procedural and theoretical work.
    Hybrid,
}

/// The type of a core loop, describing the kind of procedure it names.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CoreLoopType {
    Design,
    Transformation,
    Verification,
    Minimization,
    Analysis,
    Other,
}

/// The type of a quiz, which decides how the selector picks its questions.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuizType {
    /// A quiz over the whole course with no priority weighting.
    Random,

    /// A quiz restricted to a single topic.
    Topic,

    /// A quiz restricted to a single core loop.
    CoreLoop,

    /// A quiz restricted to exercises whose primary core loop is due for review.
    Review,

    /// A quiz that mixes weak, learning, and strong material according to a target ratio.
    Adaptive,
}

/// The lifecycle state of a quiz session.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// The session accepts answer submissions.
    Open,

    /// The session has been completed and its summary is final.
    Complete,

    /// The session was abandoned before completion.
    Abandoned,
}

/// A topic of a course. Topics group core loops and exercises around one subject.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Topic {
    /// The unique ID of the topic.
    pub id: Ustr,

    /// The ID of the course to which the topic belongs.
    pub course_id: Ustr,

    /// The human-readable name of the topic.
    pub name: String,

    /// The language of the topic's material.
    pub language: String,
}

/// A named procedural pattern, such as "Karnaugh Map Minimization". Core loops are the unit of
/// mastery tracking: every exercise is linked to one or more of them, and the student's review
/// state is kept per core loop rather than per exercise.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CoreLoop {
    /// The unique ID of the core loop.
    pub id: Ustr,

    /// The human-readable name of the procedure.
    pub name: String,

    /// The type of the procedure.
    pub loop_type: CoreLoopType,

    /// The ID of the topic to which the core loop belongs.
    pub topic_id: Ustr,

    /// The language of the core loop's material.
    pub language: String,
}

/// A problem item presented to students. Exercises are immutable once ingested: the analyzer that
/// discovers their topic and core loops runs before ingest, and the engine never calls back into
/// it.
#[derive(Builder, Clone, Debug, Deserialize, PartialEq, Serialize)]
#[builder(setter(into))]
pub struct Exercise {
    /// The unique ID of the exercise.
    pub id: Ustr,

    /// The ID of the course to which the exercise belongs.
    pub course_id: Ustr,

    /// The ID of the topic to which the exercise belongs.
    pub topic_id: Ustr,

    /// The ordered, non-empty list of core loops exercised by this item. The first entry is the
    /// primary core loop, which is materialized in its own column for indexed lookup.
    pub core_loop_ids: Vec<Ustr>,

    /// The declared difficulty of the exercise.
    pub difficulty: Difficulty,

    /// The type of the exercise.
    pub exercise_type: ExerciseType,

    /// Free-form tags attached to the exercise.
    #[builder(default)]
    pub tags: BTreeSet<String>,

    /// Whether the exercise has been analyzed. Only analyzed exercises are ever selected for
    /// quizzes.
    #[builder(default = "true")]
    pub analyzed: bool,
}

impl Exercise {
    /// Returns the primary core loop of the exercise. The library rejects exercises with no core
    /// loops, so every stored exercise has one.
    #[must_use]
    pub fn primary_core_loop(&self) -> Option<Ustr> {
        self.core_loop_ids.first().copied()
    }
}

/// The per-(student, core loop) spaced repetition record. This is the hot entity of the engine:
/// it is created lazily on the first attempt, mutated only inside the cascade transaction, and
/// never deleted, only reset on explicit request.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ReviewState {
    /// The ID of the student.
    pub student_id: Ustr,

    /// The ID of the core loop.
    pub core_loop_id: Ustr,

    /// The SM-2 easiness factor, always in [1.3, 2.5].
    pub easiness_factor: f64,

    /// The number of consecutive successful reviews.
    pub repetition_number: u32,

    /// The current review interval in days.
    pub interval_days: u32,

    /// The time at which the core loop is next due for review. None until the first attempt is
    /// recorded.
    pub next_review: Option<DateTime<Utc>>,

    /// The time of the most recent attempt.
    pub last_reviewed: Option<DateTime<Utc>>,

    /// The total number of attempts recorded against this core loop.
    pub total_attempts: u32,

    /// The number of attempts whose score reached the correctness threshold.
    pub correct_attempts: u32,

    /// An exponentially weighted moving average of attempt outcomes, in [0.0, 1.0].
    pub mastery_score: f64,
}

impl ReviewState {
    /// Returns a fresh review state with the SM-2 defaults.
    #[must_use]
    pub fn new(student_id: Ustr, core_loop_id: Ustr) -> Self {
        Self {
            student_id,
            core_loop_id,
            easiness_factor: sm2::INITIAL_EASINESS_FACTOR,
            repetition_number: 0,
            interval_days: 0,
            next_review: None,
            last_reviewed: None,
            total_attempts: 0,
            correct_attempts: 0,
            mastery_score: 0.0,
        }
    }

    /// Returns the SM-2 scheduling portion of the state.
    #[must_use]
    pub fn sm2_state(&self) -> Sm2State {
        Sm2State {
            easiness_factor: self.easiness_factor,
            repetition_number: self.repetition_number,
            interval_days: self.interval_days,
        }
    }

    /// Checks the numeric invariants of the state. Returns a description of the first violated
    /// invariant, if any. The mastery store refuses to persist a state that fails this check.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.easiness_factor < sm2::MIN_EASINESS_FACTOR
            || self.easiness_factor > sm2::MAX_EASINESS_FACTOR
        {
            return Err(format!(
                "easiness factor {} outside [1.3, 2.5] for core loop {}",
                self.easiness_factor, self.core_loop_id
            ));
        }
        if self.correct_attempts > self.total_attempts {
            return Err(format!(
                "correct attempts {} exceed total attempts {} for core loop {}",
                self.correct_attempts, self.total_attempts, self.core_loop_id
            ));
        }
        if self.repetition_number == 0 && self.interval_days > 1 {
            return Err(format!(
                "interval {} days with repetition number 0 for core loop {}",
                self.interval_days, self.core_loop_id
            ));
        }
        if !(0.0..=1.0).contains(&self.mastery_score) {
            return Err(format!(
                "mastery score {} outside [0.0, 1.0] for core loop {}",
                self.mastery_score, self.core_loop_id
            ));
        }
        Ok(())
    }
}

/// The aggregated mastery of a topic, recomputed on every cascade that touches one of its core
/// loops.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TopicMastery {
    /// The ID of the student.
    pub student_id: Ustr,

    /// The ID of the topic.
    pub topic_id: Ustr,

    /// The attempt-weighted mean of the mastery scores of the topic's core loops.
    pub mastery_score: f64,

    /// The time of the last recomputation.
    pub last_updated: DateTime<Utc>,
}

/// The aggregated mastery of a course, recomputed from its topics on every cascade.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CourseMastery {
    /// The ID of the student.
    pub student_id: Ustr,

    /// The ID of the course.
    pub course_id: Ustr,

    /// The attempt-weighted mean of the mastery scores of the course's topics.
    pub mastery_score: f64,

    /// The time of the last recomputation.
    pub last_updated: DateTime<Utc>,
}

/// The scope of a mastery query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MasteryScope {
    /// The mastery of a single core loop.
    CoreLoop(Ustr),

    /// The aggregated mastery of a topic.
    Topic(Ustr),

    /// The aggregated mastery of a course.
    Course(Ustr),
}

/// A core loop that is due for review.
#[derive(Clone, Debug, PartialEq)]
pub struct DueItem {
    /// The ID of the core loop.
    pub core_loop_id: Ustr,

    /// When the review became due. None means the core loop has a review state but no scheduled
    /// review, which counts as due immediately.
    pub next_review: Option<DateTime<Utc>>,

    /// The current mastery score of the core loop.
    pub mastery_score: f64,
}

/// A quiz session. The list of questions is frozen when the session is created: ingesting new
/// exercises afterwards never changes what an open session will ask.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct QuizSession {
    /// The unique ID of the session.
    pub id: Uuid,

    /// The ID of the student taking the quiz.
    pub student_id: Ustr,

    /// The ID of the course the quiz draws from.
    pub course_id: Ustr,

    /// The type of the quiz.
    pub quiz_type: QuizType,

    /// The filter used to narrow the candidate pool.
    pub filter: QuizFilter,

    /// The ordered list of exercise IDs frozen at creation.
    pub question_ids: Vec<Ustr>,

    /// The time at which the session was created.
    pub created_at: DateTime<Utc>,

    /// The time at which the session was completed, if it has been.
    pub completed_at: Option<DateTime<Utc>>,

    /// The lifecycle state of the session.
    pub state: SessionState,
}

/// A recorded answer to one question of a session. Answers are append-only within a session and
/// unique per question index.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct QuizAnswer {
    /// The ID of the session.
    pub session_id: Uuid,

    /// The index of the question within the session's frozen question list.
    pub question_index: usize,

    /// The ID of the answered exercise.
    pub exercise_id: Ustr,

    /// The answer submitted by the student.
    pub user_answer: String,

    /// The score assigned by the evaluator, in [0.0, 1.0].
    pub score: f64,

    /// Whether the evaluator judged the answer correct.
    pub correct: bool,

    /// Whether the student used a hint.
    pub hint_used: bool,

    /// How long the student took to answer, in seconds, if tracked.
    pub time_taken_s: Option<f64>,

    /// The time at which the answer was submitted.
    pub submitted_at: DateTime<Utc>,
}

/// Options controlling a single answer submission.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmitOptions {
    /// Whether the student used a hint before answering.
    pub hint_used: bool,

    /// How long the student took to answer, in seconds. Used to penalize very slow answers when
    /// provided.
    pub time_taken_s: Option<f64>,

    /// When set, the answer is evaluated but no state is mutated: no answer row is written and no
    /// cascade runs. The returned review state is the projection of what would have been stored.
    pub dry_run: bool,

    /// When set, a failed or canceled evaluator call is downgraded into a zero-score attempt with
    /// a clearly marked feedback string instead of surfacing an error. The attempt then updates
    /// the review schedule as a failure.
    pub evaluator_fallback: bool,
}

/// The result of a successful answer submission.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionResult {
    /// Whether the evaluator judged the answer correct.
    pub correct: bool,

    /// The score assigned by the evaluator.
    pub score: f64,

    /// The evaluator's feedback for the student.
    pub feedback: String,

    /// The review state of the exercise's primary core loop after the cascade.
    pub review_state: ReviewState,

    /// The number of questions left to answer in the session.
    pub remaining: usize,
}

/// The next unanswered question of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct NextQuestion {
    /// The index of the question within the session.
    pub question_index: usize,

    /// The ID of the exercise to present.
    pub exercise_id: Ustr,
}

/// The per-difficulty portion of a session summary.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DifficultyBreakdown {
    /// The number of questions of this difficulty in the session.
    pub total: usize,

    /// The number of those answered correctly.
    pub correct: usize,

    /// The mean score over the answered questions of this difficulty.
    pub average_score: f64,
}

/// The summary of a completed session. Recomputing the summary of a completed session always
/// yields the same value because the answers below it are frozen.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SessionSummary {
    /// The overall score as a percentage. Unanswered questions count as zero.
    pub score_percent: f64,

    /// Whether the session reached the passing threshold.
    pub passed: bool,

    /// The number of questions in the session.
    pub total_questions: usize,

    /// The number of questions that were answered.
    pub answered_questions: usize,

    /// The number of answers judged correct.
    pub correct_answers: usize,

    /// The breakdown of results per difficulty.
    pub per_difficulty: BTreeMap<Difficulty, DifficultyBreakdown>,
}

/// A point-in-time snapshot of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionStatus {
    /// The ID of the session.
    pub id: Uuid,

    /// The lifecycle state of the session.
    pub state: SessionState,

    /// The number of questions answered so far.
    pub answered: usize,

    /// The total number of questions in the session.
    pub total: usize,

    /// The frozen list of question IDs.
    pub question_ids: Vec<Ustr>,

    /// The summary, present once the session is complete.
    pub summary: Option<SessionSummary>,
}

/// The tutoring depth recommended for a core loop based on the student's mastery.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TutoringDepth {
    /// Full explanations starting from first principles.
    Basic,

    /// Explanations that assume the fundamentals are known.
    Medium,

    /// Terse explanations for students close to mastery.
    Advanced,
}

/// The urgency of a learning path item.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

/// The reason a core loop was placed on the learning path.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathReason {
    /// The core loop's review is overdue by the given number of days.
    OverdueReview { days_overdue: i64 },

    /// The core loop's mastery is below the weak threshold.
    WeakArea { mastery_score: f64 },

    /// The core loop's review is due today.
    DueToday { mastery_score: f64 },

    /// The core loop has never been attempted.
    NewContent {
        difficulty: Option<Difficulty>,
        exercise_count: usize,
    },
}

/// One item of a student's learning path.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LearningPathItem {
    /// The ID of the core loop to study.
    pub core_loop_id: Ustr,

    /// The urgency of the item.
    pub urgency: Urgency,

    /// Why the item was included.
    pub reason: PathReason,
}

/// The severity of a knowledge gap.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    High,
    Medium,
    Low,
}

/// A core loop whose mastery is low enough to count as a gap in the student's knowledge.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct KnowledgeGap {
    /// The ID of the core loop.
    pub core_loop_id: Ustr,

    /// The current mastery score.
    pub mastery_score: f64,

    /// The severity of the gap.
    pub severity: GapSeverity,
}

/// The options used to control the behavior of the engine. The defaults match the documented
/// behavior of the selector, the quality mapper, and the mastery cascade; they are grouped here
/// so that tests and embedders can tune them in one place.
#[derive(Builder, Clone, Debug, Deserialize, PartialEq, Serialize)]
#[builder(default)]
pub struct EngineOptions {
    /// The EWMA weight of a new outcome on the primary core loop of an exercise.
    pub primary_ewma_alpha: f64,

    /// The EWMA weight of a new outcome on the secondary core loops of an exercise.
    pub secondary_ewma_alpha: f64,

    /// The minimum score for an attempt to count as correct.
    pub correct_score_threshold: f64,

    /// The minimum session score percentage required to pass.
    pub passing_percent: f64,

    /// The amplitude of the uniform noise added to selection priorities.
    pub priority_noise_amplitude: f64,

    /// The fraction of an adaptive quiz drawn from weak material.
    pub adaptive_weak_fraction: f64,

    /// The fraction of an adaptive quiz drawn from material still being learned.
    pub adaptive_learning_fraction: f64,

    /// The fraction of an adaptive quiz drawn from strong material.
    pub adaptive_strong_fraction: f64,

    /// The mastery score below which material counts as weak.
    pub weak_mastery_threshold: f64,

    /// The mastery score at and above which material counts as strong.
    pub strong_mastery_threshold: f64,

    /// The expected number of seconds to answer an easy exercise.
    pub expected_seconds_easy: f64,

    /// The expected number of seconds to answer a medium exercise.
    pub expected_seconds_medium: f64,

    /// The expected number of seconds to answer a hard exercise.
    pub expected_seconds_hard: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            primary_ewma_alpha: 0.3,
            secondary_ewma_alpha: 0.15,
            correct_score_threshold: 0.7,
            passing_percent: 60.0,
            priority_noise_amplitude: 10.0,
            adaptive_weak_fraction: 0.4,
            adaptive_learning_fraction: 0.4,
            adaptive_strong_fraction: 0.2,
            weak_mastery_threshold: 0.5,
            strong_mastery_threshold: 0.7,
            expected_seconds_easy: 60.0,
            expected_seconds_medium: 120.0,
            expected_seconds_hard: 240.0,
        }
    }
}

impl EngineOptions {
    /// Returns whether two float values are equal within epsilon.
    #[must_use]
    fn float_equals(f1: f64, f2: f64) -> bool {
        (f1 - f2).abs() < f64::EPSILON
    }

    /// Returns the expected number of seconds to answer an exercise of the given difficulty.
    #[must_use]
    pub fn expected_seconds(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.expected_seconds_easy,
            Difficulty::Medium => self.expected_seconds_medium,
            Difficulty::Hard => self.expected_seconds_hard,
        }
    }

    /// Verifies that the engine options are valid.
    pub fn verify(&self) -> Result<()> {
        // The EWMA weights must be in (0.0, 1.0].
        if !(0.0..=1.0).contains(&self.primary_ewma_alpha) || self.primary_ewma_alpha == 0.0 {
            bail!("invalid engine options: primary_ewma_alpha must be in (0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&self.secondary_ewma_alpha) || self.secondary_ewma_alpha == 0.0 {
            bail!("invalid engine options: secondary_ewma_alpha must be in (0.0, 1.0]");
        }

        // The adaptive fractions must sum to 1.0.
        if !Self::float_equals(
            self.adaptive_weak_fraction
                + self.adaptive_learning_fraction
                + self.adaptive_strong_fraction,
            1.0,
        ) {
            bail!("invalid engine options: the adaptive fractions must sum to 1.0");
        }

        // The mastery thresholds must be ordered and within range.
        if self.weak_mastery_threshold >= self.strong_mastery_threshold {
            bail!(
                "invalid engine options: weak_mastery_threshold must be below \
                strong_mastery_threshold"
            );
        }
        if !(0.0..=1.0).contains(&self.weak_mastery_threshold)
            || !(0.0..=1.0).contains(&self.strong_mastery_threshold)
        {
            bail!("invalid engine options: mastery thresholds must be in [0.0, 1.0]");
        }

        // The passing percentage must be a valid percentage.
        if !(0.0..=100.0).contains(&self.passing_percent) {
            bail!("invalid engine options: passing_percent must be in [0.0, 100.0]");
        }

        // The noise amplitude must not be negative.
        if self.priority_noise_amplitude < 0.0 {
            bail!("invalid engine options: priority_noise_amplitude must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use ustr::Ustr;

    use super::*;

    /// Verifies that the default options pass verification.
    #[test]
    fn default_options_verify() {
        assert!(EngineOptions::default().verify().is_ok());
    }

    /// Verifies that invalid options are rejected.
    #[test]
    fn invalid_options() {
        let mut options = EngineOptions::default();
        options.adaptive_weak_fraction = 0.9;
        assert!(options.verify().is_err());

        let mut options = EngineOptions::default();
        options.primary_ewma_alpha = 0.0;
        assert!(options.verify().is_err());

        let mut options = EngineOptions::default();
        options.weak_mastery_threshold = 0.8;
        assert!(options.verify().is_err());

        let mut options = EngineOptions::default();
        options.passing_percent = 150.0;
        assert!(options.verify().is_err());

        let mut options = EngineOptions::default();
        options.priority_noise_amplitude = -1.0;
        assert!(options.verify().is_err());
    }

    /// Verifies the string representation used for the database columns.
    #[test]
    fn enum_string_round_trip() {
        assert_eq!(Difficulty::Easy.to_string(), "easy");
        assert_eq!(Difficulty::from_str("hard").unwrap(), Difficulty::Hard);
        assert_eq!(QuizType::CoreLoop.to_string(), "core_loop");
        assert_eq!(QuizType::from_str("adaptive").unwrap(), QuizType::Adaptive);
        assert_eq!(SessionState::Open.to_string(), "open");
        assert_eq!(ExerciseType::from_str("proof").unwrap(), ExerciseType::Proof);
        assert_eq!(CoreLoopType::from_str("design").unwrap(), CoreLoopType::Design);
    }

    /// Verifies that difficulties sort from easy to hard.
    #[test]
    fn difficulty_ordering() {
        assert!(Difficulty::Easy < Difficulty::Medium);
        assert!(Difficulty::Medium < Difficulty::Hard);
    }

    /// Verifies the invariant checks on the review state.
    #[test]
    fn review_state_invariants() {
        let student = Ustr::from("student_1");
        let core_loop = Ustr::from("loop_1");
        let state = ReviewState::new(student, core_loop);
        assert!(state.check_invariants().is_ok());

        let mut bad = ReviewState::new(student, core_loop);
        bad.easiness_factor = 1.0;
        assert!(bad.check_invariants().is_err());

        let mut bad = ReviewState::new(student, core_loop);
        bad.correct_attempts = 1;
        assert!(bad.check_invariants().is_err());

        let mut bad = ReviewState::new(student, core_loop);
        bad.interval_days = 10;
        assert!(bad.check_invariants().is_err());

        let mut bad = ReviewState::new(student, core_loop);
        bad.mastery_score = 1.5;
        assert!(bad.check_invariants().is_err());
    }

    /// Verifies that a fresh review state uses the SM-2 defaults.
    #[test]
    fn review_state_defaults() {
        let state = ReviewState::new(Ustr::from("s"), Ustr::from("c"));
        assert_eq!(state.sm2_state(), Sm2State::default());
        assert_eq!(state.total_attempts, 0);
        assert_eq!(state.mastery_score, 0.0);
        assert!(state.next_review.is_none());
    }
}
