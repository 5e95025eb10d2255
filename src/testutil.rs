//! Contains utilities used by the unit and integration tests of the engine.
//!
//! The session manager takes the evaluator and the clock as injected dependencies, so the tests
//! here provide deterministic versions of both: an evaluator that replays a scripted list of
//! scores and a clock that only moves when told to. There is also a helper that seeds a library
//! with a small course so that tests do not have to repeat the same ingest boilerplate.

use anyhow::anyhow;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use ustr::Ustr;

use crate::Mnemo;
use crate::clock::Clock;
use crate::data::{CoreLoop, CoreLoopType, Difficulty, ExerciseBuilder, ExerciseType, Topic};
use crate::error::{EvaluatorError, LibraryError};
use crate::evaluator::{AnswerEvaluator, Evaluation};

/// The score at and above which the scripted evaluator marks an answer correct.
const CORRECT_SCORE: f64 = 0.7;

/// An evaluator that replays a scripted list of scores, falling back to a default score once the
/// script runs out. Tests push the scores they want the next submissions to receive.
pub struct ScriptedEvaluator {
    /// The scores to hand out, in order.
    scores: Mutex<VecDeque<f64>>,

    /// The score returned once the script is exhausted.
    default_score: f64,
}

impl ScriptedEvaluator {
    /// Creates a new evaluator with the given default score.
    #[must_use]
    pub fn new(default_score: f64) -> Self {
        Self {
            scores: Mutex::new(VecDeque::new()),
            default_score,
        }
    }

    /// Appends a score to the script.
    pub fn push_score(&self, score: f64) {
        self.scores.lock().push_back(score);
    }
}

impl AnswerEvaluator for ScriptedEvaluator {
    fn evaluate(
        &self,
        exercise_id: Ustr,
        _user_answer: &str,
        _language: &str,
    ) -> Result<Evaluation, EvaluatorError> {
        let score = self
            .scores
            .lock()
            .pop_front()
            .unwrap_or(self.default_score);
        Ok(Evaluation {
            score,
            feedback: format!("exercise {exercise_id} scored {score:.2}"),
            correct: score >= CORRECT_SCORE,
        })
    }
}

/// An evaluator that always fails, simulating an unreachable or timed-out service.
pub struct FailingEvaluator;

impl AnswerEvaluator for FailingEvaluator {
    fn evaluate(
        &self,
        _exercise_id: Ustr,
        _user_answer: &str,
        _language: &str,
    ) -> Result<Evaluation, EvaluatorError> {
        Err(EvaluatorError::Unavailable(anyhow!(
            "the evaluator service is unreachable"
        )))
    }
}

/// A clock that only moves when the test advances it.
pub struct FixedClock {
    /// The current time of the clock.
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock set to a fixed starting point.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
        }
    }

    /// Moves the clock forward by the given number of days.
    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.lock();
        *now += Duration::days(days);
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Seeds the engine with a course of `num_topics` topics, each with `loops_per_topic` core loops
/// and `exercises_per_loop` exercises per core loop. IDs follow the patterns `topic_T`,
/// `loop_T_L`, and `ex_T_L_E`, all zero-padded to two digits, so tests can refer to them
/// directly. Exercise difficulties rotate through easy, medium, and hard.
pub fn seed_course(
    engine: &Mnemo,
    course_id: &str,
    num_topics: usize,
    loops_per_topic: usize,
    exercises_per_loop: usize,
) -> Result<(), LibraryError> {
    let difficulties = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
    for t in 0..num_topics {
        engine.add_topic(Topic {
            id: Ustr::from(&format!("topic_{t:02}")),
            course_id: Ustr::from(course_id),
            name: format!("Topic {t}"),
            language: "en".into(),
        })?;
        for l in 0..loops_per_topic {
            let loop_id = format!("loop_{t:02}_{l:02}");
            engine.add_core_loop(CoreLoop {
                id: Ustr::from(&loop_id),
                name: format!("Core loop {t}.{l}"),
                loop_type: CoreLoopType::Analysis,
                topic_id: Ustr::from(&format!("topic_{t:02}")),
                language: "en".into(),
            })?;
            for e in 0..exercises_per_loop {
                let exercise = ExerciseBuilder::default()
                    .id(format!("ex_{t:02}_{l:02}_{e:02}"))
                    .course_id(course_id)
                    .topic_id(format!("topic_{t:02}"))
                    .core_loop_ids(vec![Ustr::from(&loop_id)])
                    .difficulty(difficulties[e % difficulties.len()])
                    .exercise_type(ExerciseType::Procedural)
                    .build()
                    .expect("failed to build test exercise");
                engine.add_exercise(exercise)?;
            }
        }
    }
    Ok(())
}
