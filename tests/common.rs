//! Contains utilities common to the engine's end-to-end tests.
//!
//! The tests drive the whole stack: a real database on disk, the selector, the session manager,
//! and the cascade. Determinism comes from two injected collaborators: a scripted evaluator
//! whose scores the tests choose, and a fixed clock the tests advance by hand. The helpers here
//! wrap the session plumbing so that a test reads as a sequence of study days.

use anyhow::Result;
use std::sync::Arc;
use ustr::Ustr;
use uuid::Uuid;

use mnemo::Mnemo;
use mnemo::data::{EngineOptions, QuizType, SubmissionResult, SubmitOptions, filter::QuizFilter};
use mnemo::testutil::{FixedClock, ScriptedEvaluator};

/// The student used by all end-to-end tests.
pub const STUDENT: &str = "student_1";

/// An engine wired with deterministic test collaborators.
pub struct TestEngine {
    /// The engine under test.
    pub engine: Mnemo,

    /// The evaluator whose scores the tests script.
    pub evaluator: Arc<ScriptedEvaluator>,

    /// The clock the tests advance by hand.
    pub clock: Arc<FixedClock>,

    /// The directory holding the database, kept alive for the duration of the test.
    _dir: tempfile::TempDir,
}

/// Returns an engine backed by a fresh database. The evaluator's default score is 1.0 so that
/// unscripted submissions count as perfect answers.
pub fn new_engine() -> Result<TestEngine> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("engine.db");
    let evaluator = Arc::new(ScriptedEvaluator::new(1.0));
    let clock = Arc::new(FixedClock::new());
    let engine = Mnemo::new_with_clock(
        db_path.to_str().unwrap(),
        evaluator.clone(),
        clock.clone(),
        EngineOptions::default(),
    )?;
    Ok(TestEngine {
        engine,
        evaluator,
        clock,
        _dir: dir,
    })
}

/// Scripts the given score and submits an answer to the session's next question.
#[allow(dead_code)]
pub fn submit_next(t: &TestEngine, session_id: Uuid, score: f64) -> Result<SubmissionResult> {
    t.evaluator.push_score(score);
    let next = t
        .engine
        .next_question(session_id)?
        .expect("the session has no unanswered questions");
    let result = t.engine.submit_answer(
        session_id,
        next.exercise_id,
        "a test answer",
        &SubmitOptions::default(),
    )?;
    Ok(result)
}

/// Runs `times` single-question sessions against the given core loop, each scored with the
/// given score. Used to push a core loop's mastery to a known value.
#[allow(dead_code)]
pub fn drill(t: &TestEngine, course_id: &str, loop_id: &str, times: usize, score: f64) -> Result<()> {
    for _ in 0..times {
        let session = t.engine.create_session(
            Ustr::from(STUDENT),
            Ustr::from(course_id),
            QuizType::CoreLoop,
            1,
            QuizFilter::core_loop(Ustr::from(loop_id)),
        )?;
        submit_next(t, session.id, score)?;
        t.engine.complete_session(session.id)?;
    }
    Ok(())
}
