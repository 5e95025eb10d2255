//! Manages the lifecycle of quiz sessions.
//!
//! A session is an ordered list of exercises frozen at creation time, answered strictly in
//! order. Each submission is evaluated by the external answer evaluator, mapped onto an SM-2
//! quality rating, and cascaded through the mastery store together with the answer row in a
//! single transaction. Completing a session computes a summary that is stable under repeated
//! calls because the answers below it are append-only.
//!
//! Two locking layers protect the state. A per-session busy set rejects concurrent mutation of
//! the same session instead of blocking, and a per-student mutex serializes the
//! read-plan-write window of the cascade so that there is exactly one writer per student's
//! review state rows at any moment. The evaluator is always called before either the lock or the
//! transaction is taken, so a slow evaluator never holds up the database.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use ustr::{Ustr, UstrMap};
use uuid::Uuid;

use crate::aggregator::{self, MasteryAggregator};
use crate::clock::Clock;
use crate::data::{
    DifficultyBreakdown, EngineOptions, NextQuestion, QuizAnswer, QuizSession, QuizType,
    SessionState, SessionStatus, SessionSummary, SubmissionResult, SubmitOptions,
    filter::QuizFilter,
};
use crate::error::SessionError;
use crate::evaluator::{AnswerEvaluator, Evaluation};
use crate::exercise_library::ExerciseLibrary;
use crate::mastery_store;
use crate::selector::{QuizSelector, SelectionRequest};

/// The feedback attached to an attempt recorded through the evaluator fallback.
const EVALUATOR_FALLBACK_FEEDBACK: &str =
    "[evaluator unavailable] the answer could not be evaluated and was recorded as incorrect";

/// Returns the noise seed derived from a session ID.
fn session_seed(session_id: &Uuid) -> u64 {
    let bytes = session_id.as_bytes();
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// A claim on a session in the busy set. Dropping the guard releases the session.
struct BusyGuard<'a> {
    /// The busy set the session was claimed from.
    busy_sessions: &'a Mutex<HashSet<Uuid>>,

    /// The claimed session.
    session_id: Uuid,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy_sessions.lock().remove(&self.session_id);
    }
}

/// Runs quiz sessions against the engine's stores. All collaborators are injected at
/// construction; the manager keeps no global state.
pub struct QuizSessionManager {
    /// A pool of connections to the database holding the session and answer tables.
    pool: Pool<SqliteConnectionManager>,

    /// The library holding the exercises referenced by the sessions.
    library: Arc<RwLock<dyn ExerciseLibrary>>,

    /// The selector used to pick the questions of new sessions.
    selector: Arc<dyn QuizSelector>,

    /// The aggregator cascading answers into the mastery store.
    aggregator: MasteryAggregator,

    /// The external evaluator scoring free-form answers.
    evaluator: Arc<dyn AnswerEvaluator>,

    /// The clock supplying the current time.
    clock: Arc<dyn Clock>,

    /// The options controlling the passing threshold and quality mapping.
    options: EngineOptions,

    /// The sessions currently being mutated. Concurrent mutation of one session is rejected
    /// with [`SessionError::SessionBusy`] rather than blocked.
    busy_sessions: Mutex<HashSet<Uuid>>,

    /// One mutex per student, serializing the read-plan-write window of the cascade.
    student_locks: Mutex<UstrMap<Arc<Mutex<()>>>>,
}

impl QuizSessionManager {
    /// Creates a new session manager with the given collaborators.
    #[must_use]
    pub fn new(
        pool: Pool<SqliteConnectionManager>,
        library: Arc<RwLock<dyn ExerciseLibrary>>,
        selector: Arc<dyn QuizSelector>,
        aggregator: MasteryAggregator,
        evaluator: Arc<dyn AnswerEvaluator>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        Self {
            pool,
            library,
            selector,
            aggregator,
            evaluator,
            clock,
            options,
            busy_sessions: Mutex::new(HashSet::new()),
            student_locks: Mutex::new(UstrMap::default()),
        }
    }

    /// Claims a session in the busy set, rejecting concurrent mutation.
    fn claim(&self, session_id: Uuid) -> Result<BusyGuard<'_>, SessionError> {
        let mut busy = self.busy_sessions.lock();
        if !busy.insert(session_id) {
            return Err(SessionError::SessionBusy(session_id));
        }
        Ok(BusyGuard {
            busy_sessions: &self.busy_sessions,
            session_id,
        })
    }

    /// Returns the lock serializing mastery writes for the given student.
    fn student_lock(&self, student_id: Ustr) -> Arc<Mutex<()>> {
        self.student_locks
            .lock()
            .entry(student_id)
            .or_default()
            .clone()
    }

    /// Helper to persist a new session row.
    fn insert_session(&self, session: &QuizSession) -> Result<()> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "INSERT INTO quiz_sessions
                (id, student_id, course_id, quiz_type, filters_json, question_ids_json,
                created_at, completed_at, state)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        )?;
        stmt.execute(params![
            session.id.to_string(),
            session.student_id.as_str(),
            session.course_id.as_str(),
            session.quiz_type.to_string(),
            serde_json::to_string(&session.filter)?,
            serde_json::to_string(&session.question_ids)?,
            session.created_at.timestamp(),
            session.completed_at.map(|t| t.timestamp()),
            session.state.to_string(),
        ])?;
        Ok(())
    }

    /// Helper to load a session row.
    fn load_session(&self, session_id: Uuid) -> Result<Option<QuizSession>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT student_id, course_id, quiz_type, filters_json, question_ids_json,
                created_at, completed_at, state
                FROM quiz_sessions WHERE id = ?1;",
        )?;
        let mut rows = stmt.query(params![session_id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let student_id: String = row.get(0)?;
        let course_id: String = row.get(1)?;
        let quiz_type: String = row.get(2)?;
        let filters_json: String = row.get(3)?;
        let question_ids_json: String = row.get(4)?;
        let created_at: i64 = row.get(5)?;
        let completed_at: Option<i64> = row.get(6)?;
        let state: String = row.get(7)?;

        Ok(Some(QuizSession {
            id: session_id,
            student_id: Ustr::from(&student_id),
            course_id: Ustr::from(&course_id),
            quiz_type: QuizType::from_str(&quiz_type)?,
            filter: serde_json::from_str::<QuizFilter>(&filters_json)?,
            question_ids: serde_json::from_str::<Vec<Ustr>>(&question_ids_json)?,
            created_at: Utc
                .timestamp_opt(created_at, 0)
                .single()
                .ok_or_else(|| anyhow!("invalid creation timestamp for session {session_id}"))?,
            completed_at: completed_at
                .map(|t| {
                    Utc.timestamp_opt(t, 0).single().ok_or_else(|| {
                        anyhow!("invalid completion timestamp for session {session_id}")
                    })
                })
                .transpose()?,
            state: SessionState::from_str(&state)?,
        }))
    }

    /// Helper to load the answers of a session in question order.
    fn load_answers(&self, session_id: Uuid) -> Result<Vec<QuizAnswer>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT question_index, exercise_id, user_answer, score, correct, hint_used,
                time_taken_s, submitted_at
                FROM quiz_answers WHERE session_id = ?1 ORDER BY question_index;",
        )?;
        let rows = stmt
            .query_map(params![session_id.to_string()], |row| {
                Ok((
                    row.get::<_, usize>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(
                |(
                    question_index,
                    exercise_id,
                    user_answer,
                    score,
                    correct,
                    hint_used,
                    time_taken_s,
                    submitted_at,
                )|
                 -> Result<QuizAnswer> {
                    Ok(QuizAnswer {
                        session_id,
                        question_index,
                        exercise_id: Ustr::from(&exercise_id),
                        user_answer,
                        score,
                        correct,
                        hint_used,
                        time_taken_s,
                        submitted_at: Utc.timestamp_opt(submitted_at, 0).single().ok_or_else(
                            || anyhow!("invalid answer timestamp in session {session_id}"),
                        )?,
                    })
                },
            )
            .collect()
    }

    /// Helper to count the answers of a session.
    fn count_answers(&self, session_id: Uuid) -> Result<usize> {
        let connection = self.pool.get()?;
        let mut stmt = connection
            .prepare_cached("SELECT COUNT(*) FROM quiz_answers WHERE session_id = ?1;")?;
        let count: usize = stmt.query_row(params![session_id.to_string()], |row| row.get(0))?;
        Ok(count)
    }

    /// Helper to set the state of a session.
    fn set_session_state(
        &self,
        session_id: Uuid,
        state: SessionState,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "UPDATE quiz_sessions SET state = ?2, completed_at = ?3 WHERE id = ?1;",
        )?;
        stmt.execute(params![
            session_id.to_string(),
            state.to_string(),
            completed_at.map(|t| t.timestamp()),
        ])?;
        Ok(())
    }

    /// Loads a session, failing when it does not exist.
    fn get_session(&self, session_id: Uuid) -> Result<QuizSession, SessionError> {
        self.load_session(session_id)
            .map_err(SessionError::Storage)?
            .ok_or(SessionError::SessionNotFound(session_id))
    }

    /// Computes the summary of a session from its recorded answers. Unanswered questions count
    /// as a zero score.
    fn compute_summary(
        &self,
        session: &QuizSession,
        answers: &[QuizAnswer],
    ) -> Result<SessionSummary, SessionError> {
        let total_questions = session.question_ids.len();
        let mut total_score = 0.0;
        let mut correct_answers = 0;
        let mut per_difficulty: BTreeMap<_, DifficultyBreakdown> = BTreeMap::new();

        for (index, question_id) in session.question_ids.iter().enumerate() {
            let exercise = self
                .library
                .read()
                .get_exercise(*question_id)
                .map_err(|e| SessionError::Storage(e.into()))?
                .ok_or_else(|| {
                    SessionError::InternalInvariantViolated(format!(
                        "exercise {question_id} of session {} is missing from the library",
                        session.id
                    ))
                })?;
            let breakdown = per_difficulty.entry(exercise.difficulty).or_default();
            breakdown.total += 1;
            if let Some(answer) = answers.iter().find(|a| a.question_index == index) {
                total_score += answer.score;
                breakdown.average_score += answer.score;
                if answer.correct {
                    correct_answers += 1;
                    breakdown.correct += 1;
                }
            }
        }
        for breakdown in per_difficulty.values_mut() {
            if breakdown.total > 0 {
                breakdown.average_score /= breakdown.total as f64;
            }
        }

        let score_percent = if total_questions == 0 {
            0.0
        } else {
            100.0 * total_score / total_questions as f64
        };
        Ok(SessionSummary {
            score_percent,
            passed: score_percent >= self.options.passing_percent,
            total_questions,
            answered_questions: answers.len(),
            correct_answers,
            per_difficulty,
        })
    }

    /// Creates a new session, freezing the questions picked by the selector.
    pub fn create_session(
        &self,
        student_id: Ustr,
        course_id: Ustr,
        quiz_type: QuizType,
        count: usize,
        filter: QuizFilter,
    ) -> Result<QuizSession, SessionError> {
        if count == 0 {
            return Err(SessionError::Selector(
                crate::error::SelectorError::InvalidFilter(
                    "a quiz must have at least one question".to_string(),
                ),
            ));
        }

        // The session ID is generated before selection because it seeds the selector's noise.
        let session_id = Uuid::new_v4();
        let question_ids = self.selector.select(&SelectionRequest {
            student_id,
            course_id,
            quiz_type,
            count,
            filter: filter.clone(),
            prioritize_due: quiz_type == QuizType::Review,
            seed: session_seed(&session_id),
            now: self.clock.now(),
        })?;

        let session = QuizSession {
            id: session_id,
            student_id,
            course_id,
            quiz_type,
            filter,
            question_ids,
            created_at: self.clock.now(),
            completed_at: None,
            state: SessionState::Open,
        };
        self.insert_session(&session)
            .map_err(SessionError::Storage)?;
        info!(
            session_id = %session.id,
            %student_id,
            %course_id,
            questions = session.question_ids.len(),
            "created quiz session"
        );
        Ok(session)
    }

    /// Returns the first unanswered question of the session, or None when every question has
    /// been answered or the session is closed.
    pub fn next_question(&self, session_id: Uuid) -> Result<Option<NextQuestion>, SessionError> {
        let session = self.get_session(session_id)?;
        if session.state != SessionState::Open {
            return Ok(None);
        }
        let answered = self
            .count_answers(session_id)
            .map_err(SessionError::Storage)?;
        if answered >= session.question_ids.len() {
            return Ok(None);
        }
        Ok(Some(NextQuestion {
            question_index: answered,
            exercise_id: session.question_ids[answered],
        }))
    }

    /// Submits an answer for the next expected question of the session.
    ///
    /// The submitted exercise must match the first unanswered index: answers to earlier indexes
    /// are rejected as already answered, and answers to anything else as out of order. The
    /// evaluator runs before any lock or transaction is taken. The answer row and the mastery
    /// cascade are then committed atomically.
    pub fn submit_answer(
        &self,
        session_id: Uuid,
        exercise_id: Ustr,
        user_answer: &str,
        options: &SubmitOptions,
    ) -> Result<SubmissionResult, SessionError> {
        let _busy = self.claim(session_id)?;
        let session = self.get_session(session_id)?;
        if session.state != SessionState::Open {
            return Err(SessionError::SessionComplete(session_id));
        }

        // Resolve the expected question and reject duplicates and out-of-order submissions.
        let total = session.question_ids.len();
        let answered = self
            .count_answers(session_id)
            .map_err(SessionError::Storage)?;
        let already_answered_index = session.question_ids[..answered.min(total)]
            .iter()
            .position(|id| *id == exercise_id);
        if let Some(index) = already_answered_index {
            return Err(SessionError::AlreadyAnswered(session_id, index));
        }
        let Some(expected) = session.question_ids.get(answered).copied() else {
            // Every question has an answer; the only thing left to do is complete the session.
            return Err(SessionError::SessionComplete(session_id));
        };
        if exercise_id != expected {
            return Err(SessionError::OutOfOrderSubmission {
                expected,
                submitted: exercise_id,
            });
        }

        let exercise = self
            .library
            .read()
            .get_exercise(exercise_id)
            .map_err(|e| SessionError::Storage(e.into()))?
            .ok_or_else(|| {
                SessionError::InternalInvariantViolated(format!(
                    "exercise {exercise_id} of session {session_id} is missing from the library"
                ))
            })?;
        let primary_loop = exercise.primary_core_loop().ok_or_else(|| {
            SessionError::InternalInvariantViolated(format!(
                "exercise {exercise_id} has no core loops"
            ))
        })?;
        let language = self
            .library
            .read()
            .get_core_loop(primary_loop)
            .map_err(|e| SessionError::Storage(e.into()))?
            .map_or_else(|| "en".to_string(), |core_loop| core_loop.language);

        // Call the evaluator before taking the student lock or opening the transaction, so that
        // a slow evaluation never holds up the database. A canceled or failed call mutates
        // nothing unless the caller opted into the zero-score fallback.
        let evaluation = match self.evaluator.evaluate(exercise_id, user_answer, &language) {
            Ok(evaluation) => evaluation,
            Err(error) if options.evaluator_fallback => {
                warn!(%session_id, %exercise_id, %error, "evaluator failed; recording a failed attempt");
                Evaluation {
                    score: 0.0,
                    feedback: EVALUATOR_FALLBACK_FEEDBACK.to_string(),
                    correct: false,
                }
            }
            Err(e) => return Err(SessionError::EvaluatorUnavailable(e)),
        };

        let now = self.clock.now();
        let sm2_quality = self.aggregator.map_quality(
            &exercise,
            evaluation.score,
            options.hint_used,
            options.time_taken_s,
        );

        // Serialize the read-plan-write window per student so that cascades never race over the
        // same review state rows.
        let student_lock = self.student_lock(session.student_id);
        let _student_guard = student_lock.lock();

        let plan = self.aggregator.plan_answer(
            session.student_id,
            &exercise,
            evaluation.score,
            sm2_quality,
            now,
        )?;
        mastery_store::validate_update(&plan)
            .map_err(SessionError::InternalInvariantViolated)?;
        let review_state = aggregator::primary_state(&plan)?;

        if options.dry_run {
            return Ok(SubmissionResult {
                correct: evaluation.correct,
                score: evaluation.score,
                feedback: evaluation.feedback,
                review_state,
                remaining: total - answered,
            });
        }

        // Commit the answer row and the cascade as one unit.
        let write_helper = || -> Result<()> {
            let mut connection = self.pool.get()?;
            let tx = connection.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO quiz_answers
                        (session_id, question_index, exercise_id, user_answer, score, correct,
                        hint_used, time_taken_s, submitted_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
                )?;
                stmt.execute(params![
                    session_id.to_string(),
                    answered,
                    exercise_id.as_str(),
                    user_answer,
                    evaluation.score,
                    evaluation.correct,
                    options.hint_used,
                    options.time_taken_s,
                    now.timestamp(),
                ])?;
            }
            mastery_store::execute_cascade(&tx, &plan)?;
            tx.commit().context("failed to commit answer transaction")?;
            Ok(())
        };
        write_helper().map_err(SessionError::Storage)?;

        debug!(
            %session_id,
            %exercise_id,
            score = evaluation.score,
            quality = sm2_quality,
            "recorded answer"
        );
        Ok(SubmissionResult {
            correct: evaluation.correct,
            score: evaluation.score,
            feedback: evaluation.feedback,
            review_state,
            remaining: total - answered - 1,
        })
    }

    /// Completes the session and returns its summary. Completing an already completed session
    /// returns the same summary again.
    pub fn complete_session(&self, session_id: Uuid) -> Result<SessionSummary, SessionError> {
        let _busy = self.claim(session_id)?;
        let session = self.get_session(session_id)?;
        match session.state {
            SessionState::Abandoned => Err(SessionError::SessionComplete(session_id)),
            SessionState::Complete => {
                let answers = self
                    .load_answers(session_id)
                    .map_err(SessionError::Storage)?;
                self.compute_summary(&session, &answers)
            }
            SessionState::Open => {
                let answers = self
                    .load_answers(session_id)
                    .map_err(SessionError::Storage)?;
                let summary = self.compute_summary(&session, &answers)?;
                self.set_session_state(
                    session_id,
                    SessionState::Complete,
                    Some(self.clock.now()),
                )
                .map_err(SessionError::Storage)?;
                info!(
                    %session_id,
                    score_percent = summary.score_percent,
                    passed = summary.passed,
                    "completed quiz session"
                );
                Ok(summary)
            }
        }
    }

    /// Abandons an open session. Abandoning an already abandoned session has no effect.
    pub fn abandon_session(&self, session_id: Uuid) -> Result<(), SessionError> {
        let _busy = self.claim(session_id)?;
        let session = self.get_session(session_id)?;
        match session.state {
            SessionState::Complete => Err(SessionError::SessionComplete(session_id)),
            SessionState::Abandoned => Ok(()),
            SessionState::Open => self
                .set_session_state(session_id, SessionState::Abandoned, None)
                .map_err(SessionError::Storage),
        }
    }

    /// Returns a snapshot of the session.
    pub fn get_session_status(&self, session_id: Uuid) -> Result<SessionStatus, SessionError> {
        let session = self.get_session(session_id)?;
        let answers = self
            .load_answers(session_id)
            .map_err(SessionError::Storage)?;
        let summary = if session.state == SessionState::Complete {
            Some(self.compute_summary(&session, &answers)?)
        } else {
            None
        };
        Ok(SessionStatus {
            id: session.id,
            state: session.state,
            answered: answers.len(),
            total: session.question_ids.len(),
            question_ids: session.question_ids,
            summary,
        })
    }
}
