//! Defines how the review state of each (student, core loop) pair and the aggregated mastery of
//! topics and courses are stored in the database.
//!
//! The review state rows are the contention point of the engine. They are created lazily on the
//! first attempt, updated only through the cascade transaction, and never deleted, only reset on
//! explicit request. A cascade updates the review state of every core loop linked to the answered
//! exercise and recomputes the affected topic and course aggregates, all in a single transaction
//! so that readers observe either the previous snapshot or the new one, never a mix.
//!
//! The cascade body is exposed as a free function over a transaction so that the session manager
//! can combine it with the answer insert into one atomic unit.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Transaction, params};
use tracing::debug;
use ustr::{Ustr, UstrMap, UstrSet};

use crate::data::{CourseMastery, DueItem, ReviewState, TopicMastery};
use crate::error::MasteryStoreError;
use crate::utils;

/// The review state rows to persist after an answered question, planned by the mastery
/// aggregator. All rows belong to the same student and are written in one transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeUpdate {
    /// The ID of the student whose state is updated.
    pub student_id: Ustr,

    /// The new review state of every core loop linked to the answered exercise.
    pub states: Vec<ReviewState>,

    /// The time at which the answer was recorded.
    pub timestamp: DateTime<Utc>,
}

/// An interface to read and update review state and mastery aggregates.
pub trait MasteryStore: Send + Sync {
    /// Returns the review state for the given student and core loop, if one exists.
    fn get_review_state(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<Option<ReviewState>, MasteryStoreError>;

    /// Returns the existing review states for the given core loops. Core loops with no state are
    /// absent from the result.
    fn get_review_states(
        &self,
        student_id: Ustr,
        core_loop_ids: &[Ustr],
    ) -> Result<UstrMap<ReviewState>, MasteryStoreError>;

    /// Returns all the review states of the student for core loops in the given course.
    fn course_review_states(
        &self,
        student_id: Ustr,
        course_id: Ustr,
    ) -> Result<Vec<ReviewState>, MasteryStoreError>;

    /// Applies a cascade update atomically: review state rows, topic aggregates, and course
    /// aggregates all update together or not at all.
    fn apply_cascade(&mut self, update: &CascadeUpdate) -> Result<(), MasteryStoreError>;

    /// Returns the core loops of the course that are due for review at the given time, ordered
    /// by review time ascending with never-scheduled loops first.
    fn due_items(
        &self,
        student_id: Ustr,
        course_id: Ustr,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DueItem>, MasteryStoreError>;

    /// Returns the aggregated mastery of a topic, if it has been computed.
    fn topic_mastery(
        &self,
        student_id: Ustr,
        topic_id: Ustr,
    ) -> Result<Option<TopicMastery>, MasteryStoreError>;

    /// Returns the aggregated mastery of a course, if it has been computed.
    fn course_mastery(
        &self,
        student_id: Ustr,
        course_id: Ustr,
    ) -> Result<Option<CourseMastery>, MasteryStoreError>;

    /// Resets the review state of the given core loop to its initial values and recomputes the
    /// affected aggregates. The row is kept so that the attempt history remains auditable.
    fn reset_review_state(
        &mut self,
        student_id: Ustr,
        core_loop_id: Ustr,
        now: DateTime<Utc>,
    ) -> Result<(), MasteryStoreError>;

    /// Returns the scores of the student's most recent attempts against the given core loop, in
    /// descending order of submission time.
    fn recent_scores(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
        limit: usize,
    ) -> Result<Vec<f64>, MasteryStoreError>;
}

/// Checks the invariants of every state in the update. Returns a description of the first
/// violation. Callers must run this check before executing the cascade so that a buggy plan
/// aborts the operation instead of corrupting the store.
pub(crate) fn validate_update(update: &CascadeUpdate) -> Result<(), String> {
    for state in &update.states {
        state.check_invariants()?;
        if state.student_id != update.student_id {
            return Err(format!(
                "cascade for student {} contains a state for student {}",
                update.student_id, state.student_id
            ));
        }
    }
    Ok(())
}

/// Converts a unix timestamp into a UTC timestamp.
fn to_datetime(timestamp: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| anyhow!("invalid timestamp {timestamp} in mastery store"))
}

/// Writes the review state rows of the update and recomputes the affected topic and course
/// aggregates inside the given transaction.
pub(crate) fn execute_cascade(tx: &Transaction<'_>, update: &CascadeUpdate) -> Result<()> {
    // Upsert the review state of every linked core loop.
    let mut upsert = tx.prepare_cached(
        "INSERT INTO review_state
            (student_id, core_loop_id, easiness_factor, repetition_number, interval_days,
            next_review, last_reviewed, total_attempts, correct_attempts, mastery_score)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(student_id, core_loop_id) DO UPDATE SET
            easiness_factor = excluded.easiness_factor,
            repetition_number = excluded.repetition_number,
            interval_days = excluded.interval_days,
            next_review = excluded.next_review,
            last_reviewed = excluded.last_reviewed,
            total_attempts = excluded.total_attempts,
            correct_attempts = excluded.correct_attempts,
            mastery_score = excluded.mastery_score;",
    )?;
    for state in &update.states {
        upsert.execute(params![
            state.student_id.as_str(),
            state.core_loop_id.as_str(),
            state.easiness_factor,
            state.repetition_number,
            state.interval_days,
            state.next_review.map(|t| t.timestamp()),
            state.last_reviewed.map(|t| t.timestamp()),
            state.total_attempts,
            state.correct_attempts,
            state.mastery_score,
        ])?;
    }
    drop(upsert);

    // Collect the distinct topics of the updated core loops and recompute their aggregates,
    // followed by the aggregates of their courses.
    let mut topic_ids = UstrSet::default();
    for state in &update.states {
        let mut stmt = tx.prepare_cached("SELECT topic_id FROM core_loops WHERE id = ?1;")?;
        let topic_id: String = stmt
            .query_row(params![state.core_loop_id.as_str()], |row| row.get(0))
            .with_context(|| {
                format!("missing core loop {} during cascade", state.core_loop_id)
            })?;
        topic_ids.insert(Ustr::from(&topic_id));
    }

    let mut course_ids = UstrSet::default();
    for topic_id in &topic_ids {
        recompute_topic_mastery(tx, update.student_id, *topic_id, update.timestamp)?;
        let mut stmt = tx.prepare_cached("SELECT course_id FROM topics WHERE id = ?1;")?;
        let course_id: String = stmt
            .query_row(params![topic_id.as_str()], |row| row.get(0))
            .with_context(|| format!("missing topic {topic_id} during cascade"))?;
        course_ids.insert(Ustr::from(&course_id));
    }
    for course_id in &course_ids {
        recompute_course_mastery(tx, update.student_id, *course_id, update.timestamp)?;
    }
    Ok(())
}

/// Recomputes the mastery of a topic as the attempt-weighted mean of the mastery of its core
/// loops. Only core loops with a review state row participate; each contributes a weight of at
/// least one so that freshly reset loops still count.
fn recompute_topic_mastery(
    tx: &Transaction<'_>,
    student_id: Ustr,
    topic_id: Ustr,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "SELECT rs.mastery_score, rs.total_attempts
            FROM review_state rs
            JOIN core_loops cl ON cl.id = rs.core_loop_id
            WHERE rs.student_id = ?1 AND cl.topic_id = ?2;",
    )?;
    let rows = stmt
        .query_map(params![student_id.as_str(), topic_id.as_str()], |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, u32>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if rows.is_empty() {
        return Ok(());
    }

    let scores: Vec<f64> = rows.iter().map(|(score, _)| *score).collect();
    let weights: Vec<f64> = rows
        .iter()
        .map(|(_, attempts)| f64::from((*attempts).max(1)))
        .collect();
    let mastery_score = utils::weighted_average(&scores, &weights);

    let mut upsert = tx.prepare_cached(
        "INSERT INTO topic_mastery (student_id, topic_id, mastery_score, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(student_id, topic_id) DO UPDATE SET
            mastery_score = excluded.mastery_score,
            last_updated = excluded.last_updated;",
    )?;
    upsert.execute(params![
        student_id.as_str(),
        topic_id.as_str(),
        mastery_score,
        timestamp.timestamp(),
    ])?;
    Ok(())
}

/// Recomputes the mastery of a course as the attempt-weighted mean of the mastery of its topics.
fn recompute_course_mastery(
    tx: &Transaction<'_>,
    student_id: Ustr,
    course_id: Ustr,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "SELECT tm.mastery_score,
            (SELECT COALESCE(SUM(rs.total_attempts), 0)
                FROM review_state rs
                JOIN core_loops cl ON cl.id = rs.core_loop_id
                WHERE rs.student_id = tm.student_id AND cl.topic_id = tm.topic_id)
            FROM topic_mastery tm
            JOIN topics t ON t.id = tm.topic_id
            WHERE tm.student_id = ?1 AND t.course_id = ?2;",
    )?;
    let rows = stmt
        .query_map(params![student_id.as_str(), course_id.as_str()], |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if rows.is_empty() {
        return Ok(());
    }

    let scores: Vec<f64> = rows.iter().map(|(score, _)| *score).collect();
    let weights: Vec<f64> = rows
        .iter()
        .map(|(_, attempts)| (*attempts).max(1) as f64)
        .collect();
    let mastery_score = utils::weighted_average(&scores, &weights);

    let mut upsert = tx.prepare_cached(
        "INSERT INTO course_mastery (student_id, course_id, mastery_score, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(student_id, course_id) DO UPDATE SET
            mastery_score = excluded.mastery_score,
            last_updated = excluded.last_updated;",
    )?;
    upsert.execute(params![
        student_id.as_str(),
        course_id.as_str(),
        mastery_score,
        timestamp.timestamp(),
    ])?;
    Ok(())
}

/// An implementation of [`MasteryStore`] backed by `SQLite`.
pub struct LocalMasteryStore {
    /// A pool of connections to the database.
    pool: Pool<SqliteConnectionManager>,
}

impl LocalMasteryStore {
    /// Creates a new store sharing the given connection pool.
    #[must_use]
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    /// Helper to retrieve a single review state row.
    fn get_review_state_helper(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<Option<ReviewState>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT easiness_factor, repetition_number, interval_days, next_review,
                last_reviewed, total_attempts, correct_attempts, mastery_score
                FROM review_state WHERE student_id = ?1 AND core_loop_id = ?2;",
        )?;
        let mut rows = stmt.query(params![student_id.as_str(), core_loop_id.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let next_review: Option<i64> = row.get(3)?;
        let last_reviewed: Option<i64> = row.get(4)?;
        Ok(Some(ReviewState {
            student_id,
            core_loop_id,
            easiness_factor: row.get(0)?,
            repetition_number: row.get(1)?,
            interval_days: row.get(2)?,
            next_review: next_review.map(to_datetime).transpose()?,
            last_reviewed: last_reviewed.map(to_datetime).transpose()?,
            total_attempts: row.get(5)?,
            correct_attempts: row.get(6)?,
            mastery_score: row.get(7)?,
        }))
    }

    /// Helper to apply a cascade update in its own transaction.
    fn apply_cascade_helper(&mut self, update: &CascadeUpdate) -> Result<()> {
        let mut connection = self.pool.get()?;
        let tx = connection.transaction()?;
        execute_cascade(&tx, update)?;
        tx.commit()?;
        debug!(
            student_id = %update.student_id,
            core_loops = update.states.len(),
            "applied mastery cascade"
        );
        Ok(())
    }

    /// Helper to retrieve the due items of a course.
    fn due_items_helper(
        &self,
        student_id: Ustr,
        course_id: Ustr,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DueItem>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT rs.core_loop_id, rs.next_review, rs.mastery_score
                FROM review_state rs
                JOIN core_loops cl ON cl.id = rs.core_loop_id
                JOIN topics t ON t.id = cl.topic_id
                WHERE rs.student_id = ?1 AND t.course_id = ?2
                AND (rs.next_review IS NULL OR rs.next_review <= ?3)
                ORDER BY rs.next_review ASC NULLS FIRST;",
        )?;
        let rows = stmt
            .query_map(
                params![student_id.as_str(), course_id.as_str(), as_of.timestamp()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(core_loop_id, next_review, mastery_score)| -> Result<DueItem> {
                Ok(DueItem {
                    core_loop_id: Ustr::from(&core_loop_id),
                    next_review: next_review.map(to_datetime).transpose()?,
                    mastery_score,
                })
            })
            .collect()
    }

    /// Helper to retrieve all review states of a course.
    fn course_review_states_helper(
        &self,
        student_id: Ustr,
        course_id: Ustr,
    ) -> Result<Vec<ReviewState>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT rs.core_loop_id, rs.easiness_factor, rs.repetition_number,
                rs.interval_days, rs.next_review, rs.last_reviewed, rs.total_attempts,
                rs.correct_attempts, rs.mastery_score
                FROM review_state rs
                JOIN core_loops cl ON cl.id = rs.core_loop_id
                JOIN topics t ON t.id = cl.topic_id
                WHERE rs.student_id = ?1 AND t.course_id = ?2
                ORDER BY rs.core_loop_id;",
        )?;
        let rows = stmt
            .query_map(params![student_id.as_str(), course_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, f64>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(
                |(
                    core_loop_id,
                    easiness_factor,
                    repetition_number,
                    interval_days,
                    next_review,
                    last_reviewed,
                    total_attempts,
                    correct_attempts,
                    mastery_score,
                )|
                 -> Result<ReviewState> {
                    Ok(ReviewState {
                        student_id,
                        core_loop_id: Ustr::from(&core_loop_id),
                        easiness_factor,
                        repetition_number,
                        interval_days,
                        next_review: next_review.map(to_datetime).transpose()?,
                        last_reviewed: last_reviewed.map(to_datetime).transpose()?,
                        total_attempts,
                        correct_attempts,
                        mastery_score,
                    })
                },
            )
            .collect()
    }

    /// Helper to reset a review state row and recompute the affected aggregates.
    fn reset_review_state_helper(
        &mut self,
        student_id: Ustr,
        core_loop_id: Ustr,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = CascadeUpdate {
            student_id,
            states: vec![ReviewState::new(student_id, core_loop_id)],
            timestamp: now,
        };
        self.apply_cascade_helper(&update)
    }

    /// Helper to retrieve the most recent attempt scores against a core loop.
    fn recent_scores_helper(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT qa.score
                FROM quiz_answers qa
                JOIN quiz_sessions qs ON qs.id = qa.session_id
                JOIN exercise_core_loops ecl ON ecl.exercise_id = qa.exercise_id
                WHERE qs.student_id = ?1 AND ecl.core_loop_id = ?2
                ORDER BY qa.submitted_at DESC, qa.question_index DESC LIMIT ?3;",
        )?;
        let scores = stmt
            .query_map(
                params![student_id.as_str(), core_loop_id.as_str(), limit],
                |row| row.get::<_, f64>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    }
}

impl MasteryStore for LocalMasteryStore {
    fn get_review_state(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<Option<ReviewState>, MasteryStoreError> {
        self.get_review_state_helper(student_id, core_loop_id)
            .map_err(|e| MasteryStoreError::GetReviewState(student_id, core_loop_id, e))
    }

    fn get_review_states(
        &self,
        student_id: Ustr,
        core_loop_ids: &[Ustr],
    ) -> Result<UstrMap<ReviewState>, MasteryStoreError> {
        let mut states = UstrMap::default();
        for core_loop_id in core_loop_ids {
            if let Some(state) = self.get_review_state(student_id, *core_loop_id)? {
                states.insert(*core_loop_id, state);
            }
        }
        Ok(states)
    }

    fn course_review_states(
        &self,
        student_id: Ustr,
        course_id: Ustr,
    ) -> Result<Vec<ReviewState>, MasteryStoreError> {
        self.course_review_states_helper(student_id, course_id)
            .map_err(MasteryStoreError::Query)
    }

    fn apply_cascade(&mut self, update: &CascadeUpdate) -> Result<(), MasteryStoreError> {
        validate_update(update).map_err(MasteryStoreError::InternalInvariantViolated)?;
        self.apply_cascade_helper(update)
            .map_err(|e| MasteryStoreError::Cascade(update.student_id, e))
    }

    fn due_items(
        &self,
        student_id: Ustr,
        course_id: Ustr,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DueItem>, MasteryStoreError> {
        self.due_items_helper(student_id, course_id, as_of)
            .map_err(MasteryStoreError::Query)
    }

    fn topic_mastery(
        &self,
        student_id: Ustr,
        topic_id: Ustr,
    ) -> Result<Option<TopicMastery>, MasteryStoreError> {
        let get_helper = || -> Result<Option<TopicMastery>> {
            let connection = self.pool.get()?;
            let mut stmt = connection.prepare_cached(
                "SELECT mastery_score, last_updated FROM topic_mastery
                    WHERE student_id = ?1 AND topic_id = ?2;",
            )?;
            let mut rows = stmt.query(params![student_id.as_str(), topic_id.as_str()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            Ok(Some(TopicMastery {
                student_id,
                topic_id,
                mastery_score: row.get(0)?,
                last_updated: to_datetime(row.get(1)?)?,
            }))
        };
        get_helper().map_err(MasteryStoreError::Query)
    }

    fn course_mastery(
        &self,
        student_id: Ustr,
        course_id: Ustr,
    ) -> Result<Option<CourseMastery>, MasteryStoreError> {
        let get_helper = || -> Result<Option<CourseMastery>> {
            let connection = self.pool.get()?;
            let mut stmt = connection.prepare_cached(
                "SELECT mastery_score, last_updated FROM course_mastery
                    WHERE student_id = ?1 AND course_id = ?2;",
            )?;
            let mut rows = stmt.query(params![student_id.as_str(), course_id.as_str()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            Ok(Some(CourseMastery {
                student_id,
                course_id,
                mastery_score: row.get(0)?,
                last_updated: to_datetime(row.get(1)?)?,
            }))
        };
        get_helper().map_err(MasteryStoreError::Query)
    }

    fn reset_review_state(
        &mut self,
        student_id: Ustr,
        core_loop_id: Ustr,
        now: DateTime<Utc>,
    ) -> Result<(), MasteryStoreError> {
        self.reset_review_state_helper(student_id, core_loop_id, now)
            .map_err(|e| MasteryStoreError::Reset(student_id, core_loop_id, e))
    }

    fn recent_scores(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
        limit: usize,
    ) -> Result<Vec<f64>, MasteryStoreError> {
        self.recent_scores_helper(student_id, core_loop_id, limit)
            .map_err(MasteryStoreError::Query)
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use ustr::Ustr;

    use crate::data::{CoreLoop, CoreLoopType, ReviewState, Topic};
    use crate::db;
    use crate::error::MasteryStoreError;
    use crate::exercise_library::{ExerciseLibrary, LocalExerciseLibrary};
    use crate::mastery_store::{CascadeUpdate, LocalMasteryStore, MasteryStore};

    /// Returns a fixed timestamp to use as the current time in tests.
    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// Returns a store and library sharing a fresh database seeded with two topics of one course
    /// and two core loops each.
    fn new_test_store() -> Result<(LocalMasteryStore, tempfile::TempDir)> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("mastery.db");
        let pool = db::new_pool_from_disk(db_path.to_str().unwrap())?;
        let mut library = LocalExerciseLibrary::new(pool.clone());
        for (topic_id, loops) in [("topic_1", ["loop_1", "loop_2"]), ("topic_2", ["loop_3", "loop_4"])] {
            library.add_topic(Topic {
                id: Ustr::from(topic_id),
                course_id: Ustr::from("course_1"),
                name: topic_id.to_string(),
                language: "en".into(),
            })?;
            for loop_id in loops {
                library.add_core_loop(CoreLoop {
                    id: Ustr::from(loop_id),
                    name: loop_id.to_string(),
                    loop_type: CoreLoopType::Analysis,
                    topic_id: Ustr::from(topic_id),
                    language: "en".into(),
                })?;
            }
        }
        Ok((LocalMasteryStore::new(pool), dir))
    }

    /// Returns a review state with the given mastery and attempts, reviewed just now.
    fn reviewed_state(loop_id: &str, mastery: f64, attempts: u32) -> ReviewState {
        let mut state = ReviewState::new(Ustr::from("student_1"), Ustr::from(loop_id));
        state.mastery_score = mastery;
        state.total_attempts = attempts;
        state.correct_attempts = 0;
        state.repetition_number = 1;
        state.interval_days = 1;
        state.next_review = Some(now() + Duration::days(1));
        state.last_reviewed = Some(now());
        state
    }

    /// Verifies that a cascade writes the review states and the aggregates together.
    #[test]
    fn cascade_updates_states_and_aggregates() -> Result<()> {
        let (mut store, _dir) = new_test_store()?;
        let student = Ustr::from("student_1");
        let update = CascadeUpdate {
            student_id: student,
            states: vec![
                reviewed_state("loop_1", 0.8, 4),
                reviewed_state("loop_2", 0.4, 1),
            ],
            timestamp: now(),
        };
        store.apply_cascade(&update)?;

        let state = store.get_review_state(student, Ustr::from("loop_1"))?.unwrap();
        assert_eq!(state.mastery_score, 0.8);
        assert_eq!(state.total_attempts, 4);

        // Topic mastery is the attempt-weighted mean of its loops.
        let topic = store.topic_mastery(student, Ustr::from("topic_1"))?.unwrap();
        let expected = (0.8 * 4.0 + 0.4 * 1.0) / 5.0;
        assert!((topic.mastery_score - expected).abs() < 1e-9);

        // Course mastery covers only topics with state so far.
        let course = store.course_mastery(student, Ustr::from("course_1"))?.unwrap();
        assert!((course.mastery_score - expected).abs() < 1e-9);
        Ok(())
    }

    /// Verifies that an invalid cascade plan is rejected without touching the store.
    #[test]
    fn invalid_cascade_rejected() -> Result<()> {
        let (mut store, _dir) = new_test_store()?;
        let student = Ustr::from("student_1");
        let mut bad_state = reviewed_state("loop_1", 0.8, 4);
        bad_state.correct_attempts = 10;
        let update = CascadeUpdate {
            student_id: student,
            states: vec![bad_state],
            timestamp: now(),
        };
        assert!(matches!(
            store.apply_cascade(&update),
            Err(MasteryStoreError::InternalInvariantViolated(_))
        ));
        assert!(store.get_review_state(student, Ustr::from("loop_1"))?.is_none());
        Ok(())
    }

    /// Verifies the due item query, including the ordering of never-scheduled loops.
    #[test]
    fn due_items_ordering() -> Result<()> {
        let (mut store, _dir) = new_test_store()?;
        let student = Ustr::from("student_1");

        // loop_1 is due in the past, loop_3 in the future, and loop_2 has a state with no
        // scheduled review.
        let mut overdue = reviewed_state("loop_1", 0.5, 1);
        overdue.next_review = Some(now() - Duration::days(2));
        let mut future = reviewed_state("loop_3", 0.5, 1);
        future.next_review = Some(now() + Duration::days(5));
        let mut unscheduled = reviewed_state("loop_2", 0.5, 1);
        unscheduled.next_review = None;
        unscheduled.repetition_number = 0;
        unscheduled.interval_days = 0;

        store.apply_cascade(&CascadeUpdate {
            student_id: student,
            states: vec![overdue, future, unscheduled],
            timestamp: now(),
        })?;

        let due = store.due_items(student, Ustr::from("course_1"), now())?;
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].core_loop_id, Ustr::from("loop_2"));
        assert!(due[0].next_review.is_none());
        assert_eq!(due[1].core_loop_id, Ustr::from("loop_1"));
        Ok(())
    }

    /// Verifies that resetting a review state returns it to the defaults but keeps the row.
    #[test]
    fn reset_keeps_row() -> Result<()> {
        let (mut store, _dir) = new_test_store()?;
        let student = Ustr::from("student_1");
        store.apply_cascade(&CascadeUpdate {
            student_id: student,
            states: vec![reviewed_state("loop_1", 0.9, 7)],
            timestamp: now(),
        })?;

        store.reset_review_state(student, Ustr::from("loop_1"), now())?;
        let state = store.get_review_state(student, Ustr::from("loop_1"))?.unwrap();
        assert_eq!(state, ReviewState::new(student, Ustr::from("loop_1")));

        // The topic aggregate reflects the reset with the minimum weight of one.
        let topic = store.topic_mastery(student, Ustr::from("topic_1"))?.unwrap();
        assert_eq!(topic.mastery_score, 0.0);
        Ok(())
    }
}
