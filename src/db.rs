//! Defines the SQLite schema shared by the engine's storage components.
//!
//! Unlike a design with one database file per concern, all persisted tables live in a single
//! database. The mastery cascade must update review state, topic aggregates, and course
//! aggregates atomically together with the answer row that triggered it, which requires a single
//! transaction over a single connection. The components each hold a clone of the same connection
//! pool and prepare their own statements.

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite_migration::{M, Migrations};

use crate::utils;

/// Returns all the migrations needed to set up the database.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Create a table with the topics of each course.
        M::up(
            "CREATE TABLE topics(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            name TEXT NOT NULL,
            language TEXT NOT NULL);",
        )
        .down("DROP TABLE topics;"),
        // Create a table with the core loops of each topic.
        M::up(
            "CREATE TABLE core_loops(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            loop_type TEXT NOT NULL,
            topic_id TEXT NOT NULL REFERENCES topics(id),
            language TEXT NOT NULL);",
        )
        .down("DROP TABLE core_loops;"),
        // Create a table with the exercises. The primary core loop is materialized in its own
        // column so that selection queries can use an index instead of joining through the
        // link table.
        M::up(
            "CREATE TABLE exercises(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            topic_id TEXT NOT NULL REFERENCES topics(id),
            primary_core_loop_id TEXT NOT NULL REFERENCES core_loops(id),
            difficulty TEXT NOT NULL,
            exercise_type TEXT NOT NULL,
            tags TEXT NOT NULL,
            analyzed INTEGER NOT NULL);",
        )
        .down("DROP TABLE exercises;"),
        // Create the ordered many-to-many link between exercises and core loops.
        M::up(
            "CREATE TABLE exercise_core_loops(
            exercise_id TEXT NOT NULL REFERENCES exercises(id),
            core_loop_id TEXT NOT NULL REFERENCES core_loops(id),
            step_number INTEGER NOT NULL,
            UNIQUE(exercise_id, core_loop_id));",
        )
        .down("DROP TABLE exercise_core_loops;"),
        // Create the per-(student, core loop) review state table.
        M::up(
            "CREATE TABLE review_state(
            student_id TEXT NOT NULL,
            core_loop_id TEXT NOT NULL REFERENCES core_loops(id),
            easiness_factor REAL NOT NULL,
            repetition_number INTEGER NOT NULL,
            interval_days INTEGER NOT NULL,
            next_review INTEGER,
            last_reviewed INTEGER,
            total_attempts INTEGER NOT NULL,
            correct_attempts INTEGER NOT NULL,
            mastery_score REAL NOT NULL,
            PRIMARY KEY(student_id, core_loop_id));",
        )
        .down("DROP TABLE review_state;"),
        // Create the per-topic mastery aggregate table.
        M::up(
            "CREATE TABLE topic_mastery(
            student_id TEXT NOT NULL,
            topic_id TEXT NOT NULL REFERENCES topics(id),
            mastery_score REAL NOT NULL,
            last_updated INTEGER NOT NULL,
            PRIMARY KEY(student_id, topic_id));",
        )
        .down("DROP TABLE topic_mastery;"),
        // Create the per-course mastery aggregate table.
        M::up(
            "CREATE TABLE course_mastery(
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            mastery_score REAL NOT NULL,
            last_updated INTEGER NOT NULL,
            PRIMARY KEY(student_id, course_id));",
        )
        .down("DROP TABLE course_mastery;"),
        // Create the quiz session table. The filters and the frozen question list are stored as
        // JSON columns.
        M::up(
            "CREATE TABLE quiz_sessions(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            quiz_type TEXT NOT NULL,
            filters_json TEXT NOT NULL,
            question_ids_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            completed_at INTEGER,
            state TEXT NOT NULL);",
        )
        .down("DROP TABLE quiz_sessions;"),
        // Create the quiz answer table, unique per (session, question index).
        M::up(
            "CREATE TABLE quiz_answers(
            session_id TEXT NOT NULL REFERENCES quiz_sessions(id),
            question_index INTEGER NOT NULL,
            exercise_id TEXT NOT NULL,
            user_answer TEXT NOT NULL,
            score REAL NOT NULL,
            correct INTEGER NOT NULL,
            hint_used INTEGER NOT NULL,
            time_taken_s REAL,
            submitted_at INTEGER NOT NULL,
            UNIQUE(session_id, question_index));",
        )
        .down("DROP TABLE quiz_answers;"),
        // Create the prerequisite edge table.
        M::up(
            "CREATE TABLE prerequisite_edges(
            prereq_core_loop_id TEXT NOT NULL,
            dependent_core_loop_id TEXT NOT NULL,
            UNIQUE(prereq_core_loop_id, dependent_core_loop_id));",
        )
        .down("DROP TABLE prerequisite_edges;"),
        // Create an index for candidate queries by course and primary core loop.
        M::up(
            "CREATE INDEX exercises_by_course ON exercises (course_id, primary_core_loop_id);",
        )
        .down("DROP INDEX exercises_by_course;"),
        // Create an index for due-item queries by student and review time.
        M::up("CREATE INDEX review_state_by_due ON review_state (student_id, next_review);")
            .down("DROP INDEX review_state_by_due;"),
        // Create an index for looking up the exercises linked to a core loop.
        M::up("CREATE INDEX links_by_core_loop ON exercise_core_loops (core_loop_id);")
            .down("DROP INDEX links_by_core_loop;"),
    ])
}

/// Opens a connection pool to the database at the given path and runs the migrations. If the
/// migrations have been applied already, they will have no effect on the database.
pub fn new_pool_from_disk(db_path: &str) -> Result<Pool<SqliteConnectionManager>> {
    let connection_manager = utils::new_connection_manager(db_path);
    let pool = utils::new_connection_pool(connection_manager)
        .with_context(|| format!("cannot open engine DB at path {db_path}"))?;
    let mut connection = pool.get()?;
    migrations()
        .to_latest(&mut connection)
        .context("failed to initialize engine DB")?;
    Ok(pool)
}

#[cfg(test)]
mod test {
    use anyhow::Result;

    use super::*;

    /// Verifies that the migrations can be applied and rolled back.
    #[test]
    fn migrations_valid() -> Result<()> {
        migrations().validate()?;
        Ok(())
    }

    /// Verifies that opening the same database twice is a no-op the second time.
    #[test]
    fn reopen_database() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("engine.db");
        let db_path = db_path.to_str().unwrap();
        let _pool = new_pool_from_disk(db_path)?;
        let _pool = new_pool_from_disk(db_path)?;
        Ok(())
    }
}
