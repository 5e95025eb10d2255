//! Defines the storage for the corpus of exercises, core loops, and topics.
//!
//! Exercises enter the engine through this module once the external analyzer has discovered
//! their topic and core loops. They are immutable after ingest: the engine never updates an
//! exercise and never calls back into the analyzer. The library is also the read side used by the
//! selector and the advisor to enumerate candidate exercises and the core loops of a course.

use anyhow::{Result, anyhow};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::debug;
use ustr::Ustr;

use crate::data::{CoreLoop, CoreLoopType, Difficulty, Exercise, ExerciseType, Topic, filter::QuizFilter};
use crate::error::LibraryError;

/// A summary of the exercises linked to a core loop, used by the advisor to order new content.
#[derive(Clone, Debug, PartialEq)]
pub struct CoreLoopContent {
    /// The ID of the core loop.
    pub core_loop_id: Ustr,

    /// The number of analyzed exercises linked to the core loop, in any position.
    pub exercise_count: usize,

    /// The easiest difficulty among those exercises, if any exist.
    pub easiest_difficulty: Option<Difficulty>,
}

/// An interface to ingest and retrieve the study material of the engine.
pub trait ExerciseLibrary: Send + Sync {
    /// Adds a new topic to the library.
    fn add_topic(&mut self, topic: Topic) -> Result<(), LibraryError>;

    /// Adds a new core loop to the library. The topic it references must exist.
    fn add_core_loop(&mut self, core_loop: CoreLoop) -> Result<(), LibraryError>;

    /// Adds a new exercise to the library. The topic and every core loop it references must
    /// exist, and the core loop list must not be empty. Exercises are immutable: adding an
    /// exercise with an existing ID is rejected.
    fn add_exercise(&mut self, exercise: Exercise) -> Result<(), LibraryError>;

    /// Returns the topic with the given ID.
    fn get_topic(&self, topic_id: Ustr) -> Result<Option<Topic>, LibraryError>;

    /// Returns the core loop with the given ID.
    fn get_core_loop(&self, core_loop_id: Ustr) -> Result<Option<CoreLoop>, LibraryError>;

    /// Returns the exercise with the given ID.
    fn get_exercise(&self, exercise_id: Ustr) -> Result<Option<Exercise>, LibraryError>;

    /// Returns the analyzed exercises of the course matching the given filter, in stable ID
    /// order.
    fn find_candidates(
        &self,
        course_id: Ustr,
        filter: &QuizFilter,
    ) -> Result<Vec<Exercise>, LibraryError>;

    /// Returns all the core loops of the course.
    fn get_course_core_loops(&self, course_id: Ustr) -> Result<Vec<CoreLoop>, LibraryError>;

    /// Returns the exercise counts and easiest difficulties of the course's core loops.
    fn core_loop_contents(&self, course_id: Ustr) -> Result<Vec<CoreLoopContent>, LibraryError>;
}

/// An implementation of [`ExerciseLibrary`] backed by `SQLite`.
pub struct LocalExerciseLibrary {
    /// A pool of connections to the database.
    pool: Pool<SqliteConnectionManager>,
}

impl LocalExerciseLibrary {
    /// Creates a new library sharing the given connection pool.
    #[must_use]
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    /// Helper to check whether a row with the given ID exists in the given table.
    fn id_exists(&self, table: &str, id: Ustr) -> Result<bool> {
        let connection = self.pool.get()?;
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);");
        let mut stmt = connection.prepare_cached(&sql)?;
        let exists: bool = stmt.query_row(params![id.as_str()], |row| row.get(0))?;
        Ok(exists)
    }

    /// Helper to insert a topic.
    fn add_topic_helper(&mut self, topic: &Topic) -> Result<()> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "INSERT INTO topics (id, course_id, name, language) VALUES (?1, ?2, ?3, ?4);",
        )?;
        stmt.execute(params![
            topic.id.as_str(),
            topic.course_id.as_str(),
            topic.name,
            topic.language,
        ])?;
        Ok(())
    }

    /// Helper to insert a core loop.
    fn add_core_loop_helper(&mut self, core_loop: &CoreLoop) -> Result<()> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "INSERT INTO core_loops (id, name, loop_type, topic_id, language)
                VALUES (?1, ?2, ?3, ?4, ?5);",
        )?;
        stmt.execute(params![
            core_loop.id.as_str(),
            core_loop.name,
            core_loop.loop_type.to_string(),
            core_loop.topic_id.as_str(),
            core_loop.language,
        ])?;
        Ok(())
    }

    /// Helper to insert an exercise and its core loop links in one transaction.
    fn add_exercise_helper(&mut self, exercise: &Exercise) -> Result<()> {
        let mut connection = self.pool.get()?;
        let tx = connection.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO exercises
                    (id, course_id, topic_id, primary_core_loop_id, difficulty, exercise_type,
                    tags, analyzed)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            )?;
            let primary = exercise
                .primary_core_loop()
                .ok_or_else(|| anyhow!("exercise {} has no core loops", exercise.id))?;
            stmt.execute(params![
                exercise.id.as_str(),
                exercise.course_id.as_str(),
                exercise.topic_id.as_str(),
                primary.as_str(),
                exercise.difficulty.to_string(),
                exercise.exercise_type.to_string(),
                serde_json::to_string(&exercise.tags)?,
                exercise.analyzed,
            ])?;

            let mut link_stmt = tx.prepare_cached(
                "INSERT INTO exercise_core_loops (exercise_id, core_loop_id, step_number)
                    VALUES (?1, ?2, ?3);",
            )?;
            for (step_number, core_loop_id) in exercise.core_loop_ids.iter().enumerate() {
                link_stmt.execute(params![
                    exercise.id.as_str(),
                    core_loop_id.as_str(),
                    step_number,
                ])?;
            }
        }
        tx.commit()?;
        debug!(exercise_id = %exercise.id, "ingested exercise");
        Ok(())
    }

    /// Helper to retrieve the ordered core loop IDs of an exercise.
    fn get_core_loop_ids(&self, exercise_id: Ustr) -> Result<Vec<Ustr>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT core_loop_id FROM exercise_core_loops WHERE exercise_id = ?1
                ORDER BY step_number;",
        )?;
        let ids = stmt
            .query_map(params![exercise_id.as_str()], |row| {
                row.get::<_, String>(0)
            })?
            .map(|r| r.map(|id| Ustr::from(&id)))
            .collect::<Result<Vec<Ustr>, _>>()?;
        Ok(ids)
    }

    /// Helper to convert an exercise row plus its links into an [`Exercise`].
    fn row_to_exercise(
        &self,
        id: String,
        course_id: String,
        topic_id: String,
        difficulty: String,
        exercise_type: String,
        tags: String,
        analyzed: bool,
    ) -> Result<Exercise> {
        let id = Ustr::from(&id);
        Ok(Exercise {
            id,
            course_id: Ustr::from(&course_id),
            topic_id: Ustr::from(&topic_id),
            core_loop_ids: self.get_core_loop_ids(id)?,
            difficulty: Difficulty::from_str(&difficulty)?,
            exercise_type: ExerciseType::from_str(&exercise_type)?,
            tags: serde_json::from_str::<BTreeSet<String>>(&tags)?,
            analyzed,
        })
    }

    /// Helper to retrieve an exercise by ID.
    fn get_exercise_helper(&self, exercise_id: Ustr) -> Result<Option<Exercise>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT id, course_id, topic_id, difficulty, exercise_type, tags, analyzed
                FROM exercises WHERE id = ?1;",
        )?;
        let mut rows = stmt.query(params![exercise_id.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let exercise = self.row_to_exercise(
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        )?;
        Ok(Some(exercise))
    }

    /// Helper to retrieve the candidate exercises for a course and filter.
    fn find_candidates_helper(
        &self,
        course_id: Ustr,
        filter: &QuizFilter,
    ) -> Result<Vec<Exercise>> {
        // Build the query from the parts of the filter that are set. The parameters are
        // positional, so they are pushed in the same order as the conditions.
        let mut sql = String::from(
            "SELECT id, course_id, topic_id, difficulty, exercise_type, tags, analyzed
                FROM exercises WHERE course_id = ? AND analyzed = 1",
        );
        let mut sql_params: Vec<String> = vec![course_id.as_str().to_string()];
        if let Some(topic_id) = filter.topic_id {
            sql.push_str(" AND topic_id = ?");
            sql_params.push(topic_id.as_str().to_string());
        }
        if let Some(core_loop_id) = filter.core_loop_id {
            sql.push_str(
                " AND id IN (SELECT exercise_id FROM exercise_core_loops WHERE core_loop_id = ?)",
            );
            sql_params.push(core_loop_id.as_str().to_string());
        }
        if let Some(difficulty) = filter.difficulty {
            sql.push_str(" AND difficulty = ?");
            sql_params.push(difficulty.to_string());
        }
        if let Some(exercise_type) = filter.exercise_type {
            sql.push_str(" AND exercise_type = ?");
            sql_params.push(exercise_type.to_string());
        }
        sql.push_str(" ORDER BY id;");

        let connection = self.pool.get()?;
        let mut stmt = connection.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(sql_params.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut exercises = Vec::with_capacity(rows.len());
        for (id, course, topic, difficulty, exercise_type, tags, analyzed) in rows {
            exercises.push(self.row_to_exercise(
                id,
                course,
                topic,
                difficulty,
                exercise_type,
                tags,
                analyzed,
            )?);
        }
        Ok(exercises)
    }

    /// Helper to retrieve the core loops of a course.
    fn get_course_core_loops_helper(&self, course_id: Ustr) -> Result<Vec<CoreLoop>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT cl.id, cl.name, cl.loop_type, cl.topic_id, cl.language
                FROM core_loops cl
                JOIN topics t ON t.id = cl.topic_id
                WHERE t.course_id = ?1
                ORDER BY cl.id;",
        )?;
        let core_loops = stmt
            .query_map(params![course_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, name, loop_type, topic_id, language)| -> Result<CoreLoop> {
                Ok(CoreLoop {
                    id: Ustr::from(&id),
                    name,
                    loop_type: CoreLoopType::from_str(&loop_type)?,
                    topic_id: Ustr::from(&topic_id),
                    language,
                })
            })
            .collect::<Result<Vec<CoreLoop>>>()?;
        Ok(core_loops)
    }

    /// Helper to compute the exercise counts and easiest difficulties per core loop.
    fn core_loop_contents_helper(&self, course_id: Ustr) -> Result<Vec<CoreLoopContent>> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT cl.id, e.difficulty
                FROM core_loops cl
                JOIN topics t ON t.id = cl.topic_id
                LEFT JOIN exercise_core_loops ecl ON ecl.core_loop_id = cl.id
                LEFT JOIN exercises e ON e.id = ecl.exercise_id AND e.analyzed = 1
                WHERE t.course_id = ?1
                ORDER BY cl.id;",
        )?;
        let rows = stmt
            .query_map(params![course_id.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        // Fold the joined rows into one entry per core loop. The rows are ordered by core loop
        // ID, so a change of ID starts a new entry.
        let mut contents: Vec<CoreLoopContent> = Vec::new();
        for (id, difficulty) in rows {
            let core_loop_id = Ustr::from(&id);
            let difficulty = difficulty.map(|d| Difficulty::from_str(&d)).transpose()?;
            match contents.last_mut() {
                Some(last) if last.core_loop_id == core_loop_id => {
                    if difficulty.is_some() {
                        last.exercise_count += 1;
                        last.easiest_difficulty = match (last.easiest_difficulty, difficulty) {
                            (Some(current), Some(new)) => Some(current.min(new)),
                            (current, new) => current.or(new),
                        };
                    }
                }
                _ => contents.push(CoreLoopContent {
                    core_loop_id,
                    exercise_count: usize::from(difficulty.is_some()),
                    easiest_difficulty: difficulty,
                }),
            }
        }
        Ok(contents)
    }
}

impl ExerciseLibrary for LocalExerciseLibrary {
    fn add_topic(&mut self, topic: Topic) -> Result<(), LibraryError> {
        if self
            .id_exists("topics", topic.id)
            .map_err(LibraryError::Storage)?
        {
            return Err(LibraryError::DuplicateTopic(topic.id));
        }
        self.add_topic_helper(&topic).map_err(LibraryError::Storage)
    }

    fn add_core_loop(&mut self, core_loop: CoreLoop) -> Result<(), LibraryError> {
        if self
            .id_exists("core_loops", core_loop.id)
            .map_err(LibraryError::Storage)?
        {
            return Err(LibraryError::DuplicateCoreLoop(core_loop.id));
        }
        if !self
            .id_exists("topics", core_loop.topic_id)
            .map_err(LibraryError::Storage)?
        {
            return Err(LibraryError::UnknownTopic(core_loop.topic_id));
        }
        self.add_core_loop_helper(&core_loop)
            .map_err(LibraryError::Storage)
    }

    fn add_exercise(&mut self, exercise: Exercise) -> Result<(), LibraryError> {
        if exercise.core_loop_ids.is_empty() {
            return Err(LibraryError::EmptyCoreLoops(exercise.id));
        }
        if self
            .id_exists("exercises", exercise.id)
            .map_err(LibraryError::Storage)?
        {
            return Err(LibraryError::DuplicateExercise(exercise.id));
        }
        if !self
            .id_exists("topics", exercise.topic_id)
            .map_err(LibraryError::Storage)?
        {
            return Err(LibraryError::UnknownTopic(exercise.topic_id));
        }
        for core_loop_id in &exercise.core_loop_ids {
            if !self
                .id_exists("core_loops", *core_loop_id)
                .map_err(LibraryError::Storage)?
            {
                return Err(LibraryError::UnknownCoreLoop(*core_loop_id));
            }
        }
        self.add_exercise_helper(&exercise)
            .map_err(LibraryError::Storage)
    }

    fn get_topic(&self, topic_id: Ustr) -> Result<Option<Topic>, LibraryError> {
        let get_helper = || -> Result<Option<Topic>> {
            let connection = self.pool.get()?;
            let mut stmt = connection.prepare_cached(
                "SELECT id, course_id, name, language FROM topics WHERE id = ?1;",
            )?;
            let mut rows = stmt.query(params![topic_id.as_str()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            Ok(Some(Topic {
                id: Ustr::from(&row.get::<_, String>(0)?),
                course_id: Ustr::from(&row.get::<_, String>(1)?),
                name: row.get(2)?,
                language: row.get(3)?,
            }))
        };
        get_helper().map_err(LibraryError::Storage)
    }

    fn get_core_loop(&self, core_loop_id: Ustr) -> Result<Option<CoreLoop>, LibraryError> {
        let get_helper = || -> Result<Option<CoreLoop>> {
            let connection = self.pool.get()?;
            let mut stmt = connection.prepare_cached(
                "SELECT id, name, loop_type, topic_id, language FROM core_loops WHERE id = ?1;",
            )?;
            let mut rows = stmt.query(params![core_loop_id.as_str()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            Ok(Some(CoreLoop {
                id: Ustr::from(&row.get::<_, String>(0)?),
                name: row.get(1)?,
                loop_type: CoreLoopType::from_str(&row.get::<_, String>(2)?)?,
                topic_id: Ustr::from(&row.get::<_, String>(3)?),
                language: row.get(4)?,
            }))
        };
        get_helper().map_err(LibraryError::Storage)
    }

    fn get_exercise(&self, exercise_id: Ustr) -> Result<Option<Exercise>, LibraryError> {
        self.get_exercise_helper(exercise_id)
            .map_err(LibraryError::Storage)
    }

    fn find_candidates(
        &self,
        course_id: Ustr,
        filter: &QuizFilter,
    ) -> Result<Vec<Exercise>, LibraryError> {
        self.find_candidates_helper(course_id, filter)
            .map_err(LibraryError::Storage)
    }

    fn get_course_core_loops(&self, course_id: Ustr) -> Result<Vec<CoreLoop>, LibraryError> {
        self.get_course_core_loops_helper(course_id)
            .map_err(LibraryError::Storage)
    }

    fn core_loop_contents(&self, course_id: Ustr) -> Result<Vec<CoreLoopContent>, LibraryError> {
        self.core_loop_contents_helper(course_id)
            .map_err(LibraryError::Storage)
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use ustr::Ustr;

    use crate::data::{
        CoreLoop, CoreLoopType, Difficulty, ExerciseBuilder, ExerciseType, Topic,
        filter::QuizFilter,
    };
    use crate::db;
    use crate::error::LibraryError;
    use crate::exercise_library::{ExerciseLibrary, LocalExerciseLibrary};

    /// Returns a library backed by a fresh database, seeded with one topic and two core loops.
    fn new_test_library() -> Result<(LocalExerciseLibrary, tempfile::TempDir)> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("library.db");
        let pool = db::new_pool_from_disk(db_path.to_str().unwrap())?;
        let mut library = LocalExerciseLibrary::new(pool);
        library.add_topic(Topic {
            id: Ustr::from("topic_1"),
            course_id: Ustr::from("course_1"),
            name: "Boolean Algebra".into(),
            language: "en".into(),
        })?;
        for loop_id in ["loop_1", "loop_2"] {
            library.add_core_loop(CoreLoop {
                id: Ustr::from(loop_id),
                name: format!("Loop {loop_id}"),
                loop_type: CoreLoopType::Minimization,
                topic_id: Ustr::from("topic_1"),
                language: "en".into(),
            })?;
        }
        Ok((library, dir))
    }

    /// Returns an exercise linked to both test core loops.
    fn test_exercise(id: &str) -> crate::data::Exercise {
        ExerciseBuilder::default()
            .id(id)
            .course_id("course_1")
            .topic_id("topic_1")
            .core_loop_ids(vec![Ustr::from("loop_1"), Ustr::from("loop_2")])
            .difficulty(Difficulty::Medium)
            .exercise_type(ExerciseType::Procedural)
            .build()
            .unwrap()
    }

    /// Verifies ingesting and retrieving an exercise with its ordered core loops.
    #[test]
    fn add_and_get_exercise() -> Result<()> {
        let (mut library, _dir) = new_test_library()?;
        library.add_exercise(test_exercise("ex_1"))?;

        let exercise = library.get_exercise(Ustr::from("ex_1"))?.unwrap();
        assert_eq!(exercise.primary_core_loop(), Some(Ustr::from("loop_1")));
        assert_eq!(
            exercise.core_loop_ids,
            vec![Ustr::from("loop_1"), Ustr::from("loop_2")]
        );
        assert!(exercise.analyzed);
        Ok(())
    }

    /// Verifies that exercises are immutable: re-ingesting an ID is rejected.
    #[test]
    fn duplicate_exercise_rejected() -> Result<()> {
        let (mut library, _dir) = new_test_library()?;
        library.add_exercise(test_exercise("ex_1"))?;
        assert!(matches!(
            library.add_exercise(test_exercise("ex_1")),
            Err(LibraryError::DuplicateExercise(_))
        ));
        Ok(())
    }

    /// Verifies that references to unknown topics and core loops are rejected.
    #[test]
    fn unknown_references_rejected() -> Result<()> {
        let (mut library, _dir) = new_test_library()?;

        let mut exercise = test_exercise("ex_1");
        exercise.core_loop_ids = vec![Ustr::from("loop_404")];
        assert!(matches!(
            library.add_exercise(exercise),
            Err(LibraryError::UnknownCoreLoop(_))
        ));

        let mut exercise = test_exercise("ex_2");
        exercise.topic_id = Ustr::from("topic_404");
        assert!(matches!(
            library.add_exercise(exercise),
            Err(LibraryError::UnknownTopic(_))
        ));

        let mut exercise = test_exercise("ex_3");
        exercise.core_loop_ids = vec![];
        assert!(matches!(
            library.add_exercise(exercise),
            Err(LibraryError::EmptyCoreLoops(_))
        ));
        Ok(())
    }

    /// Verifies candidate queries with filters and the analyzed flag.
    #[test]
    fn find_candidates() -> Result<()> {
        let (mut library, _dir) = new_test_library()?;
        library.add_exercise(test_exercise("ex_1"))?;

        let mut hard = test_exercise("ex_2");
        hard.difficulty = Difficulty::Hard;
        library.add_exercise(hard)?;

        let mut unanalyzed = test_exercise("ex_3");
        unanalyzed.analyzed = false;
        library.add_exercise(unanalyzed)?;

        // Unanalyzed exercises are never candidates.
        let all = library.find_candidates(Ustr::from("course_1"), &QuizFilter::all())?;
        assert_eq!(
            all.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![Ustr::from("ex_1"), Ustr::from("ex_2")]
        );

        // Difficulty filters narrow the pool.
        let hard_only = library.find_candidates(
            Ustr::from("course_1"),
            &QuizFilter {
                difficulty: Some(Difficulty::Hard),
                ..QuizFilter::default()
            },
        )?;
        assert_eq!(hard_only.len(), 1);
        assert_eq!(hard_only[0].id, Ustr::from("ex_2"));

        // A filter on a core loop matches any link position.
        let by_loop =
            library.find_candidates(Ustr::from("course_1"), &QuizFilter::core_loop(Ustr::from("loop_2")))?;
        assert_eq!(by_loop.len(), 2);
        Ok(())
    }

    /// Verifies the per-core-loop content summaries.
    #[test]
    fn core_loop_contents() -> Result<()> {
        let (mut library, _dir) = new_test_library()?;
        library.add_exercise(test_exercise("ex_1"))?;
        let mut easy = test_exercise("ex_2");
        easy.difficulty = Difficulty::Easy;
        easy.core_loop_ids = vec![Ustr::from("loop_1")];
        library.add_exercise(easy)?;

        let contents = library.core_loop_contents(Ustr::from("course_1"))?;
        assert_eq!(contents.len(), 2);
        let loop_1 = contents
            .iter()
            .find(|c| c.core_loop_id == Ustr::from("loop_1"))
            .unwrap();
        assert_eq!(loop_1.exercise_count, 2);
        assert_eq!(loop_1.easiest_difficulty, Some(Difficulty::Easy));
        let loop_2 = contents
            .iter()
            .find(|c| c.core_loop_id == Ustr::from("loop_2"))
            .unwrap();
        assert_eq!(loop_2.exercise_count, 1);
        assert_eq!(loop_2.easiest_difficulty, Some(Difficulty::Medium));
        Ok(())
    }
}
