//! Mnemo is an adaptive learning engine for spaced-repetition study. Given a corpus of exercises
//! that has been tagged with a topic and one or more core loops (named procedural patterns, the
//! unit of mastery tracking), it drives a student's study sessions: it schedules reviews with the
//! SM-2 algorithm, selects quiz questions by mastery-weighted priority, maps evaluated answer
//! scores into review quality, and cascades the effect of every answer from the exercise up
//! through its core loops, topic, and course.
//!
//! The engine deliberately stops at the edges of that loop. Extracting exercises from documents,
//! discovering their topics and core loops, and judging free-form answers all require outside
//! help, typically an LLM, and are consumed behind narrow interfaces. What remains is the part
//! that must be exact: the scheduling math, the selection ordering, the transactional mastery
//! cascade, and the prerequisite gating that decides when a student is ready for new material.

//! Mnemo is named after Mnemosyne, the Greek personification of memory and, fittingly for a
//! study companion, the mother of the Muses.

pub mod advisor;
pub mod aggregator;
pub mod clock;
pub mod data;
pub mod db;
pub mod error;
pub mod evaluator;
pub mod exercise_library;
pub mod graph;
pub mod mastery_store;
pub mod quality;
pub mod selector;
pub mod session_manager;
pub mod sm2;
pub mod testutil;
pub mod utils;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use ustr::{Ustr, UstrSet};
use uuid::Uuid;

use advisor::AdaptiveAdvisor;
use aggregator::MasteryAggregator;
use clock::{Clock, SystemClock};
use data::{
    CoreLoop, DueItem, EngineOptions, Exercise, KnowledgeGap, LearningPathItem, MasteryScope,
    NextQuestion, QuizSession, QuizType, SessionStatus, SessionSummary, SubmissionResult,
    SubmitOptions, Topic, TutoringDepth, filter::QuizFilter,
};
use error::{AdvisorError, GraphError, LibraryError, MasteryStoreError, SessionError};
use evaluator::AnswerEvaluator;
use exercise_library::{ExerciseLibrary, LocalExerciseLibrary};
use graph::{LocalPrerequisiteGraph, PrerequisiteGraph};
use mastery_store::{LocalMasteryStore, MasteryStore};
use selector::MasteryWeightedSelector;
use session_manager::QuizSessionManager;

/// Mnemo wires the engine's components together behind one facade. All collaborators are
/// injected at construction and shared through the same connection pool; there is no
/// process-wide state.
pub struct Mnemo {
    /// The library holding exercises, core loops, and topics.
    library: Arc<RwLock<dyn ExerciseLibrary>>,

    /// The store holding review state and mastery aggregates.
    mastery_store: Arc<RwLock<dyn MasteryStore>>,

    /// The prerequisite relation over core loops.
    graph: Arc<RwLock<dyn PrerequisiteGraph>>,

    /// The read-only advisor over the aggregated state.
    advisor: AdaptiveAdvisor,

    /// The manager running quiz sessions.
    session_manager: QuizSessionManager,

    /// The clock shared by every component.
    clock: Arc<dyn Clock>,
}

impl Mnemo {
    /// Creates a new engine storing its state in the database at the given path, using the
    /// system clock and the default options.
    pub fn new_from_disk(db_path: &str, evaluator: Arc<dyn AnswerEvaluator>) -> Result<Mnemo> {
        Self::new_with_clock(
            db_path,
            evaluator,
            Arc::new(SystemClock),
            EngineOptions::default(),
        )
    }

    /// Creates a new engine with an injected clock and options. This is the constructor used by
    /// tests, which drive time by hand.
    pub fn new_with_clock(
        db_path: &str,
        evaluator: Arc<dyn AnswerEvaluator>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Result<Mnemo> {
        options.verify()?;
        let pool = db::new_pool_from_disk(db_path)?;

        let library: Arc<RwLock<dyn ExerciseLibrary>> =
            Arc::new(RwLock::new(LocalExerciseLibrary::new(pool.clone())));
        let mastery_store: Arc<RwLock<dyn MasteryStore>> =
            Arc::new(RwLock::new(LocalMasteryStore::new(pool.clone())));
        let graph: Arc<RwLock<dyn PrerequisiteGraph>> =
            Arc::new(RwLock::new(LocalPrerequisiteGraph::new(pool.clone())?));

        let selector = Arc::new(MasteryWeightedSelector::new(
            library.clone(),
            mastery_store.clone(),
            options.clone(),
        ));
        let aggregator = MasteryAggregator::new(mastery_store.clone(), options.clone());
        let advisor = AdaptiveAdvisor::new(library.clone(), mastery_store.clone(), graph.clone());
        let session_manager = QuizSessionManager::new(
            pool,
            library.clone(),
            selector,
            aggregator,
            evaluator,
            clock.clone(),
            options,
        );

        Ok(Mnemo {
            library,
            mastery_store,
            graph,
            advisor,
            session_manager,
            clock,
        })
    }

    //
    // Ingest interface.
    //

    /// Adds a new topic to the library.
    pub fn add_topic(&self, topic: Topic) -> Result<(), LibraryError> {
        self.library.write().add_topic(topic)
    }

    /// Adds a new core loop to the library.
    pub fn add_core_loop(&self, core_loop: CoreLoop) -> Result<(), LibraryError> {
        self.library.write().add_core_loop(core_loop)
    }

    /// Adds a new exercise to the library. Exercises are immutable once added.
    pub fn add_exercise(&self, exercise: Exercise) -> Result<(), LibraryError> {
        self.library.write().add_exercise(exercise)
    }

    /// Returns the exercise with the given ID.
    pub fn get_exercise(&self, exercise_id: Ustr) -> Result<Option<Exercise>, LibraryError> {
        self.library.read().get_exercise(exercise_id)
    }

    //
    // Session lifecycle.
    //

    /// Creates a new quiz session with a frozen list of questions.
    pub fn create_session(
        &self,
        student_id: Ustr,
        course_id: Ustr,
        quiz_type: QuizType,
        count: usize,
        filter: QuizFilter,
    ) -> Result<QuizSession, SessionError> {
        self.session_manager
            .create_session(student_id, course_id, quiz_type, count, filter)
    }

    /// Returns the next unanswered question of the session, or None when there is none.
    pub fn next_question(&self, session_id: Uuid) -> Result<Option<NextQuestion>, SessionError> {
        self.session_manager.next_question(session_id)
    }

    /// Submits an answer for the next expected question of the session.
    pub fn submit_answer(
        &self,
        session_id: Uuid,
        exercise_id: Ustr,
        user_answer: &str,
        options: &SubmitOptions,
    ) -> Result<SubmissionResult, SessionError> {
        self.session_manager
            .submit_answer(session_id, exercise_id, user_answer, options)
    }

    /// Completes the session and returns its summary. Idempotent.
    pub fn complete_session(&self, session_id: Uuid) -> Result<SessionSummary, SessionError> {
        self.session_manager.complete_session(session_id)
    }

    /// Abandons an open session.
    pub fn abandon_session(&self, session_id: Uuid) -> Result<(), SessionError> {
        self.session_manager.abandon_session(session_id)
    }

    /// Returns a snapshot of the session.
    pub fn get_session_status(&self, session_id: Uuid) -> Result<SessionStatus, SessionError> {
        self.session_manager.get_session_status(session_id)
    }

    //
    // Scheduling reads.
    //

    /// Returns the core loops of the course due for review at the given time.
    pub fn due_items(
        &self,
        student_id: Ustr,
        course_id: Ustr,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DueItem>, MasteryStoreError> {
        self.mastery_store.read().due_items(student_id, course_id, as_of)
    }

    /// Returns the student's mastery score for the given scope. Scopes without any recorded
    /// state have a mastery of zero.
    pub fn mastery(&self, student_id: Ustr, scope: MasteryScope) -> Result<f64, MasteryStoreError> {
        match scope {
            MasteryScope::CoreLoop(core_loop_id) => Ok(self
                .mastery_store
                .read()
                .get_review_state(student_id, core_loop_id)?
                .map_or(0.0, |state| state.mastery_score)),
            MasteryScope::Topic(topic_id) => Ok(self
                .mastery_store
                .read()
                .topic_mastery(student_id, topic_id)?
                .map_or(0.0, |mastery| mastery.mastery_score)),
            MasteryScope::Course(course_id) => Ok(self
                .mastery_store
                .read()
                .course_mastery(student_id, course_id)?
                .map_or(0.0, |mastery| mastery.mastery_score)),
        }
    }

    /// Returns the full review state of a core loop, if the student has attempted it.
    pub fn review_state(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<Option<data::ReviewState>, MasteryStoreError> {
        self.mastery_store
            .read()
            .get_review_state(student_id, core_loop_id)
    }

    /// Resets the review state of a core loop to its initial values at the student's request.
    pub fn reset_review_state(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<(), MasteryStoreError> {
        self.mastery_store
            .write()
            .reset_review_state(student_id, core_loop_id, self.clock.now())
    }

    //
    // Advisor queries.
    //

    /// Returns the tutoring depth recommended for the student's mastery of the core loop.
    pub fn recommended_depth(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<TutoringDepth, AdvisorError> {
        self.advisor.recommended_depth(student_id, core_loop_id)
    }

    /// Returns whether prerequisite material should be shown alongside the core loop.
    pub fn should_show_prerequisites(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<bool, AdvisorError> {
        self.advisor
            .should_show_prerequisites(student_id, core_loop_id)
    }

    /// Gates a request to study the core loop on the mastery of its prerequisites.
    pub fn check_learn(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
        force: bool,
    ) -> Result<(), AdvisorError> {
        self.advisor.check_learn(student_id, core_loop_id, force)
    }

    /// Returns the student's learning path for the course, truncated to the given length.
    pub fn learning_path(
        &self,
        student_id: Ustr,
        course_id: Ustr,
        limit: usize,
    ) -> Result<Vec<LearningPathItem>, AdvisorError> {
        self.advisor
            .learning_path(student_id, course_id, limit, self.clock.now())
    }

    /// Returns the student's knowledge gaps in the course.
    pub fn knowledge_gaps(
        &self,
        student_id: Ustr,
        course_id: Ustr,
    ) -> Result<Vec<KnowledgeGap>, AdvisorError> {
        self.advisor.knowledge_gaps(student_id, course_id)
    }

    //
    // Prerequisite graph.
    //

    /// Adds a prerequisite edge between two core loops.
    pub fn add_prerequisite(
        &self,
        prereq_id: Ustr,
        dependent_id: Ustr,
    ) -> Result<(), GraphError> {
        self.graph.write().add_edge(prereq_id, dependent_id)
    }

    /// Returns the transitive prerequisites of the core loop.
    #[must_use]
    pub fn prereqs_of(&self, core_loop_id: Ustr) -> UstrSet {
        self.graph.read().prereqs_of(core_loop_id)
    }

    /// Returns the transitive dependents of the core loop.
    #[must_use]
    pub fn dependents_of(&self, core_loop_id: Ustr) -> UstrSet {
        self.graph.read().dependents_of(core_loop_id)
    }
}
