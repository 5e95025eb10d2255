//! Adapts tutoring behavior to the student's demonstrated mastery.
//!
//! The advisor is a read-only layer over the mastery store, the exercise library, and the
//! prerequisite graph. It answers four questions: how deep explanations should go for a core
//! loop, whether its prerequisites should be shown alongside it, whether weak prerequisites
//! should block studying it outright, and what the student should work on next. None of its
//! queries mutate state, so they can be called freely from tutoring and planning UIs.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;
use ustr::{Ustr, UstrMap};

use crate::data::{
    GapSeverity, KnowledgeGap, LearningPathItem, PathReason, ReviewState, TutoringDepth, Urgency,
};
use crate::error::AdvisorError;
use crate::exercise_library::ExerciseLibrary;
use crate::graph::PrerequisiteGraph;
use crate::mastery_store::MasteryStore;

/// The mastery score below which tutoring starts from first principles and prerequisites are
/// always shown. Also the bar a prerequisite must clear to not block its dependents.
const BASIC_MASTERY_THRESHOLD: f64 = 0.30;

/// The mastery score at and above which tutoring can be terse.
const ADVANCED_MASTERY_THRESHOLD: f64 = 0.70;

/// The mastery score below which a core loop counts as a weak area.
const WEAK_AREA_THRESHOLD: f64 = 0.5;

/// The number of recent attempts considered when deciding whether to show prerequisites.
const RECENT_ATTEMPT_WINDOW: usize = 5;

/// The failure rate over the recent attempts above which prerequisites are shown to a student
/// in the middle mastery band.
const RECENT_FAILURE_RATE_THRESHOLD: f64 = 0.40;

/// The score below which an attempt counts as a failure.
const FAILING_SCORE: f64 = 0.7;

/// The mastery score below which a gap is severe.
const GAP_HIGH_THRESHOLD: f64 = 0.20;

/// The mastery score below which a gap is moderate.
const GAP_MEDIUM_THRESHOLD: f64 = 0.35;

/// Recommends tutoring depth, prerequisite handling, and study priorities from the student's
/// mastery state.
pub struct AdaptiveAdvisor {
    /// The library holding the course material.
    library: Arc<RwLock<dyn ExerciseLibrary>>,

    /// The store holding review state and aggregates.
    mastery_store: Arc<RwLock<dyn MasteryStore>>,

    /// The prerequisite relation over core loops.
    graph: Arc<RwLock<dyn PrerequisiteGraph>>,
}

impl AdaptiveAdvisor {
    /// Creates a new advisor reading from the given components.
    #[must_use]
    pub fn new(
        library: Arc<RwLock<dyn ExerciseLibrary>>,
        mastery_store: Arc<RwLock<dyn MasteryStore>>,
        graph: Arc<RwLock<dyn PrerequisiteGraph>>,
    ) -> Self {
        Self {
            library,
            mastery_store,
            graph,
        }
    }

    /// Returns the mastery score of a core loop, zero when it has never been attempted.
    fn mastery_of(&self, student_id: Ustr, core_loop_id: Ustr) -> Result<f64, AdvisorError> {
        let state = self
            .mastery_store
            .read()
            .get_review_state(student_id, core_loop_id)
            .map_err(|e| AdvisorError::Query(e.into()))?;
        Ok(state.map_or(0.0, |s| s.mastery_score))
    }

    /// Returns the tutoring depth appropriate for the student's mastery of the core loop.
    pub fn recommended_depth(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<TutoringDepth, AdvisorError> {
        let mastery = self.mastery_of(student_id, core_loop_id)?;
        if mastery < BASIC_MASTERY_THRESHOLD {
            Ok(TutoringDepth::Basic)
        } else if mastery < ADVANCED_MASTERY_THRESHOLD {
            Ok(TutoringDepth::Medium)
        } else {
            Ok(TutoringDepth::Advanced)
        }
    }

    /// Returns whether prerequisite material should be shown alongside the core loop. It always
    /// is for low mastery, and in the middle band when the student has been failing recently.
    pub fn should_show_prerequisites(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
    ) -> Result<bool, AdvisorError> {
        let mastery = self.mastery_of(student_id, core_loop_id)?;
        if mastery < BASIC_MASTERY_THRESHOLD {
            return Ok(true);
        }
        if mastery >= ADVANCED_MASTERY_THRESHOLD {
            return Ok(false);
        }

        let recent = self
            .mastery_store
            .read()
            .recent_scores(student_id, core_loop_id, RECENT_ATTEMPT_WINDOW)
            .map_err(|e| AdvisorError::Query(e.into()))?;
        if recent.is_empty() {
            return Ok(false);
        }
        let failures = recent.iter().filter(|score| **score < FAILING_SCORE).count();
        let failure_rate = failures as f64 / recent.len() as f64;
        Ok(failure_rate > RECENT_FAILURE_RATE_THRESHOLD)
    }

    /// Gates a request to study the core loop on the mastery of its prerequisites. Weak
    /// prerequisites block the request unless the caller forces it; the advisory error lists
    /// them so that the caller can offer the override.
    pub fn check_learn(
        &self,
        student_id: Ustr,
        core_loop_id: Ustr,
        force: bool,
    ) -> Result<(), AdvisorError> {
        if force {
            return Ok(());
        }
        let prereqs = self.graph.read().prereqs_of(core_loop_id);
        let mut weak_prereqs = Vec::new();
        for prereq in prereqs {
            if self.mastery_of(student_id, prereq)? < BASIC_MASTERY_THRESHOLD {
                weak_prereqs.push(prereq);
            }
        }
        if weak_prereqs.is_empty() {
            return Ok(());
        }
        weak_prereqs.sort_unstable();
        Err(AdvisorError::PrerequisiteBlocked { weak_prereqs })
    }

    /// Builds the student's learning path for a course: overdue reviews first, then weak areas,
    /// then material due today, then new content, deduplicated by core loop and truncated to the
    /// requested length.
    pub fn learning_path(
        &self,
        student_id: Ustr,
        course_id: Ustr,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<LearningPathItem>, AdvisorError> {
        let states = self
            .mastery_store
            .read()
            .course_review_states(student_id, course_id)
            .map_err(|e| AdvisorError::Query(e.into()))?;
        let attempted: UstrMap<&ReviewState> = states
            .iter()
            .filter(|s| s.total_attempts > 0)
            .map(|s| (s.core_loop_id, s))
            .collect();

        // Overdue reviews, most overdue first.
        let mut overdue: Vec<(i64, Ustr)> = attempted
            .values()
            .filter_map(|state| {
                let next_review = state.next_review?;
                let days_overdue = (now - next_review).num_days();
                (days_overdue >= 1).then_some((days_overdue, state.core_loop_id))
            })
            .collect();
        overdue.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        // Weak areas, weakest first.
        let mut weak: Vec<(f64, Ustr)> = attempted
            .values()
            .filter(|state| state.mastery_score < WEAK_AREA_THRESHOLD)
            .map(|state| (state.mastery_score, state.core_loop_id))
            .collect();
        weak.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        // Reviews due today, lowest mastery first.
        let mut due_today: Vec<(f64, Ustr)> = attempted
            .values()
            .filter_map(|state| {
                let next_review = state.next_review?;
                let due = next_review <= now && (now - next_review).num_days() < 1;
                due.then_some((state.mastery_score, state.core_loop_id))
            })
            .collect();
        due_today.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        // New content: core loops never attempted, easiest declared difficulty first, richer
        // loops before sparse ones.
        let mut new_content = self
            .library
            .read()
            .core_loop_contents(course_id)
            .map_err(|e| AdvisorError::Query(e.into()))?;
        new_content.retain(|content| !attempted.contains_key(&content.core_loop_id));
        new_content.sort_by(|a, b| {
            match (a.easiest_difficulty, b.easiest_difficulty) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then(b.exercise_count.cmp(&a.exercise_count))
            .then(a.core_loop_id.cmp(&b.core_loop_id))
        });

        // Concatenate the bands, deduplicate by core loop, and truncate.
        let mut path = Vec::new();
        let mut seen = ustr::UstrSet::default();
        let bands = overdue
            .into_iter()
            .map(|(days_overdue, core_loop_id)| LearningPathItem {
                core_loop_id,
                urgency: Urgency::High,
                reason: PathReason::OverdueReview { days_overdue },
            })
            .chain(weak.into_iter().map(|(mastery_score, core_loop_id)| {
                LearningPathItem {
                    core_loop_id,
                    urgency: Urgency::Medium,
                    reason: PathReason::WeakArea { mastery_score },
                }
            }))
            .chain(
                due_today
                    .into_iter()
                    .map(|(mastery_score, core_loop_id)| LearningPathItem {
                        core_loop_id,
                        urgency: Urgency::Medium,
                        reason: PathReason::DueToday { mastery_score },
                    }),
            )
            .chain(new_content.into_iter().map(|content| LearningPathItem {
                core_loop_id: content.core_loop_id,
                urgency: Urgency::Low,
                reason: PathReason::NewContent {
                    difficulty: content.easiest_difficulty,
                    exercise_count: content.exercise_count,
                },
            }));
        for item in bands {
            if path.len() >= limit {
                break;
            }
            if seen.insert(item.core_loop_id) {
                path.push(item);
            }
        }
        Ok(path)
    }

    /// Returns the student's knowledge gaps in the course, weakest first.
    pub fn knowledge_gaps(
        &self,
        student_id: Ustr,
        course_id: Ustr,
    ) -> Result<Vec<KnowledgeGap>, AdvisorError> {
        let states = self
            .mastery_store
            .read()
            .course_review_states(student_id, course_id)
            .map_err(|e| AdvisorError::Query(e.into()))?;
        let mut gaps: Vec<KnowledgeGap> = states
            .iter()
            .filter(|state| {
                state.total_attempts > 0 && state.mastery_score < WEAK_AREA_THRESHOLD
            })
            .map(|state| {
                let severity = if state.mastery_score < GAP_HIGH_THRESHOLD {
                    GapSeverity::High
                } else if state.mastery_score < GAP_MEDIUM_THRESHOLD {
                    GapSeverity::Medium
                } else {
                    GapSeverity::Low
                };
                KnowledgeGap {
                    core_loop_id: state.core_loop_id,
                    mastery_score: state.mastery_score,
                    severity,
                }
            })
            .collect();
        gaps.sort_by(|a, b| {
            a.mastery_score
                .partial_cmp(&b.mastery_score)
                .unwrap_or(Ordering::Equal)
                .then(a.core_loop_id.cmp(&b.core_loop_id))
        });
        Ok(gaps)
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::RwLock;
    use std::sync::Arc;
    use ustr::Ustr;

    use crate::data::{
        CoreLoop, CoreLoopType, Difficulty, ExerciseBuilder, ExerciseType, GapSeverity,
        PathReason, ReviewState, Topic, TutoringDepth, Urgency,
    };
    use crate::db;
    use crate::error::AdvisorError;
    use crate::exercise_library::{ExerciseLibrary, LocalExerciseLibrary};
    use crate::graph::{LocalPrerequisiteGraph, PrerequisiteGraph};
    use crate::mastery_store::{CascadeUpdate, LocalMasteryStore, MasteryStore};

    use super::AdaptiveAdvisor;

    /// Returns a fixed timestamp to use as the current time in tests.
    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    struct TestFixture {
        advisor: AdaptiveAdvisor,
        mastery_store: Arc<RwLock<dyn MasteryStore>>,
        graph: Arc<RwLock<dyn PrerequisiteGraph>>,
        _dir: tempfile::TempDir,
    }

    /// Returns an advisor over a course with `num_loops` core loops and one exercise each.
    fn new_fixture(num_loops: usize) -> Result<TestFixture> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("advisor.db");
        let pool = db::new_pool_from_disk(db_path.to_str().unwrap())?;

        let mut library = LocalExerciseLibrary::new(pool.clone());
        library.add_topic(Topic {
            id: Ustr::from("topic_1"),
            course_id: Ustr::from("course_1"),
            name: "Topic".into(),
            language: "en".into(),
        })?;
        for i in 0..num_loops {
            library.add_core_loop(CoreLoop {
                id: Ustr::from(&format!("loop_{i:02}")),
                name: format!("Loop {i}"),
                loop_type: CoreLoopType::Analysis,
                topic_id: Ustr::from("topic_1"),
                language: "en".into(),
            })?;
            library.add_exercise(
                ExerciseBuilder::default()
                    .id(format!("ex_{i:02}"))
                    .course_id("course_1")
                    .topic_id("topic_1")
                    .core_loop_ids(vec![Ustr::from(&format!("loop_{i:02}"))])
                    .difficulty(if i % 2 == 0 {
                        Difficulty::Easy
                    } else {
                        Difficulty::Hard
                    })
                    .exercise_type(ExerciseType::Procedural)
                    .build()
                    .unwrap(),
            )?;
        }

        let library: Arc<RwLock<dyn ExerciseLibrary>> = Arc::new(RwLock::new(library));
        let mastery_store: Arc<RwLock<dyn MasteryStore>> =
            Arc::new(RwLock::new(LocalMasteryStore::new(pool.clone())));
        let graph: Arc<RwLock<dyn PrerequisiteGraph>> =
            Arc::new(RwLock::new(LocalPrerequisiteGraph::new(pool)?));
        let advisor = AdaptiveAdvisor::new(library, mastery_store.clone(), graph.clone());
        Ok(TestFixture {
            advisor,
            mastery_store,
            graph,
            _dir: dir,
        })
    }

    /// Writes a review state with the given mastery and review time.
    fn seed_state(
        fixture: &TestFixture,
        loop_index: usize,
        mastery: f64,
        next_review: Option<chrono::DateTime<Utc>>,
    ) -> Result<()> {
        let student = Ustr::from("student_1");
        let core_loop_id = Ustr::from(&format!("loop_{loop_index:02}"));
        let mut state = ReviewState::new(student, core_loop_id);
        state.mastery_score = mastery;
        state.total_attempts = 2;
        state.repetition_number = 1;
        state.interval_days = 1;
        state.next_review = next_review;
        state.last_reviewed = Some(now());
        fixture.mastery_store.write().apply_cascade(&CascadeUpdate {
            student_id: student,
            states: vec![state],
            timestamp: now(),
        })?;
        Ok(())
    }

    /// Verifies the tutoring depth thresholds.
    #[test]
    fn depth_thresholds() -> Result<()> {
        let fixture = new_fixture(3)?;
        let student = Ustr::from("student_1");
        seed_state(&fixture, 1, 0.45, None)?;
        seed_state(&fixture, 2, 0.85, None)?;

        // An unattempted loop has zero mastery and gets the basic depth.
        assert_eq!(
            fixture.advisor.recommended_depth(student, Ustr::from("loop_00"))?,
            TutoringDepth::Basic
        );
        assert_eq!(
            fixture.advisor.recommended_depth(student, Ustr::from("loop_01"))?,
            TutoringDepth::Medium
        );
        assert_eq!(
            fixture.advisor.recommended_depth(student, Ustr::from("loop_02"))?,
            TutoringDepth::Advanced
        );
        Ok(())
    }

    /// Verifies the prerequisite gate and its override.
    #[test]
    fn prerequisite_gate() -> Result<()> {
        let fixture = new_fixture(2)?;
        let student = Ustr::from("student_1");
        let (c1, c2) = (Ustr::from("loop_00"), Ustr::from("loop_01"));
        fixture.graph.write().add_edge(c1, c2)?;
        seed_state(&fixture, 0, 0.15, None)?;

        let blocked = fixture.advisor.check_learn(student, c2, false);
        match blocked {
            Err(AdvisorError::PrerequisiteBlocked { weak_prereqs }) => {
                assert_eq!(weak_prereqs, vec![c1]);
            }
            other => panic!("expected PrerequisiteBlocked, got {other:?}"),
        }

        // The override proceeds, as does a gate over a mastered prerequisite.
        assert!(fixture.advisor.check_learn(student, c2, true).is_ok());
        seed_state(&fixture, 0, 0.8, None)?;
        assert!(fixture.advisor.check_learn(student, c2, false).is_ok());
        Ok(())
    }

    /// Verifies the band order and deduplication of the learning path.
    #[test]
    fn learning_path_bands() -> Result<()> {
        let fixture = new_fixture(6)?;
        let student = Ustr::from("student_1");

        // loop_00: overdue by 3 days. loop_01: overdue by 1 day. loop_02: weak. loop_03: due
        // today. loop_04 and loop_05: never attempted.
        seed_state(&fixture, 0, 0.9, Some(now() - Duration::days(3)))?;
        seed_state(&fixture, 1, 0.9, Some(now() - Duration::days(1)))?;
        seed_state(&fixture, 2, 0.2, Some(now() + Duration::days(5)))?;
        seed_state(&fixture, 3, 0.6, Some(now() - Duration::hours(2)))?;

        let path = fixture
            .advisor
            .learning_path(student, Ustr::from("course_1"), 10, now())?;
        let ids: Vec<Ustr> = path.iter().map(|item| item.core_loop_id).collect();
        assert_eq!(
            ids,
            vec![
                Ustr::from("loop_00"),
                Ustr::from("loop_01"),
                Ustr::from("loop_02"),
                Ustr::from("loop_03"),
                // New content: the easy loop comes before the hard one.
                Ustr::from("loop_04"),
                Ustr::from("loop_05"),
            ]
        );
        assert_eq!(path[0].urgency, Urgency::High);
        assert!(matches!(
            path[0].reason,
            PathReason::OverdueReview { days_overdue: 3 }
        ));
        assert!(matches!(path[2].reason, PathReason::WeakArea { .. }));
        assert!(matches!(path[3].reason, PathReason::DueToday { .. }));
        assert!(matches!(
            path[4].reason,
            PathReason::NewContent {
                difficulty: Some(Difficulty::Easy),
                ..
            }
        ));

        // Truncation respects the band order.
        let truncated =
            fixture
                .advisor
                .learning_path(student, Ustr::from("course_1"), 2, now())?;
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].core_loop_id, Ustr::from("loop_00"));
        Ok(())
    }

    /// Verifies the gap severity bands.
    #[test]
    fn gap_severities() -> Result<()> {
        let fixture = new_fixture(4)?;
        let student = Ustr::from("student_1");
        seed_state(&fixture, 0, 0.1, None)?;
        seed_state(&fixture, 1, 0.25, None)?;
        seed_state(&fixture, 2, 0.45, None)?;
        seed_state(&fixture, 3, 0.8, None)?;

        let gaps = fixture
            .advisor
            .knowledge_gaps(student, Ustr::from("course_1"))?;
        assert_eq!(gaps.len(), 3);
        assert_eq!(gaps[0].severity, GapSeverity::High);
        assert_eq!(gaps[1].severity, GapSeverity::Medium);
        assert_eq!(gaps[2].severity, GapSeverity::Low);
        assert_eq!(gaps[0].core_loop_id, Ustr::from("loop_00"));
        Ok(())
    }
}
