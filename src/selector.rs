//! Selects the exercises presented in a quiz.
//!
//! Selection works in stages. The candidate pool is first narrowed down to the analyzed
//! exercises of the course that match the caller's filter. When the quiz prioritizes due
//! material, each candidate is scored by how urgently its primary core loop needs review, with a
//! small amount of uniform noise added so that students do not memorize the order in which
//! exercises appear. Adaptive quizzes then split the pool into weak, learning, and strong
//! buckets and draw from each according to a target mix. The final batch is the top of the
//! ranked pool, with ties broken by the lowest mastery and then by stable exercise ID order.
//!
//! The noise generator is seeded from the quiz session ID, which makes every selection
//! reproducible: the same session ID over the same pool always yields the same batch.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;
use ustr::{Ustr, UstrMap};

use crate::data::{EngineOptions, QuizType, ReviewState, filter::QuizFilter};
use crate::error::SelectorError;
use crate::exercise_library::ExerciseLibrary;
use crate::mastery_store::MasteryStore;

/// The priority of an exercise whose primary core loop has never been reviewed.
const NEVER_REVIEWED_PRIORITY: f64 = 1000.0;

/// The base priority of an exercise whose primary core loop is due. Each day overdue adds one.
const OVERDUE_BASE_PRIORITY: f64 = 100.0;

/// The base priority of an exercise whose primary core loop is not yet due. Each day until the
/// review subtracts one.
const NOT_DUE_BASE_PRIORITY: f64 = 50.0;

/// The parameters of one selection.
#[derive(Clone, Debug)]
pub struct SelectionRequest {
    /// The ID of the student taking the quiz.
    pub student_id: Ustr,

    /// The ID of the course the quiz draws from.
    pub course_id: Ustr,

    /// The type of the quiz.
    pub quiz_type: QuizType,

    /// The number of exercises to select. Fewer are returned if the pool is smaller.
    pub count: usize,

    /// The filter narrowing the candidate pool.
    pub filter: QuizFilter,

    /// Whether to score candidates by review urgency even for quiz types that do not do so by
    /// default.
    pub prioritize_due: bool,

    /// The seed of the noise generator, derived from the session ID.
    pub seed: u64,

    /// The time of the selection.
    pub now: DateTime<Utc>,
}

/// The trait that defines the interface of the selector.
pub trait QuizSelector: Send + Sync {
    /// Returns the IDs of the selected exercises, in presentation order.
    fn select(&self, request: &SelectionRequest) -> Result<Vec<Ustr>, SelectorError>;
}

/// An exercise that survived the filter stage, together with the values used to rank it.
#[derive(Clone, Debug)]
struct Candidate {
    /// The ID of the exercise.
    exercise_id: Ustr,

    /// The priority assigned during the scoring stage, noise included.
    priority: f64,

    /// The mastery score of the exercise's primary core loop.
    mastery: f64,

    /// The scheduled review time of the primary core loop, if any.
    next_review: Option<DateTime<Utc>>,

    /// Whether the primary core loop has been reviewed before.
    reviewed: bool,
}

/// An implementation of [`QuizSelector`] that ranks candidates by the review urgency and mastery
/// of their primary core loop.
pub struct MasteryWeightedSelector {
    /// The library holding the candidate exercises.
    library: Arc<RwLock<dyn ExerciseLibrary>>,

    /// The store holding the review state used for prioritization.
    mastery_store: Arc<RwLock<dyn MasteryStore>>,

    /// The options controlling the noise amplitude and the adaptive mix.
    options: EngineOptions,
}

impl MasteryWeightedSelector {
    /// Creates a new selector reading from the given library and store.
    #[must_use]
    pub fn new(
        library: Arc<RwLock<dyn ExerciseLibrary>>,
        mastery_store: Arc<RwLock<dyn MasteryStore>>,
        options: EngineOptions,
    ) -> Self {
        Self {
            library,
            mastery_store,
            options,
        }
    }

    /// Returns the review urgency of a candidate based on the state of its primary core loop.
    fn review_priority(state: Option<&ReviewState>, now: DateTime<Utc>) -> f64 {
        match state.and_then(|s| s.next_review) {
            // Never reviewed, or reset without a new review being scheduled.
            None => NEVER_REVIEWED_PRIORITY,
            Some(next_review) => {
                if next_review <= now {
                    let days_overdue = (now - next_review).num_days();
                    OVERDUE_BASE_PRIORITY + days_overdue as f64
                } else {
                    let days_until_due = (next_review - now).num_days();
                    NOT_DUE_BASE_PRIORITY - days_until_due as f64
                }
            }
        }
    }

    /// Checks that the IDs referenced by the filter exist.
    fn verify_filter(&self, filter: &QuizFilter) -> Result<(), SelectorError> {
        if let Some(topic_id) = filter.topic_id {
            let topic = self
                .library
                .read()
                .get_topic(topic_id)
                .map_err(|e| SelectorError::Internal(e.into()))?;
            if topic.is_none() {
                return Err(SelectorError::InvalidFilter(format!(
                    "unknown topic {topic_id}"
                )));
            }
        }
        if let Some(core_loop_id) = filter.core_loop_id {
            let core_loop = self
                .library
                .read()
                .get_core_loop(core_loop_id)
                .map_err(|e| SelectorError::Internal(e.into()))?;
            if core_loop.is_none() {
                return Err(SelectorError::InvalidFilter(format!(
                    "unknown core loop {core_loop_id}"
                )));
            }
        }
        Ok(())
    }

    /// Sorts the candidates by priority descending, breaking ties by the lowest mastery and then
    /// by exercise ID.
    fn rank(candidates: &mut [Candidate]) {
        candidates.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(Ordering::Equal)
                .then(a.mastery.partial_cmp(&b.mastery).unwrap_or(Ordering::Equal))
                .then(a.exercise_id.cmp(&b.exercise_id))
        });
    }

    /// Splits the target count into per-bucket targets using the adaptive fractions. Remainders
    /// are assigned by the largest fractional part, favoring the weakest bucket on ties.
    fn bucket_targets(&self, count: usize) -> [usize; 3] {
        let fractions = [
            self.options.adaptive_weak_fraction,
            self.options.adaptive_learning_fraction,
            self.options.adaptive_strong_fraction,
        ];
        let raw: Vec<f64> = fractions.iter().map(|f| f * count as f64).collect();
        let mut targets = [
            raw[0].floor() as usize,
            raw[1].floor() as usize,
            raw[2].floor() as usize,
        ];
        let mut remainder = count - targets.iter().sum::<usize>();

        let mut order: Vec<usize> = (0..3).collect();
        order.sort_by(|a, b| {
            (raw[*b] - raw[*b].floor())
                .partial_cmp(&(raw[*a] - raw[*a].floor()))
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(b))
        });
        for index in order {
            if remainder == 0 {
                break;
            }
            targets[index] += 1;
            remainder -= 1;
        }
        targets
    }

    /// Builds an adaptive batch: candidates are bucketed by the mastery of their primary core
    /// loop, each bucket contributes its target share, and shortfalls are redistributed to the
    /// other buckets so that the total batch size is preserved whenever the pool allows it.
    fn select_adaptive(&self, mut candidates: Vec<Candidate>, count: usize) -> Vec<Ustr> {
        Self::rank(&mut candidates);

        let mut buckets: [Vec<Candidate>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for candidate in candidates {
            let bucket = if candidate.mastery < self.options.weak_mastery_threshold {
                0
            } else if candidate.mastery < self.options.strong_mastery_threshold {
                1
            } else {
                2
            };
            buckets[bucket].push(candidate);
        }

        let targets = self.bucket_targets(count);
        let mut taken: [usize; 3] = [0; 3];
        for index in 0..3 {
            taken[index] = targets[index].min(buckets[index].len());
        }

        // Redistribute any shortfall to the buckets that still have candidates, weakest first.
        let mut missing = count - taken.iter().sum::<usize>();
        while missing > 0 {
            let mut progressed = false;
            for index in 0..3 {
                if missing > 0 && taken[index] < buckets[index].len() {
                    taken[index] += 1;
                    missing -= 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        let mut selected = Vec::with_capacity(count);
        for (index, bucket) in buckets.iter().enumerate() {
            selected.extend(bucket.iter().take(taken[index]).map(|c| c.exercise_id));
        }
        selected
    }
}

impl QuizSelector for MasteryWeightedSelector {
    fn select(&self, request: &SelectionRequest) -> Result<Vec<Ustr>, SelectorError> {
        self.verify_filter(&request.filter)?;

        // Stage 1: narrow the pool down to the matching analyzed exercises. The library returns
        // them in stable ID order, which the noise stage below depends on for reproducibility.
        let exercises = self
            .library
            .read()
            .find_candidates(request.course_id, &request.filter)
            .map_err(|e| SelectorError::Internal(e.into()))?;
        if exercises.is_empty() {
            return Err(SelectorError::NoCandidates);
        }

        // Fetch the review state of every distinct primary core loop in the pool.
        let primary_loops: Vec<Ustr> = {
            let mut loops: Vec<Ustr> = exercises
                .iter()
                .filter_map(crate::data::Exercise::primary_core_loop)
                .collect();
            loops.sort_unstable();
            loops.dedup();
            loops
        };
        let states: UstrMap<ReviewState> = self
            .mastery_store
            .read()
            .get_review_states(request.student_id, &primary_loops)
            .map_err(|e| SelectorError::Internal(e.into()))?;

        // Stage 2: score the candidates. Review and adaptive quizzes always prioritize due
        // material; for the other types the noise alone decides the order unless the caller asks
        // for due prioritization.
        let prioritized = request.prioritize_due
            || matches!(request.quiz_type, QuizType::Review | QuizType::Adaptive);
        let mut rng = StdRng::seed_from_u64(request.seed);
        let amplitude = self.options.priority_noise_amplitude;
        let mut candidates: Vec<Candidate> = exercises
            .iter()
            .map(|exercise| {
                let state = exercise
                    .primary_core_loop()
                    .and_then(|id| states.get(&id));
                let noise = if amplitude > 0.0 {
                    rng.random_range(-amplitude..=amplitude)
                } else {
                    0.0
                };
                let base = if prioritized {
                    Self::review_priority(state, request.now)
                } else {
                    0.0
                };
                Candidate {
                    exercise_id: exercise.id,
                    priority: base + noise,
                    mastery: state.map_or(0.0, |s| s.mastery_score),
                    next_review: state.and_then(|s| s.next_review),
                    reviewed: state.is_some(),
                }
            })
            .collect();

        // Stage 4: review quizzes are restricted to material that is due or has never been
        // scheduled, ordered by review time with unscheduled material first.
        if request.quiz_type == QuizType::Review {
            candidates.retain(|c| {
                !c.reviewed || c.next_review.is_none_or(|next| next <= request.now)
            });
            if candidates.is_empty() {
                return Err(SelectorError::NoCandidates);
            }
            candidates.sort_by(|a, b| {
                match (a.next_review, b.next_review) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp(&y),
                }
                .then(
                    b.priority
                        .partial_cmp(&a.priority)
                        .unwrap_or(Ordering::Equal),
                )
                .then(a.mastery.partial_cmp(&b.mastery).unwrap_or(Ordering::Equal))
                .then(a.exercise_id.cmp(&b.exercise_id))
            });
            let selected: Vec<Ustr> = candidates
                .iter()
                .take(request.count)
                .map(|c| c.exercise_id)
                .collect();
            return Ok(selected);
        }

        // Stage 3: adaptive quizzes draw from the mastery buckets according to the target mix.
        if request.quiz_type == QuizType::Adaptive {
            let selected = self.select_adaptive(candidates, request.count);
            debug!(count = selected.len(), "selected adaptive batch");
            return Ok(selected);
        }

        // Stage 5: take the top of the ranked pool.
        Self::rank(&mut candidates);
        Ok(candidates
            .iter()
            .take(request.count)
            .map(|c| c.exercise_id)
            .collect())
    }
}
