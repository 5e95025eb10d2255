//! End-to-end tests driving the full engine: scheduling, selection, the mastery cascade, and the
//! advisor, all against a real database.

mod common;

use anyhow::Result;
use chrono::Duration;
use pretty_assertions::assert_eq;
use ustr::Ustr;

use common::{STUDENT, drill, new_engine, submit_next};
use mnemo::clock::Clock;
use mnemo::data::{
    CoreLoop, CoreLoopType, Difficulty, ExerciseBuilder, ExerciseType, MasteryScope, QuizType,
    Topic, filter::QuizFilter,
};
use mnemo::error::AdvisorError;
use mnemo::testutil::seed_course;

/// Verifies that a review quiz on a fresh student returns the entire pool: nothing has been
/// reviewed, so everything is due.
#[test]
fn fresh_student_review_quiz() -> Result<()> {
    let t = new_engine()?;
    seed_course(&t.engine, "course_1", 1, 3, 1)?;

    let session = t.engine.create_session(
        Ustr::from(STUDENT),
        Ustr::from("course_1"),
        QuizType::Review,
        3,
        QuizFilter::all(),
    )?;
    assert_eq!(session.question_ids.len(), 3);
    for exercise_id in ["ex_00_00_00", "ex_00_01_00", "ex_00_02_00"] {
        assert!(session.question_ids.contains(&Ustr::from(exercise_id)));
    }

    // The whole course is also reported as due.
    let due = t
        .engine
        .due_items(Ustr::from(STUDENT), Ustr::from("course_1"), t.clock.now())?;
    assert!(due.is_empty(), "no review state rows exist yet");
    Ok(())
}

/// Verifies the SM-2 walk of a perfect streak: intervals 1, 6, and 15 days with the easiness
/// factor pinned at its ceiling, and a monotonically non-decreasing mastery score.
#[test]
fn perfect_streak() -> Result<()> {
    let t = new_engine()?;
    seed_course(&t.engine, "course_1", 1, 1, 1)?;
    let core_loop = Ustr::from("loop_00_00");

    let mut intervals = Vec::new();
    let mut masteries = Vec::new();
    for _ in 0..3 {
        let session = t.engine.create_session(
            Ustr::from(STUDENT),
            Ustr::from("course_1"),
            QuizType::CoreLoop,
            1,
            QuizFilter::core_loop(core_loop),
        )?;
        let result = submit_next(&t, session.id, 1.0)?;
        intervals.push(result.review_state.interval_days);
        masteries.push(result.review_state.mastery_score);
        t.engine.complete_session(session.id)?;
    }

    assert_eq!(intervals, vec![1, 6, 15]);
    let state = t
        .engine
        .review_state(Ustr::from(STUDENT), core_loop)?
        .unwrap();
    assert_eq!(state.repetition_number, 3);
    assert_eq!(state.easiness_factor, 2.5);
    assert_eq!(state.total_attempts, 3);
    assert_eq!(state.correct_attempts, 3);
    assert!(masteries.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(state.next_review, Some(t.clock.now() + Duration::days(15)));
    Ok(())
}

/// Verifies that a failing answer resets the schedule without touching the easiness factor.
#[test]
fn failure_resets_schedule() -> Result<()> {
    let t = new_engine()?;
    seed_course(&t.engine, "course_1", 1, 1, 1)?;
    let core_loop = Ustr::from("loop_00_00");
    drill(&t, "course_1", "loop_00_00", 3, 1.0)?;

    let session = t.engine.create_session(
        Ustr::from(STUDENT),
        Ustr::from("course_1"),
        QuizType::CoreLoop,
        1,
        QuizFilter::core_loop(core_loop),
    )?;
    let result = submit_next(&t, session.id, 0.1)?;

    assert!(!result.correct);
    assert_eq!(result.review_state.repetition_number, 0);
    assert_eq!(result.review_state.interval_days, 1);
    assert_eq!(result.review_state.easiness_factor, 2.5);
    assert_eq!(
        result.review_state.next_review,
        Some(t.clock.now() + Duration::days(1))
    );
    Ok(())
}

/// Verifies the cascade over an exercise with two core loops: both loops advance their attempt
/// counters, the secondary loop's mastery moves less, and the topic aggregate equals the
/// attempt-weighted mean of its loops.
#[test]
fn cascade_with_two_loops() -> Result<()> {
    let t = new_engine()?;
    t.engine.add_topic(Topic {
        id: Ustr::from("topic_1"),
        course_id: Ustr::from("course_1"),
        name: "Topic".into(),
        language: "en".into(),
    })?;
    for loop_id in ["loop_c1", "loop_c2"] {
        t.engine.add_core_loop(CoreLoop {
            id: Ustr::from(loop_id),
            name: loop_id.to_string(),
            loop_type: CoreLoopType::Transformation,
            topic_id: Ustr::from("topic_1"),
            language: "en".into(),
        })?;
    }
    t.engine.add_exercise(
        ExerciseBuilder::default()
            .id("ex_both")
            .course_id("course_1")
            .topic_id("topic_1")
            .core_loop_ids(vec![Ustr::from("loop_c1"), Ustr::from("loop_c2")])
            .difficulty(Difficulty::Medium)
            .exercise_type(ExerciseType::Procedural)
            .build()
            .unwrap(),
    )?;

    for _ in 0..2 {
        let session = t.engine.create_session(
            Ustr::from(STUDENT),
            Ustr::from("course_1"),
            QuizType::CoreLoop,
            1,
            QuizFilter::core_loop(Ustr::from("loop_c1")),
        )?;
        submit_next(&t, session.id, 1.0)?;
        t.engine.complete_session(session.id)?;
    }

    let primary = t
        .engine
        .review_state(Ustr::from(STUDENT), Ustr::from("loop_c1"))?
        .unwrap();
    let secondary = t
        .engine
        .review_state(Ustr::from(STUDENT), Ustr::from("loop_c2"))?
        .unwrap();
    assert_eq!(primary.total_attempts, 2);
    assert_eq!(secondary.total_attempts, 2);
    assert!(primary.mastery_score > secondary.mastery_score);

    // The topic aggregate is the attempt-weighted mean of the two loops.
    let expected = (primary.mastery_score * 2.0 + secondary.mastery_score * 2.0) / 4.0;
    let topic_mastery = t
        .engine
        .mastery(Ustr::from(STUDENT), MasteryScope::Topic(Ustr::from("topic_1")))?;
    assert!((topic_mastery - expected).abs() < 1e-9);

    // With a single topic, the course aggregate matches it.
    let course_mastery = t.engine.mastery(
        Ustr::from(STUDENT),
        MasteryScope::Course(Ustr::from("course_1")),
    )?;
    assert!((course_mastery - expected).abs() < 1e-9);
    Ok(())
}

/// Verifies the adaptive quiz mix over a pool with known mastery buckets: 8 weak, 6 learning,
/// and 6 strong core loops with a batch of 10 yield 4 weak, 4 learning, and 2 strong questions.
#[test]
fn adaptive_quiz_mix() -> Result<()> {
    let t = new_engine()?;
    seed_course(&t.engine, "course_1", 1, 20, 1)?;

    // One perfect answer leaves a loop weak (0.3), two leave it learning (0.51), and four make
    // it strong (0.76), given the 0.3 EWMA weight.
    for l in 0..8 {
        drill(&t, "course_1", &format!("loop_00_{l:02}"), 1, 1.0)?;
    }
    for l in 8..14 {
        drill(&t, "course_1", &format!("loop_00_{l:02}"), 2, 1.0)?;
    }
    for l in 14..20 {
        drill(&t, "course_1", &format!("loop_00_{l:02}"), 4, 1.0)?;
    }

    let session = t.engine.create_session(
        Ustr::from(STUDENT),
        Ustr::from("course_1"),
        QuizType::Adaptive,
        10,
        QuizFilter::all(),
    )?;
    assert_eq!(session.question_ids.len(), 10);

    // Map each selected exercise back to its loop index to count the buckets.
    let loop_index = |id: &Ustr| -> usize { id.as_str()[6..8].parse().unwrap() };
    let weak = session.question_ids.iter().filter(|id| loop_index(id) < 8).count();
    let learning = session
        .question_ids
        .iter()
        .filter(|id| (8..14).contains(&loop_index(id)))
        .count();
    let strong = session
        .question_ids
        .iter()
        .filter(|id| loop_index(id) >= 14)
        .count();
    assert_eq!((weak, learning, strong), (4, 4, 2));
    Ok(())
}

/// Verifies the prerequisite gate: a weak prerequisite blocks the learn action until the caller
/// overrides it.
#[test]
fn prerequisite_gate() -> Result<()> {
    let t = new_engine()?;
    seed_course(&t.engine, "course_1", 1, 2, 1)?;
    let (c1, c2) = (Ustr::from("loop_00_00"), Ustr::from("loop_00_01"));
    t.engine.add_prerequisite(c1, c2)?;

    // One answer scoring 0.5 leaves the prerequisite at 0.15 mastery.
    drill(&t, "course_1", "loop_00_00", 1, 0.5)?;
    let mastery = t
        .engine
        .mastery(Ustr::from(STUDENT), MasteryScope::CoreLoop(c1))?;
    assert!((mastery - 0.15).abs() < 1e-9);

    match t.engine.check_learn(Ustr::from(STUDENT), c2, false) {
        Err(AdvisorError::PrerequisiteBlocked { weak_prereqs }) => {
            assert_eq!(weak_prereqs, vec![c1]);
        }
        other => panic!("expected PrerequisiteBlocked, got {other:?}"),
    }
    assert!(t.engine.check_learn(Ustr::from(STUDENT), c2, true).is_ok());

    // Mastering the prerequisite opens the gate.
    drill(&t, "course_1", "loop_00_00", 3, 1.0)?;
    assert!(t.engine.check_learn(Ustr::from(STUDENT), c2, false).is_ok());
    Ok(())
}

/// Verifies that due items appear once their review time passes and that the review state can be
/// reset on request.
#[test]
fn due_items_and_reset() -> Result<()> {
    let t = new_engine()?;
    seed_course(&t.engine, "course_1", 1, 2, 1)?;
    drill(&t, "course_1", "loop_00_00", 1, 1.0)?;

    // Immediately after the answer, the loop is scheduled one day out.
    let due = t
        .engine
        .due_items(Ustr::from(STUDENT), Ustr::from("course_1"), t.clock.now())?;
    assert!(due.is_empty());

    t.clock.advance_days(2);
    let due = t
        .engine
        .due_items(Ustr::from(STUDENT), Ustr::from("course_1"), t.clock.now())?;
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].core_loop_id, Ustr::from("loop_00_00"));

    // A reset returns the loop to its initial state.
    t.engine
        .reset_review_state(Ustr::from(STUDENT), Ustr::from("loop_00_00"))?;
    let state = t
        .engine
        .review_state(Ustr::from(STUDENT), Ustr::from("loop_00_00"))?
        .unwrap();
    assert_eq!(state.total_attempts, 0);
    assert_eq!(state.mastery_score, 0.0);
    assert!(state.next_review.is_none());
    Ok(())
}

/// Verifies the learning path over a mixed course state.
#[test]
fn learning_path_over_course() -> Result<()> {
    let t = new_engine()?;
    seed_course(&t.engine, "course_1", 1, 4, 1)?;

    // loop_00_00 becomes overdue; loop_00_01 stays weak; the rest are untouched.
    drill(&t, "course_1", "loop_00_00", 3, 1.0)?;
    drill(&t, "course_1", "loop_00_01", 1, 0.6)?;
    t.clock.advance_days(20);

    let path = t
        .engine
        .learning_path(Ustr::from(STUDENT), Ustr::from("course_1"), 10)?;
    let ids: Vec<Ustr> = path.iter().map(|item| item.core_loop_id).collect();
    assert_eq!(ids.len(), 4);
    // Both attempted loops are overdue after the jump; the most overdue one leads. The
    // unattempted loops close the path as new content.
    assert_eq!(ids[0], Ustr::from("loop_00_01"));
    assert_eq!(ids[1], Ustr::from("loop_00_00"));
    assert!(ids[2..].contains(&Ustr::from("loop_00_02")));
    assert!(ids[2..].contains(&Ustr::from("loop_00_03")));
    Ok(())
}
