use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use triviatimebot::database::quiz::{
    BlankAnswer, ChoiceQuestion, Quiz, QuizPayload, SelectQuestion,
};
use triviatimebot::engine::timer::TaskRegistry;
use triviatimebot::engine::{
    AdvanceOutcome, ChoiceOutcome, Clock, Phase, PickOutcome, SessionEngine, SubmitOutcome,
};

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn blank_quiz() -> Quiz {
    Quiz::new(
        "Capitals of Scandinavia".into(),
        120,
        QuizPayload::FillInBlank {
            answers: vec![
                BlankAnswer::new("Oslo".into(), vec!["oslo".into()]),
                BlankAnswer::new("Stockholm".into(), vec!["stockholm".into(), "sthlm".into()]),
            ],
        },
    )
}

fn choice_quiz() -> Quiz {
    Quiz::new(
        "Rust trivia".into(),
        60,
        QuizPayload::MultipleChoice {
            questions: (0..3)
                .map(|i| {
                    ChoiceQuestion::new(
                        format!("Question {}", i + 1),
                        vec!["a".into(), "b".into(), "c".into()],
                        0,
                    )
                })
                .collect(),
        },
    )
}

fn select_quiz() -> Quiz {
    Quiz::new(
        "Primes".into(),
        45,
        QuizPayload::MultipleSelect {
            question: SelectQuestion::new(
                "Which of these are prime?".into(),
                vec!["2".into(), "4".into(), "5".into(), "6".into()],
                vec![0, 2],
            ),
        },
    )
}

#[test]
fn fill_in_blank_completes_when_the_last_answer_lands() {
    let mut engine = SessionEngine::new(blank_quiz());
    assert_eq!(engine.phase(), Phase::Selected);

    assert_eq!(engine.start_game(), 120);
    assert_eq!(engine.phase(), Phase::Active);

    assert!(matches!(
        engine.submit_text("  OSLO "),
        SubmitOutcome::Matched { .. }
    ));
    assert!(!engine.is_completed());
    assert!(matches!(
        engine.submit_text("oslo"),
        SubmitOutcome::AlreadyFound { .. }
    ));
    assert_eq!(engine.score(), 1);

    assert!(matches!(
        engine.submit_text("sthlm"),
        SubmitOutcome::Matched { .. }
    ));
    assert!(engine.is_completed());
    assert_eq!(engine.score(), 2);
    assert_eq!(engine.max_score(), 2);
}

#[test]
fn submissions_before_start_and_after_completion_are_rejected() {
    let mut engine = SessionEngine::new(blank_quiz());
    assert_eq!(engine.submit_text("oslo"), SubmitOutcome::NoMatch);

    engine.start_game();
    engine.submit_text("oslo");
    engine.submit_text("stockholm");
    assert!(engine.is_completed());

    assert_eq!(engine.submit_text("oslo"), SubmitOutcome::NoMatch);
    assert_eq!(engine.score(), 2);
}

#[test]
fn multiple_choice_advances_and_completes_after_the_last_answer() {
    let mut engine = SessionEngine::new(choice_quiz());
    engine.start_game();

    assert_eq!(
        engine.select_option(0),
        ChoiceOutcome::Answered { correct: true }
    );
    assert_eq!(engine.advance(), AdvanceOutcome::MovedTo(1));

    assert_eq!(
        engine.select_option(1),
        ChoiceOutcome::Answered { correct: false }
    );
    assert_eq!(engine.advance(), AdvanceOutcome::MovedTo(2));

    assert_eq!(
        engine.select_option(0),
        ChoiceOutcome::Answered { correct: true }
    );
    assert_eq!(engine.advance(), AdvanceOutcome::Completed);

    assert!(engine.is_completed());
    assert_eq!(engine.score(), 2);
}

#[test]
fn timer_expiry_resolves_skipped_questions_as_incorrect() {
    let mut engine = SessionEngine::new(choice_quiz());
    engine.start_game();
    engine.select_option(0);

    engine.on_timer_expired();

    assert!(engine.is_completed());
    assert_eq!(engine.score(), 1);
    let nav = engine.as_choice().unwrap();
    let skipped = nav.answer_for(1).unwrap();
    assert_eq!(skipped.selected, None);
    assert!(!skipped.is_correct);
}

#[test]
fn multiple_select_scores_correct_picks_and_caps_out() {
    let mut engine = SessionEngine::new(select_quiz());
    let mut rng = StdRng::seed_from_u64(42);
    engine.start_game_with_rng(&mut rng);

    let controller = engine.as_select().unwrap();
    let pick_position = |engine: &SessionEngine, original: usize| {
        engine
            .as_select()
            .unwrap()
            .options()
            .iter()
            .position(|o| o.original_index == original)
            .unwrap()
    };
    assert_eq!(controller.remaining_picks(), 2);

    let first = pick_position(&engine, 0);
    assert!(matches!(
        engine.pick(first),
        PickOutcome::Picked {
            correct: true,
            cap_reached: false,
            ..
        }
    ));

    let second = pick_position(&engine, 1);
    assert!(matches!(
        engine.pick(second),
        PickOutcome::Picked {
            correct: false,
            cap_reached: true,
            ..
        }
    ));

    // Cap reached: further picks bounce, completion closes the session.
    assert_eq!(engine.pick(pick_position(&engine, 2)), PickOutcome::Rejected);
    engine.complete_selection();
    assert!(engine.is_completed());
    assert_eq!(engine.score(), 1);
    assert_eq!(engine.max_score(), 2);
}

#[test]
fn record_is_emitted_exactly_once_with_elapsed_time_from_the_clock() {
    let clock = ManualClock::starting_at(Utc::now());
    let mut engine = SessionEngine::with_clock(blank_quiz(), clock.clone());

    engine.start_game();
    clock.advance(Duration::seconds(37));
    engine.submit_text("oslo");
    engine.submit_text("stockholm");

    let record = engine.take_record("user-7").expect("first take yields the record");
    assert_eq!(record.user_id, "user-7");
    assert_eq!(record.quiz_title, "Capitals of Scandinavia");
    assert_eq!(record.score, 2);
    assert_eq!(record.max_score, 2);
    assert_eq!(record.time_spent_seconds, 37);

    assert!(engine.take_record("user-7").is_none());
}

#[test]
fn take_record_before_completion_yields_nothing() {
    let mut engine = SessionEngine::new(blank_quiz());
    assert!(engine.take_record("user-7").is_none());
    engine.start_game();
    assert!(engine.take_record("user-7").is_none());
}

#[test]
fn abort_completes_with_the_score_collected_so_far() {
    let mut engine = SessionEngine::new(blank_quiz());
    engine.start_game();
    engine.submit_text("oslo");

    engine.abort();

    assert!(engine.is_completed());
    assert_eq!(engine.score(), 1);
    let record = engine.take_record("user-7").unwrap();
    assert_eq!(record.score, 1);
}

/// A give-up racing timer expiry means two tasks each hold their own clone
/// of the stored engine, so the engine's own guard cannot arbitrate between
/// them. The registry's completion claim does: the losing path must back
/// off before taking a record.
#[test]
fn competing_completion_paths_emit_a_single_record() {
    let registry = TaskRegistry::default();
    let mut engine = SessionEngine::new(blank_quiz());
    engine.start_game();
    engine.submit_text("oslo");

    let mut give_up_path = engine.clone();
    let mut expiry_path = engine;

    let mut records = Vec::new();
    for engine in [&mut give_up_path, &mut expiry_path] {
        if registry.claim_completion(1) {
            engine.abort();
            records.extend(engine.take_record("user-7"));
        }
    }

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].score, 1);
}

#[test]
fn restart_returns_to_a_fresh_selected_session() {
    let clock = ManualClock::starting_at(Utc::now());
    let mut engine = SessionEngine::with_clock(choice_quiz(), clock.clone());

    engine.start_game();
    engine.select_option(0);
    engine.abort();
    assert!(engine.take_record("user-7").is_some());

    engine.restart();
    assert_eq!(engine.phase(), Phase::Selected);
    assert_eq!(engine.score(), 0);
    assert!(engine.take_record("user-7").is_none());

    // A second play-through emits its own record.
    engine.start_game();
    clock.advance(Duration::seconds(5));
    engine.select_option(1);
    engine.abort();
    let record = engine.take_record("user-7").unwrap();
    assert_eq!(record.score, 0);
    assert_eq!(record.time_spent_seconds, 5);
}

#[test]
fn remaining_seconds_follow_the_injected_clock() {
    let clock = ManualClock::starting_at(Utc::now());
    let mut engine = SessionEngine::with_clock(blank_quiz(), clock.clone());

    assert_eq!(engine.remaining_seconds(), 120);
    engine.start_game();
    clock.advance(Duration::seconds(50));
    assert_eq!(engine.remaining_seconds(), 70);
    clock.advance(Duration::seconds(500));
    assert_eq!(engine.remaining_seconds(), 0);
}
