use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::database::quiz::{Quiz, QuizKind, QuizPayload};

pub mod matcher;
pub mod navigation;
pub mod selection;
pub mod timer;

pub use matcher::{AnswerMatcher, SubmitOutcome};
pub use navigation::{ChoiceOutcome, NavigationController, RecordedAnswer};
pub use selection::{PickOutcome, SelectionController, ShuffledOption};

/// Timestamp source. Injected so tests can control elapsed time instead of
/// depending on the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One timed play-through of a single quiz.
#[derive(Debug, Clone)]
pub struct Session {
    score: u32,
    is_completed: bool,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            score: 0,
            is_completed: false,
            started_at: now,
            ended_at: None,
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }
}

/// Immutable fact of one completed session, created exactly once per
/// completion and merged into the aggregates by the store.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub user_id: String,
    pub quiz_id: Uuid,
    pub quiz_title: String,
    pub score: u32,
    pub max_score: u32,
    pub time_spent_seconds: i64,
    pub quiz_kind: QuizKind,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Selected,
    Active,
    Completed,
}

/// What the consumer should do after a recorded multiple-choice answer's
/// advance delay elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Completed,
    MovedTo(usize),
    Stay,
}

#[derive(Debug, Clone)]
enum Mode {
    Blank(AnswerMatcher),
    Choice(NavigationController),
    Select(SelectionController),
}

impl Mode {
    fn from_quiz(quiz: &Quiz) -> Self {
        match quiz.payload() {
            QuizPayload::FillInBlank { answers } => Mode::Blank(AnswerMatcher::new(answers.clone())),
            QuizPayload::MultipleChoice { questions } => {
                Mode::Choice(NavigationController::new(questions.clone()))
            }
            QuizPayload::MultipleSelect { question } => {
                Mode::Select(SelectionController::new(question.clone()))
            }
        }
    }
}

/// Owns the lifecycle of the active quiz session: `Selected → Active →
/// Completed`, with `restart` returning to `Selected`. "Idle" is simply the
/// absence of an engine. All per-action outcomes flow through here so score
/// and the mode's completion predicate stay consistent.
#[derive(Clone)]
pub struct SessionEngine {
    quiz: Quiz,
    session: Session,
    phase: Phase,
    mode: Mode,
    activated_at: Option<DateTime<Utc>>,
    record_taken: bool,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("quiz", self.quiz.title())
            .field("phase", &self.phase)
            .field("score", &self.session.score)
            .finish()
    }
}

impl SessionEngine {
    /// Selects a quiz for play: fresh session, cleared progress state.
    pub fn new(quiz: Quiz) -> Self {
        Self::with_clock(quiz, Arc::new(SystemClock))
    }

    pub fn with_clock(quiz: Quiz, clock: Arc<dyn Clock>) -> Self {
        let mode = Mode::from_quiz(&quiz);
        let session = Session::fresh(clock.now());
        Self {
            quiz,
            session,
            phase: Phase::Selected,
            mode,
            activated_at: None,
            record_taken: false,
            clock,
        }
    }

    /// Arms the play-through and returns the countdown length in seconds.
    /// Multiple-select options are shuffled here, once per play-through.
    pub fn start_game(&mut self) -> u32 {
        self.start_game_with_rng(&mut rand::thread_rng())
    }

    pub fn start_game_with_rng(&mut self, rng: &mut impl Rng) -> u32 {
        if self.phase == Phase::Selected {
            if let Mode::Select(controller) = &mut self.mode {
                controller.shuffle(rng);
            }
            self.phase = Phase::Active;
            self.activated_at = Some(self.clock.now());
        }
        self.quiz.time_limit_seconds()
    }

    /// Free-text submission (fill-in-the-blank). Score moves only on a
    /// genuine new match; finding the last answer completes the session.
    pub fn submit_text(&mut self, raw: &str) -> SubmitOutcome {
        if self.phase != Phase::Active {
            return SubmitOutcome::NoMatch;
        }
        let Mode::Blank(matcher) = &mut self.mode else {
            return SubmitOutcome::NoMatch;
        };

        let outcome = matcher.submit(raw);
        if let SubmitOutcome::Matched { .. } = outcome {
            self.session.score = matcher.score();
            if matcher.is_complete() {
                self.complete();
            }
        }
        outcome
    }

    /// Records an option for the current multiple-choice question. The
    /// consumer schedules `advance` after its feedback delay.
    pub fn select_option(&mut self, option: usize) -> ChoiceOutcome {
        if self.phase != Phase::Active {
            return ChoiceOutcome::Rejected;
        }
        let Mode::Choice(nav) = &mut self.mode else {
            return ChoiceOutcome::Rejected;
        };

        let outcome = nav.select_option(option);
        if let ChoiceOutcome::Answered { .. } = outcome {
            self.session.score = nav.score();
        }
        outcome
    }

    /// Delayed follow-up to a recorded answer: completes when every question
    /// has one, otherwise moves to the next unanswered question.
    pub fn advance(&mut self) -> AdvanceOutcome {
        if self.phase != Phase::Active {
            return AdvanceOutcome::Stay;
        }
        let Mode::Choice(nav) = &mut self.mode else {
            return AdvanceOutcome::Stay;
        };

        if nav.all_answered() {
            self.complete();
            return AdvanceOutcome::Completed;
        }
        match nav.advance_auto() {
            Some(index) => AdvanceOutcome::MovedTo(index),
            None => AdvanceOutcome::Stay,
        }
    }

    pub fn navigate_next(&mut self) -> Option<usize> {
        self.with_nav(|nav| nav.next())
    }

    pub fn navigate_previous(&mut self) -> Option<usize> {
        self.with_nav(|nav| nav.previous())
    }

    pub fn jump_to(&mut self, index: usize) -> bool {
        self.with_nav(|nav| nav.jump_to(index)).unwrap_or(false)
    }

    fn with_nav<T>(&mut self, f: impl FnOnce(&mut NavigationController) -> T) -> Option<T> {
        if self.phase != Phase::Active {
            return None;
        }
        match &mut self.mode {
            Mode::Choice(nav) => Some(f(nav)),
            _ => None,
        }
    }

    /// Pick by presented position (multiple-select).
    pub fn pick(&mut self, shuffled_index: usize) -> PickOutcome {
        if self.phase != Phase::Active {
            return PickOutcome::Rejected;
        }
        let Mode::Select(controller) = &mut self.mode else {
            return PickOutcome::Rejected;
        };

        let outcome = controller.select(shuffled_index);
        if let PickOutcome::Picked { .. } = outcome {
            self.session.score = controller.score();
        }
        outcome
    }

    /// Delayed follow-up once the selection cap is reached.
    pub fn complete_selection(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        if let Mode::Select(controller) = &self.mode {
            if controller.is_complete() {
                self.complete();
            }
        }
    }

    /// Manual give-up: completes with whatever was collected, skipped
    /// multiple-choice questions resolving as incorrect.
    pub fn abort(&mut self) {
        if self.phase == Phase::Active {
            self.complete();
        }
    }

    /// Countdown expiry resolves the session exactly like an abort.
    pub fn on_timer_expired(&mut self) {
        self.abort();
    }

    fn complete(&mut self) {
        if self.phase == Phase::Completed {
            return;
        }
        if let Mode::Choice(nav) = &mut self.mode {
            nav.force_complete();
        }
        self.session.score = self.current_score();
        self.session.is_completed = true;
        self.session.ended_at = Some(self.clock.now());
        self.phase = Phase::Completed;
    }

    /// Back to `Selected` with a fresh session, empty progress state, and a
    /// new shuffle pending at the next `start_game`.
    pub fn restart(&mut self) {
        self.session = Session::fresh(self.clock.now());
        self.mode = Mode::from_quiz(&self.quiz);
        self.phase = Phase::Selected;
        self.activated_at = None;
        self.record_taken = false;
    }

    /// Emits the completed session once. Re-entrant completion paths (say a
    /// give-up racing the countdown) get `None` on every later call.
    pub fn take_record(&mut self, user_id: &str) -> Option<GameRecord> {
        if self.phase != Phase::Completed || self.record_taken {
            return None;
        }
        let ended_at = self.session.ended_at?;
        self.record_taken = true;

        Some(GameRecord {
            user_id: user_id.to_owned(),
            quiz_id: *self.quiz.uuid(),
            quiz_title: self.quiz.title().clone(),
            score: self.session.score,
            max_score: self.quiz.max_score(),
            time_spent_seconds: (ended_at - self.session.started_at).num_seconds(),
            quiz_kind: self.quiz.kind(),
            completed_at: ended_at,
        })
    }

    fn current_score(&self) -> u32 {
        match &self.mode {
            Mode::Blank(matcher) => matcher.score(),
            Mode::Choice(nav) => nav.score(),
            Mode::Select(controller) => controller.score(),
        }
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }

    pub fn score(&self) -> u32 {
        self.session.score
    }

    pub fn max_score(&self) -> u32 {
        self.quiz.max_score()
    }

    /// Seconds left on the countdown, for display.
    pub fn remaining_seconds(&self) -> u32 {
        let limit = self.quiz.time_limit_seconds();
        match self.activated_at {
            Some(armed_at) => {
                let elapsed = (self.clock.now() - armed_at)
                    .num_seconds()
                    .clamp(0, i64::from(u32::MAX)) as u32;
                limit.saturating_sub(elapsed)
            }
            None => limit,
        }
    }

    /// Read-only views for rendering.
    pub fn as_blank(&self) -> Option<&AnswerMatcher> {
        match &self.mode {
            Mode::Blank(matcher) => Some(matcher),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<&NavigationController> {
        match &self.mode {
            Mode::Choice(nav) => Some(nav),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<&SelectionController> {
        match &self.mode {
            Mode::Select(controller) => Some(controller),
            _ => None,
        }
    }
}
