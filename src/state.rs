use crate::engine::{GameRecord, SessionEngine};

/// Dialogue state per chat. One session at most is alive at a time; "idle"
/// with no engine is the `Start` and `Selection` states.
#[derive(Debug, Clone, Default)]
pub enum BotState {
    #[default]
    Start,
    Selection,
    ReadyToRun {
        engine: SessionEngine,
    },
    Running {
        engine: SessionEngine,
    },
    Finished {
        engine: SessionEngine,
    },
    /// The record could not be persisted; one manual retry is offered.
    SaveFailed {
        engine: SessionEngine,
        record: GameRecord,
    },
}
