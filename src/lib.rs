use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

pub mod commands;
pub mod database;
pub mod engine;
pub mod keyboard;
pub mod runner;
pub mod state;
pub mod stats;

pub type UserDialogue = Dialogue<state::BotState, InMemStorage<state::BotState>>;
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;
