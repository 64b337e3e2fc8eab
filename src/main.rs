use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::dialogue::{self, InMemStorage};
use teloxide::dispatching::{DpHandlerDescription, UpdateHandler};
use teloxide::prelude::*;
use tracing::{instrument, level_filters};
use tracing_subscriber::fmt::format::FmtSpan;

use triviatimebot::commands::{self, Command};
use triviatimebot::database::connection::Connection;
use triviatimebot::engine::timer::TaskRegistry;
use triviatimebot::runner;
use triviatimebot::state::BotState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let rust_log = std::env::var("LOG_LEVEL").unwrap_or("error".into());
    tracing_subscriber::fmt()
        .with_max_level(level_filters::LevelFilter::from_level(
            rust_log.parse().expect("LOG_LEVEL should be a valid level."),
        ))
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_ansi(true)
        .with_line_number(true)
        .with_target(false)
        .init();

    let connection_string = std::env::var("DATABASE_URL").expect("DATABASE_URL should be set.");
    let connection =
        Arc::new(Connection::connect(std::borrow::Cow::Owned(connection_string)).await);
    connection.run_migrations().await;

    let teloxide_token = std::env::var("TELOXIDE_TOKEN").expect("TELOXIDE_TOKEN should be set.");
    let bot = Bot::new(teloxide_token);
    log::info!("Starting bot...");

    let registry = Arc::new(TaskRegistry::default());

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![
            InMemStorage::<BotState>::new(),
            connection,
            registry
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(commands::help))
        .branch(case![Command::Start].endpoint(commands::start))
        .branch(case![Command::Cancel].endpoint(commands::cancel))
        .branch(case![Command::Stats].endpoint(commands::stats::<Connection>));

    let handler = Update::filter_message()
        .branch(command_handler)
        .branch(case![BotState::Start].endpoint(runner::choose_action::<Connection>))
        .branch(running_scheme())
        .endpoint(runner::invalid_state);

    dialogue::enter::<Update, InMemStorage<BotState>, BotState, _>()
        .branch(handler)
        .branch(callback_query_scheme())
}

#[instrument(level = "debug")]
fn running_scheme() -> Handler<
    'static,
    DependencyMap,
    Result<(), Box<(dyn Error + Send + Sync + 'static)>>,
    DpHandlerDescription,
> {
    use dptree::case;
    log::debug!("Building a dispatch tree for the runner");
    Update::filter_message()
        .branch(case![BotState::Selection].endpoint(runner::selection::<Connection>))
        .branch(case![BotState::ReadyToRun { engine }].endpoint(runner::running_ready))
        .branch(case![BotState::Running { engine }].endpoint(runner::running_message))
        .branch(case![BotState::Finished { engine }].endpoint(runner::after_game))
        .branch(case![BotState::SaveFailed { engine, record }].endpoint(runner::after_game_save_failed))
}

#[instrument(level = "debug")]
fn callback_query_scheme() -> Handler<
    'static,
    DependencyMap,
    Result<(), Box<(dyn Error + Send + Sync + 'static)>>,
    DpHandlerDescription,
> {
    use dptree::case;
    log::debug!("Building a dispatch tree for callback queries");
    Update::filter_callback_query()
        .branch(case![BotState::Running { engine }].endpoint(runner::on_game_callback))
        .branch(case![BotState::SaveFailed { engine, record }].endpoint(runner::on_retry_save))
}
