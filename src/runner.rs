use std::sync::Arc;
use std::time::Duration;

use teloxide::{
    dispatching::dialogue::GetChatId,
    payloads::{EditMessageTextSetters, SendMessageSetters},
    prelude::Requester,
    types::{CallbackQuery, ChatId, Message, ReplyMarkup},
    Bot,
};
use tracing::instrument;

use crate::database::connection::{Connection, RetrieveQuiz, RetrieveStats, SaveGameRecord};
use crate::engine::timer::{Countdown, TaskRegistry, Tick};
use crate::engine::{
    AdvanceOutcome, ChoiceOutcome, GameRecord, PickOutcome, SessionEngine, SubmitOutcome,
};
use crate::keyboard::{
    action_keyboard, after_game_keyboard, choice_keyboard, give_up_keyboard, quizzes_keyboard,
    retry_save_keyboard, select_keyboard, yes_no_keyboard, GIVE_UP, MAIN_MENU, MY_STATS,
    PLAY_AGAIN, TAKE_QUIZ,
};
use crate::state::BotState;
use crate::stats::UserStats;
use crate::{HandlerResult, UserDialogue};

/// Everything a scheduled task needs to act on a session later.
#[derive(Clone)]
struct SessionCtx {
    bot: Bot,
    dialogue: UserDialogue,
    connection: Arc<Connection>,
    registry: Arc<TaskRegistry>,
    chat: ChatId,
    user: Option<String>,
}

#[instrument(level = "info", skip(connection))]
pub async fn choose_action<Store: RetrieveQuiz + RetrieveStats>(
    bot: Bot,
    msg: Message,
    dialogue: UserDialogue,
    connection: Arc<Store>,
) -> HandlerResult {
    match msg.text() {
        Some(TAKE_QUIZ) => {
            let quizzes = connection.retrieve_all_quiz_names().await?;
            if quizzes.is_empty() {
                bot.send_message(msg.chat.id, "No quizzes available yet.")
                    .await?;
            } else {
                bot.send_message(msg.chat.id, "Please choose a quiz:")
                    .reply_markup(quizzes_keyboard(&quizzes))
                    .await?;
                dialogue.update(BotState::Selection).await?;
            }
        }
        Some(MY_STATS) => {
            let text = match msg.from.as_ref() {
                Some(user) => match connection.retrieve_user_stats(&user.id.to_string()).await? {
                    Some(stats) => format_user_stats(&stats),
                    None => "No games recorded yet. Take a quiz first!".to_owned(),
                },
                None => "Statistics are only kept for identified users.".to_owned(),
            };
            bot.send_message(msg.chat.id, text)
                .parse_mode(teloxide::types::ParseMode::Html)
                .await?;
        }
        other => {
            log::info!("Invalid main menu input {:?}", other);
            bot.send_message(msg.chat.id, "Invalid input. Please use the menu buttons.")
                .reply_markup(action_keyboard())
                .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip(connection))]
pub async fn selection<Retriever: RetrieveQuiz>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    connection: Arc<Retriever>,
) -> HandlerResult {
    let Some(quiz_title) = msg.text() else {
        bot.send_message(msg.chat.id, "Please pick a quiz by its title.")
            .await?;
        return Ok(());
    };

    match connection.retrieve_quiz(quiz_title).await? {
        Some(quiz) => {
            log::info!(
                "{} selected '{}'",
                msg.chat.username().unwrap_or_default(),
                quiz.title()
            );

            let engine = SessionEngine::new(quiz);
            bot.send_message(
                msg.chat.id,
                format!("{}\n\nAre you ready to begin? (Yes/No)", engine.quiz()),
            )
            .parse_mode(teloxide::types::ParseMode::Html)
            .reply_markup(yes_no_keyboard())
            .await?;
            dialogue.update(BotState::ReadyToRun { engine }).await?;
        }
        None => {
            bot.send_message(
                msg.chat.id,
                format!("Quiz with title '{}' not found.", quiz_title),
            )
            .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip(connection, registry))]
pub async fn running_ready(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    mut engine: SessionEngine,
    connection: Arc<Connection>,
    registry: Arc<TaskRegistry>,
) -> HandlerResult {
    match msg.text() {
        Some("Yes") | Some("Yes✔️") => {
            if engine.quiz().item_count() == 0 {
                bot.send_message(msg.chat.id, "Sorry, that quiz has no content. Quitting...")
                    .reply_markup(action_keyboard())
                    .await?;
                dialogue.update(BotState::Start).await?;
                return Ok(());
            }

            let seconds = engine.start_game();
            log::info!(
                "{} starts '{}' with {}s on the clock",
                msg.chat.username().unwrap_or_default(),
                engine.quiz().title(),
                seconds
            );

            let ctx = SessionCtx {
                bot: bot.clone(),
                dialogue: dialogue.clone(),
                connection,
                registry,
                chat: msg.chat.id,
                user: msg.from.as_ref().map(|u| u.id.to_string()),
            };
            ctx.registry.reset_completion(ctx.chat.0);
            schedule_countdown(&ctx, seconds);

            bot.send_message(msg.chat.id, "Let's begin!")
                .reply_markup(give_up_keyboard())
                .await?;
            send_prompt(&ctx, &engine).await?;
            dialogue.update(BotState::Running { engine }).await?;
        }
        Some("No") | Some("No❌") => {
            log::info!(
                "{} quits '{}' before starting",
                msg.chat.username().unwrap_or_default(),
                engine.quiz().title()
            );
            bot.send_message(msg.chat.id, "OK. What do you want to do now?")
                .reply_markup(action_keyboard())
                .await?;
            dialogue.update(BotState::Start).await?;
        }
        _ => {
            bot.send_message(
                msg.chat.id,
                "Please answer <b>Yes</b> or <b>No</b>.",
            )
            .parse_mode(teloxide::types::ParseMode::Html)
            .await?;
        }
    }

    Ok(())
}

/// Plain messages during a run: free-text answers in fill-in-the-blank
/// mode, plus the give-up button in every mode.
#[instrument(level = "info", skip(connection, registry))]
pub async fn running_message(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    mut engine: SessionEngine,
    connection: Arc<Connection>,
    registry: Arc<TaskRegistry>,
) -> HandlerResult {
    let ctx = SessionCtx {
        bot: bot.clone(),
        dialogue: dialogue.clone(),
        connection,
        registry,
        chat: msg.chat.id,
        user: msg.from.as_ref().map(|u| u.id.to_string()),
    };

    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text == GIVE_UP {
        engine.abort();
        bot.send_message(msg.chat.id, "Giving up this run.").await?;
        return finish(&ctx, engine).await;
    }

    if engine.as_blank().is_none() {
        bot.send_message(msg.chat.id, "Use the buttons under the question to answer.")
            .await?;
        return Ok(());
    }

    match engine.submit_text(text) {
        SubmitOutcome::Matched { answer } => {
            let found = engine.score();
            let total = engine.max_score();
            bot.send_message(
                msg.chat.id,
                format!("✅ {} — {}/{} found", answer, found, total),
            )
            .await?;
            if engine.is_completed() {
                return finish(&ctx, engine).await;
            }
        }
        SubmitOutcome::AlreadyFound { answer } => {
            bot.send_message(msg.chat.id, format!("Already found: {}", answer))
                .await?;
        }
        SubmitOutcome::NoMatch => {
            bot.send_message(msg.chat.id, "❌ Not an answer. Keep trying!")
                .await?;
        }
    }

    dialogue.update(BotState::Running { engine }).await?;
    Ok(())
}

/// Inline-button presses during a run: option picks, navigation and jumps.
pub async fn on_game_callback(
    bot: Bot,
    dialogue: UserDialogue,
    q: CallbackQuery,
    mut engine: SessionEngine,
    connection: Arc<Connection>,
    registry: Arc<TaskRegistry>,
) -> HandlerResult {
    bot.answer_callback_query(&q.id).await?;

    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    let Some(chat) = q.chat_id() else {
        return Ok(());
    };

    let ctx = SessionCtx {
        bot: bot.clone(),
        dialogue: dialogue.clone(),
        connection,
        registry,
        chat,
        user: Some(q.from.id.to_string()),
    };

    match data.split_once(':') {
        Some(("opt", idx)) => {
            let Ok(option) = idx.parse::<usize>() else {
                return Ok(());
            };
            if let ChoiceOutcome::Answered { correct } = engine.select_option(option) {
                log::info!(
                    "{} answers option {} on '{}': {}",
                    q.from.username.clone().unwrap_or_default(),
                    option,
                    engine.quiz().title(),
                    correct
                );
                edit_question(&ctx, &q, &engine).await?;
                dialogue
                    .update(BotState::Running {
                        engine: engine.clone(),
                    })
                    .await?;
                schedule_advance(&ctx);
            }
        }
        Some(("jump", idx)) => {
            let Ok(index) = idx.parse::<usize>() else {
                return Ok(());
            };
            if engine.jump_to(index) {
                edit_question(&ctx, &q, &engine).await?;
                dialogue.update(BotState::Running { engine }).await?;
            }
        }
        Some(("nav", direction)) => {
            let moved = match direction {
                "prev" => engine.navigate_previous(),
                "next" => engine.navigate_next(),
                _ => None,
            };
            if moved.is_some() {
                edit_question(&ctx, &q, &engine).await?;
                dialogue.update(BotState::Running { engine }).await?;
            }
        }
        Some(("pick", idx)) => {
            let Ok(index) = idx.parse::<usize>() else {
                return Ok(());
            };
            if let PickOutcome::Picked { cap_reached, .. } = engine.pick(index) {
                edit_select_board(&ctx, &q, &engine).await?;
                dialogue
                    .update(BotState::Running {
                        engine: engine.clone(),
                    })
                    .await?;
                if cap_reached {
                    schedule_auto_complete(&ctx);
                }
            }
        }
        _ => {}
    }

    Ok(())
}

#[instrument(level = "info", skip(connection, registry))]
pub async fn after_game(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    mut engine: SessionEngine,
    connection: Arc<Connection>,
    registry: Arc<TaskRegistry>,
) -> HandlerResult {
    match msg.text() {
        Some(PLAY_AGAIN) => {
            engine.restart();
            bot.send_message(
                msg.chat.id,
                format!("{}\n\nAre you ready to begin? (Yes/No)", engine.quiz()),
            )
            .parse_mode(teloxide::types::ParseMode::Html)
            .reply_markup(yes_no_keyboard())
            .await?;
            dialogue.update(BotState::ReadyToRun { engine }).await?;
        }
        Some(MAIN_MENU) => {
            bot.send_message(msg.chat.id, "What do you want to do now?")
                .reply_markup(action_keyboard())
                .await?;
            dialogue.update(BotState::Start).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Play again or back to the main menu?")
                .reply_markup(after_game_keyboard())
                .await?;
        }
    }

    Ok(())
}

/// The unsaved record is dropped once the player moves on; the failure was
/// already reported and there is no silent background retry.
pub async fn after_game_save_failed(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (engine, _record): (SessionEngine, GameRecord),
    connection: Arc<Connection>,
    registry: Arc<TaskRegistry>,
) -> HandlerResult {
    after_game(bot, dialogue, msg, engine, connection, registry).await
}

/// One manual retry of a failed save. A second failure gives up for good.
pub async fn on_retry_save(
    bot: Bot,
    dialogue: UserDialogue,
    q: CallbackQuery,
    (engine, record): (SessionEngine, GameRecord),
    connection: Arc<Connection>,
) -> HandlerResult {
    bot.answer_callback_query(&q.id).await?;
    let Some(chat) = q.chat_id() else {
        return Ok(());
    };

    // Leave `SaveFailed` before touching the database so a second tap of
    // the button can never re-save an already-persisted record.
    dialogue.update(BotState::Finished { engine }).await?;

    match connection.save_game_record(&record).await {
        Ok(record_id) => {
            log::info!("Retried save succeeded: record {}", record_id);
            let text = stats_summary(connection.as_ref(), &record)
                .await
                .unwrap_or_else(|| "Result saved.".to_owned());
            bot.send_message(chat, text)
                .parse_mode(teloxide::types::ParseMode::Html)
                .reply_markup(after_game_keyboard())
                .await?;
        }
        Err(e) => {
            log::error!("Retried save failed for {}: {:?}", record.user_id, e);
            bot.send_message(
                chat,
                "Still can't reach the database. Your result won't be recorded.",
            )
            .reply_markup(after_game_keyboard())
            .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info")]
pub async fn invalid_state(bot: Bot, msg: Message) -> HandlerResult {
    log::info!(
        "{}: invalid input '{:?}'",
        msg.chat.username().unwrap_or_default(),
        msg.text()
    );
    bot.send_message(
        msg.chat.id,
        "Unable to handle the message. Enter /help to see usages.",
    )
    .await?;
    Ok(())
}

// --- scheduled tasks -----------------------------------------------------
//
// The sleeps run inside registry-owned tasks so a reset, restart or give-up
// cancels them before they act. The work after the sleep re-reads the
// dialogue and runs detached; a finisher that slipped past cancellation
// either finds the state gone or loses the completion claim in `finish`.

fn schedule_countdown(ctx: &SessionCtx, seconds: u32) {
    let ctx = ctx.clone();
    ctx.registry.clone().spawn(ctx.chat.0, async move {
        let mut countdown = Countdown::new(seconds);
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            if countdown.tick() == Tick::Expired {
                break;
            }
        }
        tokio::spawn(async move {
            if let Err(e) = expire_session(&ctx).await {
                log::error!("Countdown expiry handling failed: {:?}", e);
            }
        });
    });
}

fn schedule_advance(ctx: &SessionCtx) {
    let ctx = ctx.clone();
    ctx.registry.clone().spawn(ctx.chat.0, async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        tokio::spawn(async move {
            if let Err(e) = advance_session(&ctx).await {
                log::error!("Auto-advance failed: {:?}", e);
            }
        });
    });
}

fn schedule_auto_complete(ctx: &SessionCtx) {
    let ctx = ctx.clone();
    ctx.registry.clone().spawn(ctx.chat.0, async move {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        tokio::spawn(async move {
            if let Err(e) = complete_selection_session(&ctx).await {
                log::error!("Auto-complete failed: {:?}", e);
            }
        });
    });
}

async fn expire_session(ctx: &SessionCtx) -> HandlerResult {
    let Ok(Some(BotState::Running { mut engine })) = ctx.dialogue.get().await else {
        return Ok(());
    };
    if engine.is_completed() {
        return Ok(());
    }

    engine.on_timer_expired();
    ctx.bot.send_message(ctx.chat, "⏰ Time's up!").await?;
    finish(ctx, engine).await
}

async fn advance_session(ctx: &SessionCtx) -> HandlerResult {
    let Ok(Some(BotState::Running { mut engine })) = ctx.dialogue.get().await else {
        return Ok(());
    };

    match engine.advance() {
        AdvanceOutcome::Completed => finish(ctx, engine).await,
        AdvanceOutcome::MovedTo(_) => {
            send_prompt(ctx, &engine).await?;
            ctx.dialogue.update(BotState::Running { engine }).await?;
            Ok(())
        }
        AdvanceOutcome::Stay => Ok(()),
    }
}

async fn complete_selection_session(ctx: &SessionCtx) -> HandlerResult {
    let Ok(Some(BotState::Running { mut engine })) = ctx.dialogue.get().await else {
        return Ok(());
    };

    engine.complete_selection();
    if engine.is_completed() {
        return finish(ctx, engine).await;
    }
    Ok(())
}

// --- completion ----------------------------------------------------------

/// Single exit point for every way a session ends: predicate, give-up or
/// countdown. Competing completion paths race for the registry's claim
/// before any side effect, so exactly one of them gets past the first
/// statement; the record is then emitted at most once by the engine guard,
/// and all scheduled tasks die with the session.
async fn finish(ctx: &SessionCtx, mut engine: SessionEngine) -> HandlerResult {
    if !ctx.registry.claim_completion(ctx.chat.0) {
        return Ok(());
    }
    ctx.registry.cancel(ctx.chat.0);
    engine.abort();

    let record = ctx
        .user
        .as_deref()
        .and_then(|user_id| engine.take_record(user_id));

    let score = engine.score();
    let max = engine.max_score();
    log::info!(
        "Session on '{}' completed with {}/{}",
        engine.quiz().title(),
        score,
        max
    );

    // Commit the terminal state before any network round-trip; a handler
    // observing the dialogue meanwhile sees the run as over.
    ctx.dialogue
        .update(BotState::Finished {
            engine: engine.clone(),
        })
        .await?;

    ctx.bot
        .send_message(ctx.chat, format!("🏁 Finished! Your score: {}/{}", score, max))
        .reply_markup(after_game_keyboard())
        .await?;

    // Anonymous play still works; it just leaves no trace in the stats.
    let Some(record) = record else {
        return Ok(());
    };

    match ctx.connection.save_game_record(&record).await {
        Ok(record_id) => {
            log::info!(
                "Saved record {} for {} on quiz {}",
                record_id,
                record.user_id,
                record.quiz_id
            );
            if let Some(text) = stats_summary(ctx.connection.as_ref(), &record).await {
                ctx.bot
                    .send_message(ctx.chat, text)
                    .parse_mode(teloxide::types::ParseMode::Html)
                    .await?;
            }
        }
        Err(e) => {
            log::error!("Failed to save record for {}: {:?}", record.user_id, e);
            ctx.bot
                .send_message(
                    ctx.chat,
                    "⚠️ Couldn't save your result. Your score still counts for this run.",
                )
                .reply_markup(ReplyMarkup::InlineKeyboard(retry_save_keyboard()))
                .await?;
            ctx.dialogue
                .update(BotState::SaveFailed { engine, record })
                .await?;
        }
    }

    Ok(())
}

// --- rendering -----------------------------------------------------------

fn fmt_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn choice_text(engine: &SessionEngine) -> Option<String> {
    let nav = engine.as_choice()?;
    let question = nav.current_question()?;
    Some(format!(
        "Question #{}/{}\n{}\n\nScore {}/{} · ⏱ {}",
        nav.current_index() + 1,
        nav.total(),
        question.text(),
        engine.score(),
        engine.max_score(),
        fmt_clock(engine.remaining_seconds()),
    ))
}

fn select_text(engine: &SessionEngine) -> Option<String> {
    let controller = engine.as_select()?;
    Some(format!(
        "{}\n\nPicks left: {} · Score {}/{} · ⏱ {}",
        controller.question().text(),
        controller.remaining_picks(),
        engine.score(),
        engine.max_score(),
        fmt_clock(engine.remaining_seconds()),
    ))
}

/// Sends the prompt for the engine's current state as a fresh message.
async fn send_prompt(ctx: &SessionCtx, engine: &SessionEngine) -> HandlerResult {
    if let Some(nav) = engine.as_choice() {
        if let Some(text) = choice_text(engine) {
            ctx.bot
                .send_message(ctx.chat, text)
                .reply_markup(choice_keyboard(nav))
                .await?;
        }
    } else if let Some(controller) = engine.as_select() {
        if let Some(text) = select_text(engine) {
            ctx.bot
                .send_message(ctx.chat, text)
                .reply_markup(select_keyboard(controller))
                .await?;
        }
    } else if let Some(matcher) = engine.as_blank() {
        ctx.bot
            .send_message(
                ctx.chat,
                format!(
                    "Type your answers! {} to find · ⏱ {}",
                    matcher.total(),
                    fmt_clock(engine.remaining_seconds()),
                ),
            )
            .await?;
    }
    Ok(())
}

/// Replaces the pressed message in place so verdict marks show up where
/// the player just tapped.
async fn edit_question(ctx: &SessionCtx, q: &CallbackQuery, engine: &SessionEngine) -> HandlerResult {
    let (Some(nav), Some(text)) = (engine.as_choice(), choice_text(engine)) else {
        return Ok(());
    };
    if let Some(message) = &q.message {
        ctx.bot
            .edit_message_text(ctx.chat, message.id(), text)
            .reply_markup(choice_keyboard(nav))
            .await?;
    }
    Ok(())
}

async fn edit_select_board(
    ctx: &SessionCtx,
    q: &CallbackQuery,
    engine: &SessionEngine,
) -> HandlerResult {
    let (Some(controller), Some(text)) = (engine.as_select(), select_text(engine)) else {
        return Ok(());
    };
    if let Some(message) = &q.message {
        ctx.bot
            .edit_message_text(ctx.chat, message.id(), text)
            .reply_markup(select_keyboard(controller))
            .await?;
    }
    Ok(())
}

/// Post-game aggregate lines. `None` when the aggregates can't be fetched:
/// by then the record is already saved, so a display failure must not
/// bubble up and put the dialogue back on a path that saves again.
async fn stats_summary<Store: RetrieveStats>(
    connection: &Store,
    record: &GameRecord,
) -> Option<String> {
    let pct = crate::stats::score_percentage(record);
    let personal = match connection
        .retrieve_user_quiz_stats(&record.user_id, record.quiz_id)
        .await
    {
        Ok(personal) => personal,
        Err(e) => {
            log::warn!("Failed to fetch stats summary for {}: {:?}", record.user_id, e);
            return None;
        }
    };
    let quiz = match connection.retrieve_quiz_stats(record.quiz_id).await {
        Ok(quiz) => quiz,
        Err(e) => {
            log::warn!("Failed to fetch stats summary for {}: {:?}", record.user_id, e);
            return None;
        }
    };

    let mut text = format!(
        "📊 <b>{}</b>\nThis run: {:.0}%\nYour best: {:.0}% over {} plays",
        record.quiz_title, pct, personal.best_score, personal.play_count,
    );
    if let Some(quiz) = quiz {
        text.push_str(&format!(
            "\nEveryone: {:.0}% average, {:.0}% best over {} plays",
            quiz.average_score, quiz.best_score, quiz.total_plays,
        ));
    }
    Some(text)
}

pub(crate) fn format_user_stats(stats: &UserStats) -> String {
    format!(
        "📊 <b>Your statistics</b>\nGames played: {}\nAverage score: {:.0}%\nDistinct quizzes: {}",
        stats.total_games,
        stats.average_score,
        stats.play_count.len(),
    )
}
