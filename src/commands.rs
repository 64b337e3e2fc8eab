use std::sync::Arc;

use teloxide::{
    payloads::SendMessageSetters, prelude::Requester, types::Message,
    utils::command::BotCommands, Bot,
};

use crate::database::connection::RetrieveStats;
use crate::engine::timer::TaskRegistry;
use crate::keyboard::action_keyboard;
use crate::runner;
use crate::state::BotState;
use crate::{HandlerResult, UserDialogue};

#[derive(Debug, Clone, BotCommands)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "display help.")]
    Help,
    #[command(description = "show the main menu.")]
    Start,
    #[command(description = "abandon the current quiz or dialogue.")]
    Cancel,
    #[command(description = "show your play statistics.")]
    Stats,
}

pub async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

pub async fn start(bot: Bot, msg: Message, dialogue: UserDialogue) -> HandlerResult {
    bot.send_message(msg.chat.id, "Please choose what to do:")
        .reply_markup(action_keyboard())
        .await?;
    dialogue.update(BotState::Start).await?;
    Ok(())
}

/// Cancelling tears the session down, so its scheduled tasks go with it.
pub async fn cancel(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    registry: Arc<TaskRegistry>,
) -> HandlerResult {
    registry.cancel(msg.chat.id.0);
    bot.send_message(msg.chat.id, "Cancelled. Back to the main menu.")
        .reply_markup(action_keyboard())
        .await?;
    dialogue.update(BotState::Start).await?;
    Ok(())
}

pub async fn stats<Stats: RetrieveStats>(
    bot: Bot,
    msg: Message,
    connection: Arc<Stats>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        bot.send_message(msg.chat.id, "Statistics are only kept for identified users.")
            .await?;
        return Ok(());
    };

    let text = match connection.retrieve_user_stats(&user.id.to_string()).await? {
        Some(stats) => runner::format_user_stats(&stats),
        None => "No games recorded yet. Take a quiz first!".to_owned(),
    };
    bot.send_message(msg.chat.id, text)
        .parse_mode(teloxide::types::ParseMode::Html)
        .await?;
    Ok(())
}
