use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::engine::{NavigationController, SelectionController};

pub(crate) const TAKE_QUIZ: &str = "Take a quiz📝";
pub(crate) const MY_STATS: &str = "My stats📊";
pub(crate) const GIVE_UP: &str = "Give up🏳️";
pub(crate) const PLAY_AGAIN: &str = "Play again🔁";
pub(crate) const MAIN_MENU: &str = "Main menu🏠";

pub(crate) fn action_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(TAKE_QUIZ),
        KeyboardButton::new(MY_STATS),
    ]])
}

pub(crate) fn yes_no_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new("Yes✔️"),
        KeyboardButton::new("No❌"),
    ]])
}

pub(crate) fn quizzes_keyboard(quizzes: &[String]) -> KeyboardMarkup {
    let keyboard = quizzes
        .iter()
        .map(|quiz| vec![KeyboardButton::new(quiz)]);

    KeyboardMarkup::new(keyboard)
}

pub(crate) fn give_up_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(GIVE_UP)]])
}

pub(crate) fn after_game_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(PLAY_AGAIN),
        KeyboardButton::new(MAIN_MENU),
    ]])
}

/// Options plus a navigation row for the current multiple-choice question.
/// Answered questions render their verdict in the jump row so the player
/// can see where they stand.
pub(crate) fn choice_keyboard(nav: &NavigationController) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();

    if let Some(question) = nav.current_question() {
        let answered = nav.answer_for(nav.current_index());
        for (idx, option) in question.options().iter().enumerate() {
            let label = match answered {
                Some(_) if idx == question.correct_option() => format!("✅ {}", option),
                Some(answer) if answer.selected == Some(idx) => format!("❌ {}", option),
                _ => option.clone(),
            };
            rows.push(vec![InlineKeyboardButton::callback(
                label,
                format!("opt:{}", idx),
            )]);
        }
    }

    // Telegram caps an inline row at 8 buttons, so the jump row is a
    // window centered on the current question, clamped at both ends.
    let max_visible = 8;
    let total = nav.total();
    let start = if total <= max_visible {
        0
    } else {
        nav.current_index()
            .saturating_sub(max_visible / 2)
            .min(total - max_visible)
    };

    let mut jump_row: Vec<InlineKeyboardButton> = Vec::new();
    for idx in start..total.min(start + max_visible) {
        let mark = match nav.answer_for(idx) {
            _ if idx == nav.current_index() => format!("·{}·", idx + 1),
            Some(answer) if answer.is_correct => format!("{}✅", idx + 1),
            Some(_) => format!("{}❌", idx + 1),
            None => format!("{}", idx + 1),
        };
        jump_row.push(InlineKeyboardButton::callback(mark, format!("jump:{}", idx)));
    }
    if !jump_row.is_empty() {
        rows.push(jump_row);
    }

    rows.push(vec![
        InlineKeyboardButton::callback("⬅️ Prev", "nav:prev"),
        InlineKeyboardButton::callback("Next ➡️", "nav:next"),
    ]);

    InlineKeyboardMarkup::new(rows)
}

/// Shuffled option grid for a multiple-select quiz, two per row, with
/// verdicts on already-picked options.
pub(crate) fn select_keyboard(controller: &SelectionController) -> InlineKeyboardMarkup {
    let correct = controller.question().correct_indices();
    let buttons: Vec<InlineKeyboardButton> = controller
        .options()
        .iter()
        .enumerate()
        .map(|(shuffled_idx, option)| {
            let label = if controller.selected().contains(&option.original_index) {
                if correct.contains(&option.original_index) {
                    format!("✅ {}", option.text)
                } else {
                    format!("❌ {}", option.text)
                }
            } else {
                option.text.clone()
            };
            InlineKeyboardButton::callback(label, format!("pick:{}", shuffled_idx))
        })
        .collect();

    InlineKeyboardMarkup::new(buttons.chunks(2).map(|chunk| chunk.to_vec()))
}

pub(crate) fn retry_save_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Retry saving💾",
        "retry_save",
    )]])
}

#[cfg(test)]
mod tests {
    use teloxide::types::InlineKeyboardButtonKind;

    use crate::database::quiz::ChoiceQuestion;

    use super::*;

    fn nav_with(total: usize) -> NavigationController {
        NavigationController::new(
            (0..total)
                .map(|i| {
                    ChoiceQuestion::new(
                        format!("Question {}", i + 1),
                        vec!["a".into(), "b".into()],
                        0,
                    )
                })
                .collect(),
        )
    }

    fn jump_targets(markup: &InlineKeyboardMarkup) -> Vec<usize> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => {
                    data.strip_prefix("jump:").and_then(|s| s.parse().ok())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn short_quizzes_show_every_jump_button() {
        let nav = nav_with(5);
        assert_eq!(jump_targets(&choice_keyboard(&nav)), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn jump_window_centers_on_the_current_question() {
        let mut nav = nav_with(15);
        nav.jump_to(7);
        assert_eq!(
            jump_targets(&choice_keyboard(&nav)),
            (3..11).collect::<Vec<_>>()
        );
    }

    #[test]
    fn jump_window_reaches_the_last_questions() {
        let mut nav = nav_with(15);
        nav.jump_to(14);
        assert_eq!(
            jump_targets(&choice_keyboard(&nav)),
            (7..15).collect::<Vec<_>>()
        );
    }

    #[test]
    fn jump_window_clamps_at_the_start() {
        let nav = nav_with(15);
        assert_eq!(
            jump_targets(&choice_keyboard(&nav)),
            (0..8).collect::<Vec<_>>()
        );
    }
}
