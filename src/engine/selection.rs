use rand::seq::SliceRandom;
use rand::Rng;

use crate::database::quiz::SelectQuestion;

/// An option as presented to the player, remembering where it came from
/// in the quiz definition so scoring stays stable across the shuffle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffledOption {
    pub text: String,
    pub original_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    Picked {
        original_index: usize,
        correct: bool,
        cap_reached: bool,
    },
    Rejected,
}

/// Bounded, irrevocable multi-pick state for multiple-select quizzes.
/// Selections are append-only and capped at `max_selections`.
#[derive(Debug, Clone)]
pub struct SelectionController {
    question: SelectQuestion,
    shuffled: Vec<ShuffledOption>,
    selected: Vec<usize>,
}

impl SelectionController {
    pub fn new(question: SelectQuestion) -> Self {
        let shuffled = question
            .options()
            .iter()
            .enumerate()
            .map(|(original_index, text)| ShuffledOption {
                text: text.clone(),
                original_index,
            })
            .collect();
        Self {
            question,
            shuffled,
            selected: Vec::new(),
        }
    }

    /// Permutes the presented options. Called exactly once per play-through,
    /// at game start; re-renders reuse the same order.
    pub fn shuffle(&mut self, rng: &mut impl Rng) {
        self.shuffled.shuffle(rng);
    }

    /// Picks the option at a presented position. Already-selected options,
    /// picks past the cap, and out-of-range indices are all no-ops.
    pub fn select(&mut self, shuffled_index: usize) -> PickOutcome {
        if self.is_complete() {
            return PickOutcome::Rejected;
        }
        let Some(option) = self.shuffled.get(shuffled_index) else {
            return PickOutcome::Rejected;
        };
        let original_index = option.original_index;
        if self.selected.contains(&original_index) {
            return PickOutcome::Rejected;
        }

        self.selected.push(original_index);
        PickOutcome::Picked {
            original_index,
            correct: self.question.correct_indices().contains(&original_index),
            cap_reached: self.is_complete(),
        }
    }

    pub fn score(&self) -> u32 {
        self.selected
            .iter()
            .filter(|idx| self.question.correct_indices().contains(idx))
            .count() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.selected.len() == self.question.max_selections()
    }

    pub fn remaining_picks(&self) -> usize {
        self.question.max_selections() - self.selected.len()
    }

    pub fn question(&self) -> &SelectQuestion {
        &self.question
    }

    pub fn options(&self) -> &[ShuffledOption] {
        &self.shuffled
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn continents() -> SelectionController {
        // Correct picks: indices 0 and 2 out of four options.
        SelectionController::new(SelectQuestion::new(
            "Which are continents?".into(),
            vec![
                "Asia".into(),
                "Greenland".into(),
                "Africa".into(),
                "Madagascar".into(),
            ],
            vec![0, 2],
        ))
    }

    fn position_of(controller: &SelectionController, original: usize) -> usize {
        controller
            .options()
            .iter()
            .position(|o| o.original_index == original)
            .unwrap()
    }

    #[test]
    fn shuffle_keeps_original_indices_with_their_texts() {
        let mut controller = continents();
        let mut rng = StdRng::seed_from_u64(7);
        controller.shuffle(&mut rng);

        for option in controller.options() {
            let original = &["Asia", "Greenland", "Africa", "Madagascar"][option.original_index];
            assert_eq!(&option.text, original);
        }
        assert_eq!(controller.options().len(), 4);
    }

    #[test]
    fn picking_a_correct_option_scores_one() {
        let mut controller = continents();
        let mut rng = StdRng::seed_from_u64(7);
        controller.shuffle(&mut rng);

        let pos = position_of(&controller, 0);
        let outcome = controller.select(pos);
        assert_eq!(
            outcome,
            PickOutcome::Picked {
                original_index: 0,
                correct: true,
                cap_reached: false,
            }
        );
        assert_eq!(controller.score(), 1);
    }

    #[test]
    fn picking_the_same_original_index_twice_is_a_no_op() {
        let mut controller = continents();

        assert!(matches!(controller.select(1), PickOutcome::Picked { .. }));
        assert_eq!(controller.select(1), PickOutcome::Rejected);
        assert_eq!(controller.selected().len(), 1);
    }

    #[test]
    fn selection_count_never_exceeds_the_cap() {
        let mut controller = continents();

        assert!(matches!(controller.select(1), PickOutcome::Picked { .. }));
        let second = controller.select(3);
        assert_eq!(
            second,
            PickOutcome::Picked {
                original_index: 3,
                correct: false,
                cap_reached: true,
            }
        );
        assert!(controller.is_complete());

        assert_eq!(controller.select(0), PickOutcome::Rejected);
        assert_eq!(controller.selected().len(), 2);
        assert_eq!(controller.score(), 0);
    }

    #[test]
    fn out_of_range_pick_is_rejected() {
        let mut controller = continents();
        assert_eq!(controller.select(42), PickOutcome::Rejected);
        assert_eq!(controller.remaining_picks(), 2);
    }
}
