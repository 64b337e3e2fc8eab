use std::collections::HashMap;

use uuid::Uuid;

use crate::database::quiz::ChoiceQuestion;

/// One recorded answer. `selected` is `None` when the question was never
/// answered and got resolved as incorrect at completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAnswer {
    pub question_id: Uuid,
    pub selected: Option<usize>,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceOutcome {
    Answered { correct: bool },
    Rejected,
}

/// Question-index state machine for multiple-choice quizzes. Answers are
/// irrevocable; navigation wraps around at both ends.
#[derive(Debug, Clone)]
pub struct NavigationController {
    questions: Vec<ChoiceQuestion>,
    current: usize,
    answers: HashMap<Uuid, RecordedAnswer>,
}

impl NavigationController {
    pub fn new(questions: Vec<ChoiceQuestion>) -> Self {
        Self {
            questions,
            current: 0,
            answers: HashMap::new(),
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<&ChoiceQuestion> {
        self.questions.get(self.current)
    }

    pub fn answer_for(&self, index: usize) -> Option<&RecordedAnswer> {
        self.questions
            .get(index)
            .and_then(|q| self.answers.get(q.uuid()))
    }

    /// Records an answer for the current question. A question that already
    /// has an answer keeps it; the late call is a no-op.
    pub fn select_option(&mut self, option: usize) -> ChoiceOutcome {
        let Some(question) = self.questions.get(self.current) else {
            return ChoiceOutcome::Rejected;
        };
        if option >= question.options().len() || self.answers.contains_key(question.uuid()) {
            return ChoiceOutcome::Rejected;
        }

        let correct = option == question.correct_option();
        self.answers.insert(
            *question.uuid(),
            RecordedAnswer {
                question_id: *question.uuid(),
                selected: Some(option),
                is_correct: correct,
            },
        );
        ChoiceOutcome::Answered { correct }
    }

    pub fn all_answered(&self) -> bool {
        self.answers.len() == self.questions.len()
    }

    /// Moves to the next unanswered question: scan forward from the index
    /// after the current one, then wrap and scan from the start up to (not
    /// including) the current index. No move when nothing is unanswered.
    pub fn advance_auto(&mut self) -> Option<usize> {
        let forward = (self.current + 1)..self.total();
        let wrapped = 0..self.current;
        let target = forward.chain(wrapped).find(|&i| self.is_unanswered(i))?;
        self.current = target;
        Some(target)
    }

    pub fn next(&mut self) -> usize {
        if !self.questions.is_empty() {
            self.current = (self.current + 1) % self.total();
        }
        self.current
    }

    pub fn previous(&mut self) -> usize {
        if !self.questions.is_empty() {
            self.current = self.current.checked_sub(1).unwrap_or(self.total() - 1);
        }
        self.current
    }

    pub fn jump_to(&mut self, index: usize) -> bool {
        if index >= self.total() {
            return false;
        }
        self.current = index;
        true
    }

    /// Resolves every unanswered question as incorrect, leaving recorded
    /// answers untouched.
    pub fn force_complete(&mut self) {
        for question in &self.questions {
            self.answers
                .entry(*question.uuid())
                .or_insert_with(|| RecordedAnswer {
                    question_id: *question.uuid(),
                    selected: None,
                    is_correct: false,
                });
        }
    }

    pub fn score(&self) -> u32 {
        self.answers.values().filter(|a| a.is_correct).count() as u32
    }

    fn is_unanswered(&self, index: usize) -> bool {
        !self
            .questions
            .get(index)
            .map(|q| self.answers.contains_key(q.uuid()))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_questions() -> NavigationController {
        let questions = (0..5)
            .map(|i| {
                ChoiceQuestion::new(
                    format!("Question {}", i + 1),
                    vec!["a".into(), "b".into(), "c".into()],
                    0,
                )
            })
            .collect();
        NavigationController::new(questions)
    }

    #[test]
    fn previous_at_zero_wraps_to_last_and_next_at_last_wraps_to_zero() {
        let mut nav = five_questions();

        assert_eq!(nav.previous(), 4);
        assert_eq!(nav.next(), 0);
        nav.jump_to(4);
        assert_eq!(nav.next(), 0);
    }

    #[test]
    fn answers_are_irrevocable() {
        let mut nav = five_questions();

        assert_eq!(
            nav.select_option(0),
            ChoiceOutcome::Answered { correct: true }
        );
        assert_eq!(nav.select_option(1), ChoiceOutcome::Rejected);
        assert_eq!(nav.answer_for(0).unwrap().selected, Some(0));
        assert_eq!(nav.score(), 1);
    }

    #[test]
    fn out_of_range_option_is_rejected() {
        let mut nav = five_questions();

        assert_eq!(nav.select_option(99), ChoiceOutcome::Rejected);
        assert_eq!(nav.score(), 0);
    }

    #[test]
    fn auto_advance_scans_forward_before_wrapping() {
        let mut nav = five_questions();

        // Answer questions 1 and 3, standing on question 1.
        nav.jump_to(1);
        nav.select_option(0);
        nav.jump_to(3);
        nav.select_option(1);
        nav.jump_to(1);

        assert_eq!(nav.advance_auto(), Some(2));
    }

    #[test]
    fn auto_advance_wraps_when_nothing_unanswered_lies_ahead() {
        let mut nav = five_questions();

        nav.jump_to(3);
        nav.select_option(0);
        nav.jump_to(4);
        nav.select_option(0);
        // Standing on the last question, only 0..3 hold unanswered ones.
        assert_eq!(nav.advance_auto(), Some(0));
    }

    #[test]
    fn auto_advance_stays_put_when_everything_is_answered() {
        let mut nav = five_questions();

        for i in 0..5 {
            nav.jump_to(i);
            nav.select_option(0);
        }
        assert!(nav.all_answered());
        assert_eq!(nav.advance_auto(), None);
    }

    #[test]
    fn force_complete_marks_skipped_questions_incorrect() {
        let mut nav = five_questions();

        nav.select_option(0);
        nav.force_complete();

        assert!(nav.all_answered());
        assert_eq!(nav.score(), 1);
        let skipped = nav.answer_for(2).unwrap();
        assert_eq!(skipped.selected, None);
        assert!(!skipped.is_correct);
    }

    #[test]
    fn jump_to_rejects_out_of_range_indices() {
        let mut nav = five_questions();

        assert!(!nav.jump_to(5));
        assert_eq!(nav.current_index(), 0);
        assert!(nav.jump_to(4));
        assert_eq!(nav.current_index(), 4);
    }
}
