use crate::database::quiz::BlankAnswer;

/// Result of one free-text submission. Only `Matched` credits score;
/// the caller clears the input field only on a genuine new match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Matched { answer: String },
    AlreadyFound { answer: String },
    NoMatch,
}

/// Free-text matcher for fill-in-the-blank quizzes. Owns the found-answer
/// set; an answer is credited at most once per session.
#[derive(Debug, Clone)]
pub struct AnswerMatcher {
    answers: Vec<BlankAnswer>,
    found: Vec<usize>,
}

/// Lowercase and strip all whitespace, so "New  York " == "newyork".
fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

impl AnswerMatcher {
    pub fn new(answers: Vec<BlankAnswer>) -> Self {
        Self {
            answers,
            found: Vec::new(),
        }
    }

    /// Matches the input against every answer's synonym set, first answer
    /// in list order winning on synonym collisions.
    pub fn submit(&mut self, raw: &str) -> SubmitOutcome {
        let needle = normalize(raw);
        if needle.is_empty() {
            return SubmitOutcome::NoMatch;
        }

        let hit = self
            .answers
            .iter()
            .position(|answer| answer.synonyms().iter().any(|s| normalize(s) == needle));

        match hit {
            Some(idx) if self.found.contains(&idx) => SubmitOutcome::AlreadyFound {
                answer: self.answers[idx].answer().clone(),
            },
            Some(idx) => {
                self.found.push(idx);
                SubmitOutcome::Matched {
                    answer: self.answers[idx].answer().clone(),
                }
            }
            None => SubmitOutcome::NoMatch,
        }
    }

    pub fn score(&self) -> u32 {
        self.found.len() as u32
    }

    pub fn total(&self) -> usize {
        self.answers.len()
    }

    pub fn is_complete(&self) -> bool {
        self.found.len() == self.answers.len()
    }

    /// Canonical texts of found answers, in the order they were found.
    pub fn found_answers(&self) -> Vec<&str> {
        self.found
            .iter()
            .map(|&idx| self.answers[idx].answer().as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capitals() -> AnswerMatcher {
        AnswerMatcher::new(vec![
            BlankAnswer::new(
                "Seoul".into(),
                vec!["seoul".into(), "서울".into()],
            ),
            BlankAnswer::new(
                "New York".into(),
                vec!["new york".into(), "nyc".into()],
            ),
        ])
    }

    #[test]
    fn normalized_synonym_credits_exactly_one_point() {
        let mut matcher = capitals();

        let outcome = matcher.submit("  SeOuL ");
        assert_eq!(
            outcome,
            SubmitOutcome::Matched {
                answer: "Seoul".into()
            }
        );
        assert_eq!(matcher.score(), 1);
    }

    #[test]
    fn whitespace_is_collapsed_before_matching() {
        let mut matcher = capitals();

        assert_eq!(
            matcher.submit("NEW\tYORK"),
            SubmitOutcome::Matched {
                answer: "New York".into()
            }
        );
        assert_eq!(
            matcher.submit("n y c"),
            SubmitOutcome::AlreadyFound {
                answer: "New York".into()
            }
        );
        assert_eq!(matcher.score(), 1);
    }

    #[test]
    fn resubmitting_any_synonym_of_a_found_answer_is_a_no_op() {
        let mut matcher = capitals();

        matcher.submit("seoul");
        let outcome = matcher.submit("서울");
        assert_eq!(
            outcome,
            SubmitOutcome::AlreadyFound {
                answer: "Seoul".into()
            }
        );
        assert_eq!(matcher.score(), 1);
        assert!(!matcher.is_complete());
    }

    #[test]
    fn unknown_and_empty_input_do_not_match() {
        let mut matcher = capitals();

        assert_eq!(matcher.submit("tokyo"), SubmitOutcome::NoMatch);
        assert_eq!(matcher.submit("   "), SubmitOutcome::NoMatch);
        assert_eq!(matcher.score(), 0);
    }

    #[test]
    fn completes_once_every_answer_is_found() {
        let mut matcher = capitals();

        matcher.submit("seoul");
        assert!(!matcher.is_complete());
        matcher.submit("nyc");
        assert!(matcher.is_complete());
        assert_eq!(matcher.found_answers(), vec!["Seoul", "New York"]);
    }
}
