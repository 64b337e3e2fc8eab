use std::fmt;

use uuid::Uuid;

/// Answer mode of a quiz. Session logic dispatches on this exhaustively,
/// so a quiz can never carry a payload that disagrees with its mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizKind {
    FillInBlank,
    MultipleChoice,
    MultipleSelect,
}

impl QuizKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizKind::FillInBlank => "fill_in_blank",
            QuizKind::MultipleChoice => "multiple_choice",
            QuizKind::MultipleSelect => "multiple_select",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fill_in_blank" => Some(QuizKind::FillInBlank),
            "multiple_choice" => Some(QuizKind::MultipleChoice),
            "multiple_select" => Some(QuizKind::MultipleSelect),
            _ => None,
        }
    }
}

impl fmt::Display for QuizKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuizKind::FillInBlank => "fill-in-the-blank",
            QuizKind::MultipleChoice => "multiple choice",
            QuizKind::MultipleSelect => "multiple select",
        };
        write!(f, "{}", label)
    }
}

/// Immutable quiz definition. Loaded once per play attempt and never
/// mutated by session logic.
#[derive(Debug, Clone)]
pub struct Quiz {
    uuid: Uuid,
    title: String,
    time_limit_seconds: u32,
    payload: QuizPayload,
}

#[derive(Debug, Clone)]
pub enum QuizPayload {
    FillInBlank { answers: Vec<BlankAnswer> },
    MultipleChoice { questions: Vec<ChoiceQuestion> },
    MultipleSelect { question: SelectQuestion },
}

/// One creditable fill-in-the-blank answer with its accepted spellings.
#[derive(Debug, Clone)]
pub struct BlankAnswer {
    answer: String,
    synonyms: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChoiceQuestion {
    uuid: Uuid,
    text: String,
    options: Vec<String>,
    correct_option: usize,
}

#[derive(Debug, Clone)]
pub struct SelectQuestion {
    text: String,
    options: Vec<String>,
    correct_indices: Vec<usize>,
}

impl Quiz {
    pub fn new(title: String, time_limit_seconds: u32, payload: QuizPayload) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title,
            time_limit_seconds,
            payload,
        }
    }

    pub fn retrieve(
        uuid: Uuid,
        title: String,
        time_limit_seconds: u32,
        payload: QuizPayload,
    ) -> Self {
        Self {
            uuid,
            title,
            time_limit_seconds,
            payload,
        }
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn title(&self) -> &String {
        &self.title
    }

    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }

    pub fn payload(&self) -> &QuizPayload {
        &self.payload
    }

    pub fn kind(&self) -> QuizKind {
        match &self.payload {
            QuizPayload::FillInBlank { .. } => QuizKind::FillInBlank,
            QuizPayload::MultipleChoice { .. } => QuizKind::MultipleChoice,
            QuizPayload::MultipleSelect { .. } => QuizKind::MultipleSelect,
        }
    }

    /// Maximum obtainable score; a session's score never exceeds this.
    pub fn max_score(&self) -> u32 {
        match &self.payload {
            QuizPayload::FillInBlank { answers } => answers.len() as u32,
            QuizPayload::MultipleChoice { questions } => questions.len() as u32,
            QuizPayload::MultipleSelect { question } => question.max_selections() as u32,
        }
    }

    /// Number of prompts shown to the player.
    pub fn item_count(&self) -> usize {
        match &self.payload {
            QuizPayload::FillInBlank { answers } => answers.len(),
            QuizPayload::MultipleChoice { questions } => questions.len(),
            QuizPayload::MultipleSelect { .. } => 1,
        }
    }
}

impl fmt::Display for Quiz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<b>{}</b>\nMode: {}\nItems: {}\nTime limit: {}:{:02}",
            self.title(),
            self.kind(),
            self.item_count(),
            self.time_limit_seconds / 60,
            self.time_limit_seconds % 60,
        )
    }
}

impl BlankAnswer {
    pub fn new(answer: String, synonyms: Vec<String>) -> Self {
        Self { answer, synonyms }
    }

    pub fn answer(&self) -> &String {
        &self.answer
    }

    pub fn synonyms(&self) -> &[String] {
        &self.synonyms
    }
}

impl ChoiceQuestion {
    pub fn new(text: String, options: Vec<String>, correct_option: usize) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            text,
            options,
            correct_option,
        }
    }

    pub fn retrieve(
        uuid: Uuid,
        text: String,
        options: Vec<String>,
        correct_option: usize,
    ) -> Self {
        Self {
            uuid,
            text,
            options,
            correct_option,
        }
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn text(&self) -> &String {
        &self.text
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_option(&self) -> usize {
        self.correct_option
    }
}

impl SelectQuestion {
    pub fn new(text: String, options: Vec<String>, correct_indices: Vec<usize>) -> Self {
        Self {
            text,
            options,
            correct_indices,
        }
    }

    pub fn text(&self) -> &String {
        &self.text
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_indices(&self) -> &[usize] {
        &self.correct_indices
    }

    /// The selection cap always equals the number of correct options.
    pub fn max_selections(&self) -> usize {
        self.correct_indices.len()
    }
}
