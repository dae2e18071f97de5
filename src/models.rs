use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

impl Turn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Metadata about the book under discussion. Every field is independently
/// optional; absent fields are never rendered into the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookContext {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub chapter: Option<String>,
    pub characters: Option<String>,
    pub vocab: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPlan {
    pub current: String,
    pub upcoming: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TutorRequest {
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub user: String,
    /// Opaque correlation id supplied by the caller; never validated or stored.
    #[serde(default, rename = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub book: Option<BookContext>,
    #[serde(default, rename = "questionList")]
    pub question_list: Option<Vec<String>>,
    #[serde(default, rename = "remainingQuestions")]
    pub remaining_questions: Option<Vec<String>>,
    #[serde(default)]
    pub current_question: Option<String>,
    #[serde(default, rename = "endSession")]
    pub end_session: bool,
}

impl TutorRequest {
    /// Resolves the question plan variants callers may supply. A question
    /// list wins over a bare `current_question`: its head is the canonical
    /// current question and its second element the upcoming hint.
    pub fn question_plan(&self) -> Option<QuestionPlan> {
        let list = self
            .question_list
            .as_deref()
            .or(self.remaining_questions.as_deref())
            .unwrap_or(&[]);

        if let Some(current) = list.first() {
            return Some(QuestionPlan {
                current: current.clone(),
                upcoming: list.get(1).cloned(),
            });
        }

        let current = self.current_question.as_deref()?.trim();
        if current.is_empty() {
            return None;
        }

        Some(QuestionPlan {
            current: current.to_string(),
            upcoming: None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub transcript: String,
    #[serde(default = "default_max_words", rename = "maxWords")]
    pub max_words: usize,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_max_words() -> usize {
    250
}

fn default_lang() -> String {
    "ko".to_string()
}

/// The fixed JSON shape the tutoring UI consumes from every successful turn.
/// `bot_text` is always a non-empty feedback sentence, distinct from the
/// question carried in `next_question`. Keys the model emitted beyond the
/// contract are passed through unchanged in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorReply {
    pub bot_text: String,
    pub next_question: String,
    pub practice_tip: Option<String>,
    pub advance: Option<bool>,
    pub session_summary: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
