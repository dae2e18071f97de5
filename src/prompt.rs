use crate::models::{BookContext, QuestionPlan, Turn};
use crate::openai::{ChatMessage, Role};

/// Literal control tokens the persona prompt teaches the model to recognize.
/// They stand in for the user turn when the caller sent no utterance.
pub const OPENING_QUESTION_TOKEN: &str = "[SYSTEM_REQUEST_OPENING_QUESTION]";
pub const END_SESSION_TOKEN: &str = "[SYSTEM_END_SESSION]";

const PERSONA: &str = "You are a supportive English speaking tutor for young learners. \
    Language: English only. Keep sentences short enough to be spoken in under ~12 seconds. \
    Each turn: 1) Brief feedback on the previous answer. \
    2) One short practice tip (e.g., verb tense, connectors). \
    3) ONE open-ended follow-up question. Avoid multiple choice. \
    Use gentle scaffolding if the learner struggles. \
    If you receive [SYSTEM_REQUEST_OPENING_QUESTION], start with a friendly opener about the story. \
    If you receive [SYSTEM_END_SESSION], produce a compact JSON summary with strengths[], needs[], and examples[].";

/// Which optional prompt sections a deployment renders. The historical
/// handler variants differed only in these switches, so they are flags on a
/// single builder instead of copies of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PromptFlags {
    pub render_book: bool,
    pub render_question_plan: bool,
    pub strict_json: bool,
}

impl Default for PromptFlags {
    fn default() -> Self {
        Self {
            render_book: true,
            render_question_plan: true,
            strict_json: true,
        }
    }
}

pub struct BuiltPrompt {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
}

/// Assembles the system prompt and ordered message list for one tutoring
/// turn. Pure function of its inputs; no I/O.
pub fn build_turn_prompt(
    flags: PromptFlags,
    history: &[Turn],
    user: &str,
    book: Option<&BookContext>,
    plan: Option<&QuestionPlan>,
    end_session: bool,
) -> BuiltPrompt {
    let system_prompt = build_system_prompt(flags, book, plan);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt.clone()));
    for turn in history {
        messages.push(ChatMessage {
            role: wire_role(turn),
            content: turn.content.clone(),
        });
    }
    messages.push(ChatMessage::user(user_turn_content(user, end_session)));

    BuiltPrompt {
        system_prompt,
        messages,
    }
}

/// Messages for the best-effort session summary call over the last `turns`
/// history entries.
pub fn build_summary_messages(history: &[Turn], turns: usize) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(
        "Summarize briefly as JSON with keys: strengths[], needs[], examples[]. \
         Under 80 words, English only.",
    )];

    let start = history.len().saturating_sub(turns);
    for turn in &history[start..] {
        messages.push(ChatMessage {
            role: wire_role(turn),
            content: turn.content.clone(),
        });
    }

    messages.push(ChatMessage::user(
        "Summarize the learner's speaking so far in the required JSON format.",
    ));
    messages
}

/// Messages for the standalone transcript summarizer endpoint.
pub fn build_transcript_messages(transcript: &str, max_words: usize, lang: &str) -> Vec<ChatMessage> {
    let system = if lang == "ko" {
        "You are an expert summarizer. Output clean Korean summary bullets and a concise action list. No preamble."
    } else {
        "You are an expert summarizer. Output clean English summary bullets and a concise action list. No preamble."
    };

    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!(
            "다음 대화 내용을 {max_words}단어 이내 핵심 요약과 할 일 목록으로 정리:\n\n{transcript}"
        )),
    ]
}

fn build_system_prompt(
    flags: PromptFlags,
    book: Option<&BookContext>,
    plan: Option<&QuestionPlan>,
) -> String {
    let mut prompt = PERSONA.to_string();

    if flags.render_book {
        if let Some(section) = book.and_then(render_book_section) {
            prompt.push_str("\n\n");
            prompt.push_str(&section);
        }
    }

    match plan.filter(|_| flags.render_question_plan) {
        Some(plan) => {
            prompt.push_str(&format!(
                "\n\nThis turn you must ask exactly this question, word for word \
                 (keep any page references): \"{}\"",
                plan.current
            ));
            if let Some(upcoming) = &plan.upcoming {
                prompt.push_str(&format!(
                    " The question after this one will be: \"{upcoming}\" Do not ask it yet."
                ));
            }
        }
        None => {
            prompt.push_str(
                "\n\nNo fixed question is scheduled this turn; ask one open-ended \
                 follow-up question that fits the conversation.",
            );
        }
    }

    if flags.strict_json {
        prompt.push_str(
            "\n\nReply with a single JSON object with exactly these keys: \
             \"bot_text\", \"next_question\", \"practice_tip\", \"advance\". \
             Do not write anything outside the JSON object.",
        );
    }

    prompt
}

fn render_book_section(book: &BookContext) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(title) = present(&book.title) {
        lines.push(format!("Book title: {title}"));
    }
    if let Some(summary) = present(&book.summary) {
        lines.push(format!("Summary: {summary}"));
    }
    if let Some(chapter) = present(&book.chapter) {
        lines.push(format!("Chapter: {chapter}"));
    }
    if let Some(characters) = present(&book.characters) {
        lines.push(format!("Characters: {characters}"));
    }
    if let Some(vocab) = present(&book.vocab) {
        lines.push(format!("Vocabulary: {vocab}"));
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "The learner is reading this book:\n{}",
        lines.join("\n")
    ))
}

fn present(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn wire_role(turn: &Turn) -> Role {
    if turn.role == "assistant" {
        Role::Assistant
    } else {
        Role::User
    }
}

fn user_turn_content(user: &str, end_session: bool) -> String {
    if !user.trim().is_empty() {
        return user.to_string();
    }
    if end_session {
        END_SESSION_TOKEN.to_string()
    } else {
        OPENING_QUESTION_TOKEN.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> BookContext {
        BookContext {
            title: Some("The Fox".to_string()),
            summary: Some("A fox learns to share.".to_string()),
            ..BookContext::default()
        }
    }

    #[test]
    fn renders_present_book_fields_and_free_form_directive() {
        let built = build_turn_prompt(
            PromptFlags::default(),
            &[],
            "I liked the fox.",
            Some(&book()),
            None,
            false,
        );

        assert!(built.system_prompt.contains("Book title: The Fox"));
        assert!(built
            .system_prompt
            .contains("Summary: A fox learns to share."));
        assert!(built.system_prompt.contains("ask one open-ended"));
        assert!(!built.system_prompt.contains("word for word"));
    }

    #[test]
    fn omits_absent_and_blank_book_fields() {
        let sparse = BookContext {
            title: Some("The Fox".to_string()),
            chapter: Some("   ".to_string()),
            ..BookContext::default()
        };
        let built = build_turn_prompt(
            PromptFlags::default(),
            &[],
            "hello",
            Some(&sparse),
            None,
            false,
        );

        assert!(built.system_prompt.contains("Book title: The Fox"));
        assert!(!built.system_prompt.contains("Summary:"));
        assert!(!built.system_prompt.contains("Chapter:"));
    }

    #[test]
    fn fixed_question_is_quoted_verbatim_with_upcoming_hint() {
        let plan = QuestionPlan {
            current: "What happens on page 12?".to_string(),
            upcoming: Some("Who helped the fox?".to_string()),
        };
        let built = build_turn_prompt(
            PromptFlags::default(),
            &[],
            "ready",
            None,
            Some(&plan),
            false,
        );

        assert!(built
            .system_prompt
            .contains("word for word (keep any page references): \"What happens on page 12?\""));
        assert!(built
            .system_prompt
            .contains("The question after this one will be: \"Who helped the fox?\""));
        assert!(!built.system_prompt.contains("ask one open-ended"));
    }

    #[test]
    fn history_roles_are_coerced_to_user_unless_assistant() {
        let history = vec![
            Turn::new("assistant", "Hi there!"),
            Turn::new("bot", "stray role"),
            Turn::new("system", "sneaky"),
        ];
        let built =
            build_turn_prompt(PromptFlags::default(), &history, "hi", None, None, false);

        assert_eq!(built.messages[0].role, Role::System);
        assert_eq!(built.messages[1].role, Role::Assistant);
        assert_eq!(built.messages[2].role, Role::User);
        assert_eq!(built.messages[3].role, Role::User);
        assert_eq!(built.messages[4].role, Role::User);
    }

    #[test]
    fn blank_user_turn_becomes_opening_token() {
        let built = build_turn_prompt(PromptFlags::default(), &[], "  ", None, None, false);
        let last = built.messages.last().expect("user turn");
        assert_eq!(last.content, OPENING_QUESTION_TOKEN);
    }

    #[test]
    fn blank_user_turn_becomes_end_token_when_session_ends() {
        let built = build_turn_prompt(PromptFlags::default(), &[], "", None, None, true);
        let last = built.messages.last().expect("user turn");
        assert_eq!(last.content, END_SESSION_TOKEN);
    }

    #[test]
    fn trailing_json_instruction_appears_exactly_once() {
        let built = build_turn_prompt(PromptFlags::default(), &[], "hi", None, None, false);
        assert_eq!(
            built.system_prompt.matches("single JSON object").count(),
            1
        );
        assert!(built
            .system_prompt
            .ends_with("Do not write anything outside the JSON object."));
    }

    #[test]
    fn strict_json_flag_controls_the_trailing_instruction() {
        let flags = PromptFlags {
            strict_json: false,
            ..PromptFlags::default()
        };
        let built = build_turn_prompt(flags, &[], "hi", None, None, false);
        assert!(!built.system_prompt.contains("single JSON object"));
    }

    #[test]
    fn summary_messages_keep_only_recent_turns() {
        let history: Vec<Turn> = (0..6)
            .map(|i| Turn::new("user", format!("turn {i}")))
            .collect();
        let messages = build_summary_messages(&history, 3);

        // system + 3 recent turns + closing user instruction
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[1].content, "turn 3");
        assert_eq!(messages[4].role, Role::User);
    }

    #[test]
    fn transcript_messages_switch_system_prompt_by_lang() {
        let korean = build_transcript_messages("hello", 100, "ko");
        assert!(korean[0].content.contains("Korean"));

        let english = build_transcript_messages("hello", 100, "en");
        assert!(english[0].content.contains("English summary bullets"));
        assert!(english[1].content.contains("100"));
    }
}
