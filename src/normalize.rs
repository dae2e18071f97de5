use regex::Regex;
use serde_json::{Map, Value};

use crate::models::TutorReply;

/// Stand-in feedback sentence used whenever the model left the reply slot
/// empty or unusable. The UI treats it as a normal conversational beat.
pub const FALLBACK_BOT_TEXT: &str = "Let's continue.";

/// Turns a successful chat-completion response body into the reply contract.
/// Never fails: every malformed stage degrades to safe defaults.
pub fn normalize_reply(raw_body: &str) -> TutorReply {
    let content = extract_message_content(raw_body).unwrap_or_default();
    parse_reply_content(&content)
}

/// Best-effort session summary from a chat-completion response body.
/// Unparsable summary text degrades to `{ "note": <raw text> }`.
pub fn normalize_summary(raw_body: &str) -> Value {
    let content = extract_message_content(raw_body).unwrap_or_default();
    if content.is_empty() {
        return Value::Object(Map::new());
    }
    match embedded_json_object(&content) {
        Some(object) => Value::Object(object),
        None => serde_json::json!({ "note": content }),
    }
}

/// Pulls `choices[0].message.content` out of the provider envelope.
fn extract_message_content(raw_body: &str) -> Option<String> {
    let envelope: Value = serde_json::from_str(raw_body).ok()?;
    let content = envelope
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim()
        .to_string();
    Some(content)
}

/// The model's message content may be a JSON object, free text, or free text
/// with a JSON object embedded in it (code fences included).
pub fn parse_reply_content(content: &str) -> TutorReply {
    if content.is_empty() {
        tracing::warn!("empty model reply, substituting filler text");
        return filler_reply();
    }

    match embedded_json_object(content) {
        Some(object) => coerce_reply(object),
        None => free_text_reply(content),
    }
}

fn filler_reply() -> TutorReply {
    TutorReply {
        bot_text: FALLBACK_BOT_TEXT.to_string(),
        next_question: String::new(),
        practice_tip: None,
        advance: None,
        session_summary: None,
        extra: Map::new(),
    }
}

/// Finds a JSON object in the content: direct parse first, then the slice
/// from the first `{` to the last `}`.
fn embedded_json_object(content: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(object)) = serde_json::from_str(content.trim()) {
        return Some(object);
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&content[start..=end]) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Enforces the reply contract on a model-produced JSON object: `bot_text`
/// non-empty, `next_question` a string, `advance` a boolean when present.
/// Unknown keys ride along unchanged.
fn coerce_reply(mut object: Map<String, Value>) -> TutorReply {
    let bot_text = match object.remove("bot_text") {
        Some(Value::String(text)) if !text.trim().is_empty() => text,
        _ => FALLBACK_BOT_TEXT.to_string(),
    };
    let next_question = match object.remove("next_question") {
        Some(Value::String(question)) => question,
        _ => String::new(),
    };
    let practice_tip = match object.remove("practice_tip") {
        Some(Value::String(tip)) if !tip.trim().is_empty() => Some(tip),
        _ => None,
    };
    let advance = object
        .remove("advance")
        .map(|value| value.as_bool().unwrap_or(false));
    let session_summary = match object.remove("session_summary") {
        Some(Value::Object(summary)) => Some(Value::Object(summary)),
        _ => None,
    };

    let (bot_text, next_question) = split_bare_question(bot_text, next_question);

    TutorReply {
        bot_text,
        next_question,
        practice_tip,
        advance,
        session_summary,
        extra: object,
    }
}

/// A reply whose feedback slot holds nothing but a question gets the question
/// moved where it belongs; the UI relies on `bot_text` being reactive text.
fn split_bare_question(bot_text: String, next_question: String) -> (String, String) {
    if !next_question.trim().is_empty() {
        return (bot_text, next_question);
    }
    let trimmed = bot_text.trim();
    let sentences = split_sentences(trimmed);
    if sentences.len() == 1 && trimmed.ends_with('?') {
        return (FALLBACK_BOT_TEXT.to_string(), trimmed.to_string());
    }
    (bot_text, next_question)
}

/// Fallback for replies where the model ignored structured-output mode:
/// the last question sentence becomes `next_question`, a Tip:/Practice:
/// clause becomes `practice_tip`, the rest is feedback text.
fn free_text_reply(content: &str) -> TutorReply {
    let question = trailing_question(content);
    let bot_text = match &question {
        Some(question) => {
            let stripped = content.replacen(question.as_str(), "", 1).trim().to_string();
            if stripped.is_empty() {
                FALLBACK_BOT_TEXT.to_string()
            } else {
                stripped
            }
        }
        None => content.to_string(),
    };
    let practice_tip = extract_practice_tip(&bot_text);

    TutorReply {
        bot_text,
        next_question: question.unwrap_or_default(),
        practice_tip,
        advance: None,
        session_summary: None,
        extra: Map::new(),
    }
}

/// Splits text on sentence-ending punctuation followed by whitespace,
/// keeping the punctuation with each sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();

    while let Some((index, ch)) = iter.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let end = index + ch.len_utf8();
        let at_break = iter.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_break {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// The last sentence ending in `?`, scanning from the end of the text.
fn trailing_question(text: &str) -> Option<String> {
    split_sentences(text)
        .into_iter()
        .rev()
        .find(|sentence| sentence.ends_with('?'))
        .map(str::to_string)
}

fn extract_practice_tip(text: &str) -> Option<String> {
    let re = Regex::new(r"(?i)(?:Tip|Practice)\s*:\s*([^.!?]+)")
        .unwrap_or_else(|_| Regex::new("^$").unwrap());
    let caps = re.captures(text)?;
    let clause = caps.get(1)?.as_str().trim();
    if clause.is_empty() {
        return None;
    }
    Some(format!("Practice: {clause}."))
}
