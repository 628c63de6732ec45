//! Text shaping shared by previews and subjects.

/// Maximum length of `last_message_preview`.
pub const PREVIEW_LIMIT: usize = 100;

/// Maximum length of a subject derived from message content.
pub const SUBJECT_LIMIT: usize = 50;

const ELLIPSIS: &str = "...";

/// Cut `text` to at most `limit` characters, ending in `...` when shortened.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Preview line for a conversation.
pub fn preview(text: &str) -> String {
    truncate(text, PREVIEW_LIMIT)
}

/// Subject for a new conversation: the caller's subject when given, else
/// the start of the first message.
pub fn derive_subject(subject: Option<&str>, content: &str) -> String {
    match subject.map(str::trim) {
        Some(subject) if !subject.is_empty() => subject.to_string(),
        _ => truncate(content, SUBJECT_LIMIT),
    }
}
