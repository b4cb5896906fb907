use mangrove_core::state::{ChatMessage, ConversationSnapshot, MessageRole};

pub const THINKING: &str = "Mangrove is thinking...";
pub const CLEARED: &str = "[conversation cleared]";

pub fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "System",
        MessageRole::User => "You",
        MessageRole::Assistant => "Mangrove",
    }
}

pub fn format_message(message: &ChatMessage) -> String {
    format!("{}: {}", role_label(message.role()), message.content())
}

/// Lines to print when the view moves from `shown` to `next`.
///
/// Updates can arrive merged, so a clear followed by a new turn may look like
/// a same-length history. Any turn in `shown` that `next` no longer carries
/// under the same id counts as a reset.
pub fn render_update(shown: &ConversationSnapshot, next: &ConversationSnapshot) -> Vec<String> {
    let kept = shown.messages.len() <= next.messages.len()
        && shown
            .messages
            .iter()
            .zip(&next.messages)
            .all(|(old, new)| old.id() == new.id());
    if !kept {
        let mut lines = vec![CLEARED.to_string()];
        lines.extend(render_update(&ConversationSnapshot::default(), next));
        return lines;
    }
    let mut lines: Vec<String> = next.messages[shown.messages.len()..]
        .iter()
        .map(format_message)
        .collect();
    if next.is_loading && !shown.is_loading {
        lines.push(THINKING.to_string());
    }
    if let Some(error) = &next.error {
        if shown.error.as_ref() != Some(error) {
            lines.push(format!("error: {error}"));
        }
    }
    lines
}
