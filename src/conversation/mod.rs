use anyhow::{Context, Result};
use minijinja::{context, Environment};
use std::sync::OnceLock;

use crate::model::message::{Message, ROLE_AI, ROLE_USER};

/// Outbound context strings never carry more than this many turns.
pub const MAX_CONTEXT_TURNS: usize = 20;

pub const ROLE_MARKERS: &[&str] = &["<|system|>", "<|user|>", "<|assistant|>"];

const PROMPT_TEMPLATE_NAME: &str = "inference_prompt";
const PROMPT_TEMPLATE: &str = "<|system|>You are a helpful, knowledgeable AI assistant. Provide clear, accurate, and engaging responses.\n\n<|user|>{{ prompt }}\n\n<|assistant|>";

static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn template_env() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.add_template(PROMPT_TEMPLATE_NAME, PROMPT_TEMPLATE)
            .expect("prompt template failed to compile");
        env
    })
}

/// Wrap the raw user text in the fixed role-tagged template the
/// inference endpoint expects.
pub fn build_prompt(user_text: &str) -> Result<String> {
    template_env()
        .get_template(PROMPT_TEMPLATE_NAME)
        .and_then(|tpl| tpl.render(context! { prompt => user_text }))
        .context("prompt template rendering failed")
}

pub fn strip_role_markers(text: &str) -> String {
    let mut out = text.to_string();
    for marker in ROLE_MARKERS {
        out = out.replace(marker, "");
    }
    out.trim().to_string()
}

pub fn trim_history(mut history: Vec<Message>, max_messages: usize) -> Vec<Message> {
    if history.len() <= max_messages {
        return history;
    }
    history.drain(0..history.len() - max_messages);
    history
}

/// Plain-text transcript for the export surface, one labelled line per
/// turn, in stored order.
pub fn transcript_text(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let label = match msg.role.as_str() {
            ROLE_USER => "You",
            ROLE_AI => "AI",
            _ => "System",
        };
        out.push_str(label);
        out.push_str(": ");
        out.push_str(&msg.text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, text: &str, ts: i64) -> Message {
        Message {
            id: format!("m{ts}"),
            chat_id: "c".into(),
            device_hash: None,
            role: role.into(),
            text: text.into(),
            ts,
        }
    }

    #[test]
    fn prompt_carries_all_role_tags_and_the_user_text() {
        let prompt = build_prompt("where is the hub?").unwrap();
        assert!(prompt.starts_with("<|system|>"));
        assert!(prompt.contains("<|user|>where is the hub?"));
        assert!(prompt.ends_with("<|assistant|>"));
    }

    #[test]
    fn strip_role_markers_removes_every_tag() {
        let raw = "<|assistant|>The Hub is near Gate 3.<|user|> <|system|>";
        assert_eq!(strip_role_markers(raw), "The Hub is near Gate 3.");
    }

    #[test]
    fn trim_history_keeps_most_recent_turns() {
        let history: Vec<_> = (0..30).map(|i| msg(ROLE_USER, &format!("t{i}"), i)).collect();
        let trimmed = trim_history(history, MAX_CONTEXT_TURNS);
        assert_eq!(trimmed.len(), MAX_CONTEXT_TURNS);
        assert_eq!(trimmed.first().unwrap().text, "t10");
        assert_eq!(trimmed.last().unwrap().text, "t29");
    }

    #[test]
    fn transcript_labels_roles() {
        let messages = vec![msg(ROLE_USER, "hi", 1), msg(ROLE_AI, "hello!", 2)];
        assert_eq!(transcript_text(&messages), "You: hi\nAI: hello!\n");
    }
}
