use minijinja::{context, Environment};
use once_cell::sync::Lazy;
use rand::{thread_rng, Rng};
use std::collections::HashSet;

/// Last-resort responder: pure, synchronous, and total. Extracts up to
/// three keywords from the prompt, picks a sentence template for the
/// detected vocabulary category, and fills in the blanks.
const MAX_KEYWORDS: usize = 3;
const MIN_TOKEN_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "with", "a", "an", "is", "are",
];

const CODING_VOCAB: &[&str] = &["code", "programming", "function", "error"];
const TECHNICAL_VOCAB: &[&str] = &["technical", "system", "database", "network"];

const DEFAULT_TEMPLATES: &[&str] = &[
    "Based on your question about {{ topic }}, I can help with {{ context }}. What specific aspects would you like to explore?",
    "I understand you're interested in {{ topic }}. Let's discuss {{ context }} in more detail.",
    "Your question about {{ topic }} is interesting. I can provide information about {{ context }}.",
    "I'd be happy to explain about {{ topic }}, particularly regarding {{ context }}.",
];

const CODING_TEMPLATES: &[&str] = &[
    "I see you're working with {{ topic }}. Let me help you understand the {{ context }}.",
    "For your {{ topic }} question, I can explain how {{ context }} works.",
];

const TECHNICAL_TEMPLATES: &[&str] = &[
    "Regarding your {{ topic }} inquiry, I can explain the {{ context }} aspects.",
    "Let's explore how {{ topic }} relates to {{ context }}.",
];

static STOP_WORD_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STOP_WORDS.iter().copied().collect());

static TEMPLATE_ENV: Lazy<Environment<'static>> = Lazy::new(Environment::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateCategory {
    Coding,
    Technical,
    Default,
}

impl TemplateCategory {
    fn templates(self) -> &'static [&'static str] {
        match self {
            TemplateCategory::Coding => CODING_TEMPLATES,
            TemplateCategory::Technical => TECHNICAL_TEMPLATES,
            TemplateCategory::Default => DEFAULT_TEMPLATES,
        }
    }
}

pub fn generate(prompt: &str) -> String {
    let keywords = extract_keywords(prompt);
    let category = classify(&keywords);

    let pool = category.templates();
    let template = pool[thread_rng().gen_range(0..pool.len())];

    let topic = keywords.first().map_or("your question", String::as_str);
    let context_phrase = derive_context(&keywords);

    TEMPLATE_ENV
        .render_str(
            template,
            context! { topic => topic, context => context_phrase },
        )
        .unwrap_or_else(|_| format!("I'd be happy to explain about {topic}."))
}

/// Coding vocabulary is checked before technical vocabulary.
pub fn classify(keywords: &[String]) -> TemplateCategory {
    let has_any = |vocab: &[&str]| keywords.iter().any(|k| vocab.contains(&k.as_str()));
    if has_any(CODING_VOCAB) {
        TemplateCategory::Coding
    } else if has_any(TECHNICAL_VOCAB) {
        TemplateCategory::Technical
    } else {
        TemplateCategory::Default
    }
}

fn extract_keywords(prompt: &str) -> Vec<String> {
    prompt
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() >= MIN_TOKEN_LEN && !STOP_WORD_SET.contains(word))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

fn derive_context(keywords: &[String]) -> String {
    match keywords {
        [] => "this topic".to_string(),
        [only] => format!("{only}-related concepts"),
        [first, second, ..] => format!("how {first} relates to {second}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_for_any_input() {
        for prompt in ["", "   ", "???", "a", "the and or", "explain quantum entanglement"] {
            let out = generate(prompt);
            assert!(!out.is_empty(), "empty output for prompt {prompt:?}");
        }
    }

    #[test]
    fn keywords_drop_stop_words_and_short_tokens() {
        let keywords = extract_keywords("the code is on an odd error path");
        assert_eq!(keywords, ["code", "odd", "error"]);
    }

    #[test]
    fn coding_vocabulary_wins_over_technical() {
        let keywords = extract_keywords("database code question");
        assert_eq!(classify(&keywords), TemplateCategory::Coding);
    }

    #[test]
    fn technical_vocabulary_without_coding_terms() {
        let keywords = extract_keywords("our network keeps dropping");
        assert_eq!(classify(&keywords), TemplateCategory::Technical);
    }

    #[test]
    fn context_phrase_by_keyword_count() {
        assert_eq!(derive_context(&[]), "this topic");
        assert_eq!(derive_context(&["rust".into()]), "rust-related concepts");
        assert_eq!(
            derive_context(&["rust".into(), "tokio".into()]),
            "how rust relates to tokio"
        );
    }

    #[test]
    fn output_substitutes_the_first_keyword() {
        let out = generate("code error in my project");
        assert!(out.contains("code"), "output was: {out}");
    }

    #[test]
    fn empty_prompt_uses_the_fixed_topic_phrase() {
        let out = generate("");
        assert!(out.contains("your question") || out.contains("this topic"), "output was: {out}");
    }
}
