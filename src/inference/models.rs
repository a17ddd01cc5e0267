use serde_json::Value;

/// Model identifiers the inference endpoint accepts. Anything else is
/// redirected to [`DEFAULT_MODEL`].
pub const AVAILABLE_MODELS: &[&str] = &[
    "mistralai/Mistral-7B-Instruct-v0.2",
    "meta-llama/Llama-2-70b-chat-hf",
    "meta-llama/Llama-2-13b-chat-hf",
    "mistralai/Mixtral-8x7B-Instruct-v0.1",
    "google/gemma-7b-it",
];

pub const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";

pub fn is_available(model: &str) -> bool {
    AVAILABLE_MODELS.contains(&model)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Mistral,
    Llama,
    Other,
}

pub fn family_of(model: &str) -> ModelFamily {
    if model.contains("mistral") {
        ModelFamily::Mistral
    } else if model.contains("llama") {
        ModelFamily::Llama
    } else {
        ModelFamily::Other
    }
}

/// Pull the generated text out of an endpoint payload. The payload may
/// be a JSON array or a bare object, and the field name depends on the
/// model family that served the request.
pub fn extract_generated_text(model: &str, payload: &Value) -> Option<String> {
    let record = match payload {
        Value::Array(items) => items.first()?,
        other => other,
    };

    let field = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    match family_of(model) {
        ModelFamily::Llama => field("generation").or_else(|| field("generated_text")),
        ModelFamily::Mistral | ModelFamily::Other => field("generated_text"),
    }
}
