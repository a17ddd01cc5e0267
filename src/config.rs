use crate::inference::models::DEFAULT_MODEL;

/// Runtime configuration, read once at startup. Every value has a
/// working default; only the inference token is genuinely optional —
/// without it remote generation is disabled and the pipeline answers
/// from local sources only.
pub struct AppConfig {
    pub bind_addr: String,
    pub chat_db_path: String,
    pub cache_db_path: String,
    pub inference_base_url: String,
    pub inference_api_token: Option<String>,
    pub default_model: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: dotenvy::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            chat_db_path: dotenvy::var("CHAT_DB_PATH").unwrap_or_else(|_| "chatdb".to_string()),
            cache_db_path: dotenvy::var("RESPONSE_CACHE_PATH")
                .unwrap_or_else(|_| "responsedb".to_string()),
            inference_base_url: dotenvy::var("INFERENCE_BASE_URL")
                .unwrap_or_else(|_| "https://api-inference.huggingface.co".to_string()),
            inference_api_token: dotenvy::var("INFERENCE_API_TOKEN").ok(),
            default_model: dotenvy::var("INFERENCE_DEFAULT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }
}
