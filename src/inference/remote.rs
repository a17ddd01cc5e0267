use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::conversation::{build_prompt, strip_role_markers};
use crate::inference::models;

/// Connectivity check consulted between retries; injected so the host
/// environment decides what "online" means.
pub type OnlineProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Suspending delay used between retries; injected so tests never wait.
pub type DelayFn =
    Arc<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(1000);
const MAX_BACKOFF: Duration = Duration::from_millis(8000);

/// Boilerplate the upstream model emits when it punts; any of these in
/// the generated text means the attempt failed quality filtering.
const GENERIC_PHRASES: &[&str] = &[
    "I want to give you the best possible answer",
    "I'm having trouble processing",
    "Could you elaborate",
    "I apologize, but I'm having trouble",
    "I encountered an issue",
];

#[derive(Debug, Clone, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub do_sample: bool,
    pub top_k: u32,
    pub return_full_text: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
            repetition_penalty: 1.2,
            do_sample: true,
            top_k: 50,
            return_full_text: false,
        }
    }
}

#[derive(Debug)]
pub struct RemoteReply {
    pub text: String,
    /// Set when the requested model was substituted; surfaced to the
    /// user once per process.
    pub notice: Option<String>,
}

/// Client for the hosted text-generation endpoint. Failures here are
/// always recoverable: the pipeline falls through to the template
/// responder when retries are exhausted.
pub struct RemoteResponder {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    params: GenerationParams,
    default_model: String,
    online: OnlineProbe,
    delay: DelayFn,
    substitution_notified: AtomicBool,
}

impl RemoteResponder {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        default_model: impl Into<String>,
        online: OnlineProbe,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
            params: GenerationParams::default(),
            default_model: default_model.into(),
            online,
            delay: Arc::new(|d| Box::pin(tokio::time::sleep(d))),
            substitution_notified: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: DelayFn) -> Self {
        self.delay = delay;
        self
    }

    /// Delay before retry `attempt` (0-based): doubles per attempt,
    /// capped at [`MAX_BACKOFF`].
    pub fn backoff_delay(attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        BASE_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
    }

    pub async fn generate(
        &self,
        user_text: &str,
        requested_model: Option<&str>,
    ) -> Result<RemoteReply> {
        let (model, notice) = self.resolve_model(requested_model);
        let prompt = build_prompt(user_text)?;

        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                // Retrying is pointless without connectivity; stop
                // immediately and let the local fallback take over.
                if !(self.online)() {
                    bail!("connection lost while retrying remote generation");
                }
                (self.delay)(Self::backoff_delay(attempt - 1)).await;
            }

            match self.request_once(&model, &prompt).await {
                Ok(text) => return Ok(RemoteReply { text, notice }),
                Err(err) => {
                    warn!(attempt, model = model.as_str(), error = %err, "remote generation attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("remote generation failed")))
    }

    fn resolve_model(&self, requested: Option<&str>) -> (String, Option<String>) {
        let requested = requested.map(str::trim).filter(|m| !m.is_empty());
        match requested {
            Some(model) if models::is_available(model) => (model.to_string(), None),
            Some(model) => {
                warn!(
                    requested = model,
                    fallback = self.default_model.as_str(),
                    "requested model is not in the allow-list"
                );
                let notice = if self.substitution_notified.swap(true, Ordering::SeqCst) {
                    None
                } else {
                    Some(format!(
                        "Selected model is currently unavailable. Falling back to {}.",
                        self.default_model
                    ))
                };
                (self.default_model.clone(), notice)
            }
            None => (self.default_model.clone(), None),
        }
    }

    async fn request_once(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{model}", self.base_url.trim_end_matches('/'));
        let body = json!({
            "inputs": prompt,
            "parameters": self.params,
        });

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_token),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("inference request failed: {}", response.status());
        }

        let payload: serde_json::Value = response.json().await?;
        let text = models::extract_generated_text(model, &payload)
            .ok_or_else(|| anyhow!("generation payload missing text field"))?;
        vet_generated(&text)
    }
}

/// Reject empty and boilerplate generations, strip role markers from
/// the rest.
fn vet_generated(text: &str) -> Result<String> {
    if text.trim().is_empty() {
        bail!("empty generation payload");
    }
    if let Some(phrase) = GENERIC_PHRASES.iter().find(|p| text.contains(*p)) {
        bail!("low quality generation: matched boilerplate \"{phrase}\"");
    }
    Ok(strip_role_markers(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::models::DEFAULT_MODEL;
    use std::sync::Mutex;

    fn always_online() -> OnlineProbe {
        Arc::new(|| true)
    }

    fn responder() -> RemoteResponder {
        RemoteResponder::new(
            "https://inference.invalid",
            "test-token",
            DEFAULT_MODEL,
            always_online(),
        )
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(RemoteResponder::backoff_delay(0), Duration::from_secs(1));
        assert_eq!(RemoteResponder::backoff_delay(1), Duration::from_secs(2));
        assert_eq!(RemoteResponder::backoff_delay(2), Duration::from_secs(4));
        assert_eq!(RemoteResponder::backoff_delay(3), Duration::from_secs(8));
        assert_eq!(RemoteResponder::backoff_delay(10), Duration::from_secs(8));
    }

    #[test]
    fn allow_listed_model_passes_through() {
        let (model, notice) = responder().resolve_model(Some("google/gemma-7b-it"));
        assert_eq!(model, "google/gemma-7b-it");
        assert!(notice.is_none());
    }

    #[test]
    fn unknown_model_substitutes_default_with_one_notice() {
        let r = responder();

        let (model, notice) = r.resolve_model(Some("someone/private-model"));
        assert_eq!(model, DEFAULT_MODEL);
        assert!(notice.unwrap().contains(DEFAULT_MODEL));

        // Second substitution is silent.
        let (model, notice) = r.resolve_model(Some("someone/other-model"));
        assert_eq!(model, DEFAULT_MODEL);
        assert!(notice.is_none());
    }

    #[test]
    fn vet_rejects_empty_and_boilerplate() {
        assert!(vet_generated("   ").is_err());
        assert!(vet_generated("Could you elaborate on that?").is_err());
        assert_eq!(
            vet_generated("<|assistant|>The forum is outside.").unwrap(),
            "The forum is outside."
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_exhausts_retries_with_injected_delays() {
        let recorded: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = recorded.clone();
        let r = RemoteResponder::new(
            "http://127.0.0.1:1",
            "test-token",
            DEFAULT_MODEL,
            always_online(),
        )
        .with_delay(Arc::new(move |d| {
            sink.lock().unwrap().push(d);
            Box::pin(async {})
        }));

        let err = r.generate("anything", None).await;
        assert!(err.is_err());

        let delays = recorded.lock().unwrap().clone();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn connectivity_loss_stops_retrying() {
        let recorded: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = recorded.clone();
        let offline: OnlineProbe = Arc::new(|| false);
        let r = RemoteResponder::new("http://127.0.0.1:1", "test-token", DEFAULT_MODEL, offline)
            .with_delay(Arc::new(move |d| {
                sink.lock().unwrap().push(d);
                Box::pin(async {})
            }));

        let err = r.generate("anything", None).await;
        assert!(err.is_err());
        // First attempt ran, no backoff was ever scheduled.
        assert!(recorded.lock().unwrap().is_empty());
    }
}
