use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::catalog::{ResponseCatalog, ResponseValue};
use crate::inference::remote::{OnlineProbe, RemoteResponder};
use crate::inference::template;
use crate::matcher::{self, catalog::match_catalog, catalog::MatchPass, context::ContextRules};

/// Minimum interval between accepted invocations.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1000);

pub const RATE_LIMIT_NOTICE: &str = "Please wait a moment before sending another message.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Context,
    Catalog,
    Cache,
    Remote,
    Fallback,
}

#[derive(Debug)]
pub enum Reply {
    Answer {
        value: ResponseValue,
        source: ReplySource,
        notice: Option<String>,
        notes: Vec<String>,
    },
    /// Arrived inside the minimum interval; dropped, not queued.
    RateLimited,
    /// Empty or whitespace-only input; silently ignored.
    Empty,
}

/// Strict-priority response chain: context rules → catalog (exact,
/// substring) → when online: persisted cache → remote generation →
/// template fallback. The fallback cannot fail, so every accepted
/// message ends in a displayable answer.
pub struct ResponsePipeline {
    catalog: Arc<ResponseCatalog>,
    rules: Arc<ContextRules>,
    cache: Option<Arc<ResponseCache>>,
    remote: Option<Arc<RemoteResponder>>,
    online: OnlineProbe,
    min_interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl ResponsePipeline {
    pub fn new(
        catalog: Arc<ResponseCatalog>,
        rules: Arc<ContextRules>,
        cache: Option<Arc<ResponseCache>>,
        remote: Option<Arc<RemoteResponder>>,
        online: OnlineProbe,
    ) -> Self {
        Self {
            catalog,
            rules,
            cache,
            remote,
            online,
            min_interval: MIN_INTERVAL,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub async fn respond(&self, message: &str, requested_model: Option<&str>) -> Reply {
        let normalized = matcher::normalize(message);
        if normalized.is_empty() {
            return Reply::Empty;
        }

        if !self.accept_now() {
            debug!("invocation inside the minimum interval, dropping message");
            return Reply::RateLimited;
        }

        let mut notes = Vec::new();

        if let Some(hit) = self.rules.match_message(&normalized) {
            notes.push(format!("context rule fired → {}/{}", hit.group, hit.question));
            return Reply::Answer {
                value: ResponseValue::Text(hit.response.to_string()),
                source: ReplySource::Context,
                notice: None,
                notes,
            };
        }

        if let Some(hit) = match_catalog(&self.catalog, &normalized) {
            let pass = match hit.pass {
                MatchPass::Exact => "exact",
                MatchPass::Substring => "substring",
            };
            notes.push(format!("catalog {pass} hit → {}", hit.key));
            return Reply::Answer {
                value: hit.value.canonical().clone(),
                source: ReplySource::Catalog,
                notice: None,
                notes,
            };
        }
        notes.push("no catalog match".into());

        if (self.online)() {
            // Cache before remote: it is cheaper, and it still answers
            // when the endpoint is flaky.
            if let Some(cache) = &self.cache {
                if let Some(value) = cache.lookup(&normalized) {
                    notes.push("persisted cache hit".into());
                    return Reply::Answer {
                        value: value.canonical().clone(),
                        source: ReplySource::Cache,
                        notice: None,
                        notes,
                    };
                }
            }

            if let Some(remote) = &self.remote {
                match remote.generate(message, requested_model).await {
                    Ok(reply) => {
                        notes.push("remote generation succeeded".into());
                        return Reply::Answer {
                            value: ResponseValue::Text(reply.text),
                            source: ReplySource::Remote,
                            notice: reply.notice,
                            notes,
                        };
                    }
                    Err(err) => {
                        warn!(error = %err, "remote generation exhausted, using local fallback");
                        notes.push(format!("remote failed: {err}"));
                    }
                }
            }
        } else {
            notes.push("offline, skipping remote generation".into());
        }

        notes.push("template fallback".into());
        Reply::Answer {
            value: ResponseValue::Text(template::generate(message)),
            source: ReplySource::Fallback,
            notice: None,
            notes,
        }
    }

    fn accept_now(&self) -> bool {
        let mut last = self.last_accepted.lock().unwrap();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::remote::DelayFn;
    use std::sync::Mutex as StdMutex;

    fn online() -> OnlineProbe {
        Arc::new(|| true)
    }

    fn offline() -> OnlineProbe {
        Arc::new(|| false)
    }

    fn pipeline(online_probe: OnlineProbe, remote: Option<Arc<RemoteResponder>>) -> ResponsePipeline {
        ResponsePipeline::new(
            Arc::new(ResponseCatalog::builtin().unwrap()),
            Arc::new(ContextRules::builtin().unwrap()),
            None,
            remote,
            online_probe,
        )
    }

    fn answer(reply: Reply) -> (ResponseValue, ReplySource) {
        match reply {
            Reply::Answer { value, source, .. } => (value, source),
            other => panic!("expected an answer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exact_key_returns_first_variant_verbatim() {
        let p = pipeline(offline(), None);
        let (value, source) = answer(p.respond("hub", None).await);
        assert_eq!(source, ReplySource::Catalog);
        match value {
            ResponseValue::Text(text) => assert!(
                text.starts_with("The Hub is a newly built USANT building"),
                "got: {text}"
            ),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn context_rule_beats_catalog_substring() {
        let p = pipeline(offline(), None);
        let (value, source) = answer(p.respond("what is the hub for", None).await);
        assert_eq!(source, ReplySource::Context);
        assert_eq!(
            value,
            ResponseValue::Text(
                "The Hub is a newly built facility located near Gate 3, designed to create a \
                 central gathering and collaborative space for USANT students and staff. It \
                 represents the university's commitment to providing modern infrastructure to \
                 support student life and academic interactions."
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn second_call_inside_interval_is_rate_limited() {
        let p = pipeline(offline(), None);
        assert!(matches!(p.respond("hub", None).await, Reply::Answer { .. }));
        assert!(matches!(p.respond("forum", None).await, Reply::RateLimited));
    }

    #[tokio::test]
    async fn zero_interval_disables_the_limiter() {
        let p = pipeline(offline(), None).with_min_interval(Duration::ZERO);
        assert!(matches!(p.respond("hub", None).await, Reply::Answer { .. }));
        assert!(matches!(p.respond("forum", None).await, Reply::Answer { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_ignored_and_does_not_consume_the_slot() {
        let p = pipeline(offline(), None);
        assert!(matches!(p.respond("   \n", None).await, Reply::Empty));
        assert!(matches!(p.respond("hub", None).await, Reply::Answer { .. }));
    }

    #[tokio::test]
    async fn offline_unmatched_message_falls_back_to_template() {
        let p = pipeline(offline(), None);
        let (value, source) = answer(p.respond("explain quantum entanglement basics", None).await);
        assert_eq!(source, ReplySource::Fallback);
        match value {
            ResponseValue::Text(text) => assert!(!text.is_empty()),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_remote_still_resolves_to_a_fallback_answer() {
        let recorded: Arc<StdMutex<Vec<Duration>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = recorded.clone();
        let delay: DelayFn = Arc::new(move |d| {
            sink.lock().unwrap().push(d);
            Box::pin(async {})
        });
        let remote = Arc::new(
            RemoteResponder::new("http://127.0.0.1:1", "test-token", "mistralai/Mistral-7B-Instruct-v0.2", online())
                .with_delay(delay),
        );

        let p = pipeline(online(), Some(remote));
        let (value, source) = answer(p.respond("explain quantum entanglement basics", None).await);
        assert_eq!(source, ReplySource::Fallback);
        assert!(matches!(value, ResponseValue::Text(t) if !t.is_empty()));
        // All three backoffs ran before the fallback.
        assert_eq!(recorded.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cache_answers_before_the_remote_is_consulted() {
        let path = std::env::temp_dir().join(format!("maroonbot-pipe-{}", uuid::Uuid::new_v4()));
        let cache = ResponseCache::open(path.to_str().unwrap()).unwrap();
        cache.populate(&ResponseCatalog::builtin().unwrap()).unwrap();

        // Empty in-memory catalog: only the persisted copy can answer.
        let p = ResponsePipeline::new(
            Arc::new(ResponseCatalog::from_json("[]").unwrap()),
            Arc::new(ContextRules::from_json("[]").unwrap()),
            Some(Arc::new(cache)),
            None,
            online(),
        );

        let (value, source) = answer(p.respond("hub", None).await);
        assert_eq!(source, ReplySource::Cache);
        assert!(matches!(value, ResponseValue::Text(t) if t.contains("Hub")));

        drop(p);
        let _ = std::fs::remove_dir_all(path);
    }
}
