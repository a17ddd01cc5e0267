use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod cache;
mod catalog;
mod config;
mod conversation;
mod db;
mod inference;
mod matcher;
mod model;
mod pipeline;

use api::AppState;
use cache::ResponseCache;
use catalog::ResponseCatalog;
use config::AppConfig;
use db::ChatStore;
use inference::remote::{OnlineProbe, RemoteResponder};
use matcher::context::ContextRules;
use pipeline::ResponsePipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("🚀 Starting campus FAQ server...");

    let cfg = AppConfig::from_env();

    // -----------------------------
    // Static response data
    // -----------------------------
    let catalog = Arc::new(ResponseCatalog::builtin()?);
    let rules = Arc::new(ContextRules::builtin()?);
    tracing::info!(entries = catalog.len(), "response catalog loaded");

    // -----------------------------
    // Persistence (best-effort for the response cache)
    // -----------------------------
    let db = Arc::new(ChatStore::new(&cfg.chat_db_path)?);

    let cache = match ResponseCache::open(&cfg.cache_db_path) {
        Ok(cache) => {
            if let Err(err) = cache.populate(&catalog) {
                warn!(error = %err, "response cache population failed, lookups will miss");
            }
            Some(Arc::new(cache))
        }
        Err(err) => {
            warn!(error = %err, "response cache unavailable, continuing without it");
            None
        }
    };

    // -----------------------------
    // Response pipeline
    // -----------------------------
    let online: OnlineProbe = Arc::new(|| true);

    let remote = cfg.inference_api_token.as_ref().map(|token| {
        Arc::new(RemoteResponder::new(
            cfg.inference_base_url.clone(),
            token.clone(),
            cfg.default_model.clone(),
            online.clone(),
        ))
    });
    if remote.is_none() {
        warn!("no inference token configured, remote generation disabled");
    }

    let pipeline = Arc::new(ResponsePipeline::new(
        catalog,
        rules,
        cache,
        remote,
        online,
    ));

    let state = AppState { db, pipeline };

    // -----------------------------
    // Router
    // -----------------------------
    let app = api::router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state);

    println!("🌐 HTTP listening on http://{}", cfg.bind_addr);

    let listener = TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
