use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{db::ChatStore, pipeline::ResponsePipeline};

pub mod handlers;
pub mod types;

use handlers::{export_chat, get_messages, get_prefs, health, post_chat, put_prefs};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<ChatStore>,
    pub pipeline: Arc<ResponsePipeline>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(post_chat))
        .route("/chats/{chat_id}/messages", get(get_messages))
        .route("/chats/{chat_id}/export", get(export_chat))
        .route("/prefs/{device_hash}", get(get_prefs))
        .route("/prefs/{device_hash}", post(put_prefs))
}
