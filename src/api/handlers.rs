use axum::extract::{Json, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use tracing::debug;

use crate::api::types::{ChatRequest, ExportQuery};
use crate::api::AppState;
use crate::conversation::{transcript_text, trim_history, MAX_CONTEXT_TURNS};
use crate::model::message::{Message, ROLE_AI, ROLE_USER};
use crate::pipeline::{Reply, RATE_LIMIT_NOTICE};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn post_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<serde_json::Value> {
    let reply = state
        .pipeline
        .respond(&req.text, req.model.as_deref())
        .await;

    match reply {
        Reply::Empty => Json(json!({ "ignored": true })),
        Reply::RateLimited => Json(json!({ "notice": RATE_LIMIT_NOTICE })),
        Reply::Answer {
            value,
            source,
            notice,
            notes,
        } => {
            let chat_id = match persist_turn(&state, &req, value.display_text()).await {
                Ok(chat_id) => chat_id,
                Err(e) => {
                    return Json(json!({
                        "error": e.to_string(),
                        "reply": value,
                        "source": source,
                    }))
                }
            };

            Json(json!({
                "chat_id": chat_id,
                "reply": value,
                "source": source,
                "notice": notice,
                "debug": notes,
            }))
        }
    }
}

async fn persist_turn(
    state: &AppState,
    req: &ChatRequest,
    reply_text: &str,
) -> anyhow::Result<String> {
    let chat_id = state.db.ensure_chat(&req.chat_id, &req.device_hash).await?;
    let now = chrono::Utc::now().timestamp_millis();
    let device_hash = if req.device_hash.is_empty() {
        None
    } else {
        Some(req.device_hash.clone())
    };

    state
        .db
        .save_message(&Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.clone(),
            device_hash: device_hash.clone(),
            role: ROLE_USER.into(),
            text: req.text.clone(),
            ts: now,
        })
        .await?;

    state
        .db
        .save_message(&Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.clone(),
            device_hash,
            role: ROLE_AI.into(),
            text: reply_text.to_string(),
            ts: now + 1,
        })
        .await?;

    state.db.touch_chat(&chat_id).await?;

    let history = state.db.list_messages_for_chat(&chat_id).await?;
    let context = trim_history(history, MAX_CONTEXT_TURNS);
    debug!(
        chat_id = chat_id.as_str(),
        context_turns = context.len(),
        "conversation context updated"
    );

    Ok(chat_id)
}

pub async fn get_messages(
    Path(chat_id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.db.list_messages_for_chat(&chat_id).await {
        Ok(mut msgs) => {
            msgs.sort_by_key(|m| m.ts);
            Json(json!({
                "chat_id": chat_id,
                "messages": msgs,
            }))
        }
        Err(e) => Json(json!({
            "chat_id": chat_id,
            "messages": [],
            "error": e.to_string()
        })),
    }
}

/// Download the full turn history, as plain text by default or as raw
/// JSON with `?format=json`. There is no import path.
pub async fn export_chat(
    Path(chat_id): Path<String>,
    Query(query): Query<ExportQuery>,
    State(state): State<AppState>,
) -> Response {
    let mut msgs = match state.db.list_messages_for_chat(&chat_id).await {
        Ok(msgs) => msgs,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    msgs.sort_by_key(|m| m.ts);

    match query.format.as_deref() {
        Some("json") => (
            [(
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"chat_export.json\"",
            )],
            Json(msgs),
        )
            .into_response(),
        _ => (
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"chat_export.txt\"",
                ),
            ],
            transcript_text(&msgs),
        )
            .into_response(),
    }
}

pub async fn get_prefs(
    Path(device_hash): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.db.list_prefs(&device_hash).await {
        Ok(prefs) => {
            let map: HashMap<String, String> = prefs.into_iter().collect();
            Json(json!({ "device_hash": device_hash, "prefs": map }))
        }
        Err(e) => Json(json!({
            "device_hash": device_hash,
            "prefs": {},
            "error": e.to_string()
        })),
    }
}

pub async fn put_prefs(
    Path(device_hash): Path<String>,
    State(state): State<AppState>,
    Json(values): Json<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    for (name, value) in &values {
        if let Err(e) = state.db.set_pref(&device_hash, name, value).await {
            return Json(json!({
                "device_hash": device_hash,
                "updated": false,
                "error": e.to_string()
            }));
        }
    }
    Json(json!({ "device_hash": device_hash, "updated": true }))
}
