use serde::{Deserialize, Serialize};

pub const ROLE_USER: &str = "user";
pub const ROLE_AI: &str = "ai";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub device_hash: Option<String>,
    pub role: String,
    pub text: String,
    pub ts: i64,
}
