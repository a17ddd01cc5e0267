use anyhow::Result;
use rocksdb::{Direction, IteratorMode, Options, DB};
use uuid::Uuid;

use crate::model::{chat::Chat, message::Message};

/// Chat history and per-device preferences on one rocksdb handle.
/// String keys with reserved prefixes, prefix scans for listings.
pub struct ChatStore {
    db: DB,
}

impl ChatStore {
    pub fn new(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    // ============================================================
    // MESSAGE STORAGE (CHAT-ORDERED)
    // ============================================================
    fn msg_key(chat_id: &str, ts: i64, id: &str) -> String {
        // 020 → zero-padded timestamp for correct sorting
        format!("chat:{}:msg:{:020}:{id}", chat_id, ts)
    }

    fn pref_key(device_hash: &str, name: &str) -> String {
        format!("pref:{device_hash}:{name}")
    }

    pub async fn save_message(&self, msg: &Message) -> Result<()> {
        let key = Self::msg_key(&msg.chat_id, msg.ts, &msg.id);
        let val = serde_json::to_vec(msg)?;
        self.db.put(key, val)?;
        Ok(())
    }

    pub async fn list_messages_for_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        let prefix = format!("chat:{}:msg:", chat_id);
        let mut results = Vec::new();

        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, val) = item?;
            let k = std::str::from_utf8(&key)?;

            if !k.starts_with(&prefix) {
                break;
            }

            let msg: Message = serde_json::from_slice(&val)?;
            results.push(msg);
        }

        Ok(results)
    }

    // ============================================================
    // CHAT STORAGE
    // ============================================================
    pub async fn save_chat(&self, chat: &Chat) -> Result<()> {
        let key = format!("chat:meta:{}", chat.id);
        let val = serde_json::to_vec(chat)?;
        self.db.put(key, val)?;
        Ok(())
    }

    pub async fn load_chat(&self, id: &str) -> Result<Option<Chat>> {
        let key = format!("chat:meta:{id}");
        Ok(self
            .db
            .get(key)?
            .map(|v| serde_json::from_slice(&v))
            .transpose()?)
    }

    /// Ensure a chat exists for the given id/device; create one if missing.
    pub async fn ensure_chat(&self, chat_id: &str, device_hash: &str) -> Result<String> {
        if !chat_id.is_empty() && self.load_chat(chat_id).await?.is_some() {
            return Ok(chat_id.to_string());
        }

        let new_id = if chat_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            chat_id.to_string()
        };

        let chat = Chat {
            id: new_id.clone(),
            title: None,
            device_hash: if device_hash.is_empty() {
                None
            } else {
                Some(device_hash.to_string())
            },
            updated_ts: chrono::Utc::now().timestamp(),
        };
        self.save_chat(&chat).await?;
        Ok(new_id)
    }

    pub async fn touch_chat(&self, chat_id: &str) -> Result<()> {
        if let Some(mut chat) = self.load_chat(chat_id).await? {
            chat.updated_ts = chrono::Utc::now().timestamp();
            self.save_chat(&chat).await?;
        }
        Ok(())
    }

    // ============================================================
    // DEVICE PREFERENCES
    // ============================================================
    pub async fn set_pref(&self, device_hash: &str, name: &str, value: &str) -> Result<()> {
        self.db
            .put(Self::pref_key(device_hash, name), value.as_bytes())?;
        Ok(())
    }

    pub async fn get_pref(&self, device_hash: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .get(Self::pref_key(device_hash, name))?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    pub async fn list_prefs(&self, device_hash: &str) -> Result<Vec<(String, String)>> {
        let prefix = format!("pref:{device_hash}:");
        let mut out = Vec::new();

        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, val) = item?;
            let k = std::str::from_utf8(&key)?;
            if !k.starts_with(&prefix) {
                break;
            }
            out.push((
                k[prefix.len()..].to_string(),
                String::from_utf8_lossy(&val).into_owned(),
            ));
        }

        Ok(out)
    }
}
