use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

const CATALOG_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/catalog.json"));

/// A single media-carrying answer. `text` is always present so the entry
/// stays usable on surfaces that cannot render the referenced asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_alt: Option<String>,
}

/// Response payload for one topic key. The stored data uses the natural
/// JSON shapes (string / object / array); everything downstream switches
/// on this enum instead of probing shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Text(String),
    Media(MediaResponse),
    Variants(Vec<ResponseValue>),
}

impl ResponseValue {
    /// The deterministic selection for this value: a variant pool resolves
    /// to its first element, single values resolve to themselves.
    pub fn canonical(&self) -> &ResponseValue {
        match self {
            ResponseValue::Variants(pool) => pool.first().map_or(self, |v| v.canonical()),
            other => other,
        }
    }

    pub fn display_text(&self) -> &str {
        match self.canonical() {
            ResponseValue::Text(text) => text,
            ResponseValue::Media(media) => &media.text,
            // canonical() never returns a pool; empty pools are rejected at load.
            ResponseValue::Variants(_) => "",
        }
    }
}

#[derive(Deserialize)]
struct RawEntry {
    key: String,
    value: ResponseValue,
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub key: String,
    norm_key: String,
    pub value: ResponseValue,
}

impl CatalogEntry {
    pub fn norm_key(&self) -> &str {
        &self.norm_key
    }
}

/// Immutable topic-key → response table. Declared order is load-bearing:
/// the substring matching pass and the persisted cache both iterate
/// entries in the order the data file declares them.
pub struct ResponseCatalog {
    entries: Vec<CatalogEntry>,
}

impl ResponseCatalog {
    pub fn builtin() -> Result<Self> {
        Self::from_json(CATALOG_JSON).context("embedded catalog data is invalid")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let raw_entries: Vec<RawEntry> =
            serde_json::from_str(raw).context("catalog data did not parse")?;

        let mut entries: Vec<CatalogEntry> = Vec::with_capacity(raw_entries.len());
        for raw in raw_entries {
            let norm_key = raw.key.trim().to_lowercase();
            if norm_key.is_empty() {
                bail!("catalog entry with an empty key");
            }
            validate_value(&raw.key, &raw.value)?;

            // Duplicate keys mirror a JS object literal: the later value
            // wins, the earlier position is kept.
            if let Some(existing) = entries.iter_mut().find(|e| e.norm_key == norm_key) {
                warn!(
                    key = raw.key.as_str(),
                    "duplicate catalog key, keeping the later definition"
                );
                existing.value = raw.value;
                continue;
            }

            entries.push(CatalogEntry {
                key: raw.key,
                norm_key,
                value: raw.value,
            });
        }

        let catalog = Self { entries };
        catalog.warn_shadowed_keys();
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flag (without fixing) every key that can swallow a later,
    /// longer key during the substring pass.
    fn warn_shadowed_keys(&self) {
        for (i, early) in self.entries.iter().enumerate() {
            for late in &self.entries[i + 1..] {
                if late.norm_key.contains(&early.norm_key) {
                    warn!(
                        key = early.key.as_str(),
                        shadowed = late.key.as_str(),
                        "catalog key shadows a later, more specific key in substring matching"
                    );
                }
            }
        }
    }
}

fn validate_value(key: &str, value: &ResponseValue) -> Result<()> {
    if let ResponseValue::Variants(pool) = value {
        if pool.is_empty() {
            bail!("catalog entry '{key}' has an empty variant pool");
        }
        if pool.iter().any(|v| matches!(v, ResponseValue::Variants(_))) {
            bail!("catalog entry '{key}' nests a variant pool inside a variant pool");
        }
    }
    Ok(())
}
