use anyhow::Result;
use rocksdb::{Direction, IteratorMode, Options, DB};
use tracing::warn;

use crate::catalog::{ResponseCatalog, ResponseValue};

const RESPONSE_PREFIX: &str = "response:";

/// Persisted mirror of the response catalog. Populated once at startup,
/// read-only afterwards. Every failure here is a cache miss, never an
/// error: the in-memory catalog and the template fallback keep the
/// pipeline fully functional without it.
pub struct ResponseCache {
    db: DB,
}

impl ResponseCache {
    pub fn open(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    // Ordinal prefix keeps rocksdb's lexicographic scan in the
    // catalog's declared order, which the substring lookup relies on.
    fn entry_key(position: usize, norm_key: &str) -> String {
        format!("{RESPONSE_PREFIX}{position:04}:{norm_key}")
    }

    /// Idempotent bulk upsert of the whole catalog.
    pub fn populate(&self, catalog: &ResponseCatalog) -> Result<()> {
        for (position, entry) in catalog.entries().iter().enumerate() {
            let key = Self::entry_key(position, entry.norm_key());
            let val = serde_json::to_vec(&entry.value)?;
            self.db.put(key, val)?;
        }
        Ok(())
    }

    /// Same exact-then-substring semantics as the in-memory matcher,
    /// evaluated against the persisted copy so a lookup still works
    /// before the catalog is available. Declared order breaks ties.
    pub fn lookup(&self, normalized: &str) -> Option<ResponseValue> {
        self.scan(|topic| topic == normalized)
            .or_else(|| self.scan(|topic| normalized.contains(topic)))
    }

    fn scan(&self, hit: impl Fn(&str) -> bool) -> Option<ResponseValue> {
        let iter = self
            .db
            .iterator(IteratorMode::From(RESPONSE_PREFIX.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, val) = match item {
                Ok(kv) => kv,
                Err(err) => {
                    warn!(error = %err, "response cache scan failed, treating as miss");
                    return None;
                }
            };

            let Ok(key) = std::str::from_utf8(&key) else {
                continue;
            };
            if !key.starts_with(RESPONSE_PREFIX) {
                break;
            }
            let Some((_, topic)) = key[RESPONSE_PREFIX.len()..].split_once(':') else {
                continue;
            };

            if hit(topic) {
                match serde_json::from_slice(&val) {
                    Ok(value) => return Some(value),
                    Err(err) => {
                        warn!(topic, error = %err, "cached response did not parse, skipping");
                    }
                }
            }
        }

        None
    }
}
