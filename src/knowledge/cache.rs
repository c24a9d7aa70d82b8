//! TTL'd disk cache for researcher LLM calls and search results.
//!
//! Keys are a stable SHA-256 over the sorted parameter map, so any call
//! whose output depends on which URLs were seen must include that URL list
//! in its parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Serialize, Deserialize)]
struct Envelope {
    stored_at: DateTime<Utc>,
    ttl_secs: u64,
    value: Value,
}

/// File-per-entry cache under one directory.
#[derive(Clone, Debug)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        DiskCache { dir: dir.into(), ttl }
    }

    /// Stable key: prefix + sha256 of the canonical (sorted-key) JSON of
    /// the parameters.
    fn key(prefix: &str, params: &Value) -> String {
        let canonical = canonical_json(params);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("{prefix}_{hex}")
    }

    fn path_for(&self, prefix: &str, params: &Value) -> PathBuf {
        self.dir.join(format!("{}.json", Self::key(prefix, params)))
    }

    pub async fn get(&self, prefix: &str, params: &Value) -> Option<Value> {
        let path = self.path_for(prefix, params);
        let raw = tokio::fs::read(&path).await.ok()?;
        let envelope: Envelope = serde_json::from_slice(&raw).ok()?;
        let age = Utc::now().signed_duration_since(envelope.stored_at);
        if age.num_seconds() < 0 || age.num_seconds() as u64 >= envelope.ttl_secs {
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        tracing::debug!(prefix, path = %path.display(), "cache hit");
        Some(envelope.value)
    }

    pub async fn set(&self, prefix: &str, params: &Value, value: Value) {
        let envelope = Envelope {
            stored_at: Utc::now(),
            ttl_secs: self.ttl.as_secs(),
            value,
        };
        if tokio::fs::create_dir_all(&self.dir).await.is_err() {
            return;
        }
        let path = self.path_for(prefix, params);
        match serde_json::to_vec(&envelope) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(&path, bytes).await {
                    tracing::warn!(%err, "cache write failed");
                }
            }
            Err(err) => tracing::warn!(%err, "cache serialization failed"),
        }
    }

    /// Remove every entry, returning the count removed.
    pub async fn clear(&self) -> usize {
        let mut removed = 0usize;
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().is_some_and(|e| e == "json")
                && tokio::fs::remove_file(entry.path()).await.is_ok()
            {
                removed += 1;
            }
        }
        removed
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// JSON with object keys emitted in sorted order at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_stable_under_key_order() {
        let a = json!({"q": "rust", "urls": ["u1", "u2"]});
        let b = json!({"urls": ["u1", "u2"], "q": "rust"});
        assert_eq!(DiskCache::key("search", &a), DiskCache::key("search", &b));
    }

    #[test]
    fn url_list_changes_the_key() {
        let a = json!({"q": "rust", "urls": ["u1"]});
        let b = json!({"q": "rust", "urls": ["u1", "u2"]});
        assert_ne!(DiskCache::key("search", &a), DiskCache::key("search", &b));
    }

    #[tokio::test]
    async fn round_trip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(3600));
        let params = json!({"q": "tokio"});
        assert!(cache.get("t", &params).await.is_none());
        cache.set("t", &params, json!({"hits": 3})).await;
        assert_eq!(cache.get("t", &params).await.unwrap()["hits"], 3);

        let expired = DiskCache::new(dir.path(), Duration::from_secs(0));
        expired.set("e", &params, json!(1)).await;
        assert!(expired.get("e", &params).await.is_none());
    }
}
