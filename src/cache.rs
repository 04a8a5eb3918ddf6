//! On-disk cache of HTTP responses keyed by request URL.
//!
//! Each entry is two files named by the SHA-256 of the URL: a JSON metadata
//! file (`<key>.json`) holding the expiry, final URL, status, and headers, and the raw
//! body (`<key>.body`). A missing, expired, or unreadable entry is a cache
//! miss. Losing the cache only costs refetches.

use crate::http::FetchedResponse;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    url: String,
    expires_at: DateTime<Utc>,
    status: u16,
    headers: BTreeMap<String, String>,
}

/// Handle to a cache directory.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    /// Open (and create if needed) a cache directory.
    pub async fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
        (
            self.dir.join(format!("{digest}.json")),
            self.dir.join(format!("{digest}.body")),
        )
    }

    /// Look up a live entry.
    #[instrument(level = "debug", skip(self))]
    pub async fn get(&self, key: &str) -> Option<FetchedResponse> {
        let (meta_path, body_path) = self.paths(key);
        let meta_bytes = fs::read(&meta_path).await.ok()?;
        let meta: EntryMeta = match serde_json::from_slice(&meta_bytes) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(error = %e, "Unreadable cache entry; treating as miss");
                return None;
            }
        };
        if meta.key != key {
            return None;
        }
        if meta.expires_at <= Utc::now() {
            debug!("Cache entry expired");
            let _ = fs::remove_file(&meta_path).await;
            let _ = fs::remove_file(&body_path).await;
            return None;
        }
        let body = fs::read(&body_path).await.ok()?;
        Some(FetchedResponse {
            url: meta.url,
            status: meta.status,
            headers: meta.headers,
            body,
        })
    }

    /// Store a response, replacing any previous entry for `key`.
    ///
    /// Write failures are logged and swallowed.
    #[instrument(level = "debug", skip(self, response))]
    pub async fn set(&self, key: &str, response: &FetchedResponse, ttl: Duration) {
        let (meta_path, body_path) = self.paths(key);
        let meta = EntryMeta {
            key: key.to_string(),
            url: response.url.clone(),
            expires_at: Utc::now() + ttl,
            status: response.status,
            headers: response.headers.clone(),
        };
        let meta_json = match serde_json::to_vec(&meta) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        // Body first, so a readable meta file always has its body.
        if let Err(e) = fs::write(&body_path, &response.body).await {
            warn!(error = %e, "Failed to write cache body");
            return;
        }
        if let Err(e) = fs::write(&meta_path, meta_json).await {
            warn!(error = %e, "Failed to write cache metadata");
        }
    }
}
