// src/images.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;

/// Resolves opaque `tg:<file_id>` image references into time-limited
/// download URLs through the bot file API.
///
/// Resolved URLs are cached with an expiry shorter than the upstream
/// URL's own validity window (the upstream link lives about an hour).
/// Resolution failures fall back to the unresolved reference; a broken
/// image beats a broken page.
pub struct ImageResolver {
    client: reqwest::Client,
    token: Option<String>,
    ttl: Duration,
    max_retries: u32,
    backoff: Duration,
    cache: Mutex<HashMap<String, CachedUrl>>,
}

struct CachedUrl {
    url: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct GetFileResponse {
    ok: bool,
    result: Option<FileInfo>,
}

#[derive(Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

impl ImageResolver {
    pub fn new(
        client: reqwest::Client,
        token: Option<String>,
        ttl_minutes: u64,
        max_retries: u32,
        backoff_ms: u64,
    ) -> Self {
        Self {
            client,
            token,
            ttl: Duration::from_secs(ttl_minutes * 60),
            max_retries,
            backoff: Duration::from_millis(backoff_ms),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve one reference. Plain URLs pass through untouched; `tg:`
    /// references resolve via the file API, the cache, or fall back to
    /// themselves on persistent failure.
    pub async fn resolve(&self, reference: &str) -> String {
        let Some(file_id) = reference.strip_prefix("tg:") else {
            return reference.to_string();
        };
        let Some(token) = self.token.as_deref() else {
            tracing::debug!("bot token not configured, leaving image reference unresolved");
            return reference.to_string();
        };

        if let Some(cached) = self.cached(file_id) {
            return cached;
        }

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff * 2u32.pow(attempt - 1)).await;
            }
            match self.fetch_path(token, file_id).await {
                Ok(file_path) => {
                    let url = format!("https://api.telegram.org/file/bot{}/{}", token, file_path);
                    self.store(file_id, &url);
                    return url;
                }
                Err(e) => {
                    tracing::warn!("image resolution attempt {} failed: {}", attempt + 1, e);
                }
            }
        }

        reference.to_string()
    }

    /// Resolve a list of references with at most `concurrency` calls in
    /// flight, preserving input order.
    pub async fn resolve_many(
        self: Arc<Self>,
        references: Vec<String>,
        concurrency: usize,
    ) -> Vec<String> {
        let mut resolved = Vec::with_capacity(references.len());
        for batch in references.chunks(concurrency.max(1)) {
            let mut handles = Vec::new();
            for reference in batch {
                let resolver = self.clone();
                let reference = reference.clone();
                handles.push(tokio::spawn(
                    async move { resolver.resolve(&reference).await },
                ));
            }
            for (handle, reference) in handles.into_iter().zip(batch) {
                match handle.await {
                    Ok(url) => resolved.push(url),
                    Err(_) => resolved.push(reference.clone()),
                }
            }
        }
        resolved
    }

    async fn fetch_path(&self, token: &str, file_id: &str) -> Result<String, String> {
        let url = format!("https://api.telegram.org/bot{}/getFile", token);
        let response = self
            .client
            .get(&url)
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {}", status));
        }

        let parsed: GetFileResponse = response.json().await.map_err(|e| e.to_string())?;
        if !parsed.ok {
            return Err("file API returned ok=false".to_string());
        }
        parsed
            .result
            .and_then(|r| r.file_path)
            .ok_or_else(|| "missing file_path".to_string())
    }

    fn cached(&self, file_id: &str) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(file_id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.url.clone()),
            Some(_) => {
                cache.remove(file_id);
                None
            }
            None => None,
        }
    }

    fn store(&self, file_id: &str, url: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                file_id.to_string(),
                CachedUrl {
                    url: url.to_string(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(token: Option<&str>) -> ImageResolver {
        ImageResolver::new(
            reqwest::Client::new(),
            token.map(str::to_string),
            45,
            0,
            1,
        )
    }

    #[tokio::test]
    async fn plain_urls_pass_through() {
        let r = resolver(Some("token"));
        assert_eq!(
            r.resolve("https://example.com/figure.png").await,
            "https://example.com/figure.png"
        );
    }

    #[tokio::test]
    async fn missing_token_leaves_reference_unresolved() {
        let r = resolver(None);
        assert_eq!(r.resolve("tg:ABC123").await, "tg:ABC123");
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network() {
        let r = resolver(Some("token"));
        r.store("ABC123", "https://files.example/abc");
        assert_eq!(r.resolve("tg:ABC123").await, "https://files.example/abc");
    }
}
