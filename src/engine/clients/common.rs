//! Shared primitives reused across provider adapters.
//!
//! A single pooled [`reqwest::Client`] behind a `lazy_static!`, plus the
//! error-body decoding logic every vendor client that doesn't already have
//! an SDK to lean on needs to hand-roll.

use lazy_static::lazy_static;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::engine::errors::AdapterError;

lazy_static! {
    /// Shared HTTP client with persistent connection pooling. A single instance
    /// keeps TLS sessions and DNS lookups warm across every adapter and every
    /// concurrently running turn. Carries no overall request timeout of its
    /// own since that varies per deployment (cloud vs. local provider); each
    /// call site sets one via `.timeout(...)` from its adapter's configured
    /// duration instead.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build shared HTTP client");
}

/// Borrow the lazily initialized shared [`reqwest::Client`].
pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

/// Read a non-2xx response body and translate it into an [`AdapterError::Http`],
/// attempting a `{"error":{"message": ...}}` decode first and falling back to
/// the raw body text.
pub async fn translate_http_error(status: u16, response: reqwest::Response) -> AdapterError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or(body);
    AdapterError::Http {
        status,
        message: crate::engine::errors::translate_error(&message),
    }
}

pub fn transport_error(err: reqwest::Error) -> AdapterError {
    AdapterError::Transport(err.to_string())
}

/// A token cached until `expires_at`, refreshed lazily and serialized per
/// adapter by a `Mutex`. The critical section only ever covers
/// "check expiry → maybe fetch → store", never the network round trip itself
/// once a valid token is already cached.
#[derive(Clone, Debug)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Per-adapter token cache. `refresh` is only invoked while the stored value is
/// missing or within `margin` of expiry; the mutex is held only across the
/// stored-value check, never across `refresh`'s own network call.
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Return a valid token, refreshing it via `refresh` if absent or about to
    /// expire within `margin`.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        margin: Duration,
        refresh: F,
    ) -> Result<String, AdapterError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CachedToken, AdapterError>>,
    {
        {
            let guard = self.slot.lock().await;
            if let Some(cached) = guard.as_ref() {
                let margin = chrono::Duration::from_std(margin).unwrap_or_default();
                if cached.expires_at - margin > chrono::Utc::now() {
                    return Ok(cached.value.clone());
                }
            }
        }
        // No valid token: refresh without holding the lock across the network call.
        let fresh = refresh().await?;
        let mut guard = self.slot.lock().await;
        *guard = Some(fresh.clone());
        Ok(fresh.value)
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caches_until_expiry() {
        let cache = TokenCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let v = cache
                .get_or_refresh(Duration::from_secs(30), || {
                    calls += 1;
                    async move {
                        Ok(CachedToken {
                            value: "tok".to_string(),
                            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                        })
                    }
                })
                .await
                .unwrap();
            assert_eq!(v, "tok");
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn refreshes_when_stale() {
        let cache = TokenCache::new();
        {
            let mut guard = cache.slot.lock().await;
            *guard = Some(CachedToken {
                value: "stale".to_string(),
                expires_at: chrono::Utc::now() + chrono::Duration::seconds(5),
            });
        }
        let v = cache
            .get_or_refresh(Duration::from_secs(30), || async move {
                Ok(CachedToken {
                    value: "fresh".to_string(),
                    expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                })
            })
            .await
            .unwrap();
        assert_eq!(v, "fresh");
    }
}
