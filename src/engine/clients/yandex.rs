//! YandexGPT adapter.
//!
//! Authenticates either with a static API key or, when a service-account JSON
//! is configured, by minting an RSA-PSS-signed JWT and exchanging it for a
//! short-lived IAM token (cached, refreshed at least 30s before expiry — see
//! [`crate::engine::clients::common::TokenCache`]). Role `tool` has no native
//! counterpart and is down-converted to `assistant`. The completion endpoint
//! addresses models via `modelUri = "gpt://{folder}/{model}/latest"`.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::engine::client_wrapper::ProviderAdapter;
use crate::engine::clients::common::{
    get_shared_http_client, transport_error, translate_http_error, CachedToken, TokenCache,
};
use crate::engine::errors::AdapterError;
use crate::engine::message::{ChatRequest, ChatResponse, Role};

const IAM_TOKEN_URL: &str = "https://iam.api.cloud.yandex.net/iam/v1/tokens";
const COMPLETION_URL: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

/// A Yandex Cloud service-account key, as found in the `extras` field of a
/// provider configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceAccountKey {
    pub service_account_id: String,
    pub key_id: String,
    pub private_key: String,
}

enum Credential {
    ApiKey(String),
    ServiceAccount(ServiceAccountKey),
}

pub struct YandexAdapter {
    name: String,
    folder_id: String,
    credential: Credential,
    token_cache: TokenCache,
    token_refresh_margin: Duration,
    timeout: Duration,
}

impl YandexAdapter {
    /// `token_refresh_margin` is accepted for symmetry with
    /// [`Self::new_with_service_account`] but never exercised: the API-key
    /// credential has no token cache to refresh.
    pub fn new_with_api_key(
        name: impl Into<String>,
        folder_id: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        token_refresh_margin: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            folder_id: folder_id.into(),
            credential: Credential::ApiKey(api_key.into()),
            token_cache: TokenCache::new(),
            token_refresh_margin,
            timeout,
        }
    }

    pub fn new_with_service_account(
        name: impl Into<String>,
        folder_id: impl Into<String>,
        service_account: ServiceAccountKey,
        timeout: Duration,
        token_refresh_margin: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            folder_id: folder_id.into(),
            credential: Credential::ServiceAccount(service_account),
            token_cache: TokenCache::new(),
            token_refresh_margin,
            timeout,
        }
    }

    fn model_uri(&self, model: &str) -> String {
        format!("gpt://{}/{}/latest", self.folder_id, model)
    }

    async fn auth_header(&self) -> Result<String, AdapterError> {
        match &self.credential {
            Credential::ApiKey(key) => Ok(format!("Api-Key {}", key)),
            Credential::ServiceAccount(sa) => {
                let sa = sa.clone();
                let timeout = self.timeout;
                let token = self
                    .token_cache
                    .get_or_refresh(self.token_refresh_margin, move || async move {
                        mint_iam_token(&sa, timeout).await
                    })
                    .await?;
                Ok(format!("Bearer {}", token))
            }
        }
    }
}

#[derive(Serialize)]
struct JwtClaims {
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

async fn mint_iam_token(sa: &ServiceAccountKey, timeout: Duration) -> Result<CachedToken, AdapterError> {
    let now = Utc::now();
    let claims = JwtClaims {
        iss: sa.service_account_id.clone(),
        aud: IAM_TOKEN_URL.to_string(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::hours(1)).timestamp(),
    };
    let mut header = Header::new(Algorithm::PS256);
    header.kid = Some(sa.key_id.clone());
    let encoding_key = EncodingKey::from_rsa_pem(sa.private_key.as_bytes())
        .map_err(|e| AdapterError::Configuration(format!("invalid Yandex service-account key: {}", e)))?;
    let jwt = encode(&header, &claims, &encoding_key)
        .map_err(|e| AdapterError::Configuration(format!("could not sign Yandex JWT: {}", e)))?;

    let response = get_shared_http_client()
        .post(IAM_TOKEN_URL)
        .timeout(timeout)
        .json(&json!({ "jwt": jwt }))
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
    let iam_token = payload
        .get("iamToken")
        .and_then(|t| t.as_str())
        .ok_or_else(|| AdapterError::Decode("missing iamToken".to_string()))?
        .to_string();
    let expires_at = payload
        .get("expiresAt")
        .and_then(|t| t.as_str())
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| now_plus_hour());
    Ok(CachedToken {
        value: iam_token,
        expires_at,
    })
}

fn now_plus_hour() -> chrono::DateTime<Utc> {
    Utc::now() + chrono::Duration::hours(1)
}

#[async_trait]
impl ProviderAdapter for YandexAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AdapterError> {
        let auth = self.auth_header().await?;

        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                // Role `tool` has no native counterpart: down-converted to `assistant`.
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant | Role::Tool => "assistant",
                };
                json!({ "role": role, "text": m.content.as_ref() })
            })
            .collect();

        let body = json!({
            "modelUri": self.model_uri(&req.model),
            "completionOptions": {
                "stream": false,
                "temperature": 0.3,
                "maxTokens": "2000",
            },
            "messages": messages,
        });

        let response = get_shared_http_client()
            .post(COMPLETION_URL)
            .header("Authorization", auth)
            .header("x-folder-id", &self.folder_id)
            .timeout(self.timeout)
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

        let text = payload
            .get("result")
            .and_then(|r| r.get("alternatives"))
            .and_then(|a| a.get(0))
            .and_then(|alt| alt.get("message"))
            .and_then(|m| m.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        Ok(ChatResponse {
            content: text,
            tool_calls: Vec::new(),
            model: req.model.clone(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        // YandexGPT does not expose a model-listing endpoint; the catalog is
        // fixed per the `gpt://{folder}/{model}/latest` URI scheme.
        Ok(vec!["yandexgpt".to_string(), "yandexgpt-lite".to_string()])
    }

    fn name(&self) -> &str {
        &self.name
    }
}
