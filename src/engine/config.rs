//! Process-environment configuration for the orchestration engine.
//!
//! A plain struct built by hand from `std::env`, no TOML/YAML parsing
//! dependency. Covers provider credentials, collaborator base URLs, and
//! the tuning knobs the engine needs at startup.

use std::env;
use std::time::Duration;

/// Built-in provider configuration read from environment at startup, before any
/// persisted configs are replayed from the provider-config repository.
#[derive(Debug, Clone, Default)]
pub struct EnvProviderConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub yandex_api_key: Option<String>,
    pub yandex_folder_id: Option<String>,
    pub yandex_service_account_json: Option<String>,
    pub gigachat_client_id: Option<String>,
    pub gigachat_client_secret: Option<String>,
    pub gigachat_scope: Option<String>,
    pub aggregator_api_key: Option<String>,
    pub aggregator_app_id: Option<String>,
    pub fast_inference_api_key: Option<String>,
    pub local_base_url: Option<String>,
}

/// Global configuration for the orchestration engine. Constructed once at
/// process startup and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub providers: EnvProviderConfig,

    /// External collaborator endpoints. All optional except `tool_service_url`
    /// and `browser_service_url`, which the dispatcher needs to route any
    /// non-compound-skill tool call.
    pub tool_service_url: String,
    pub browser_service_url: String,
    pub rag_service_url: Option<String>,
    pub learning_store_url: Option<String>,
    pub intent_matcher_url: Option<String>,

    /// Listening port for the HTTP surface.
    pub port: u16,

    /// Hard cap on tool-call rounds within one turn.
    pub max_rounds: u32,
    /// Per-call timeout for external tool invocations, default 30s.
    pub tool_call_timeout: Duration,
    /// Per-adapter overall timeout for cloud providers, default 120s.
    pub cloud_provider_timeout: Duration,
    /// Per-adapter overall timeout for the local provider, default 5min.
    pub local_provider_timeout: Duration,
    /// Safety margin subtracted from a cached token's expiry before it is
    /// considered stale, default 30s.
    pub token_refresh_margin: Duration,
}

impl EngineConfig {
    /// Build configuration from the process environment. Missing optional
    /// variables are left `None`; callers (the registry, at adapter-registration
    /// time) are responsible for surfacing a [`crate::engine::errors::AdapterError::Configuration`]
    /// when a required credential is absent for a provider the deployment wants
    /// active.
    pub fn from_env() -> Self {
        Self {
            providers: EnvProviderConfig {
                openai_api_key: env::var("OPENAI_API_KEY").ok(),
                anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
                yandex_api_key: env::var("YANDEX_API_KEY").ok(),
                yandex_folder_id: env::var("YANDEX_FOLDER_ID").ok(),
                yandex_service_account_json: env::var("YANDEX_SERVICE_ACCOUNT_JSON").ok(),
                gigachat_client_id: env::var("GIGACHAT_CLIENT_ID").ok(),
                gigachat_client_secret: env::var("GIGACHAT_CLIENT_SECRET").ok(),
                gigachat_scope: env::var("GIGACHAT_SCOPE").ok(),
                aggregator_api_key: env::var("AGGREGATOR_API_KEY").ok(),
                aggregator_app_id: env::var("AGGREGATOR_APP_ID").ok(),
                fast_inference_api_key: env::var("FAST_INFERENCE_API_KEY").ok(),
                local_base_url: env::var("LOCAL_PROVIDER_BASE_URL").ok(),
            },
            tool_service_url: env::var("TOOL_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:9001".to_string()),
            browser_service_url: env::var("BROWSER_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:9002".to_string()),
            rag_service_url: env::var("RAG_SERVICE_URL").ok(),
            learning_store_url: env::var("LEARNING_STORE_URL").ok(),
            intent_matcher_url: env::var("INTENT_MATCHER_URL").ok(),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            max_rounds: 5,
            tool_call_timeout: Duration::from_secs(30),
            cloud_provider_timeout: Duration::from_secs(120),
            local_provider_timeout: Duration::from_secs(300),
            token_refresh_margin: Duration::from_secs(30),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig {
            providers: EnvProviderConfig::default(),
            tool_service_url: "http://localhost:9001".to_string(),
            browser_service_url: "http://localhost:9002".to_string(),
            rag_service_url: None,
            learning_store_url: None,
            intent_matcher_url: None,
            port: 8080,
            max_rounds: 5,
            tool_call_timeout: Duration::from_secs(30),
            cloud_provider_timeout: Duration::from_secs(120),
            local_provider_timeout: Duration::from_secs(300),
            token_refresh_margin: Duration::from_secs(30),
        };
        assert_eq!(cfg.max_rounds, 5);
        assert_eq!(cfg.tool_call_timeout, Duration::from_secs(30));
    }
}
