//! HTTP server composition root — exposes `POST /chat` and `GET /health`
//! over `axum`: read environment config, build the provider registry and
//! collaborators, bind a listener, serve.
//!
//! Only built with `--features server` (Cargo.toml marks `axum`/`tower` as
//! optional dependencies gated behind that feature).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use turnhub::engine::clients::anthropic::AnthropicAdapter;
use turnhub::engine::clients::gigachat::GigaChatAdapter;
use turnhub::engine::clients::local::LocalAdapter;
use turnhub::engine::clients::openai_compat::OpenAiCompatibleAdapter;
use turnhub::engine::clients::yandex::{ServiceAccountKey, YandexAdapter};
use turnhub::engine::config::EngineConfig;
use turnhub::engine::dispatcher::Dispatcher;
use turnhub::engine::message::{Message, Role};
use turnhub::engine::orchestration::{ChatTurnRequest, Orchestrator, RagSourceView};
use turnhub::engine::registry::Registry;
use turnhub::engine::repositories::{InMemoryAgentRepository, NoopIntentMatcher, NoopLearningStore, NoopMessageRepository};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatTurnBody {
    agent: String,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
struct ChatTurnResponseBody {
    response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<RagSourceView>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "system" => Some(Role::System),
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat(State(state): State<AppState>, Json(body): Json<ChatTurnBody>) -> axum::response::Response {
    if body.messages.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "messages must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    let mut messages = Vec::with_capacity(body.messages.len());
    for m in &body.messages {
        let Some(role) = parse_role(&m.role) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: format!("unknown message role: {}", m.role),
                }),
            )
                .into_response();
        };
        messages.push(Message {
            role,
            content: m.content.clone().into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
    }

    let request = ChatTurnRequest {
        agent: body.agent,
        messages,
    };
    let token = CancellationToken::new();

    match state.orchestrator.handle_turn(request, &token).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ChatTurnResponseBody {
                response: outcome.response,
                error: outcome.error,
                sources: outcome.sources,
            }),
        )
            .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorBody { error: e.to_string() })).into_response(),
    }
}

/// Register every provider whose required credentials are present in
/// `config`. Missing credentials simply skip that adapter rather than failing
/// startup — a deployment may only use a subset of the provider table.
async fn build_registry(config: &EngineConfig) -> Registry {
    let registry = Registry::new();
    let providers = &config.providers;

    if let Some(base_url) = &providers.local_base_url {
        registry
            .register(Arc::new(LocalAdapter::new("local", base_url.clone(), config.local_provider_timeout)))
            .await;
    }

    if let Some(api_key) = &providers.openai_api_key {
        registry
            .register(Arc::new(OpenAiCompatibleAdapter::new(
                "openai",
                "https://api.openai.com/v1",
                api_key.clone(),
                config.cloud_provider_timeout,
            )))
            .await;
    }

    if let Some(api_key) = &providers.anthropic_api_key {
        registry
            .register(Arc::new(AnthropicAdapter::new(
                "anthropic",
                api_key.clone(),
                config.cloud_provider_timeout,
            )))
            .await;
    }

    if let (Some(client_id), Some(client_secret)) =
        (&providers.gigachat_client_id, &providers.gigachat_client_secret)
    {
        let scope = providers.gigachat_scope.clone().unwrap_or_else(|| "GIGACHAT_API_PERS".to_string());
        registry
            .register(Arc::new(GigaChatAdapter::new(
                "gigachat",
                client_id.clone(),
                client_secret.clone(),
                scope,
                config.cloud_provider_timeout,
                config.token_refresh_margin,
            )))
            .await;
    }

    if let Some(folder_id) = &providers.yandex_folder_id {
        // Service-account JWT auth takes priority over the static API key when
        // both are configured: it is the credential Yandex recommends for
        // anything beyond quick manual testing.
        if let Some(sa_json) = &providers.yandex_service_account_json {
            match serde_json::from_str::<ServiceAccountKey>(sa_json) {
                Ok(service_account) => {
                    registry
                        .register(Arc::new(YandexAdapter::new_with_service_account(
                            "yandex",
                            folder_id.clone(),
                            service_account,
                            config.cloud_provider_timeout,
                            config.token_refresh_margin,
                        )))
                        .await;
                }
                Err(e) => {
                    log::warn!("YANDEX_SERVICE_ACCOUNT_JSON could not be parsed, skipping Yandex adapter: {}", e);
                }
            }
        } else if let Some(api_key) = &providers.yandex_api_key {
            registry
                .register(Arc::new(YandexAdapter::new_with_api_key(
                    "yandex",
                    folder_id.clone(),
                    api_key.clone(),
                    config.cloud_provider_timeout,
                    config.token_refresh_margin,
                )))
                .await;
        }
    }

    if let Some(api_key) = &providers.aggregator_api_key {
        registry
            .register(Arc::new(
                OpenAiCompatibleAdapter::new(
                    "aggregator",
                    "https://openrouter.ai/api/v1",
                    api_key.clone(),
                    config.cloud_provider_timeout,
                )
                .with_extra_header("app-id", providers.aggregator_app_id.clone().unwrap_or_default()),
            ))
            .await;
    }

    if let Some(api_key) = &providers.fast_inference_api_key {
        registry
            .register(Arc::new(OpenAiCompatibleAdapter::new(
                "fast-inference",
                "https://api.groq.com/openai/v1",
                api_key.clone(),
                config.cloud_provider_timeout,
            )))
            .await;
    }

    registry
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = EngineConfig::from_env();
    let registry = Arc::new(build_registry(&config).await);

    let agent_repo = Arc::new(InMemoryAgentRepository::new());
    let dispatcher = Arc::new(Dispatcher::new(
        agent_repo.clone(),
        config.tool_service_url.clone(),
        config.browser_service_url.clone(),
        config.tool_call_timeout,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        agent_repo,
        Arc::new(NoopMessageRepository),
        Arc::new(NoopIntentMatcher),
        None,
        Arc::new(NoopLearningStore),
        dispatcher,
        config.max_rounds,
    ));

    let state = AppState { orchestrator };
    let app = Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    log::info!("turnhubd listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
