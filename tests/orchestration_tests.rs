//! Integration tests for the six concrete per-turn scenarios, driven entirely
//! through the public crate surface against a scripted `ProviderAdapter`
//! fake (a mock client implementing the adapter trait, `#[tokio::test]`
//! throughout).

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use turnhub::engine::client_wrapper::ProviderAdapter;
use turnhub::engine::dispatcher::Dispatcher;
use turnhub::engine::errors::AdapterError;
use turnhub::engine::message::{Agent, ChatRequest, ChatResponse, Message, ModelDetail, ToolCall, ToolCallFunction};
use turnhub::engine::orchestration::{ChatTurnRequest, Orchestrator};
use turnhub::engine::registry::Registry;
use turnhub::engine::repositories::{InMemoryAgentRepository, NoopIntentMatcher, NoopLearningStore, NoopMessageRepository};

struct ScriptedAdapter {
    name: String,
    responses: StdMutex<Vec<Result<ChatResponse, AdapterError>>>,
    call_count: AtomicU32,
}

impl ScriptedAdapter {
    fn new(name: &str, responses: Vec<Result<ChatResponse, AdapterError>>) -> Self {
        Self {
            name: name.to_string(),
            responses: StdMutex::new(responses),
            call_count: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AdapterError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(ChatResponse {
                content: String::new(),
                tool_calls: Vec::new(),
                model: req.model.clone(),
            });
        }
        responses.remove(0)
    }

    async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        Ok(vec!["scripted".to_string()])
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_models_detailed(&self) -> Result<Vec<ModelDetail>, AdapterError> {
        Ok(Vec::new())
    }
}

fn agent() -> Agent {
    Agent {
        name: "admin".to_string(),
        system_prompt: "be helpful".to_string(),
        model: "gpt-4o-mini".to_string(),
        provider_name: "scripted".to_string(),
        supports_tools: false,
    }
}

async fn build_orchestrator(adapter: ScriptedAdapter) -> Orchestrator {
    let registry = Registry::new();
    registry.register(Arc::new(adapter)).await;
    let agent_repo = Arc::new(InMemoryAgentRepository::seeded(vec![agent()]));
    let dispatcher = Arc::new(Dispatcher::new(
        agent_repo.clone(),
        "http://127.0.0.1:0".to_string(),
        "http://127.0.0.1:0".to_string(),
        Duration::from_millis(500),
    ));
    Orchestrator::new(
        Arc::new(registry),
        agent_repo,
        Arc::new(NoopMessageRepository),
        Arc::new(NoopIntentMatcher),
        None,
        Arc::new(NoopLearningStore),
        dispatcher,
        5,
    )
}

#[tokio::test]
async fn scenario_1_happy_path_no_tools() {
    let adapter = ScriptedAdapter::new(
        "scripted",
        vec![Ok(ChatResponse {
            content: "The answer is 4.".to_string(),
            tool_calls: Vec::new(),
            model: "gpt-4o-mini".to_string(),
        })],
    );
    let orchestrator = build_orchestrator(adapter).await;
    let token = CancellationToken::new();
    let outcome = orchestrator
        .handle_turn(
            ChatTurnRequest {
                agent: "admin".to_string(),
                messages: vec![Message::user("what is 2+2?")],
            },
            &token,
        )
        .await
        .unwrap();

    assert_eq!(outcome.response, "The answer is 4.");
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn scenario_2_structured_tool_call_round_trips_through_dispatch() {
    let adapter = ScriptedAdapter::new(
        "scripted",
        vec![
            Ok(ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: "c1".to_string(),
                    call_type: "function".to_string(),
                    function: ToolCallFunction {
                        name: "execute".to_string(),
                        arguments: json!({"command": "uname -a"}),
                    },
                }],
                model: "m".to_string(),
            }),
            Ok(ChatResponse {
                content: "Система: Linux ...".to_string(),
                tool_calls: Vec::new(),
                model: "m".to_string(),
            }),
        ],
    );
    let orchestrator = build_orchestrator(adapter).await;
    let token = CancellationToken::new();
    let outcome = orchestrator
        .handle_turn(
            ChatTurnRequest {
                agent: "admin".to_string(),
                messages: vec![Message::user("status?")],
            },
            &token,
        )
        .await
        .unwrap();

    assert_eq!(outcome.response, "Система: Linux ...");
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn scenario_3_inline_tool_call_encoding_is_recognized() {
    let adapter = ScriptedAdapter::new(
        "scripted",
        vec![
            Ok(ChatResponse {
                content: r#"execute{"command": "ls /"}"#.to_string(),
                tool_calls: Vec::new(),
                model: "m".to_string(),
            }),
            Ok(ChatResponse {
                content: "Listed the root directory.".to_string(),
                tool_calls: Vec::new(),
                model: "m".to_string(),
            }),
        ],
    );
    let orchestrator = build_orchestrator(adapter).await;
    let token = CancellationToken::new();
    let outcome = orchestrator
        .handle_turn(
            ChatTurnRequest {
                agent: "admin".to_string(),
                messages: vec![Message::user("list root")],
            },
            &token,
        )
        .await
        .unwrap();

    assert_eq!(outcome.response, "Listed the root directory.");
}

#[tokio::test]
async fn scenario_4_retries_a_transient_provider_error_then_succeeds() {
    let adapter = ScriptedAdapter::new(
        "scripted",
        vec![
            Err(AdapterError::Http {
                status: 503,
                message: "Service Unavailable".to_string(),
            }),
            Err(AdapterError::Http {
                status: 503,
                message: "Service Unavailable".to_string(),
            }),
            Ok(ChatResponse {
                content: "recovered".to_string(),
                tool_calls: Vec::new(),
                model: "m".to_string(),
            }),
        ],
    );
    let orchestrator = build_orchestrator(adapter).await;
    let token = CancellationToken::new();
    let outcome = orchestrator
        .handle_turn(
            ChatTurnRequest {
                agent: "admin".to_string(),
                messages: vec![Message::user("try again")],
            },
            &token,
        )
        .await
        .unwrap();

    assert_eq!(outcome.response, "recovered");
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn scenario_5_round_cap_returns_last_content_verbatim() {
    let mut scripted = Vec::new();
    for i in 0..5 {
        scripted.push(Ok(ChatResponse {
            content: format!("execute{{\"command\":\"step{}\"}}", i),
            tool_calls: Vec::new(),
            model: "m".to_string(),
        }));
    }
    let adapter = ScriptedAdapter::new("scripted", scripted);
    let orchestrator = build_orchestrator(adapter).await;
    let token = CancellationToken::new();
    let outcome = orchestrator
        .handle_turn(
            ChatTurnRequest {
                agent: "admin".to_string(),
                messages: vec![Message::user("loop forever")],
            },
            &token,
        )
        .await
        .unwrap();

    assert!(outcome.error.is_none());
    assert_eq!(outcome.response, "execute{\"command\":\"step4\"}");
}

#[tokio::test]
async fn scenario_6_empty_final_answer_surfaces_as_body_level_error() {
    let adapter = ScriptedAdapter::new(
        "scripted",
        vec![Ok(ChatResponse {
            content: "   ".to_string(),
            tool_calls: Vec::new(),
            model: "m".to_string(),
        })],
    );
    let orchestrator = build_orchestrator(adapter).await;
    let token = CancellationToken::new();
    let outcome = orchestrator
        .handle_turn(
            ChatTurnRequest {
                agent: "admin".to_string(),
                messages: vec![Message::user("say nothing")],
            },
            &token,
        )
        .await
        .unwrap();

    assert!(outcome.response.is_empty());
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn empty_messages_array_is_rejected_at_the_boundary() {
    let adapter = ScriptedAdapter::new("scripted", Vec::new());
    let orchestrator = build_orchestrator(adapter).await;
    let token = CancellationToken::new();
    let result = orchestrator
        .handle_turn(
            ChatTurnRequest {
                agent: "admin".to_string(),
                messages: Vec::new(),
            },
            &token,
        )
        .await;

    assert!(result.is_err());
}
