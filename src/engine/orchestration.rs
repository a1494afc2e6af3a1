//! Orchestration Loop (C7) — the end-to-end turn: prompt assembly, provider
//! call, bounded tool-call loop, final reply.
//!
//! Structured as an inherent `impl` on [`Orchestrator`] holding its
//! collaborators as fields: registry-resolved adapter trait objects plus
//! the repositories, intent matcher, RAG retriever and learning store the
//! turn touches along the way.

use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::engine::client_wrapper::ProviderAdapter;
use crate::engine::dispatcher::Dispatcher;
use crate::engine::errors::{translate_error, AdapterError, OrchestrationError};
use crate::engine::message::{ChatRequest, Message, Role, ToolDef, ToolDefFunction};
use crate::engine::registry::Registry;
use crate::engine::repositories::{AgentRepository, IntentMatcher, LearningStore, MessageRepository, RagRetriever};
use crate::engine::retry::{is_retryable, with_retry, RetryConfig};
use crate::engine::{learning, skills, tool_parser};

/// Tools offered to large, tool-capable models: individual primitive
/// operations (file I/O, shell execution, system probes, browser/search)
/// plus the agent-control operations the dispatcher also understands.
const BASE_TOOLS: &[(&str, &str)] = &[
    ("execute", "Run a shell command and return its stdout/stderr."),
    ("sysinfo", "Return host system information."),
    ("sysload", "Return current system load averages."),
    ("cputemp", "Return CPU temperature readings."),
    ("internet_search", "Search the web for a query."),
    ("browser_get_text", "Fetch the text content of a URL."),
    ("check_url_access", "Check whether a URL is reachable."),
];

const ORCHESTRATION_TOOLS: &[(&str, &str)] = &[
    ("get_agent_info", "Fetch the configuration of an agent."),
    ("set_agent_model", "Change the model an agent uses."),
    ("set_agent_provider", "Change the provider an agent uses."),
    ("set_agent_system_prompt", "Change an agent's system prompt."),
    ("list_agent_logs", "List recent log entries for an agent."),
];

fn generic_tool_def(name: &str, description: &str) -> ToolDef {
    ToolDef {
        def_type: "function".to_string(),
        function: ToolDefFunction {
            name: name.to_string(),
            description: description.to_string(),
            parameters: json!({ "type": "object", "additionalProperties": true }),
        },
    }
}

/// Incoming `/chat` turn: the named agent plus the message history so far.
#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub agent: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RagSourceView {
    pub title: String,
    pub content: String,
    pub score: f64,
}

/// Result of one turn. `error` set alongside an empty `response` means "HTTP
/// 200, error embedded in the body"; only [`OrchestrationError::BadRequest`]
/// escapes as an actual `Err` from [`Orchestrator::handle_turn`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnOutcome {
    pub response: String,
    pub error: Option<String>,
    pub sources: Vec<RagSourceView>,
}

impl TurnOutcome {
    fn error(message: impl Into<String>) -> Self {
        Self {
            response: String::new(),
            error: Some(message.into()),
            sources: Vec::new(),
        }
    }

    fn ok(response: String, sources: Vec<RagSourceView>) -> Self {
        Self {
            response,
            error: None,
            sources,
        }
    }
}

pub struct Orchestrator {
    registry: Arc<Registry>,
    agent_repo: Arc<dyn AgentRepository>,
    message_repo: Arc<dyn MessageRepository>,
    intent_matcher: Arc<dyn IntentMatcher>,
    rag_retriever: Option<Arc<dyn RagRetriever>>,
    learning_store: Arc<dyn LearningStore>,
    dispatcher: Arc<Dispatcher>,
    max_rounds: u32,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<Registry>,
        agent_repo: Arc<dyn AgentRepository>,
        message_repo: Arc<dyn MessageRepository>,
        intent_matcher: Arc<dyn IntentMatcher>,
        rag_retriever: Option<Arc<dyn RagRetriever>>,
        learning_store: Arc<dyn LearningStore>,
        dispatcher: Arc<Dispatcher>,
        max_rounds: u32,
    ) -> Self {
        Self {
            registry,
            agent_repo,
            message_repo,
            intent_matcher,
            rag_retriever,
            learning_store,
            dispatcher,
            max_rounds,
        }
    }

    fn select_tool_catalog(&self, agent: &crate::engine::message::Agent) -> Option<Vec<ToolDef>> {
        if !agent.supports_tools {
            return None;
        }
        if skills::is_small_model(&agent.model) {
            Some(
                skills::registry()
                    .keys()
                    .map(|name| generic_tool_def(name, "Compound skill."))
                    .collect(),
            )
        } else {
            Some(
                BASE_TOOLS
                    .iter()
                    .chain(ORCHESTRATION_TOOLS.iter())
                    .map(|(name, desc)| generic_tool_def(name, desc))
                    .collect(),
            )
        }
    }

    fn classify_adapter_error(error: &AdapterError) -> bool {
        match error {
            AdapterError::Transport(msg) => is_retryable(msg, None),
            AdapterError::Http { status, message } => is_retryable(message, Some(*status)),
            AdapterError::Decode(_) | AdapterError::Configuration(_) => false,
        }
    }

    /// Execute one complete chat turn. Returns `Err` only for the
    /// malformed-request case; every other failure mode (agent/provider not
    /// found, provider error, empty generation) is embedded in a successful
    /// [`TurnOutcome`].
    pub async fn handle_turn(
        &self,
        request: ChatTurnRequest,
        token: &CancellationToken,
    ) -> Result<TurnOutcome, OrchestrationError> {
        if request.messages.is_empty() {
            return Err(OrchestrationError::BadRequest("messages must not be empty".to_string()));
        }

        let last_user_message = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.to_string());

        if let Some(text) = &last_user_message {
            if let Some((kind, params)) = self.intent_matcher.detect(text).await {
                return Ok(match self.intent_matcher.handle(&kind, params).await {
                    Ok(reply) => TurnOutcome::ok(reply, Vec::new()),
                    Err(e) => TurnOutcome::error(e.to_string()),
                });
            }
        }

        let agent = match self.agent_repo.get_by_name(&request.agent).await {
            Ok(Some(agent)) => agent,
            Ok(None) => return Ok(TurnOutcome::error(format!("agent not found: {}", request.agent))),
            Err(e) => return Ok(TurnOutcome::error(e.to_string())),
        };

        let provider_name = if agent.provider_name.is_empty() {
            "local".to_string()
        } else {
            agent.provider_name.clone()
        };

        let adapter: Arc<dyn ProviderAdapter> = match self.registry.get(&provider_name).await {
            Some(adapter) => adapter,
            None => return Ok(TurnOutcome::error(format!("provider not found: {}", provider_name))),
        };

        let mut system_prompt = agent.system_prompt.clone();
        let mut sources = Vec::new();
        if let (Some(retriever), Some(query)) = (&self.rag_retriever, &last_user_message) {
            match retriever.search(query, 5).await {
                Ok(docs) if !docs.is_empty() => {
                    let kb = docs
                        .iter()
                        .map(|d| format!("- {}: {}", d.title, d.content))
                        .collect::<Vec<_>>()
                        .join("\n");
                    system_prompt.push_str(&format!("\n\n---knowledge base---\n{}\n---end knowledge base---", kb));
                    sources = docs
                        .into_iter()
                        .map(|d| RagSourceView {
                            title: d.title,
                            content: d.content,
                            score: d.score,
                        })
                        .collect();
                }
                Ok(_) => {}
                Err(e) => log::warn!("RAG retriever failed: {}", e),
            }
        }

        let mut conversation = Vec::with_capacity(request.messages.len() + 1);
        conversation.push(Message::system(system_prompt));
        conversation.extend(request.messages.iter().cloned());

        let tools = self.select_tool_catalog(&agent);
        let stream = tools.is_none();

        let mut final_content = String::new();
        for round_index in 0..self.max_rounds {
            let chat_request = ChatRequest {
                model: agent.model.clone(),
                messages: conversation.clone(),
                tools: tools.clone(),
                stream,
            };

            let response = with_retry(
                RetryConfig::llm(),
                token,
                |e: &AdapterError| Self::classify_adapter_error(e),
                || adapter.chat(&chat_request),
            )
            .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let message = match &e {
                        AdapterError::Http { message, .. } => message.clone(),
                        other => translate_error(&other.to_string()),
                    };
                    return Ok(TurnOutcome::error(message));
                }
            };

            let stripped_content = tool_parser::strip_thinking_tags(&response.content);

            let extracted = if !response.tool_calls.is_empty() {
                tool_parser::normalize_structured(&response.tool_calls)
            } else {
                tool_parser::extract_from_content(&stripped_content).unwrap_or_default()
            };

            let is_cap_round = round_index + 1 == self.max_rounds;

            if extracted.is_empty() || is_cap_round {
                final_content = stripped_content;
                break;
            }

            conversation.push(Message::assistant_with_tool_calls(
                stripped_content,
                response.tool_calls.clone(),
            ));

            for call in &extracted {
                let result = self
                    .dispatcher
                    .dispatch(&call.name, &call.arguments, &agent, token)
                    .await;
                let result_json = serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string());
                conversation.push(Message::tool_result(call.id.clone(), result_json));
            }
        }

        if final_content.trim().is_empty() {
            return Ok(TurnOutcome::error("model returned empty answer"));
        }

        for message in &request.messages {
            if let Err(e) = self.message_repo.save(&agent.name, message).await {
                log::warn!("message persistence failed: {}", e);
            }
        }
        let final_assistant_message = Message::assistant(final_content.clone());
        if let Err(e) = self.message_repo.save(&agent.name, &final_assistant_message).await {
            log::warn!("message persistence failed: {}", e);
        }

        if let Some(user_text) = last_user_message {
            learning::extract_and_submit(
                self.learning_store.clone(),
                agent.name.clone(),
                user_text,
                final_content.clone(),
            );
        }

        Ok(TurnOutcome::ok(final_content, sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::errors::AdapterError;
    use crate::engine::message::{Agent, ChatResponse, ModelDetail, ToolCall, ToolCallFunction};
    use crate::engine::repositories::{InMemoryAgentRepository, NoopIntentMatcher, NoopLearningStore, NoopMessageRepository};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct ScriptedAdapter {
        name: String,
        responses: std::sync::Mutex<Vec<Result<ChatResponse, AdapterError>>>,
        calls: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(name: &str, responses: Vec<Result<ChatResponse, AdapterError>>) -> Self {
            Self {
                name: name.to_string(),
                responses: std::sync::Mutex::new(responses),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
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

    fn test_agent() -> Agent {
        Agent {
            name: "admin".to_string(),
            system_prompt: "be helpful".to_string(),
            model: "gpt-4o-mini".to_string(),
            provider_name: "scripted".to_string(),
            supports_tools: false,
        }
    }

    async fn orchestrator_with(adapter: ScriptedAdapter) -> (Orchestrator, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        registry.register(Arc::new(adapter)).await;
        let agent_repo = Arc::new(InMemoryAgentRepository::seeded(vec![test_agent()]));
        let dispatcher = Arc::new(Dispatcher::new(
            agent_repo.clone(),
            "http://localhost:1".to_string(),
            "http://localhost:2".to_string(),
            Duration::from_secs(1),
        ));
        let orchestrator = Orchestrator::new(
            registry.clone(),
            agent_repo,
            Arc::new(NoopMessageRepository),
            Arc::new(NoopIntentMatcher),
            None,
            Arc::new(NoopLearningStore),
            dispatcher,
            5,
        );
        (orchestrator, registry)
    }

    #[tokio::test]
    async fn happy_path_no_tools_returns_final_content() {
        let adapter = ScriptedAdapter::new(
            "scripted",
            vec![Ok(ChatResponse {
                content: "Привет!".to_string(),
                tool_calls: Vec::new(),
                model: "gpt-4o-mini".to_string(),
            })],
        );
        let (orchestrator, _registry) = orchestrator_with(adapter).await;
        let token = CancellationToken::new();
        let request = ChatTurnRequest {
            agent: "admin".to_string(),
            messages: vec![Message::user("Привет")],
        };
        let outcome = orchestrator.handle_turn(request, &token).await.unwrap();
        assert_eq!(outcome.response, "Привет!");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn structured_tool_call_runs_two_rounds() {
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
        let (orchestrator, _registry) = orchestrator_with(adapter).await;
        let token = CancellationToken::new();
        let request = ChatTurnRequest {
            agent: "admin".to_string(),
            messages: vec![Message::user("status?")],
        };
        let outcome = orchestrator.handle_turn(request, &token).await.unwrap();
        assert_eq!(outcome.response, "Система: Linux ...");
    }

    #[tokio::test]
    async fn inline_tool_call_encoding_is_parsed_and_continues() {
        let adapter = ScriptedAdapter::new(
            "scripted",
            vec![
                Ok(ChatResponse {
                    content: r#"execute{"command": "ls /"}"#.to_string(),
                    tool_calls: Vec::new(),
                    model: "m".to_string(),
                }),
                Ok(ChatResponse {
                    content: "done".to_string(),
                    tool_calls: Vec::new(),
                    model: "m".to_string(),
                }),
            ],
        );
        let (orchestrator, _registry) = orchestrator_with(adapter).await;
        let token = CancellationToken::new();
        let request = ChatTurnRequest {
            agent: "admin".to_string(),
            messages: vec![Message::user("list root")],
        };
        let outcome = orchestrator.handle_turn(request, &token).await.unwrap();
        assert_eq!(outcome.response, "done");
    }

    #[tokio::test]
    async fn round_cap_returns_last_content_verbatim() {
        let mut scripted = Vec::new();
        for i in 0..5 {
            scripted.push(Ok(ChatResponse {
                content: format!("execute{{\"command\":\"step{}\"}}", i),
                tool_calls: Vec::new(),
                model: "m".to_string(),
            }));
        }
        let adapter = ScriptedAdapter::new("scripted", scripted);
        let (orchestrator, _registry) = orchestrator_with(adapter).await;
        let token = CancellationToken::new();
        let request = ChatTurnRequest {
            agent: "admin".to_string(),
            messages: vec![Message::user("loop forever")],
        };
        let outcome = orchestrator.handle_turn(request, &token).await.unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.response, "execute{\"command\":\"step4\"}");
    }

    #[tokio::test]
    async fn empty_final_answer_is_reported_as_error() {
        let adapter = ScriptedAdapter::new(
            "scripted",
            vec![Ok(ChatResponse {
                content: String::new(),
                tool_calls: Vec::new(),
                model: "m".to_string(),
            })],
        );
        let (orchestrator, _registry) = orchestrator_with(adapter).await;
        let token = CancellationToken::new();
        let request = ChatTurnRequest {
            agent: "admin".to_string(),
            messages: vec![Message::user("say nothing")],
        };
        let outcome = orchestrator.handle_turn(request, &token).await.unwrap();
        assert!(outcome.error.is_some());
        assert!(outcome.response.is_empty());
    }

    #[tokio::test]
    async fn empty_messages_is_a_bad_request() {
        let adapter = ScriptedAdapter::new("scripted", Vec::new());
        let (orchestrator, _registry) = orchestrator_with(adapter).await;
        let token = CancellationToken::new();
        let request = ChatTurnRequest {
            agent: "admin".to_string(),
            messages: Vec::new(),
        };
        let err = orchestrator.handle_turn(request, &token).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_agent_is_reported_as_error_not_failure() {
        let adapter = ScriptedAdapter::new("scripted", Vec::new());
        let (orchestrator, _registry) = orchestrator_with(adapter).await;
        let token = CancellationToken::new();
        let request = ChatTurnRequest {
            agent: "nonexistent".to_string(),
            messages: vec![Message::user("hi")],
        };
        let outcome = orchestrator.handle_turn(request, &token).await.unwrap();
        assert!(outcome.error.unwrap().contains("agent not found"));
    }
}
