//! Collaborator interfaces consumed by the orchestration loop.
//!
//! Everything here is an external system from the core's point of view:
//! persistent storage, the intent matcher, the RAG retriever, the learning
//! store. The core only ever sees these through `async_trait` objects so test
//! doubles can stand in without generics spreading through `Orchestrator`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use tokio::sync::RwLock;

use crate::engine::message::{Agent, Message, ProviderConfig};

#[derive(Debug, Clone)]
pub struct RepositoryError(pub String);

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for RepositoryError {}

/// `{name, system_prompt, model, provider_name, supports_tools}` CRUD, owned
/// externally.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<Agent>, RepositoryError>;
    async fn save(&self, agent: Agent) -> Result<(), RepositoryError>;
    async fn list_logs(&self, agent_name: &str) -> Result<Vec<String>, RepositoryError>;
}

/// Best-effort message persistence — failures are logged by the caller, never
/// propagated to the client.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn save(&self, agent_name: &str, message: &Message) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProviderConfigRepository: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<ProviderConfig>, RepositoryError>;
    async fn save(&self, config: ProviderConfig) -> Result<(), RepositoryError>;
}

/// `Detect(text) -> (kind, params)`, `Handle(kind, params) -> string | error`.
/// Detection returning `None` means "no fixed-phrase match; fall
/// through to the model".
#[async_trait]
pub trait IntentMatcher: Send + Sync {
    async fn detect(&self, text: &str) -> Option<(String, serde_json::Value)>;
    async fn handle(&self, kind: &str, params: serde_json::Value) -> Result<String, RepositoryError>;
}

#[derive(Debug, Clone)]
pub struct RagDoc {
    pub title: String,
    pub content: String,
    pub score: f64,
}

#[async_trait]
pub trait RagRetriever: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RagDoc>, RepositoryError>;
}

/// One extracted learning, built by [`crate::engine::learning`] and handed to
/// the store fire-and-forget.
#[derive(Debug, Clone)]
pub struct LearningEntry {
    pub agent_name: String,
    pub category: String,
    pub summary: String,
}

#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn submit(&self, entry: LearningEntry) -> Result<(), RepositoryError>;
}

/// In-memory [`AgentRepository`], useful for tests and for a deployment that
/// has not yet wired up a real relational store.
#[derive(Default)]
pub struct InMemoryAgentRepository {
    agents: RwLock<HashMap<String, Agent>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(agents: Vec<Agent>) -> Self {
        let map = agents.into_iter().map(|a| (a.name.clone(), a)).collect();
        Self {
            agents: RwLock::new(map),
        }
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn get_by_name(&self, name: &str) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.read().await.get(name).cloned())
    }

    async fn save(&self, agent: Agent) -> Result<(), RepositoryError> {
        self.agents.write().await.insert(agent.name.clone(), agent);
        Ok(())
    }

    async fn list_logs(&self, _agent_name: &str) -> Result<Vec<String>, RepositoryError> {
        Ok(Vec::new())
    }
}

/// Discards every message. Useful when no message repository is configured.
#[derive(Default)]
pub struct NoopMessageRepository;

#[async_trait]
impl MessageRepository for NoopMessageRepository {
    async fn save(&self, _agent_name: &str, _message: &Message) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Never matches a fixed phrase; every turn falls through to the model.
#[derive(Default)]
pub struct NoopIntentMatcher;

#[async_trait]
impl IntentMatcher for NoopIntentMatcher {
    async fn detect(&self, _text: &str) -> Option<(String, serde_json::Value)> {
        None
    }

    async fn handle(&self, kind: &str, _params: serde_json::Value) -> Result<String, RepositoryError> {
        Err(RepositoryError(format!("no handler registered for intent kind: {}", kind)))
    }
}

/// RAG disabled for this deployment.
#[derive(Default)]
pub struct NoopRagRetriever;

#[async_trait]
impl RagRetriever for NoopRagRetriever {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RagDoc>, RepositoryError> {
        Ok(Vec::new())
    }
}

/// Discards every learning. Useful when no learning store is configured.
#[derive(Default)]
pub struct NoopLearningStore;

#[async_trait]
impl LearningStore for NoopLearningStore {
    async fn submit(&self, _entry: LearningEntry) -> Result<(), RepositoryError> {
        Ok(())
    }
}
