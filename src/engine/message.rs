//! Canonical data model shared by every provider adapter and by the orchestration
//! loop itself.
//!
//! Everything here lives only for the duration of one HTTP turn (see
//! [`crate::engine::orchestration`]); adapters and the registry outlive a single
//! turn, agents and provider configs are owned by external repositories and only
//! borrowed here.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role of a single message within a conversation.
///
/// `Tool` carries the `tool_call_id` of the assistant [`ToolCall`] it answers;
/// adapters that don't understand a native `tool` role (Anthropic, YandexGPT) fold
/// this down into a `user` message before transmission — see
/// [`crate::engine::clients`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single function call requested by the model.
///
/// `arguments` is kept as an untyped [`serde_json::Value`] so that vendor-specific
/// encodings (a JSON object, a JSON-encoded string, or a bare scalar) can be
/// normalized lazily by [`crate::engine::tool_parser`] rather than re-parsed in
/// every adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id assigned by the provider (or synthesized by the parser, e.g.
    /// `"json-0"`, `"xml-0"`, `"inline-0"`).
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Raw, not-yet-normalized arguments. May decode as an object, a string
    /// wrapping JSON, or a scalar.
    pub arguments: serde_json::Value,
}

/// One role-tagged turn in a conversation.
///
/// Ordering in the enclosing `Vec<Message>` is significant and preserved by every
/// component that touches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Stored as `Arc<str>` so conversation histories can be cheaply cloned
    /// across retry attempts and tool-loop rounds.
    pub content: Arc<str>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Present only on `role: tool` messages; must match the originating
    /// assistant `ToolCall.id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<Arc<str>>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// JSON-Schema-shaped tool definition passed through to the provider largely
/// untouched; only Anthropic remaps the key name (`input_schema` vs
/// `parameters`), never the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub def_type: String,
    pub function: ToolDefFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The canonical request sent to [`crate::engine::client_wrapper::ProviderAdapter::chat`].
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDef>>,
    pub stream: bool,
}

/// The canonical response returned by every adapter, regardless of vendor wire
/// format.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub model: String,
}

/// Pricing/listing detail surfaced by `list_models_detailed` for UI hints. Not
/// every adapter can populate every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDetail {
    pub name: String,
    pub input_price_per_1k: Option<f64>,
    pub output_price_per_1k: Option<f64>,
    pub context_window: Option<u64>,
}

/// Read-only view of an agent as consumed by the orchestration engine. The core
/// never writes an `Agent` back; mutation happens through
/// [`crate::engine::repositories::AgentRepository`] on behalf of admin tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub system_prompt: String,
    pub model: String,
    pub provider_name: String,
    pub supports_tools: bool,
}

/// Provider configuration as replayed from the external provider-config
/// repository at startup, or pushed at runtime by an admin UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub credential: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Folder identifier (Yandex), scope (GigaChat), or a full service-account
    /// JSON blob for JWT-based auth, depending on `name`.
    #[serde(default)]
    pub extras: serde_json::Value,
}
