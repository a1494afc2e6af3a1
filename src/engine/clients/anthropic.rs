//! Anthropic Claude adapter.
//!
//! Differs from the generic OpenAI-compatible wire format in three ways:
//! the system prompt is a **top-level field**, not a message; the response
//! is an array of typed
//! content blocks (`text`, `tool_use`) rather than a single `message.content`
//! string; and role `tool` has no native equivalent, so it is down-converted to
//! `user` with the tool output folded into the text.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::engine::client_wrapper::ProviderAdapter;
use crate::engine::clients::common::{get_shared_http_client, transport_error, translate_http_error};
use crate::engine::errors::AdapterError;
use crate::engine::message::{ChatRequest, ChatResponse, Role, ToolCall, ToolCallFunction};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    name: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl AnthropicAdapter {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Split `messages` into the Anthropic top-level `system` string and the
    /// remaining `messages` array, down-converting `tool` role to `user`.
    fn split_system_and_messages(messages: &[crate::engine::message::Message]) -> (String, Vec<Value>) {
        let mut system = String::new();
        let mut out = Vec::new();
        for msg in messages {
            match msg.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(msg.content.as_ref());
                }
                Role::User => out.push(json!({ "role": "user", "content": msg.content.as_ref() })),
                Role::Assistant => {
                    out.push(json!({ "role": "assistant", "content": msg.content.as_ref() }))
                }
                Role::Tool => {
                    // No native `tool` role: fold the tool output into a `user`
                    // message so the model still sees it as the next turn.
                    out.push(json!({
                        "role": "user",
                        "content": format!("Tool result: {}", msg.content.as_ref()),
                    }));
                }
            }
        }
        (system, out)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AdapterError> {
        let (system, messages) = Self::split_system_and_messages(&req.messages);

        let mut body = json!({
            "model": req.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if let Some(tools) = &req.tools {
            if !tools.is_empty() {
                // Anthropic remaps the key name (`input_schema`) but not the value.
                body["tools"] = json!(tools
                    .iter()
                    .map(|t| json!({
                        "name": t.function.name,
                        "description": t.function.description,
                        "input_schema": t.function.parameters,
                    }))
                    .collect::<Vec<_>>());
            }
        }

        let response = get_shared_http_client()
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let blocks = payload
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| AdapterError::Decode("missing content blocks".to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for (i, block) in blocks.iter().enumerate() {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let name = block
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let arguments = block.get("input").cloned().unwrap_or(Value::Null);
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("anthropic-{}", i));
                    tool_calls.push(ToolCall {
                        id,
                        call_type: "function".to_string(),
                        function: ToolCallFunction { name, arguments },
                    });
                }
                _ => {}
            }
        }

        Ok(ChatResponse {
            content,
            tool_calls,
            model: req.model.clone(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        let response = get_shared_http_client()
            .get(format!("{}/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(self.timeout)
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
