//! Generic OpenAI-compatible adapter.
//!
//! Covers three OpenAI-wire providers that only differ in auth headers and
//! model filtering: the plain OpenAI-compatible provider, the aggregator
//! (adds an `app-id` style header and filters a broad catalog by prefix), and
//! the fast-inference provider (adds a curated model whitelist). Rather than
//! three near-identical structs we parametrize one `OpenAiCompatibleAdapter`.
//!
//! This adapter never streams (streaming is only supported by the Local
//! adapter in this core) and always posts to `{base_url}/chat/completions`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::engine::client_wrapper::ProviderAdapter;
use crate::engine::clients::common::{get_shared_http_client, transport_error, translate_http_error};
use crate::engine::errors::AdapterError;
use crate::engine::message::{ChatRequest, ChatResponse, Role, ToolCall, ToolCallFunction};

/// A single extra header sent with every request (the aggregator's `app-id`,
/// for instance).
#[derive(Debug, Clone)]
pub struct ExtraHeader {
    pub name: String,
    pub value: String,
}

pub struct OpenAiCompatibleAdapter {
    name: String,
    base_url: String,
    api_key: String,
    extra_headers: Vec<ExtraHeader>,
    /// When set, `list_models` filters the provider's catalog down to this
    /// whitelist (fast-inference) or by prefix match (aggregator, using the
    /// configured provider-name prefixes).
    model_whitelist: Option<Vec<String>>,
    timeout: Duration,
}

impl OpenAiCompatibleAdapter {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            extra_headers: Vec::new(),
            model_whitelist: None,
            timeout,
        }
    }

    pub fn with_extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push(ExtraHeader {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_model_whitelist(mut self, models: Vec<String>) -> Self {
        self.model_whitelist = Some(models);
        self
    }

    fn message_to_json(msg: &crate::engine::message::Message) -> Value {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let mut obj = json!({
            "role": role,
            "content": msg.content.as_ref(),
        });
        if let Some(id) = &msg.tool_call_id {
            obj["tool_call_id"] = json!(id);
        }
        if !msg.tool_calls.is_empty() {
            obj["tool_calls"] = json!(msg
                .tool_calls
                .iter()
                .map(|tc| json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.function.name,
                        "arguments": tc.function.arguments,
                    }
                }))
                .collect::<Vec<_>>());
        }
        obj
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AdapterError> {
        let messages: Vec<Value> = req.messages.iter().map(Self::message_to_json).collect();
        let mut body = json!({
            "model": req.model,
            "messages": messages,
        });
        if let Some(tools) = &req.tools {
            if !tools.is_empty() {
                body["tools"] = json!(tools
                    .iter()
                    .map(|t| json!({
                        "type": "function",
                        "function": {
                            "name": t.function.name,
                            "description": t.function.description,
                            "parameters": t.function.parameters,
                        }
                    }))
                    .collect::<Vec<_>>());
            }
        }

        let mut request = get_shared_http_client()
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body);
        for header in &self.extra_headers {
            request = request.header(header.name.as_str(), header.value.as_str());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(translate_http_error(status.as_u16(), response).await);
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;

        let choice = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| AdapterError::Decode("missing choices[0]".to_string()))?;
        let message = choice
            .get("message")
            .ok_or_else(|| AdapterError::Decode("missing choices[0].message".to_string()))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let tool_calls = message
            .get("tool_calls")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|tc| {
                        let id = tc.get("id")?.as_str()?.to_string();
                        let function = tc.get("function")?;
                        let name = function.get("name")?.as_str()?.to_string();
                        // OpenAI's wire format encodes arguments as a JSON string;
                        // kept as-is here and normalized lazily by the parser.
                        let arguments = function.get("arguments").cloned().unwrap_or(Value::Null);
                        Some(ToolCall {
                            id,
                            call_type: "function".to_string(),
                            function: ToolCallFunction { name, arguments },
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            tool_calls,
            model: req.model.clone(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, AdapterError> {
        if let Some(whitelist) = &self.model_whitelist {
            return Ok(whitelist.clone());
        }
        let response = get_shared_http_client()
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
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
        let models = payload
            .get("data")
            .and_then(|d| d.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("id").and_then(|i| i.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::message::Message;

    fn adapter() -> OpenAiCompatibleAdapter {
        OpenAiCompatibleAdapter::new("openai", "https://api.openai.com/v1", "key", Duration::from_secs(120))
    }

    #[test]
    fn builds_with_configured_timeout() {
        assert_eq!(adapter().timeout, Duration::from_secs(120));
    }

    #[test]
    fn message_to_json_preserves_tool_call_id() {
        let msg = Message::tool_result("call_1", "{\"ok\":true}");
        let json = OpenAiCompatibleAdapter::message_to_json(&msg);
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
    }

    #[test]
    fn message_to_json_carries_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".to_string(),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: "execute".to_string(),
                    arguments: Value::String("{\"command\":\"ls\"}".to_string()),
                },
            }],
        );
        let json = OpenAiCompatibleAdapter::message_to_json(&msg);
        assert_eq!(json["tool_calls"][0]["function"]["name"], "execute");
    }
}
