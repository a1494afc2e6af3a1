//! Local (Ollama-style) provider adapter — no authentication, streaming NDJSON
//! transport, tool calls returned inline in whichever frame carries them.
//!
//! Streaming is disabled whenever the request carries tools (vendors
//! that stream don't interleave tool calls reliably); in that case a single
//! non-streamed JSON object is requested and decoded instead.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;

use crate::engine::client_wrapper::ProviderAdapter;
use crate::engine::clients::common::{get_shared_http_client, transport_error, translate_http_error};
use crate::engine::errors::AdapterError;
use crate::engine::message::{ChatRequest, ChatResponse, Role, ToolCall, ToolCallFunction};

pub struct LocalAdapter {
    name: String,
    base_url: String,
    timeout: Duration,
}

impl LocalAdapter {
    /// `timeout` should be generous: local/Ollama-hosted models routinely take
    /// longer per completion than a hosted cloud endpoint.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            timeout,
        }
    }

    fn message_to_json(msg: &crate::engine::message::Message) -> Value {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        json!({ "role": role, "content": msg.content.as_ref() })
    }

    fn extract_tool_calls(frame: &Value) -> Vec<ToolCall> {
        frame
            .get("message")
            .and_then(|m| m.get("tool_calls"))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .enumerate()
                    .filter_map(|(i, tc)| {
                        let function = tc.get("function")?;
                        let name = function.get("name")?.as_str()?.to_string();
                        let arguments = function.get("arguments").cloned().unwrap_or(Value::Null);
                        Some(ToolCall {
                            id: tc
                                .get("id")
                                .and_then(|v| v.as_str())
                                .map(str::to_string)
                                .unwrap_or_else(|| format!("local-{}", i)),
                            call_type: "function".to_string(),
                            function: ToolCallFunction { name, arguments },
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AdapterError> {
        let has_tools = req.tools.as_ref().is_some_and(|t| !t.is_empty());
        let messages: Vec<Value> = req.messages.iter().map(Self::message_to_json).collect();

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "stream": !has_tools,
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

        let response = get_shared_http_client()
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(translate_http_error(status.as_u16(), response).await);
        }

        if has_tools {
            let frame: Value = response
                .json()
                .await
                .map_err(|e| AdapterError::Decode(e.to_string()))?;
            let content = frame
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .unwrap_or("")
                .to_string();
            return Ok(ChatResponse {
                content,
                tool_calls: Self::extract_tool_calls(&frame),
                model: req.model.clone(),
            });
        }

        // NDJSON: concatenate `content` fragments across frames, adopt
        // `tool_calls` from whichever frame carries them, stop at `done: true`.
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut byte_stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(transport_error)?;
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = &line[..line.len().saturating_sub(1)];
                if line.is_empty() {
                    continue;
                }
                let frame: Value = serde_json::from_slice(line)
                    .map_err(|e| AdapterError::Decode(e.to_string()))?;
                if let Some(fragment) = frame.get("message").and_then(|m| m.get("content")).and_then(|c| c.as_str()) {
                    content.push_str(fragment);
                }
                let frame_calls = Self::extract_tool_calls(&frame);
                if !frame_calls.is_empty() {
                    tool_calls = frame_calls;
                }
                if frame.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
                    return Ok(ChatResponse {
                        content,
                        tool_calls,
                        model: req.model.clone(),
                    });
                }
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
            .get(format!("{}/api/tags", self.base_url))
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
            .get("models")
            .and_then(|m| m.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
