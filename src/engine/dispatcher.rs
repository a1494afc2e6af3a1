//! Tool Dispatcher (C5) — routes one tool invocation to a compound skill, an
//! agent-control operation, or an external HTTP micro-service.
//!
//! `ToolResult` (`success`, `output`, `error`, `metadata`) is the single
//! output shape for every tool invocation, whatever route it took to get
//! there.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::engine::errors::translate_error;
use crate::engine::message::Agent;
use crate::engine::repositories::AgentRepository;
use crate::engine::retry::{is_retryable, with_retry, RetryConfig};
use crate::engine::skills::{self, SkillContext, SkillFn};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Browser-family tool names route to the browser service; every other name
/// routes to the generic tool service.
const BROWSER_ROUTES: &[(&str, &str)] = &[
    ("browser_get_text", "/browser/text"),
    ("internet_search", "/search"),
    ("check_url_access", "/access/check"),
];

fn resolve_route(tool_name: &str, tool_service_url: &str, browser_service_url: &str) -> String {
    for (name, path) in BROWSER_ROUTES {
        if *name == tool_name {
            return format!("{}{}", browser_service_url, path);
        }
    }
    format!("{}/{}", tool_service_url, tool_name)
}

/// Read the whole response body before deciding on shape: a JSON object
/// passes through untouched; a JSON array, any other JSON value, or non-JSON
/// bytes are all wrapped under `result`.
pub(crate) fn coerce_response_body(bytes: &[u8]) -> ToolResult {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => ToolResult::success(Value::Object(map)),
        Ok(other) => ToolResult::success(json!({ "result": other })),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).to_string();
            ToolResult::success(json!({ "result": text }))
        }
    }
}

fn http_error_result(status: u16, body: String) -> ToolResult {
    ToolResult::failure(translate_error(&body))
        .with_metadata("status_code", json!(status))
        .with_metadata("body", json!(body))
}

pub struct Dispatcher {
    skills: HashMap<&'static str, SkillFn>,
    skill_ctx: SkillContext,
    agent_repo: Arc<dyn AgentRepository>,
    http: reqwest::Client,
    tool_service_url: String,
    browser_service_url: String,
    tool_call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        agent_repo: Arc<dyn AgentRepository>,
        tool_service_url: String,
        browser_service_url: String,
        tool_call_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::new();
        Self {
            skills: skills::registry(),
            skill_ctx: SkillContext {
                http: http.clone(),
                tool_service_url: tool_service_url.clone(),
                browser_service_url: browser_service_url.clone(),
            },
            agent_repo,
            http,
            tool_service_url,
            browser_service_url,
            tool_call_timeout,
        }
    }

    /// Dispatch order: compound skill, then agent-control operation,
    /// then an external HTTP POST resolved through the static routing table.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
        agent: &Agent,
        token: &CancellationToken,
    ) -> ToolResult {
        if let Some(skill) = self.skills.get(tool_name) {
            return skill(Value::Object(arguments.clone()), self.skill_ctx.clone()).await;
        }

        if let Some(result) = self.handle_agent_control(tool_name, arguments, agent).await {
            return result;
        }

        self.dispatch_external(tool_name, arguments, token).await
    }

    async fn handle_agent_control(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
        agent: &Agent,
    ) -> Option<ToolResult> {
        let target_name = arguments
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(&agent.name)
            .to_string();

        match tool_name {
            "get_agent_info" => Some(match self.agent_repo.get_by_name(&target_name).await {
                Ok(Some(found)) => ToolResult::success(json!({
                    "name": found.name,
                    "model": found.model,
                    "provider_name": found.provider_name,
                    "supports_tools": found.supports_tools,
                })),
                Ok(None) => ToolResult::failure(format!("no such agent: {}", target_name)),
                Err(e) => ToolResult::failure(e.to_string()),
            }),
            "set_agent_model" | "set_agent_provider" | "set_agent_system_prompt" => {
                Some(self.mutate_agent(tool_name, &target_name, arguments).await)
            }
            "list_agent_logs" => Some(match self.agent_repo.list_logs(&target_name).await {
                Ok(logs) => ToolResult::success(json!({ "logs": logs })),
                Err(e) => ToolResult::failure(e.to_string()),
            }),
            _ => None,
        }
    }

    async fn mutate_agent(&self, tool_name: &str, target_name: &str, arguments: &Map<String, Value>) -> ToolResult {
        let mut found = match self.agent_repo.get_by_name(target_name).await {
            Ok(Some(found)) => found,
            Ok(None) => return ToolResult::failure(format!("no such agent: {}", target_name)),
            Err(e) => return ToolResult::failure(e.to_string()),
        };
        match tool_name {
            "set_agent_model" => {
                let Some(model) = arguments.get("model").and_then(|v| v.as_str()) else {
                    return ToolResult::failure("missing required argument: model");
                };
                found.model = model.to_string();
            }
            "set_agent_provider" => {
                let Some(provider) = arguments.get("provider_name").and_then(|v| v.as_str()) else {
                    return ToolResult::failure("missing required argument: provider_name");
                };
                found.provider_name = provider.to_string();
            }
            "set_agent_system_prompt" => {
                let Some(prompt) = arguments.get("system_prompt").and_then(|v| v.as_str()) else {
                    return ToolResult::failure("missing required argument: system_prompt");
                };
                found.system_prompt = prompt.to_string();
            }
            _ => unreachable!(),
        }
        match self.agent_repo.save(found).await {
            Ok(()) => ToolResult::success(json!({ "updated": target_name })),
            Err(e) => ToolResult::failure(e.to_string()),
        }
    }

    async fn dispatch_external(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
        token: &CancellationToken,
    ) -> ToolResult {
        let url = resolve_route(tool_name, &self.tool_service_url, &self.browser_service_url);
        let body = Value::Object(arguments.clone());

        let outcome = with_retry(
            RetryConfig::tool_call(),
            token,
            |e: &ToolResult| {
                let status_code = e
                    .metadata
                    .get("status_code")
                    .and_then(|v| v.as_u64())
                    .map(|code| code as u16);
                is_retryable(&e.error.clone().unwrap_or_default(), status_code)
            },
            || async {
                match self
                    .http
                    .post(&url)
                    .timeout(self.tool_call_timeout)
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(response) => {
                        let status = response.status();
                        let bytes = response.bytes().await.unwrap_or_default();
                        if status.is_success() {
                            Ok(coerce_response_body(&bytes))
                        } else {
                            Err(http_error_result(
                                status.as_u16(),
                                String::from_utf8_lossy(&bytes).to_string(),
                            ))
                        }
                    }
                    Err(e) => Err(ToolResult::failure(format!("tool service unreachable: {}", e))),
                }
            },
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(result) => result,
        }
    }
}
