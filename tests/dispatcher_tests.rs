//! Integration tests for external tool dispatch against a mock HTTP service,
//! grounded in the same `wiremock` usage seen across the broader pack of LLM
//! client crates for exercising HTTP call sites without a live network.

use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use turnhub::engine::dispatcher::Dispatcher;
use turnhub::engine::message::Agent;
use turnhub::engine::repositories::InMemoryAgentRepository;

fn agent() -> Agent {
    Agent {
        name: "admin".to_string(),
        system_prompt: "be helpful".to_string(),
        model: "gpt-4o-mini".to_string(),
        provider_name: "openai".to_string(),
        supports_tools: true,
    }
}

#[tokio::test]
async fn dispatches_unknown_tool_to_external_service_and_coerces_object_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/read_file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "hello"})))
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryAgentRepository::new());
    let dispatcher = Dispatcher::new(repo, server.uri(), server.uri(), Duration::from_secs(2));
    let token = CancellationToken::new();
    let mut args = Map::new();
    args.insert("path".to_string(), json!("/etc/hostname"));

    let result = dispatcher.dispatch("read_file", &args, &agent(), &token).await;

    assert!(result.success);
    assert_eq!(result.output.get("content").unwrap(), "hello");
}

#[tokio::test]
async fn dispatches_browser_family_tool_to_the_browser_service() {
    let tool_server = MockServer::start().await;
    let browser_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"url": "https://example.com"}])))
        .mount(&browser_server)
        .await;

    let repo = Arc::new(InMemoryAgentRepository::new());
    let dispatcher = Dispatcher::new(
        repo,
        tool_server.uri(),
        browser_server.uri(),
        Duration::from_secs(2),
    );
    let token = CancellationToken::new();
    let mut args = Map::new();
    args.insert("query".to_string(), json!("rust async traits"));

    let result = dispatcher.dispatch("internet_search", &args, &agent(), &token).await;

    assert!(result.success);
    let results = result.output.get("result").and_then(|v| v.as_array()).unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn propagates_non_success_status_as_a_failed_tool_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flaky_tool"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryAgentRepository::new());
    let dispatcher = Dispatcher::new(repo, server.uri(), server.uri(), Duration::from_secs(2));
    let token = CancellationToken::new();

    let result = dispatcher
        .dispatch("flaky_tool", &Map::new(), &agent(), &token)
        .await;

    assert!(!result.success);
    assert_eq!(result.metadata.get("status_code").unwrap(), 404);
}
