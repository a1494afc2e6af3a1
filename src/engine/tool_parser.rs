//! Tool-call parser (C4) — normalizes the four distinct encodings a model can
//! use to request a tool invocation.
//!
//! Total on non-empty content: every public entry point either extracts a tool
//! call or reports "no tool call here" — it never panics. Regexes are
//! compiled once via `lazy_static!`.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::engine::message::ToolCall;

lazy_static! {
    static ref THINK_BRACKET: Regex =
        Regex::new(r"(?is)\[think\].*?\[/think\]").expect("valid regex");
    static ref THINK_TAG: Regex = Regex::new(r"(?is)<think>.*?</think>").expect("valid regex");
    static ref XML_FUNCTION: Regex =
        Regex::new(r"(?is)<tool_call>\s*<function=([^>]+)>(.*?)</function>\s*</tool_call>")
            .expect("valid regex");
    static ref XML_PARAMETER: Regex =
        Regex::new(r"(?is)<parameter=([^>]+)>(.*?)</parameter>").expect("valid regex");
    static ref XML_JSON: Regex =
        Regex::new(r"(?is)<tool_call>\s*(\w+)\s*(\{.*?\})\s*</tool_call>").expect("valid regex");
    static ref INLINE: Regex = Regex::new(r"(?is)^(\w+)(\{.+\})$").expect("valid regex");
}

/// Strip reasoning-model "thinking" blocks. Case-insensitive, multiline, and
/// idempotent — stripping twice is the same as stripping once.
pub fn strip_thinking_tags(content: &str) -> String {
    let once = THINK_BRACKET.replace_all(content, "");
    THINK_TAG.replace_all(&once, "").to_string()
}

/// Normalize a raw tool-call-argument value to a key→value mapping by
/// attempting, in order: direct object decode, string-unwrap then decode, wrap
/// any other decoded value under key `"value"`.
pub fn normalize_arguments(raw: &Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            Ok(other) => wrap_under_value(other),
            Err(_) => wrap_under_value(Value::String(s.clone())),
        },
        other => wrap_under_value(other.clone()),
    }
}

fn wrap_under_value(v: Value) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("value".to_string(), v);
    m
}

/// Normalize every structured [`ToolCall`] already carried on a
/// [`crate::engine::message::ChatResponse`] (encoding 1).
pub fn normalize_structured(calls: &[ToolCall]) -> Vec<ExtractedCall> {
    calls
        .iter()
        .map(|c| ExtractedCall {
            id: c.id.clone(),
            name: c.function.name.clone(),
            arguments: normalize_arguments(&c.function.arguments),
        })
        .collect()
}

/// A tool call extracted from free-text content (encodings 2–4), already
/// carrying a synthesized, spec-mandated id prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Try encodings 2 (JSON-in-content), 3 (XML-tagged), then 4 (inline) in that
/// order against already-thinking-stripped `content`. Returns the first
/// encoding that matches, or `None` if `content` is final natural-language
/// text.
pub fn extract_from_content(content: &str) -> Option<Vec<ExtractedCall>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    try_json_in_content(trimmed)
        .or_else(|| try_xml_function(trimmed))
        .or_else(|| try_xml_json(trimmed))
        .or_else(|| try_inline(trimmed))
}

fn try_json_in_content(trimmed: &str) -> Option<Vec<ExtractedCall>> {
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let obj = value.as_object()?;
    let name = obj.get("name")?.as_str()?.to_string();
    let args_value = obj.get("arguments").or_else(|| obj.get("parameters"));
    let arguments = args_value.map(normalize_arguments).unwrap_or_default();
    Some(vec![ExtractedCall {
        id: "json-0".to_string(),
        name,
        arguments,
    }])
}

fn try_xml_function(trimmed: &str) -> Option<Vec<ExtractedCall>> {
    let caps = XML_FUNCTION.captures(trimmed)?;
    let name = caps.get(1)?.as_str().trim().to_string();
    let body = caps.get(2)?.as_str();
    let mut arguments = Map::new();
    for param in XML_PARAMETER.captures_iter(body) {
        let key = param.get(1)?.as_str().trim().to_string();
        let value = param.get(2)?.as_str().trim().to_string();
        arguments.insert(key, Value::String(value));
    }
    Some(vec![ExtractedCall {
        id: "xml-0".to_string(),
        name,
        arguments,
    }])
}

fn try_xml_json(trimmed: &str) -> Option<Vec<ExtractedCall>> {
    let caps = XML_JSON.captures(trimmed)?;
    let name = caps.get(1)?.as_str().to_string();
    let json_text = caps.get(2)?.as_str();
    let value: Value = serde_json::from_str(json_text).ok()?;
    let arguments = normalize_arguments(&value);
    Some(vec![ExtractedCall {
        id: "xml-0".to_string(),
        name,
        arguments,
    }])
}

fn try_inline(trimmed: &str) -> Option<Vec<ExtractedCall>> {
    let caps = INLINE.captures(trimmed)?;
    let name = caps.get(1)?.as_str().to_string();
    let json_text = caps.get(2)?.as_str();
    let value: Value = serde_json::from_str(json_text).ok()?;
    let arguments = normalize_arguments(&value);
    Some(vec![ExtractedCall {
        id: "inline-0".to_string(),
        name,
        arguments,
    }])
}
