//! Error kinds for the orchestration engine, plus the vendor-signature translator.
//!
//! Plain enums implementing `Display` by hand rather than pulling in an
//! error-derive crate.

use std::error::Error;
use std::fmt;

/// Errors a [`crate::engine::client_wrapper::ProviderAdapter`] can return.
#[derive(Debug, Clone)]
pub enum AdapterError {
    /// Network-level failure (timeout, connection reset, DNS, TLS...). Carries the
    /// raw description so [`crate::engine::retry`] can classify it.
    Transport(String),
    /// Non-2xx HTTP response. `status` is the raw code, `message` the translated,
    /// human-readable text.
    Http { status: u16, message: String },
    /// The vendor response could not be decoded into the canonical shape.
    Decode(String),
    /// Missing credential/folder/scope for this adapter, surfaced at registration
    /// time.
    Configuration(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Transport(msg) => write!(f, "transport error: {}", msg),
            AdapterError::Http { status, message } => {
                write!(f, "provider returned HTTP {}: {}", status, message)
            }
            AdapterError::Decode(msg) => write!(f, "could not decode provider response: {}", msg),
            AdapterError::Configuration(msg) => write!(f, "adapter misconfigured: {}", msg),
        }
    }
}

impl Error for AdapterError {}

/// Errors surfaced by [`crate::engine::dispatcher::Dispatcher`].
///
/// Per spec, a dispatch failure is never terminal to a turn — it is embedded in
/// the tool-role message so the model can react — but the dispatcher still needs a
/// typed error to build that payload from.
#[derive(Debug, Clone)]
pub enum DispatchError {
    UnknownTool(String),
    Http { status: u16, body: String },
    Transport(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownTool(name) => write!(f, "no route for tool: {}", name),
            DispatchError::Http { status, body } => {
                write!(f, "tool service returned HTTP {}: {}", status, body)
            }
            DispatchError::Transport(msg) => write!(f, "tool service unreachable: {}", msg),
        }
    }
}

impl Error for DispatchError {}

/// Top-level error for a single chat turn: transient-upstream and
/// terminal-upstream both surface here (the former only once the retry
/// budget is exhausted), as does the empty-generation case.
#[derive(Debug, Clone)]
pub enum OrchestrationError {
    /// Bad HTTP method on `/chat`.
    MethodNotAllowed,
    /// Malformed JSON body or an empty `messages` array.
    BadRequest(String),
    /// No agent registered under the requested name.
    AgentNotFound(String),
    /// The provider registry has no adapter under the agent's `provider_name`.
    ProviderNotFound(String),
    /// The provider call failed (after retries, if any) and could not be
    /// recovered within the turn.
    LlmError(String),
    /// The round cap was reached — not actually an error per spec (the last
    /// assistant text is still returned) but modeled here so callers that want
    /// to log it can distinguish the path.
    RoundCapReached,
    /// Final assistant content was empty or all-whitespace.
    EmptyAnswer,
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationError::MethodNotAllowed => write!(f, "method not allowed"),
            OrchestrationError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            OrchestrationError::AgentNotFound(name) => write!(f, "agent not found: {}", name),
            OrchestrationError::ProviderNotFound(name) => {
                write!(f, "provider not found: {}", name)
            }
            OrchestrationError::LlmError(msg) => write!(f, "LLM error: {}", msg),
            OrchestrationError::RoundCapReached => {
                write!(f, "maximum tool-call rounds reached")
            }
            OrchestrationError::EmptyAnswer => write!(f, "model returned empty answer"),
        }
    }
}

impl Error for OrchestrationError {}

/// Recognize common vendor error signatures and produce a localized, actionable
/// message. A standalone matcher over the lower-cased raw text rather than a
/// one-off parse at each call site.
pub fn translate_error(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
    {
        "The provider is rate-limiting requests right now. Please try again shortly.".to_string()
    } else if lower.contains("insufficient") && lower.contains("credit")
        || lower.contains("quota")
        || lower.contains("billing")
    {
        "The provider account has insufficient credits or quota.".to_string()
    } else if lower.contains("invalid") && (lower.contains("api key") || lower.contains("token"))
        || lower.contains("unauthorized")
        || lower.contains("401")
    {
        "The provider rejected the request: invalid or expired credentials.".to_string()
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "The provider did not respond in time.".to_string()
    } else if lower.contains("dns") || lower.contains("name resolution") {
        "Could not resolve the provider's address (DNS failure).".to_string()
    } else if lower.contains("tls") || lower.contains("certificate") {
        "TLS handshake with the provider failed.".to_string()
    } else if lower.contains("folder") && (lower.contains("mismatch") || lower.contains("not found"))
    {
        "The configured folder id does not match this provider account.".to_string()
    } else if raw.trim().is_empty() {
        "The provider returned an empty error body.".to_string()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_rate_limit() {
        assert!(translate_error("Error 429: Too Many Requests").contains("rate-limiting"));
    }

    #[test]
    fn recognizes_invalid_key() {
        assert!(translate_error("401 Unauthorized: invalid api key").contains("credentials"));
    }

    #[test]
    fn passes_through_unknown_text() {
        assert_eq!(translate_error("weird vendor thing"), "weird vendor thing");
    }

    #[test]
    fn adapter_error_display() {
        let e = AdapterError::Http {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(e.to_string(), "provider returned HTTP 503: Service Unavailable");
    }
}
