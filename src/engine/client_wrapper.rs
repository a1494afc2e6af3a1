//! Provider adapter trait (C1) — the seam every vendor-specific client
//! implements.
//!
//! One `async fn chat` entry point, a synchronous `name()` accessor, and a
//! shared HTTP transport underneath, with `list_models`/`list_models_detailed`
//! rounding out the four operations every provider must support.

use async_trait::async_trait;

use crate::engine::errors::AdapterError;
use crate::engine::message::{ChatRequest, ChatResponse, ModelDetail};

/// Trait implemented by every vendor-specific provider client.
///
/// All implementations must be `Send + Sync` so they can be shared as
/// `Arc<dyn ProviderAdapter>` across concurrently-running turns.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Translate `req` into the vendor wire format, issue the call, and translate
    /// the response back into the canonical [`ChatResponse`].
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AdapterError>;

    /// List the model identifiers this provider currently exposes.
    async fn list_models(&self) -> Result<Vec<String>, AdapterError>;

    /// Stable adapter name as registered in the [`crate::engine::registry::Registry`].
    fn name(&self) -> &str;

    /// Optional richer listing with pricing/context-window hints for UI
    /// consumers. Default falls back to wrapping [`ProviderAdapter::list_models`].
    async fn list_models_detailed(&self) -> Result<Vec<ModelDetail>, AdapterError> {
        Ok(self
            .list_models()
            .await?
            .into_iter()
            .map(|name| ModelDetail {
                name,
                input_price_per_1k: None,
                output_price_per_1k: None,
                context_window: None,
            })
            .collect())
    }
}
