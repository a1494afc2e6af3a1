//! Provider registry (C2) — a name→adapter map guarded by a reader-writer lock.
//!
//! `Get` is the hot path (one call per turn) and reads run in parallel;
//! `Register` (rare, config-UI-driven) takes the writer lock and replaces
//! any existing entry atomically.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::client_wrapper::ProviderAdapter;
use crate::engine::message::ModelDetail;

pub struct Registry {
    adapters: RwLock<HashMap<String, Arc<dyn ProviderAdapter>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Register `adapter`, replacing any existing entry under the same name.
    /// Readers that call [`Registry::get`] after this returns are guaranteed to
    /// see `adapter` or a newer replacement.
    pub async fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        let name = adapter.name().to_string();
        self.adapters.write().await.insert(name, adapter);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<String> {
        self.adapters.read().await.keys().cloned().collect()
    }

    /// Name + model list per registered adapter, used by admin/UI tooling.
    pub async fn list_all(&self) -> Vec<(String, Vec<ModelDetail>)> {
        let adapters: Vec<Arc<dyn ProviderAdapter>> =
            self.adapters.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let models = adapter.list_models_detailed().await.unwrap_or_default();
            out.push((adapter.name().to_string(), models));
        }
        out
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
