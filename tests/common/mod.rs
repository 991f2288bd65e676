//! Shared helpers for coordinator integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use lra_coordinator::participant::ScriptedClient;
use lra_coordinator::store::{FileStore, InMemoryStore};
use lra_coordinator::{CoordinatorConfig, LraContext};

/// Config with no retry backoff, so every sweep retries immediately
pub fn fast_config(data_dir: &Path) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::new(data_dir);
    config.initial_backoff_ms = 0;
    config.max_backoff_ms = 0;
    config.call_timeout_ms = 200;
    config.shutdown_grace_ms = 1_000;
    config
}

/// Context over an in-memory store
pub fn memory_context(
    config: CoordinatorConfig,
    client: Arc<ScriptedClient>,
) -> (LraContext, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let ctx = LraContext::new(config, store.clone(), client);
    (ctx, store)
}

/// Context over a file store rooted at `config.data_dir`
pub fn file_context(config: CoordinatorConfig, client: Arc<ScriptedClient>) -> LraContext {
    let store = FileStore::open(&config.data_dir).unwrap();
    LraContext::new(config, Arc::new(store), client)
}
