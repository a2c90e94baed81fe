//! Process-wide engine slot for host bindings.
//!
//! The engine itself is an explicit handle (`KvtEngine::new`); this
//! module is the convenience wrapper a language binding routes through:
//! `initialize` installs an instance, `global` hands it out, `shutdown`
//! drops it. Before `initialize` (or after `shutdown`) every access
//! fails `NotInitialized`.

use std::sync::Arc;

use parking_lot::RwLock;

use kvt_common::config::KvtConfig;
use kvt_common::error::{KvtError, KvtResult};

use crate::engine::KvtEngine;

static ENGINE: RwLock<Option<Arc<KvtEngine>>> = RwLock::new(None);

/// Install a freshly constructed engine as the process-wide instance.
/// An already-installed engine is replaced, which doubles as a
/// clear-storage operation: the previous instance's tables die with it
/// (outstanding `Arc` handles excepted).
pub fn initialize(config: &KvtConfig) -> Arc<KvtEngine> {
    let engine = Arc::new(KvtEngine::new(&config.engine));
    *ENGINE.write() = Some(Arc::clone(&engine));
    tracing::debug!(scheme = %config.engine.cc_scheme, "process-wide engine initialized");
    engine
}

/// Drop the process-wide engine. Idempotent.
pub fn shutdown() {
    *ENGINE.write() = None;
    tracing::debug!("process-wide engine shut down");
}

/// The process-wide engine, or `NotInitialized`.
pub fn global() -> KvtResult<Arc<KvtEngine>> {
    ENGINE.read().clone().ok_or(KvtError::NotInitialized)
}
