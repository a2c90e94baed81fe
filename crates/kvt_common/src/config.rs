use serde::{Deserialize, Serialize};

use crate::error::{KvtError, KvtResult};
use crate::types::CcScheme;

/// Top-level configuration: engine plus adapter sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvtConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
}

impl KvtConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> KvtResult<Self> {
        toml::from_str(text).map_err(|e| KvtError::Internal(format!("config parse error: {e}")))
    }
}

/// Engine section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrency-control scheme the engine runs under.
    #[serde(default)]
    pub cc_scheme: CcScheme,
}

/// Physical layout used by the key-column-value adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnLayout {
    /// All columns of a key serialized into one engine entry.
    #[default]
    SerializedColumns,
    /// One engine entry per column, column joined into the key with a
    /// reserved separator byte. Requires range-partitioned tables.
    CompositeKey,
}

impl ColumnLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnLayout::SerializedColumns => "serialized-columns",
            ColumnLayout::CompositeKey => "composite-key",
        }
    }
}

impl std::fmt::Display for ColumnLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Which physical layout the adapter maps columns onto.
    #[serde(default)]
    pub layout: ColumnLayout,
    /// Upper bound on entries fetched per prefix scan in the
    /// composite-key layout.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

fn default_scan_limit() -> usize {
    10_000
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            layout: ColumnLayout::default(),
            scan_limit: default_scan_limit(),
        }
    }
}
