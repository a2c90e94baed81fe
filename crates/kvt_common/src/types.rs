use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KvtError;

/// The universal key/value type: an opaque byte sequence, ordered
/// lexicographically. `Vec<u8>` already compares byte-for-byte, so no
/// wrapper is needed.
pub type ByteString = Vec<u8>;

/// Unique identifier for a table. Ids are dense and monotonically
/// increasing within a process, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table:{}", self.0)
    }
}

/// Unique identifier for a transaction. Monotonic, never reused.
/// `TxnId(0)` is the auto-commit sentinel: operations carrying it run
/// one-shot against committed state with no transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(pub u64);

impl TxnId {
    pub const AUTO_COMMIT: TxnId = TxnId(0);

    pub fn is_auto_commit(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// How a table's keyspace is organized. Range-partitioned tables keep
/// keys ordered and accept range scans; hash-partitioned tables reject
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partitioning {
    Hash,
    Range,
}

impl Partitioning {
    pub fn as_str(self) -> &'static str {
        match self {
            Partitioning::Hash => "hash",
            Partitioning::Range => "range",
        }
    }

    pub fn supports_scan(self) -> bool {
        matches!(self, Partitioning::Range)
    }
}

impl fmt::Display for Partitioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partitioning {
    type Err = KvtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash" => Ok(Partitioning::Hash),
            "range" => Ok(Partitioning::Range),
            other => Err(KvtError::InvalidPartitionMethod(other.to_string())),
        }
    }
}

/// Concurrency-control scheme the engine runs under. A deployment picks
/// one at engine construction; all four share the same operation
/// contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CcScheme {
    /// No coordination at all: reads and writes hit committed state
    /// directly, writers overwrite.
    NoCc,
    /// Mutual exclusion: at most one transaction live at a time.
    Serialized,
    /// Strict two-phase locking with non-blocking acquisition; conflicts
    /// surface as `KeyIsLocked`.
    #[default]
    TwoPhaseLocking,
    /// Optimistic validation: versions observed at read time are
    /// re-checked at commit.
    Optimistic,
}

impl CcScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            CcScheme::NoCc => "no-cc",
            CcScheme::Serialized => "serialized",
            CcScheme::TwoPhaseLocking => "two-phase-locking",
            CcScheme::Optimistic => "optimistic",
        }
    }

    /// True when one-shot (auto-commit) writes and deletes are permitted.
    /// Locking and optimistic schemes forbid them to preserve their
    /// commit-time discipline.
    pub fn allows_one_shot_writes(self) -> bool {
        matches!(self, CcScheme::NoCc | CcScheme::Serialized)
    }
}

impl fmt::Display for CcScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CcScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-cc" | "nocc" => Ok(CcScheme::NoCc),
            "serialized" => Ok(CcScheme::Serialized),
            "two-phase-locking" | "2pl" => Ok(CcScheme::TwoPhaseLocking),
            "optimistic" | "occ" => Ok(CcScheme::Optimistic),
            other => Err(format!("unknown concurrency-control scheme '{other}'")),
        }
    }
}

/// One operation in a batch request. Operations in a batch share a
/// transaction id and observe each other's effects under the normal
/// visibility rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Get {
        table: TableId,
        key: ByteString,
    },
    Set {
        table: TableId,
        key: ByteString,
        value: ByteString,
    },
    Del {
        table: TableId,
        key: ByteString,
    },
}

/// Per-operation outcome of a batch request. `value` is set only for a
/// successful `Get`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOpResult {
    pub error: Option<KvtError>,
    pub value: Option<ByteString>,
}

impl BatchOpResult {
    pub fn ok(value: Option<ByteString>) -> Self {
        Self { error: None, value }
    }

    pub fn err(error: KvtError) -> Self {
        Self {
            error: Some(error),
            value: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
