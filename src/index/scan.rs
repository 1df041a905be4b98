use serde::{Deserialize, Serialize};

use crate::core::types::{Key, Record};

/// Bounds and pagination for a range query against an index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Inclusive lower bound; `None` starts at the leftmost key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_key: Option<Key>,
    /// Exclusive upper bound; `None` runs to the end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_key: Option<Key>,
    /// Maximum number of records to return; 0 means unlimited.
    #[serde(default)]
    pub limit: usize,
    /// Number of qualifying records to skip first.
    #[serde(default)]
    pub offset: usize,
}

/// Page of records produced by a range query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub records: Vec<Record>,
    pub total: usize,
    pub has_more: bool,
}
