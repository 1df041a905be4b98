use serde::{Deserialize, Serialize};

use crate::core::types::{Key, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Leaf,
    Internal,
}

/// One B+ tree node, persisted as a single file in the index directory.
///
/// For a leaf, `values` holds the stored records in key order and
/// `prev`/`next` link the leaf chain. For an internal node, `children`
/// holds child node identifiers, always exactly `keys.len() + 1` of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub page_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub keys: Vec<Key>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl Node {
    pub fn new_leaf(id: String, page_size: usize) -> Self {
        Node {
            id,
            kind: NodeKind::Leaf,
            page_size,
            parent: None,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            prev: None,
            next: None,
        }
    }

    pub fn new_internal(id: String, page_size: usize) -> Self {
        Node {
            kind: NodeKind::Internal,
            ..Node::new_leaf(id, page_size)
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    /// A node overflows once it holds more than `page_size` keys and must
    /// be split.
    pub fn is_overflowing(&self) -> bool {
        self.keys.len() > self.page_size
    }

    /// Minimum key count for a non-root node: ceil(page_size / 2).
    pub fn min_keys(&self) -> usize {
        (self.page_size + 1) / 2
    }

    pub fn is_underfull(&self) -> bool {
        self.keys.len() < self.min_keys()
    }

    /// Whether this node can give one entry to a sibling without dropping
    /// below the minimum itself.
    pub fn can_lend(&self) -> bool {
        self.keys.len() > self.min_keys()
    }
}
