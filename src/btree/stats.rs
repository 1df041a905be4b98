use serde::{Deserialize, Serialize};

use crate::btree::BTree;
use crate::core::error::Result;

/// Structural counters for one index, computed by a full traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub index_name: String,
    pub node_count: usize,
    pub row_count: usize,
    pub height: usize,
    pub page_size: usize,
}

impl BTree {
    pub fn stats(&mut self, index_name: &str) -> Result<IndexStats> {
        let mut stats = IndexStats {
            index_name: index_name.to_string(),
            node_count: 0,
            row_count: 0,
            height: 0,
            page_size: self.page_size,
        };

        let root_id = match self.root_id() {
            None => return Ok(stats),
            Some(id) => id.clone(),
        };

        let mut frontier = vec![(root_id, 1usize)];
        while let Some((id, depth)) = frontier.pop() {
            let node = self.store_mut().load(&id)?;
            stats.node_count += 1;
            stats.height = stats.height.max(depth);
            if node.is_leaf() {
                stats.row_count += node.keys.len();
            } else {
                for child in &node.children {
                    frontier.push((child.clone(), depth + 1));
                }
            }
        }
        Ok(stats)
    }
}
