use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;

use crate::btree::node::Node;
use crate::core::error::{Error, Result};
use crate::storage::file_provider::FileProvider;

const NODE_FILE_EXT: &str = "json";

/// Per-index node persistence. Each node lives in its own file inside the
/// index directory; a tree mutation stages every node it touches here and
/// flushes them in one pass at the end of the operation.
///
/// Clean (already-flushed) nodes sit in a bounded LRU read cache. Staged
/// nodes live in the unbounded working map until flushed, so cache eviction
/// can never drop an unwritten change.
pub struct NodeStore {
    provider: Arc<dyn FileProvider>,
    dir: PathBuf,
    clean: LruCache<String, Node>,
    dirty: HashMap<String, Node>,
    removed: HashSet<String>,
}

impl NodeStore {
    pub fn new(provider: Arc<dyn FileProvider>, dir: PathBuf, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        NodeStore {
            provider,
            dir,
            clean: LruCache::new(capacity),
            dirty: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    /// Loads a node by identifier, preferring the staged copy of the current
    /// operation over the clean cache over the file on disk.
    pub fn load(&mut self, id: &str) -> Result<Node> {
        if let Some(node) = self.dirty.get(id) {
            return Ok(node.clone());
        }
        if self.removed.contains(id) {
            return Err(Error::corrupted(format!(
                "node '{}' referenced after removal",
                id
            )));
        }
        if let Some(node) = self.clean.get(id) {
            return Ok(node.clone());
        }
        let data = self.provider.read_file(&self.dir, &node_file_name(id))?;
        let node: Node = serde_json::from_slice(&data)?;
        self.clean.put(id.to_string(), node.clone());
        Ok(node)
    }

    /// Stages a modified (or freshly created) node for the next flush.
    pub fn stage(&mut self, node: Node) {
        self.removed.remove(&node.id);
        self.clean.pop(&node.id);
        self.dirty.insert(node.id.clone(), node);
    }

    /// Marks a node's file for deletion at the next flush.
    pub fn remove(&mut self, id: &str) {
        self.dirty.remove(id);
        self.clean.pop(id);
        self.removed.insert(id.to_string());
    }

    /// Writes staged nodes back one by one and deletes removed ones. A
    /// failure mid-flush leaves the remaining nodes unwritten; the caller
    /// must treat that as fatal for the index.
    pub fn flush(&mut self) -> Result<()> {
        let removed: Vec<String> = self.removed.drain().collect();
        for id in removed {
            match self.provider.delete_file(&self.dir, &node_file_name(&id)) {
                Ok(()) => {}
                // A node created and merged away within one operation never
                // reached disk.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        let dirty: Vec<(String, Node)> = self.dirty.drain().collect();
        for (id, node) in dirty {
            let data = serde_json::to_vec_pretty(&node)?;
            self.provider
                .write_file(&self.dir, &node_file_name(&id), &data)?;
            self.clean.put(id, node);
        }
        Ok(())
    }

    /// Drops all staged work, e.g. after an in-memory failure before flush.
    pub fn discard(&mut self) {
        self.dirty.clear();
        self.removed.clear();
    }

    /// Forgets every cached node. Used when an index is rebuilt from scratch.
    pub fn clear_cache(&mut self) {
        self.clean.clear();
        self.dirty.clear();
        self.removed.clear();
    }
}

pub fn node_file_name(id: &str) -> String {
    format!("{}.{}", id, NODE_FILE_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::Node;
    use crate::core::types::Value;
    use crate::storage::file_provider::DiskFileProvider;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> NodeStore {
        NodeStore::new(Arc::new(DiskFileProvider), dir.path().to_path_buf(), 8)
    }

    #[test]
    fn staged_node_is_visible_before_flush_and_persisted_after() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);

        let mut node = Node::new_leaf("n1".to_string(), 4);
        node.keys.push(vec![Value::Int(1)]);
        node.values.push(Value::Int(10));
        store.stage(node);

        assert_eq!(store.load("n1").unwrap().keys.len(), 1);
        store.flush().unwrap();

        // A fresh store sees only what reached disk.
        let mut reopened = NodeStore::new(
            Arc::new(DiskFileProvider),
            tmp.path().to_path_buf(),
            8,
        );
        let loaded = reopened.load("n1").unwrap();
        assert_eq!(loaded.keys, vec![vec![Value::Int(1)]]);
        assert_eq!(loaded.values, vec![Value::Int(10)]);
    }

    #[test]
    fn discard_drops_staged_changes() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.stage(Node::new_leaf("n1".to_string(), 4));
        store.discard();
        store.flush().unwrap();
        assert!(store.load("n1").is_err());
    }

    #[test]
    fn removed_node_file_is_deleted_on_flush() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.stage(Node::new_leaf("n1".to_string(), 4));
        store.flush().unwrap();
        assert!(tmp.path().join("n1.json").exists());

        store.remove("n1");
        store.flush().unwrap();
        assert!(!tmp.path().join("n1.json").exists());
    }

    #[test]
    fn remove_of_never_flushed_node_is_silent() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.stage(Node::new_leaf("ephemeral".to_string(), 4));
        store.remove("ephemeral");
        store.flush().unwrap();
    }
}
