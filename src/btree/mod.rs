pub mod node;

mod delete;
mod stats;

pub use stats::IndexStats;

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::trace;
use uuid::Uuid;

use crate::btree::node::Node;
use crate::core::error::{Error, Result};
use crate::core::types::{compare_keys, Key, Value};
use crate::storage::node_store::NodeStore;

/// Ancestor trail recorded while descending from the root: the node passed
/// through and the child slot taken out of it.
struct PathEntry {
    id: String,
    child: usize,
}

/// Persistent B+ tree over composite keys. Every mutation stages the nodes
/// it touches in the store and flushes them at the end of the operation; an
/// in-memory failure before the flush leaves the on-disk tree untouched.
pub struct BTree {
    store: NodeStore,
    root_id: Option<String>,
    page_size: usize,
    unique: bool,
}

impl BTree {
    pub fn new(
        store: NodeStore,
        root_id: Option<String>,
        page_size: usize,
        unique: bool,
    ) -> Self {
        BTree {
            store,
            root_id,
            page_size: page_size.max(1),
            unique,
        }
    }

    pub fn root_id(&self) -> Option<&String> {
        self.root_id.as_ref()
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub(crate) fn store_mut(&mut self) -> &mut NodeStore {
        &mut self.store
    }

    /// Inserts a key/value pair. Fails with a duplicate-key error when the
    /// tree enforces uniqueness and an equal key already exists; otherwise
    /// equal keys are kept in first-in-first-out order.
    pub fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        match self.insert_staged(key, value) {
            Ok(()) => self.store.flush(),
            Err(e) => {
                self.store.discard();
                Err(e)
            }
        }
    }

    fn insert_staged(&mut self, key: Key, value: Value) -> Result<()> {
        let root_id = match &self.root_id {
            None => {
                let mut root = Node::new_leaf(new_node_id(), self.page_size);
                root.keys.push(key);
                root.values.push(value);
                self.root_id = Some(root.id.clone());
                self.store.stage(root);
                return Ok(());
            }
            Some(id) => id.clone(),
        };

        let (mut leaf, path) = self.descend(&root_id, Some(&key))?;

        if self.unique {
            let exists = leaf
                .keys
                .iter()
                .any(|k| compare_keys(k, &key) == Ordering::Equal);
            if exists {
                return Err(Error::duplicate_key(&key));
            }
        }

        // Equal keys land after their elders, keeping duplicates FIFO.
        let mut pos = 0;
        while pos < leaf.keys.len() && compare_keys(&key, &leaf.keys[pos]) != Ordering::Less {
            pos += 1;
        }
        leaf.keys.insert(pos, key);
        leaf.values.insert(pos, value);

        if leaf.is_overflowing() {
            self.split_leaf(leaf, path)
        } else {
            self.store.stage(leaf);
            Ok(())
        }
    }

    fn split_leaf(&mut self, mut leaf: Node, path: Vec<PathEntry>) -> Result<()> {
        let mid = leaf.keys.len() / 2;
        let mut right = Node::new_leaf(new_node_id(), self.page_size);
        right.keys = leaf.keys.split_off(mid);
        right.values = leaf.values.split_off(mid);
        right.prev = Some(leaf.id.clone());
        right.next = leaf.next.take();
        leaf.next = Some(right.id.clone());

        if let Some(next_id) = right.next.clone() {
            let mut next = self.store.load(&next_id)?;
            next.prev = Some(right.id.clone());
            self.store.stage(next);
        }

        trace!(left = %leaf.id, right = %right.id, "leaf split");

        let separator = right.keys[0].clone();
        let left_id = leaf.id.clone();
        let right_id = right.id.clone();
        self.store.stage(leaf);
        self.store.stage(right);
        self.promote(separator, left_id, right_id, path)
    }

    fn split_internal(&mut self, mut node: Node, path: Vec<PathEntry>) -> Result<()> {
        let mid = node.keys.len() / 2;
        let mut right = Node::new_internal(new_node_id(), self.page_size);
        right.keys = node.keys.split_off(mid + 1);
        right.children = node.children.split_off(mid + 1);
        // The middle key moves up; it is not copied into either half.
        let separator = node
            .keys
            .pop()
            .ok_or_else(|| Error::corrupted(format!("split of empty internal node '{}'", node.id)))?;

        for child_id in right.children.clone() {
            let mut child = self.store.load(&child_id)?;
            child.parent = Some(right.id.clone());
            self.store.stage(child);
        }

        trace!(left = %node.id, right = %right.id, "internal split");

        let left_id = node.id.clone();
        let right_id = right.id.clone();
        self.store.stage(node);
        self.store.stage(right);
        self.promote(separator, left_id, right_id, path)
    }

    /// Hangs `right_id` next to `left_id` under the parent recorded in the
    /// descent path, growing a new root when the split reached the top.
    fn promote(
        &mut self,
        separator: Key,
        left_id: String,
        right_id: String,
        mut path: Vec<PathEntry>,
    ) -> Result<()> {
        match path.pop() {
            None => {
                let mut root = Node::new_internal(new_node_id(), self.page_size);
                root.keys.push(separator);
                root.children.push(left_id.clone());
                root.children.push(right_id.clone());

                let mut left = self.store.load(&left_id)?;
                left.parent = Some(root.id.clone());
                self.store.stage(left);
                let mut right = self.store.load(&right_id)?;
                right.parent = Some(root.id.clone());
                self.store.stage(right);

                self.root_id = Some(root.id.clone());
                self.store.stage(root);
                Ok(())
            }
            Some(entry) => {
                let mut parent = self.store.load(&entry.id)?;
                parent.keys.insert(entry.child, separator);
                parent.children.insert(entry.child + 1, right_id.clone());

                let mut right = self.store.load(&right_id)?;
                right.parent = Some(parent.id.clone());
                self.store.stage(right);

                if parent.is_overflowing() {
                    self.split_internal(parent, path)
                } else {
                    self.store.stage(parent);
                    Ok(())
                }
            }
        }
    }

    /// Returns all values whose key equals `key`, or every value in key
    /// order when `key` is `None`.
    pub fn search(&mut self, key: Option<&Key>) -> Result<Vec<Value>> {
        match key {
            None => self.scan_all(),
            Some(k) => self.search_key(k),
        }
    }

    fn search_key(&mut self, key: &Key) -> Result<Vec<Value>> {
        let root_id = match &self.root_id {
            None => return Ok(Vec::new()),
            Some(id) => id.clone(),
        };
        let (leaf, _) = self.descend(&root_id, Some(key))?;

        let mut results = matching_values(&leaf, key);

        // A duplicate run can straddle a split, so follow the chain in both
        // directions while the neighboring leaf still holds the key.
        let mut front: Vec<Vec<Value>> = Vec::new();
        let mut prev_id = leaf.prev.clone();
        while let Some(id) = prev_id {
            let prev = self.store.load(&id)?;
            let matched = matching_values(&prev, key);
            if matched.is_empty() {
                break;
            }
            prev_id = prev.prev.clone();
            front.push(matched);
        }
        // `front` holds nearer leaves first; prepending in that order ends
        // with the farthest (oldest) leaf at the front of the results.
        for older in front {
            let mut merged = older;
            merged.extend(results);
            results = merged;
        }

        let mut next_id = leaf.next.clone();
        while let Some(id) = next_id {
            let next = self.store.load(&id)?;
            let matched = matching_values(&next, key);
            if matched.is_empty() {
                break;
            }
            next_id = next.next.clone();
            results.extend(matched);
        }

        Ok(results)
    }

    fn scan_all(&mut self) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        self.walk_leaves(|leaf| {
            results.extend(leaf.values.iter().cloned());
            true
        })?;
        Ok(results)
    }

    /// Walks the leaf chain from the leftmost leaf, invoking `visit` per
    /// leaf until it returns `false`. Guards against pointer cycles and
    /// stops if a sibling file has gone missing.
    pub(crate) fn walk_leaves<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&Node) -> bool,
    {
        let root_id = match &self.root_id {
            None => return Ok(()),
            Some(id) => id.clone(),
        };
        let (mut leaf, _) = self.descend(&root_id, None)?;
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            if !visited.insert(leaf.id.clone()) {
                break;
            }
            if !visit(&leaf) {
                break;
            }
            match &leaf.next {
                None => break,
                Some(next_id) => match self.store.load(next_id) {
                    Ok(next) => leaf = next,
                    Err(e) if e.is_not_found() => break,
                    Err(e) => return Err(e),
                },
            }
        }
        Ok(())
    }

    /// Replaces the value bound to `key`. Only meaningful on unique trees;
    /// non-unique trees reject the operation.
    pub fn update(&mut self, key: &Key, value: Value) -> Result<()> {
        if !self.unique {
            return Err(Error::unsupported_operation(
                "in-place update requires a unique index",
            ));
        }
        let root_id = match &self.root_id {
            None => return Err(Error::tree_empty()),
            Some(id) => id.clone(),
        };
        let (mut leaf, _) = self.descend(&root_id, Some(key))?;
        let pos = leaf
            .keys
            .iter()
            .position(|k| compare_keys(k, key) == Ordering::Equal);
        match pos {
            None => Err(Error::key_not_found(key)),
            Some(pos) => {
                leaf.values[pos] = value;
                self.store.stage(leaf);
                self.store.flush()
            }
        }
    }

    /// Range walk over the leaf chain: yields values whose key is at least
    /// `start` (when given) and strictly below `end` (when given), honoring
    /// `offset` and `limit` (0 = unlimited). The second return value tells
    /// whether qualifying entries remained beyond the limit.
    pub fn range_scan(
        &mut self,
        start: Option<&Key>,
        end: Option<&Key>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Value>, bool)> {
        let root_id = match &self.root_id {
            None => return Ok((Vec::new(), false)),
            Some(id) => id.clone(),
        };
        let (mut leaf, _) = self.descend(&root_id, start)?;

        let mut results = Vec::new();
        let mut has_more = false;
        let mut skipped = 0;
        let mut visited: HashSet<String> = HashSet::new();

        'walk: loop {
            if !visited.insert(leaf.id.clone()) {
                break;
            }
            for (key, value) in leaf.keys.iter().zip(leaf.values.iter()) {
                if let Some(start) = start {
                    if compare_keys(key, start) == Ordering::Less {
                        continue;
                    }
                }
                if let Some(end) = end {
                    if compare_keys(key, end) != Ordering::Less {
                        break 'walk;
                    }
                }
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                if limit > 0 && results.len() >= limit {
                    has_more = true;
                    break 'walk;
                }
                results.push(value.clone());
            }
            match &leaf.next {
                None => break,
                Some(next_id) => match self.store.load(next_id) {
                    Ok(next) => leaf = next,
                    Err(e) if e.is_not_found() => break,
                    Err(e) => return Err(e),
                },
            }
        }
        Ok((results, has_more))
    }

    /// Descends to the leaf responsible for `key` (the leftmost leaf when
    /// `key` is `None`), recording the path taken. At each internal node the
    /// chosen child is the first whose upper separator is strictly greater
    /// than the key, so equal keys consistently descend right.
    fn descend(&mut self, root_id: &str, key: Option<&Key>) -> Result<(Node, Vec<PathEntry>)> {
        let mut node = self.store.load(root_id)?;
        let mut path = Vec::new();

        while !node.is_leaf() {
            let child = match key {
                None => 0,
                Some(key) => {
                    let mut pos = 0;
                    while pos < node.keys.len()
                        && compare_keys(key, &node.keys[pos]) != Ordering::Less
                    {
                        pos += 1;
                    }
                    pos
                }
            };
            let child_id = node
                .children
                .get(child)
                .ok_or_else(|| {
                    Error::corrupted(format!("node '{}' has no child at slot {}", node.id, child))
                })?
                .clone();
            path.push(PathEntry {
                id: node.id.clone(),
                child,
            });
            node = self.store.load(&child_id)?;
        }
        Ok((node, path))
    }
}

fn matching_values(leaf: &Node, key: &Key) -> Vec<Value> {
    leaf.keys
        .iter()
        .zip(leaf.values.iter())
        .filter(|(k, _)| compare_keys(k, key) == Ordering::Equal)
        .map(|(_, v)| v.clone())
        .collect()
}

fn new_node_id() -> String {
    Uuid::new_v4().to_string()
}
