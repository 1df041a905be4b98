use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::btree::{BTree, IndexStats};
use crate::core::error::{Error, Result};
use crate::core::types::{compare_keys, Key, Record, Value};
use crate::index::scan::{ScanOptions, ScanResult};
use crate::schema::schema::IndexDefinition;
use crate::storage::file_provider::FileProvider;
use crate::storage::node_store::NodeStore;

const ROOT_META_FILE: &str = "root.meta";

/// One persisted index: a directory of node files, a B+ tree over them and
/// a `root.meta` file recording the current root so the tree can be
/// reopened without scanning.
///
/// For a clustered index the stored value is the full record; for a
/// secondary index it is a projection of the key fields plus any declared
/// included fields.
pub struct IndexManager {
    definition: IndexDefinition,
    dir: PathBuf,
    provider: Arc<dyn FileProvider>,
    cache_capacity: usize,
    inner: RwLock<TreeState>,
}

struct TreeState {
    tree: BTree,
    persisted_root: Option<String>,
}

impl fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexManager")
            .field("definition", &self.definition)
            .field("dir", &self.dir)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

impl IndexManager {
    pub fn open(
        dir: PathBuf,
        definition: IndexDefinition,
        provider: Arc<dyn FileProvider>,
        cache_capacity: usize,
    ) -> Result<Self> {
        provider.create_directory(&dir)?;
        let root = load_root_id(provider.as_ref(), &dir)?;
        let tree = new_tree(&definition, provider.clone(), &dir, cache_capacity, root.clone());
        Ok(IndexManager {
            definition,
            dir,
            provider,
            cache_capacity,
            inner: RwLock::new(TreeState {
                tree,
                persisted_root: root,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn is_clustered(&self) -> bool {
        self.definition.is_clustered
    }

    /// The composite key of `record` under this index's key fields. Absent
    /// fields contribute null components.
    pub fn extract_key(&self, record: &Record) -> Key {
        self.definition
            .keys
            .iter()
            .map(|field| record.get(&field.name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Wipes the index directory and re-inserts `records` from scratch.
    pub fn build(&self, records: &[Record]) -> Result<()> {
        let mut state = self.inner.write();
        debug!(index = %self.definition.name, records = records.len(), "rebuilding index");

        for entry in self.provider.read_directory(&self.dir)? {
            if !entry.is_directory {
                self.provider.delete_file(&self.dir, &entry.name)?;
            }
        }
        state.tree = new_tree(
            &self.definition,
            self.provider.clone(),
            &self.dir,
            self.cache_capacity,
            None,
        );
        state.persisted_root = None;

        for record in records {
            let key = self.extract_key(record);
            let value = self.entry_value(record);
            state.tree.insert(key, value)?;
        }
        self.persist_root(&mut state)
    }

    pub fn insert(&self, record: &Record) -> Result<()> {
        let mut state = self.inner.write();
        let key = self.extract_key(record);
        let value = self.entry_value(record);
        state.tree.insert(key, value)?;
        self.persist_root(&mut state)
    }

    /// Removes every entry whose key equals `key`.
    pub fn delete(&self, key: &Key) -> Result<()> {
        let mut state = self.inner.write();
        state.tree.delete(key)?;
        self.persist_root(&mut state)
    }

    /// Clustered indexes update in place when the key is unchanged;
    /// secondary indexes always delete then re-insert.
    pub fn update(&self, old_key: &Key, new_key: &Key, record: &Record) -> Result<()> {
        let mut state = self.inner.write();
        let value = self.entry_value(record);
        if self.definition.is_clustered && compare_keys(old_key, new_key) == Ordering::Equal {
            state.tree.update(new_key, value)?;
        } else {
            state.tree.delete(old_key)?;
            state.tree.insert(new_key.clone(), value)?;
        }
        self.persist_root(&mut state)
    }

    /// All records whose key equals `key`, or every record in key order
    /// when `key` is `None`.
    ///
    /// Lookups load nodes into the store's read cache, so even the read
    /// path takes the write half of the index lock; callers get shared
    /// access through the collection-level lock above this one.
    pub fn search(&self, key: Option<&Key>) -> Result<Vec<Record>> {
        let mut state = self.inner.write();
        let values = state.tree.search(key)?;
        to_records(values)
    }

    /// Range query over the leaf chain with offset/limit pagination.
    pub fn scan(&self, options: &ScanOptions) -> Result<ScanResult> {
        let mut state = self.inner.write();
        let (values, has_more) = state.tree.range_scan(
            options.start_key.as_ref(),
            options.end_key.as_ref(),
            options.limit,
            options.offset,
        )?;
        let records = to_records(values)?;
        Ok(ScanResult {
            total: records.len(),
            has_more,
            records,
        })
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let mut state = self.inner.write();
        state.tree.stats(&self.definition.name)
    }

    fn entry_value(&self, record: &Record) -> Value {
        if self.definition.is_clustered {
            Value::Map(record.clone())
        } else {
            Value::Map(self.project(record))
        }
    }

    /// Key fields plus declared included fields, for covering lookups.
    fn project(&self, record: &Record) -> Record {
        let mut projected = Record::new();
        for field in &self.definition.keys {
            if let Some(value) = record.get(&field.name) {
                projected.insert(field.name.clone(), value.clone());
            }
        }
        for field in &self.definition.includes {
            if let Some(value) = record.get(field) {
                projected.insert(field.clone(), value.clone());
            }
        }
        projected
    }

    /// Writes `root.meta` whenever a mutation moved the root.
    fn persist_root(&self, state: &mut TreeState) -> Result<()> {
        let current = state.tree.root_id().cloned();
        if current == state.persisted_root {
            return Ok(());
        }
        let contents = current.clone().unwrap_or_default();
        self.provider
            .write_file(&self.dir, ROOT_META_FILE, contents.as_bytes())?;
        state.persisted_root = current;
        Ok(())
    }
}

fn new_tree(
    definition: &IndexDefinition,
    provider: Arc<dyn FileProvider>,
    dir: &Path,
    cache_capacity: usize,
    root: Option<String>,
) -> BTree {
    let store = NodeStore::new(provider, dir.to_path_buf(), cache_capacity);
    // A clustered index enforces key uniqueness regardless of its declared
    // unique flag.
    let unique = definition.is_clustered || definition.is_unique;
    BTree::new(store, root, definition.page_size, unique)
}

fn load_root_id(provider: &dyn FileProvider, dir: &Path) -> Result<Option<String>> {
    if !provider.file_exists(dir, ROOT_META_FILE)? {
        return Ok(None);
    }
    let data = provider.read_file(dir, ROOT_META_FILE)?;
    let id = String::from_utf8_lossy(&data).trim().to_string();
    Ok(if id.is_empty() { None } else { Some(id) })
}

fn to_records(values: Vec<Value>) -> Result<Vec<Record>> {
    values
        .into_iter()
        .map(|value| match value {
            Value::Map(record) => Ok(record),
            other => Err(Error::corrupted(format!(
                "leaf value is not a record: {}",
                other
            ))),
        })
        .collect()
}
