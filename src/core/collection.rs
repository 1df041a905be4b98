use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::btree::IndexStats;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{compare_values, DocumentId, Key, Record, Value};
use crate::fulltext::inverted::InvertedIndex;
use crate::index::manager::IndexManager;
use crate::index::scan::{ScanOptions, ScanResult};
use crate::schema::schema::{CollectionSchema, IndexDefinition};
use crate::storage::file_provider::FileProvider;

pub const FULLTEXT_DIR: &str = "fulltext";

/// One collection: a clustered index holding the records, any number of
/// secondary indexes and an optional full-text index, kept mutually
/// consistent under a single writer.
///
/// Every write takes the collection lock exclusively; reads take it shared.
/// There is no rollback: a failure partway through a write surfaces to the
/// caller and may leave the indexes inconsistent until rebuilt.
#[derive(Debug)]
pub struct Collection {
    schema: CollectionSchema,
    clustered: Option<IndexManager>,
    secondary: HashMap<String, IndexManager>,
    fulltext: Option<InvertedIndex>,
    lock: RwLock<()>,
}

impl Collection {
    pub fn open(
        path: PathBuf,
        schema: CollectionSchema,
        provider: Arc<dyn FileProvider>,
        config: &Config,
    ) -> Result<Self> {
        let mut clustered = None;
        let mut secondary = HashMap::new();

        for definition in &schema.indexes {
            let manager = IndexManager::open(
                path.join(&definition.name),
                definition.clone(),
                provider.clone(),
                config.node_cache_capacity,
            )?;
            if definition.is_clustered {
                clustered = Some(manager);
            } else {
                secondary.insert(definition.name.clone(), manager);
            }
        }

        let fulltext = if schema.enable_full_text {
            Some(InvertedIndex::open(
                path.join(FULLTEXT_DIR),
                config.ngram_size,
                provider,
            )?)
        } else {
            None
        };

        Ok(Collection {
            schema,
            clustered,
            secondary,
            fulltext,
            lock: RwLock::new(()),
        })
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Inserts a record: clustered index first, then each secondary index
    /// whose partial filter matches, then the full-text index.
    pub fn insert(&self, record: &Record) -> Result<()> {
        let _guard = self.lock.write();
        let clustered = self.clustered()?;
        let key = clustered.extract_key(record);
        debug!(collection = %self.schema.name, key = %DocumentId::from_key(&key), "insert");

        clustered.insert(record)?;
        for index in self.secondary.values() {
            if matches_filter(index.definition(), record) {
                index.insert(record)?;
            }
        }

        if let Some(fulltext) = &self.fulltext {
            let text = self.full_text_content(record);
            if !text.is_empty() {
                fulltext.add_document(&DocumentId::from_key(&key), &text)?;
            }
        }
        Ok(())
    }

    /// Replaces `old` with `new` in every index. The clustered key may
    /// change; the full-text document id follows it.
    pub fn update(&self, old: &Record, new: &Record) -> Result<()> {
        let _guard = self.lock.write();
        let clustered = self.clustered()?;
        let old_key = clustered.extract_key(old);
        let new_key = clustered.extract_key(new);
        debug!(collection = %self.schema.name, key = %DocumentId::from_key(&old_key), "update");

        clustered.update(&old_key, &new_key, new)?;
        for index in self.secondary.values() {
            let was_indexed = matches_filter(index.definition(), old);
            let is_indexed = matches_filter(index.definition(), new);
            let old_idx_key = index.extract_key(old);
            let new_idx_key = index.extract_key(new);
            match (was_indexed, is_indexed) {
                (true, true) => index.update(&old_idx_key, &new_idx_key, new)?,
                (true, false) => index.delete(&old_idx_key)?,
                (false, true) => index.insert(new)?,
                (false, false) => {}
            }
        }

        if let Some(fulltext) = &self.fulltext {
            fulltext.remove_document(&DocumentId::from_key(&old_key))?;
            let text = self.full_text_content(new);
            if !text.is_empty() {
                fulltext.add_document(&DocumentId::from_key(&new_key), &text)?;
            }
        }
        Ok(())
    }

    /// Removes a record from every index.
    pub fn delete(&self, record: &Record) -> Result<()> {
        let _guard = self.lock.write();
        let clustered = self.clustered()?;
        let key = clustered.extract_key(record);
        debug!(collection = %self.schema.name, key = %DocumentId::from_key(&key), "delete");

        clustered.delete(&key)?;
        for index in self.secondary.values() {
            if matches_filter(index.definition(), record) {
                index.delete(&index.extract_key(record))?;
            }
        }

        if let Some(fulltext) = &self.fulltext {
            fulltext.remove_document(&DocumentId::from_key(&key))?;
        }
        Ok(())
    }

    /// Point lookup (or full ordered scan when `key` is `None`) against the
    /// clustered index.
    pub fn find(&self, key: Option<&Key>) -> Result<Vec<Record>> {
        let _guard = self.lock.read();
        self.clustered()?.search(key)
    }

    /// Lookup against a named secondary index; returns the projected
    /// records stored there.
    pub fn find_by_index(&self, index_name: &str, key: Option<&Key>) -> Result<Vec<Record>> {
        let _guard = self.lock.read();
        let index = self
            .secondary
            .get(index_name)
            .ok_or_else(|| Error::index_not_found(index_name))?;
        index.search(key)
    }

    /// Range query with pagination over the clustered index.
    pub fn scan(&self, options: &ScanOptions) -> Result<ScanResult> {
        let _guard = self.lock.read();
        self.clustered()?.scan(options)
    }

    /// Full-text query; returns matching document ids by descending score.
    pub fn search_full_text(&self, query: &str) -> Result<Vec<DocumentId>> {
        let _guard = self.lock.read();
        let fulltext = self.fulltext.as_ref().ok_or_else(|| {
            Error::invalid_collection(format!(
                "collection '{}' does not enable full-text search",
                self.schema.name
            ))
        })?;
        fulltext.search(query)
    }

    /// Structural statistics for every index of the collection.
    pub fn stats(&self) -> Result<Vec<IndexStats>> {
        let _guard = self.lock.read();
        let mut all = Vec::new();
        if let Some(clustered) = &self.clustered {
            all.push(clustered.stats()?);
        }
        for index in self.secondary.values() {
            all.push(index.stats()?);
        }
        Ok(all)
    }

    /// Re-derives every secondary index and the full-text index from the
    /// clustered records. This is the recovery path after a failed
    /// multi-index write left the collection inconsistent.
    pub fn rebuild_indexes(&self) -> Result<()> {
        let _guard = self.lock.write();
        let clustered = self.clustered()?;
        let records = clustered.search(None)?;
        debug!(collection = %self.schema.name, records = records.len(), "rebuilding secondary indexes");

        for index in self.secondary.values() {
            let matching: Vec<Record> = records
                .iter()
                .filter(|r| matches_filter(index.definition(), r))
                .cloned()
                .collect();
            index.build(&matching)?;
        }

        if let Some(fulltext) = &self.fulltext {
            fulltext.clear()?;
            for record in &records {
                let text = self.full_text_content(record);
                if text.is_empty() {
                    continue;
                }
                let key = clustered.extract_key(record);
                fulltext.add_document(&DocumentId::from_key(&key), &text)?;
            }
        }
        Ok(())
    }

    fn clustered(&self) -> Result<&IndexManager> {
        self.clustered.as_ref().ok_or_else(|| {
            Error::invalid_collection(format!(
                "collection '{}' has no clustered index",
                self.schema.name
            ))
        })
    }

    /// Space-joined values of every full-text column, skipping null or
    /// absent fields.
    fn full_text_content(&self, record: &Record) -> String {
        let mut parts = Vec::new();
        for column in self.schema.full_text_columns() {
            match record.get(&column.field_name) {
                None | Some(Value::Null) => {}
                Some(value) => parts.push(value.to_string()),
            }
        }
        parts.join(" ")
    }
}

/// A record belongs to a partial index when every filter condition matches;
/// an absent field only matches a null condition value.
fn matches_filter(definition: &IndexDefinition, record: &Record) -> bool {
    definition.partial_filter.iter().all(|condition| {
        let value = record.get(&condition.field).unwrap_or(&Value::Null);
        compare_values(value, &condition.value) == Ordering::Equal
    })
}
