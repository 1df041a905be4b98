use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::analysis::ngram::NGramTokenizer;
use crate::core::error::Result;
use crate::core::types::DocumentId;
use crate::fulltext::posting::PostingList;
use crate::storage::file_provider::FileProvider;

const TERM_FILE_PREFIX: &str = "term_";
const TERM_FILE_EXT: &str = ".json";

/// File-backed inverted index over n-grams. Each term owns one posting-list
/// file; an in-memory write-through cache mirrors every file so document
/// removal can scan the cache exhaustively.
pub struct InvertedIndex {
    dir: PathBuf,
    provider: Arc<dyn FileProvider>,
    tokenizer: NGramTokenizer,
    cache: RwLock<HashMap<String, PostingList>>,
}

impl fmt::Debug for InvertedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvertedIndex")
            .field("dir", &self.dir)
            .field("tokenizer", &self.tokenizer)
            .finish()
    }
}

/// Counters exposed for inspection.
#[derive(Debug, Clone)]
pub struct FullTextStats {
    pub term_count: usize,
    pub ngram_size: usize,
}

impl InvertedIndex {
    /// Opens (or creates) the index directory and preloads every existing
    /// posting list, so the cache is complete from the start.
    pub fn open(
        dir: PathBuf,
        ngram_size: usize,
        provider: Arc<dyn FileProvider>,
    ) -> Result<Self> {
        provider.create_directory(&dir)?;

        let mut cache = HashMap::new();
        for entry in provider.read_directory(&dir)? {
            if entry.is_directory
                || !entry.name.starts_with(TERM_FILE_PREFIX)
                || !entry.name.ends_with(TERM_FILE_EXT)
            {
                continue;
            }
            let data = provider.read_file(&dir, &entry.name)?;
            let list: PostingList = serde_json::from_slice(&data)?;
            cache.insert(list.term.clone(), list);
        }

        Ok(InvertedIndex {
            dir,
            provider,
            tokenizer: NGramTokenizer::new(if ngram_size == 0 { 3 } else { ngram_size }),
            cache: RwLock::new(cache),
        })
    }

    /// Indexes `text` under `doc_id`, replacing whatever that document had
    /// contributed before.
    pub fn add_document(&self, doc_id: &DocumentId, text: &str) -> Result<()> {
        let mut cache = self.cache.write();
        self.remove_locked(&mut cache, doc_id)?;

        let mut frequencies: HashMap<String, u64> = HashMap::new();
        for gram in self.tokenizer.tokenize(text) {
            *frequencies.entry(gram).or_insert(0) += 1;
        }
        trace!(doc = %doc_id, terms = frequencies.len(), "indexing document");

        for (term, frequency) in frequencies {
            let list = cache
                .entry(term.clone())
                .or_insert_with(|| PostingList::new(term));
            list.add(doc_id, frequency);
            self.save_list(list)?;
        }
        Ok(())
    }

    /// Removes every posting-list entry referencing `doc_id`, deleting
    /// posting lists that become empty.
    pub fn remove_document(&self, doc_id: &DocumentId) -> Result<()> {
        let mut cache = self.cache.write();
        self.remove_locked(&mut cache, doc_id)
    }

    /// Tokenizes the query the same way documents are indexed, sums
    /// per-document frequencies across all matched terms and returns
    /// document ids by descending score (ascending id on ties).
    pub fn search(&self, query: &str) -> Result<Vec<DocumentId>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let cache = self.cache.read();

        let mut scores: HashMap<DocumentId, u64> = HashMap::new();
        for gram in self.tokenizer.tokenize(query) {
            if let Some(list) = cache.get(&gram) {
                for tf in &list.documents {
                    *scores.entry(tf.doc_id.clone()).or_insert(0) += tf.frequency;
                }
            }
        }

        let mut ranked: Vec<(DocumentId, u64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().map(|(doc, _)| doc).collect())
    }

    /// Deletes every posting list. Used when the index is rebuilt.
    pub fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write();
        for term in cache.keys() {
            self.provider.delete_file(&self.dir, &term_file_name(term))?;
        }
        cache.clear();
        Ok(())
    }

    pub fn stats(&self) -> FullTextStats {
        FullTextStats {
            term_count: self.cache.read().len(),
            ngram_size: self.tokenizer.size(),
        }
    }

    fn remove_locked(
        &self,
        cache: &mut HashMap<String, PostingList>,
        doc_id: &DocumentId,
    ) -> Result<()> {
        let mut emptied = Vec::new();
        for (term, list) in cache.iter_mut() {
            if !list.remove(doc_id) {
                continue;
            }
            if list.is_empty() {
                emptied.push(term.clone());
            } else {
                self.save_list(list)?;
            }
        }
        for term in emptied {
            cache.remove(&term);
            self.provider.delete_file(&self.dir, &term_file_name(&term))?;
            trace!(term = %term, "posting list emptied");
        }
        Ok(())
    }

    fn save_list(&self, list: &PostingList) -> Result<()> {
        let data = serde_json::to_vec_pretty(list)?;
        self.provider
            .write_file(&self.dir, &term_file_name(&list.term), &data)
    }
}

/// Posting-list file name: hexadecimal octets of the term, so any token is
/// a safe file name.
fn term_file_name(term: &str) -> String {
    let mut hex = String::with_capacity(term.len() * 2);
    for byte in term.as_bytes() {
        hex.push_str(&format!("{:02x}", byte));
    }
    format!("{}{}{}", TERM_FILE_PREFIX, hex, TERM_FILE_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file_provider::DiskFileProvider;
    use tempfile::TempDir;

    fn doc(id: &str) -> DocumentId {
        DocumentId(id.to_string())
    }

    fn index(tmp: &TempDir) -> InvertedIndex {
        InvertedIndex::open(tmp.path().to_path_buf(), 3, Arc::new(DiskFileProvider)).unwrap()
    }

    #[test]
    fn added_document_is_searchable_by_its_ngrams() {
        let tmp = TempDir::new().unwrap();
        let idx = index(&tmp);
        idx.add_document(&doc("1"), "Go Programming").unwrap();
        idx.add_document(&doc("2"), "中文编程").unwrap();

        assert_eq!(idx.search("Go").unwrap(), vec![doc("1")]);
        assert_eq!(idx.search("programming").unwrap(), vec![doc("1")]);
        assert_eq!(idx.search("编程").unwrap(), vec![doc("2")]);
        assert!(idx.search("nothing here").unwrap().is_empty());
    }

    #[test]
    fn removed_document_disappears_from_every_term() {
        let tmp = TempDir::new().unwrap();
        let idx = index(&tmp);
        idx.add_document(&doc("1"), "shared words here").unwrap();
        idx.add_document(&doc("2"), "shared words there").unwrap();

        idx.remove_document(&doc("1")).unwrap();
        let hits = idx.search("shared").unwrap();
        assert_eq!(hits, vec![doc("2")]);
    }

    #[test]
    fn re_adding_replaces_previous_content() {
        let tmp = TempDir::new().unwrap();
        let idx = index(&tmp);
        idx.add_document(&doc("1"), "alpha topic").unwrap();
        idx.add_document(&doc("1"), "gamma topic").unwrap();

        assert!(idx.search("alpha").unwrap().is_empty());
        assert_eq!(idx.search("gamma").unwrap(), vec![doc("1")]);
    }

    #[test]
    fn higher_aggregate_frequency_ranks_first() {
        let tmp = TempDir::new().unwrap();
        let idx = index(&tmp);
        idx.add_document(&doc("once"), "database").unwrap();
        idx.add_document(&doc("twice"), "database database").unwrap();

        assert_eq!(idx.search("database").unwrap(), vec![doc("twice"), doc("once")]);
    }

    #[test]
    fn posting_lists_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let idx = index(&tmp);
            idx.add_document(&doc("1"), "persistent text").unwrap();
        }
        let reopened = index(&tmp);
        assert_eq!(reopened.search("persistent").unwrap(), vec![doc("1")]);

        // Removal after reopen must reach terms loaded from disk.
        reopened.remove_document(&doc("1")).unwrap();
        assert!(reopened.search("persistent").unwrap().is_empty());
    }

    #[test]
    fn empty_posting_list_file_is_deleted() {
        let tmp = TempDir::new().unwrap();
        let idx = index(&tmp);
        idx.add_document(&doc("1"), "solo").unwrap();
        assert_eq!(idx.stats().term_count, 2); // "sol", "olo"

        idx.remove_document(&doc("1")).unwrap();
        assert_eq!(idx.stats().term_count, 0);
        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn term_file_name_is_hex_of_token() {
        assert_eq!(term_file_name("go"), "term_676f.json");
    }
}
