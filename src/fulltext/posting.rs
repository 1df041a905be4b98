use serde::{Deserialize, Serialize};

use crate::core::types::DocumentId;

/// How often one term occurs in one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFrequency {
    pub doc_id: DocumentId,
    pub frequency: u64,
}

/// All documents containing one term, ordered by descending frequency.
/// Persisted as one file per term in the full-text directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingList {
    pub term: String,
    pub documents: Vec<TermFrequency>,
}

impl PostingList {
    pub fn new(term: impl Into<String>) -> Self {
        PostingList {
            term: term.into(),
            documents: Vec::new(),
        }
    }

    /// Adds `frequency` occurrences for `doc_id`, creating the entry if the
    /// document is new to this term, then restores descending-frequency
    /// order.
    pub fn add(&mut self, doc_id: &DocumentId, frequency: u64) {
        match self.documents.iter_mut().find(|tf| &tf.doc_id == doc_id) {
            Some(entry) => entry.frequency += frequency,
            None => self.documents.push(TermFrequency {
                doc_id: doc_id.clone(),
                frequency,
            }),
        }
        self.documents.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    }

    /// Drops the entry for `doc_id`; returns whether anything changed.
    pub fn remove(&mut self, doc_id: &DocumentId) -> bool {
        let before = self.documents.len();
        self.documents.retain(|tf| &tf.doc_id != doc_id);
        self.documents.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
