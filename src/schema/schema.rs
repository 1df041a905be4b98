use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::types::Value;

/// Declared type of a column. The engine only relies on it for
/// documentation and key comparison hints; values are checked at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "datetime")]
    DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub field_name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub full_text: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl ColumnDefinition {
    pub fn new(field_name: impl Into<String>, data_type: DataType) -> Self {
        ColumnDefinition {
            field_name: field_name.into(),
            data_type,
            is_unique: false,
            is_nullable: false,
            default_value: None,
            auto_increment: false,
            full_text: false,
            comment: String::new(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn full_text(mut self) -> Self {
        self.full_text = true;
        self
    }
}

/// One component of an index key with its declared direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    #[serde(default = "default_true")]
    pub ascending: bool,
}

/// Equality predicate restricting which records a partial index covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EqualFilterCondition {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub keys: Vec<IndexField>,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_clustered: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partial_filter: Vec<EqualFilterCondition>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        IndexDefinition {
            name: name.into(),
            keys: Vec::new(),
            is_unique: false,
            is_clustered: false,
            includes: Vec::new(),
            partial_filter: Vec::new(),
            page_size: default_page_size(),
        }
    }

    pub fn key(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.keys.push(IndexField {
            name: field.into(),
            ascending,
        });
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn clustered(mut self) -> Self {
        self.is_clustered = true;
        self
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.includes.push(field.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.partial_filter.push(EqualFilterCondition {
            field: field.into(),
            value,
        });
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Declared shape of one collection, persisted as `schema.json` in the
/// collection directory. The id and timestamps are engine-assigned when the
/// schema is first written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    #[serde(default)]
    pub enable_full_text: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        CollectionSchema {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            columns: Vec::new(),
            indexes: Vec::new(),
            enable_full_text: false,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn full_text(mut self) -> Self {
        self.enable_full_text = true;
        self
    }

    pub fn clustered_index(&self) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|idx| idx.is_clustered)
    }

    pub fn full_text_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.full_text)
    }

    /// Structural validation applied before a schema is persisted.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_collection("collection name must not be empty"));
        }
        let clustered = self.indexes.iter().filter(|i| i.is_clustered).count();
        if clustered > 1 {
            return Err(Error::invalid_collection(format!(
                "collection '{}' declares {} clustered indexes, at most one is allowed",
                self.name, clustered
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(Error::invalid_collection(format!(
                    "duplicate index name '{}'",
                    index.name
                )));
            }
            if index.keys.is_empty() {
                return Err(Error::invalid_collection(format!(
                    "index '{}' has no key fields",
                    index.name
                )));
            }
            if index.page_size == 0 {
                return Err(Error::invalid_collection(format!(
                    "index '{}' has a zero page size",
                    index.name
                )));
            }
            if !self.columns.is_empty() {
                for key in &index.keys {
                    if !self.columns.iter().any(|c| c.field_name == key.name) {
                        return Err(Error::invalid_collection(format!(
                            "index '{}' references undeclared column '{}'",
                            index.name, key.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    16
}
