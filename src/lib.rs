//! shelfdb — an embeddable, file-backed document database.
//!
//! Collections store heterogeneous records keyed by user-declared composite
//! keys. Each collection owns a clustered B+ tree index (one file per tree
//! node), any number of secondary indexes, and an optional n-gram inverted
//! index for full-text search. Everything runs on the caller's thread; a
//! reader/writer lock per collection gives single-writer semantics.
//!
//! ```no_run
//! use shelfdb::core::database::Database;
//! use shelfdb::core::types::{Record, Value};
//! use shelfdb::schema::schema::{CollectionSchema, ColumnDefinition, DataType, IndexDefinition};
//!
//! # fn main() -> shelfdb::core::error::Result<()> {
//! let db = Database::open("./data")?;
//! db.ensure_collection(
//!     CollectionSchema::new("users")
//!         .column(ColumnDefinition::new("id", DataType::Int).unique())
//!         .column(ColumnDefinition::new("name", DataType::String))
//!         .index(IndexDefinition::new("primary").key("id", true).unique().clustered()),
//! )?;
//!
//! let users = db.collection("users")?;
//! let record = Record::from([
//!     ("id".to_string(), Value::Int(1)),
//!     ("name".to_string(), Value::Text("Ada".into())),
//! ]);
//! users.insert(&record)?;
//! assert_eq!(users.find(Some(&vec![Value::Int(1)]))?, vec![record]);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod btree;
pub mod core;
pub mod fulltext;
pub mod index;
pub mod schema;
pub mod storage;

pub use crate::btree::IndexStats;
pub use crate::core::collection::Collection;
pub use crate::core::config::Config;
pub use crate::core::database::Database;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{DocumentId, Key, Record, Value};
pub use crate::index::scan::{ScanOptions, ScanResult};
pub use crate::schema::schema::{
    CollectionSchema, ColumnDefinition, DataType, EqualFilterCondition, IndexDefinition,
    IndexField,
};
