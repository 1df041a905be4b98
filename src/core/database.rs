use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::core::collection::Collection;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::schema::schema::CollectionSchema;
use crate::storage::file_provider::{DiskFileProvider, FileProvider};

pub const SCHEMA_FILE: &str = "schema.json";

/// An embedded database: one base directory holding one subdirectory per
/// collection. Collections are discovered from their schema files at open
/// and cached by name.
pub struct Database {
    base_dir: PathBuf,
    config: Config,
    provider: Arc<dyn FileProvider>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    /// Opens (or creates) a database rooted at `base_dir` on the local
    /// filesystem.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(base_dir, Config::default())
    }

    pub fn open_with_config(base_dir: impl Into<PathBuf>, config: Config) -> Result<Self> {
        Self::open_with_provider(base_dir, config, Arc::new(DiskFileProvider))
    }

    /// Opens against an arbitrary file provider, the seam used by hosts
    /// that bring their own storage.
    pub fn open_with_provider(
        base_dir: impl Into<PathBuf>,
        config: Config,
        provider: Arc<dyn FileProvider>,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        provider.create_directory(&base_dir)?;
        let db = Database {
            base_dir,
            config,
            provider,
            collections: RwLock::new(HashMap::new()),
        };
        db.load_existing_collections()?;
        Ok(db)
    }

    fn load_existing_collections(&self) -> Result<()> {
        let mut collections = self.collections.write();
        for entry in self.provider.read_directory(&self.base_dir)? {
            if !entry.is_directory {
                continue;
            }
            let path = self.base_dir.join(&entry.name);
            if !self.provider.file_exists(&path, SCHEMA_FILE)? {
                continue;
            }
            let data = self.provider.read_file(&path, SCHEMA_FILE)?;
            let schema: CollectionSchema = serde_json::from_slice(&data)?;
            let collection =
                Collection::open(path, schema, self.provider.clone(), &self.config)?;
            collections.insert(collection.name().to_string(), Arc::new(collection));
        }
        info!(base = %self.base_dir.display(), collections = collections.len(), "database opened");
        Ok(())
    }

    /// Creates a collection from `schema`: validates it, assigns the id and
    /// timestamps, persists the schema file and instantiates the indexes.
    pub fn create_collection(&self, mut schema: CollectionSchema) -> Result<()> {
        let mut collections = self.collections.write();
        schema.validate()?;

        let path = self.base_dir.join(&schema.name);
        if self.provider.directory_exists(&path)? {
            return Err(Error::collection_exists(&schema.name));
        }
        self.provider.create_directory(&path)?;

        schema.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        schema.created_at = Some(now);
        schema.updated_at = Some(now);

        if let Err(e) = self.write_schema(&path, &schema) {
            // Leave no half-created collection directory behind.
            let _ = self.provider.delete_directory(&path);
            return Err(e);
        }

        let collection =
            Collection::open(path, schema, self.provider.clone(), &self.config)?;
        info!(collection = %collection.name(), "collection created");
        collections.insert(collection.name().to_string(), Arc::new(collection));
        Ok(())
    }

    /// Create-if-absent convenience: an already existing collection is not
    /// an error.
    pub fn ensure_collection(&self, schema: CollectionSchema) -> Result<()> {
        match self.create_collection(schema) {
            Ok(()) => Ok(()),
            Err(e) if e.kind == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::collection_not_found(name))
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Removes a collection and all its data.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        let path = self.base_dir.join(name);
        if !self.provider.directory_exists(&path)? {
            return Err(Error::collection_not_found(name));
        }
        self.provider.delete_directory(&path)?;
        collections.remove(name);
        info!(collection = %name, "collection deleted");
        Ok(())
    }

    /// Reads the schema as persisted on disk.
    pub fn collection_schema(&self, name: &str) -> Result<CollectionSchema> {
        let path = self.base_dir.join(name);
        if !self.provider.file_exists(&path, SCHEMA_FILE)? {
            return Err(Error::collection_not_found(name));
        }
        let data = self.provider.read_file(&path, SCHEMA_FILE)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Rewrites a collection's schema. Name and engine-assigned id must be
    /// unchanged; changes are expected to be additive.
    pub fn update_collection_schema(
        &self,
        name: &str,
        mut updated: CollectionSchema,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        let current = self.collection_schema(name)?;
        if current.name != updated.name || current.id != updated.id {
            return Err(Error::invalid_collection(
                "collection name and id cannot change on schema update",
            ));
        }
        updated.validate()?;
        updated.created_at = current.created_at;
        updated.updated_at = Some(Utc::now());

        let path = self.base_dir.join(name);
        self.write_schema(&path, &updated)?;

        // Reopen so newly declared indexes become visible.
        let collection =
            Collection::open(path, updated, self.provider.clone(), &self.config)?;
        collections.insert(name.to_string(), Arc::new(collection));
        info!(collection = %name, "collection schema updated");
        Ok(())
    }

    fn write_schema(&self, path: &std::path::Path, schema: &CollectionSchema) -> Result<()> {
        let data = serde_json::to_vec_pretty(schema)?;
        self.provider.write_file(path, SCHEMA_FILE, &data)
    }
}
