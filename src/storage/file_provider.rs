use std::fs;
use std::path::Path;

use crate::core::error::Result;

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Narrow seam between the engine and the medium it persists to. Everything
/// the engine writes (schemas, tree nodes, posting lists) goes through here.
pub trait FileProvider: Send + Sync {
    fn create_directory(&self, path: &Path) -> Result<()>;

    fn directory_exists(&self, path: &Path) -> Result<bool>;

    /// Removes a directory and everything beneath it.
    fn delete_directory(&self, path: &Path) -> Result<()>;

    fn file_exists(&self, dir: &Path, name: &str) -> Result<bool>;

    fn read_file(&self, dir: &Path, name: &str) -> Result<Vec<u8>>;

    fn write_file(&self, dir: &Path, name: &str, data: &[u8]) -> Result<()>;

    fn delete_file(&self, dir: &Path, name: &str) -> Result<()>;

    fn read_directory(&self, path: &Path) -> Result<Vec<DirEntry>>;
}

/// Local-filesystem provider. Stateless, safe to share across collections.
#[derive(Debug, Default)]
pub struct DiskFileProvider;

impl FileProvider for DiskFileProvider {
    fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn directory_exists(&self, path: &Path) -> Result<bool> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_directory(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)?;
        Ok(())
    }

    fn file_exists(&self, dir: &Path, name: &str) -> Result<bool> {
        match fs::metadata(dir.join(name)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_file(&self, dir: &Path, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(dir.join(name))?)
    }

    fn write_file(&self, dir: &Path, name: &str, data: &[u8]) -> Result<()> {
        fs::write(dir.join(name), data)?;
        Ok(())
    }

    fn delete_file(&self, dir: &Path, name: &str) -> Result<()> {
        fs::remove_file(dir.join(name))?;
        Ok(())
    }

    fn read_directory(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: file_type.is_dir(),
            });
        }
        Ok(entries)
    }
}
