//! File-based storage: one pretty-printed JSON file per document.

use super::{Storage, StorageError, StorageResult};
use crate::snapshot::DocumentSnapshot;
use std::fs;
use std::path::{Path, PathBuf};

pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `base_path`, creating the directory
    /// if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .map_err(|e| StorageError::Io(format!("Failed to create storage directory: {}", e)))?;
        }
        Ok(Self { base_path })
    }

    /// File storage under the platform data directory:
    /// `<data_local_dir>/stencil/documents/`, falling back to the home directory.
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
        Self::new(base.join("stencil").join("documents"))
    }

    fn document_path(&self, id: &str) -> PathBuf {
        let safe_id: String = id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.json", safe_id))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl Storage for FileStorage {
    fn save(&self, id: &str, snapshot: &DocumentSnapshot) -> StorageResult<()> {
        let path = self.document_path(id);
        let json = snapshot
            .to_json_pretty()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(&path, json).map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
        log::debug!("saved {}", path.display());
        Ok(())
    }

    fn load(&self, id: &str) -> StorageResult<DocumentSnapshot> {
        let path = self.document_path(id);
        if !path.exists() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        let json = fs::read_to_string(&path)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let snapshot = DocumentSnapshot::from_json(&json)
            .map_err(|e| StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e)))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.document_path(id);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| StorageError::Io(format!("Failed to delete {}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        if !self.base_path.exists() {
            return Ok(vec![]);
        }
        let entries =
            fs::read_dir(&self.base_path).map_err(|e| StorageError::Io(format!("Failed to read directory: {}", e)))?;

        let mut ids: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "json"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.document_path(id).exists())
    }
}
