//! Schema descriptor storage.
//!
//! A [`SchemaCache`] persists [`SchemaDescriptor`]s under a lowercase
//! `database.prefix+name` key. [`FileSchemaCache`] writes one JSON file per key and
//! replaces it atomically; [`MemorySchemaCache`] keeps descriptors in-process.

use crate::error::{ModelError, ModelResult};
use crate::schema::SchemaDescriptor;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Storage for schema descriptors
pub trait SchemaCache: Send + Sync {
    /// Stored descriptor for `key`, `None` when nothing is stored
    fn load(&self, key: &str) -> ModelResult<Option<SchemaDescriptor>>;

    /// Store `descriptor` under `key`, replacing any previous value
    fn store(&self, key: &str, descriptor: &SchemaDescriptor) -> ModelResult<()>;
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One JSON file per key under a directory
///
/// Writes go to a temporary file in the same directory and are renamed into place, so
/// concurrent readers see either the old or the new descriptor. Last writer wins.
#[derive(Debug, Clone)]
pub struct FileSchemaCache {
    dir: PathBuf,
}

impl FileSchemaCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a key is stored in
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key.to_lowercase()))
    }
}

impl SchemaCache for FileSchemaCache {
    fn load(&self, key: &str) -> ModelResult<Option<SchemaDescriptor>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| ModelError::Cache(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ModelError::Cache(format!("Failed to parse {}: {e}", path.display())))
    }

    fn store(&self, key: &str, descriptor: &SchemaDescriptor) -> ModelResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ModelError::Cache(format!("Failed to create {}: {e}", self.dir.display()))
        })?;

        let json = serde_json::to_string(descriptor)
            .map_err(|e| ModelError::Cache(format!("Failed to serialize descriptor: {e}")))?;

        let path = self.path_for(key);
        let temp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            key.to_lowercase(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, json)
            .map_err(|e| ModelError::Cache(format!("Failed to write {}: {e}", temp.display())))?;
        fs::rename(&temp, &path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            ModelError::Cache(format!("Failed to replace {}: {e}", path.display()))
        })
    }
}

/// In-process descriptor store
#[derive(Debug, Default)]
pub struct MemorySchemaCache {
    entries: Mutex<HashMap<String, SchemaDescriptor>>,
}

impl MemorySchemaCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored descriptors
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchemaCache for MemorySchemaCache {
    fn load(&self, key: &str) -> ModelResult<Option<SchemaDescriptor>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| ModelError::Cache(format!("Failed to lock schema cache: {e}")))?;
        Ok(entries.get(&key.to_lowercase()).cloned())
    }

    fn store(&self, key: &str, descriptor: &SchemaDescriptor) -> ModelResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| ModelError::Cache(format!("Failed to lock schema cache: {e}")))?;
        entries.insert(key.to_lowercase(), descriptor.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PrimaryKey;

    fn descriptor() -> SchemaDescriptor {
        let mut descriptor = SchemaDescriptor::default();
        descriptor.fields = vec!["id".to_string(), "name".to_string()];
        descriptor.types.insert("id".to_string(), "int(11)".to_string());
        descriptor.types.insert("name".to_string(), "varchar(32)".to_string());
        descriptor.primary_key = Some(PrimaryKey::Single("id".to_string()));
        descriptor.autoinc = true;
        descriptor
    }

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemorySchemaCache::new();
        assert!(cache.load("test.user").unwrap().is_none());
        cache.store("Test.User", &descriptor()).unwrap();
        assert_eq!(cache.load("test.user").unwrap(), Some(descriptor()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_file_cache_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let cache = FileSchemaCache::new(root.path().join("_fields"));

        assert!(cache.load("test.user").unwrap().is_none());
        cache.store("test.user", &descriptor()).unwrap();
        assert!(cache.path_for("test.user").exists());
        assert_eq!(cache.load("test.user").unwrap(), Some(descriptor()));
    }

    #[test]
    fn test_file_cache_replaces_and_leaves_no_temp_files() {
        let root = tempfile::tempdir().unwrap();
        let cache = FileSchemaCache::new(root.path());

        cache.store("test.user", &descriptor()).unwrap();
        let mut updated = descriptor();
        updated.fields.push("email".to_string());
        cache.store("test.user", &updated).unwrap();

        assert_eq!(cache.load("test.user").unwrap(), Some(updated));
        let files: Vec<_> = fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_file_cache_corrupt_entry() {
        let root = tempfile::tempdir().unwrap();
        let cache = FileSchemaCache::new(root.path());
        fs::write(cache.path_for("test.user"), "not json").unwrap();
        assert!(matches!(cache.load("test.user"), Err(ModelError::Cache(_))));
    }
}
