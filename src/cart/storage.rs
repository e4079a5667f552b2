use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::CartError;

/// Durable key/value slot the cart persists itself into
pub trait CartStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, CartError>;
    fn save(&self, key: &str, value: &str) -> Result<(), CartError>;
}

/// Process-local storage, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryCartStorage {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartStorage for MemoryCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartError> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| CartError::Storage("cart storage lock poisoned".into()))?;
        Ok(slots.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| CartError::Storage("cart storage lock poisoned".into()))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl CartStorage for FileCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CartError::Storage(e.to_string())),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CartError::Storage(e.to_string()))?;
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|e| CartError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &target).map_err(|e| CartError::Storage(e.to_string()))
    }
}
