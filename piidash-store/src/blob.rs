use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serde error: {0}")]
    Serde(String),
    #[error("lock poisoned")]
    Lock,
}

/// Key-value blob capability backing the UI state persistence.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, BlobError>;
    fn set(&self, key: &str, value: &str) -> Result<(), BlobError>;
    fn clear(&self, key: &str) -> Result<(), BlobError>;
}

/// Blobs that live as long as the process: the default "session" medium.
#[derive(Default)]
pub struct SessionBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl SessionBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for SessionBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, BlobError> {
        let blobs = self.blobs.lock().map_err(|_| BlobError::Lock)?;
        Ok(blobs.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BlobError> {
        let mut blobs = self.blobs.lock().map_err(|_| BlobError::Lock)?;
        blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), BlobError> {
        let mut blobs = self.blobs.lock().map_err(|_| BlobError::Lock)?;
        blobs.remove(key);
        Ok(())
    }
}

/// Blobs kept in one JSON object file (`{"key": "blob", ...}`).
///
/// Lets a CLI operator keep UI state across invocations; deleting the file
/// ends the session. Every write rewrites the whole file.
pub struct FileBlobStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileBlobStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, BlobError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let text = fs::read_to_string(&self.path).map_err(|e| BlobError::Io(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&text).map_err(|e| BlobError::Serde(e.to_string()))? {
            Value::Object(map) => Ok(map),
            _ => Err(BlobError::Serde("session file is not a JSON object".into())),
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> Result<(), BlobError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BlobError::Io(e.to_string()))?;
        }
        let text = serde_json::to_string_pretty(map).map_err(|e| BlobError::Serde(e.to_string()))?;
        fs::write(&self.path, text).map_err(|e| BlobError::Io(e.to_string()))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, BlobError> {
        let _guard = self.guard.lock().map_err(|_| BlobError::Lock)?;
        let map = self.read_all()?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BlobError> {
        let _guard = self.guard.lock().map_err(|_| BlobError::Lock)?;
        // A corrupt file is overwritten rather than blocking every write.
        let mut map = self.read_all().unwrap_or_default();
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_all(&map)
    }

    fn clear(&self, key: &str) -> Result<(), BlobError> {
        let _guard = self.guard.lock().map_err(|_| BlobError::Lock)?;
        let mut map = self.read_all()?;
        if map.remove(key).is_some() {
            self.write_all(&map)?;
        }
        Ok(())
    }
}
