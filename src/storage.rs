// planner/src/storage.rs

use directories::ProjectDirs;
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use crate::error::{Result, StoreError};

/// Host key-value storage. Values are opaque strings (JSON in practice).
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
    pub fn keys(&self) -> Vec<String> { self.items.read().keys().cloned().collect() }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> { Ok(self.items.read().get(key).cloned()) }
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<()> {
        self.items.write().remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    /// Platform data directory, e.g. `~/.local/share/planner/storage`.
    pub fn default_dir() -> Result<PathBuf> {
        let proj = ProjectDirs::from("dev", "noxis", "planner")
            .ok_or_else(|| StoreError::Config("no home directory for default storage".into()))?;
        Ok(proj.data_dir().join("storage"))
    }

    pub fn dir(&self) -> &Path { &self.dir }

    // Bytes outside `[A-Za-z0-9.-]`, `_` included, become `_XX`, so distinct
    // keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for b in key.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' {
                name.push(char::from(b));
            } else {
                name.push_str(&format!("_{b:02X}"));
            }
        }
        self.dir.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::storage(key, e)),
        }
    }

    // temp file + rename, so readers never observe a half-written payload
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::storage(key, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| StoreError::storage(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::storage(key, e))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(StoreError::storage(key, e)),
            _ => Ok(()),
        }
    }
}
