//! Durable key/value byte-store collaborator.
//!
//! The knowledge table is persisted as one JSON blob under one key. The store
//! layer only needs get/put/remove of raw bytes; two backends are provided:
//! - **FileByteStore**: one file per key under a directory, written atomically
//! - **MemoryByteStore**: shared in-memory map for tests and ephemeral sessions

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ByteStoreError;

pub trait ByteStore: Send + Sync {
    /// Raw bytes stored under `key`, `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ByteStoreError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), ByteStoreError>;

    fn remove(&self, key: &str) -> Result<(), ByteStoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// FileByteStore
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileByteStore {
    root: PathBuf,
}

impl FileByteStore {
    /// Open (and create if needed) a store rooted at `path`. `~` is expanded.
    pub fn open(path: &str) -> Result<Self, ByteStoreError> {
        let root = PathBuf::from(shellexpand::tilde(path).as_ref());
        fs::create_dir_all(&root).map_err(|source| ByteStoreError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ByteStoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(ByteStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl ByteStore for FileByteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ByteStoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ByteStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), ByteStoreError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| ByteStoreError::Io {
            key: key.to_string(),
            source,
        };
        fs::write(&tmp, value).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ByteStoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ByteStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

// ============================================================================
// MemoryByteStore
// ============================================================================

/// In-memory store. Clones share the same map, so a test can keep a handle and
/// tamper with the blob behind the knowledge store's back.
#[derive(Debug, Clone, Default)]
pub struct MemoryByteStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteStore for MemoryByteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ByteStoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), ByteStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ByteStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
