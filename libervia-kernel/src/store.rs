//! Atomic JSON entity stores.
//!
//! Each store is a single JSON array file inside a tenant's data directory
//! (`decisoes.json`, `episodios.json`, ...). Writes go through the atomic
//! `write(<path>.tmp) -> rename` protocol; a crash between the two leaves
//! the previous state intact.

use libervia_core::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Items kept in a [`JsonStore`] must expose a stable id.
pub trait StoredItem {
    fn item_id(&self) -> &str;
}

/// A file-backed list of entities with in-memory reads and atomic writes.
pub struct JsonStore<T> {
    path: PathBuf,
    items: RwLock<Vec<T>>,
}

impl<T> JsonStore<T>
where
    T: StoredItem + Serialize + DeserializeOwned + Clone,
{
    /// Open a store, loading existing content or starting empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let items = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    /// Number of stored items.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.read()?.is_empty())
    }

    /// Whether an item with the given id exists.
    pub fn contains(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.read()?.iter().any(|item| item.item_id() == id))
    }

    /// Fetch a clone of the item with the given id.
    pub fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        Ok(self
            .read()?
            .iter()
            .find(|item| item.item_id() == id)
            .cloned())
    }

    /// Clone the full list, in insertion order.
    pub fn list(&self) -> Result<Vec<T>, StorageError> {
        Ok(self.read()?.clone())
    }

    /// Append an item and persist. Duplicate ids are rejected.
    pub fn insert(&self, item: T) -> Result<(), StorageError> {
        let mut items = self.write()?;
        if items.iter().any(|e| e.item_id() == item.item_id()) {
            return Err(StorageError::Corrupt {
                path: self.path.display().to_string(),
                reason: format!("duplicate id {}", item.item_id()),
            });
        }
        items.push(item);
        self.persist(&items)
    }

    /// Replace the item with the same id and persist.
    pub fn update(&self, item: T) -> Result<(), StorageError> {
        let mut items = self.write()?;
        let slot = items
            .iter_mut()
            .find(|e| e.item_id() == item.item_id())
            .ok_or_else(|| StorageError::NotFound {
                entity: self.entity_name(),
                id: item.item_id().to_string(),
            })?;
        *slot = item;
        self.persist(&items)
    }

    fn entity_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "item".to_string())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<T>>, StorageError> {
        self.items.read().map_err(|_| StorageError::Io {
            path: self.path.display().to_string(),
            reason: "store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<T>>, StorageError> {
        self.items.write().map_err(|_| StorageError::Io {
            path: self.path.display().to_string(),
            reason: "store lock poisoned".to_string(),
        })
    }

    fn persist(&self, items: &[T]) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(items).map_err(|e| StorageError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        write_atomic(&self.path, &body)
    }
}

/// Write `body` to `path` via the tmp-then-rename protocol.
pub(crate) fn write_atomic(path: &Path, body: &[u8]) -> Result<(), StorageError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    let io_err = |e: std::io::Error| StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(&tmp, body).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
