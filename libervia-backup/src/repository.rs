//! Atomic snapshot persistence.
//!
//! Snapshots land in `<baseDir>/backups/` as
//! `backup_<tenantId>_<YYYYMMDD-HHmmss>.json`. Writes go through the
//! `.tmp`-then-rename protocol behind a single write lock, so concurrent
//! saves serialize and a reader can never observe a torn file. Orphaned
//! `.tmp` files from a crashed process are swept at startup.

use libervia_core::{BackupError, BackupId, BackupMetadata, BackupSnapshot, TenantId, Timestamp};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// File-backed snapshot store.
pub struct BackupRepository {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl BackupRepository {
    /// Open the repository, creating the directory and sweeping `.tmp`
    /// orphans left by a previous crash.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| BackupError::PersistFailed {
            reason: format!("failed to create {}: {}", dir.display(), e),
        })?;
        sweep_orphans(&dir);
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Build the backup id (and file stem) for a tenant snapshot.
    pub fn backup_id_for(tenant_id: &TenantId, created_at: Timestamp) -> BackupId {
        BackupId::new(format!(
            "backup_{}_{}",
            tenant_id,
            created_at.format("%Y%m%d-%H%M%S")
        ))
    }

    /// Persist a snapshot atomically. Returns the final path.
    pub async fn save(&self, snapshot: &BackupSnapshot) -> Result<PathBuf, BackupError> {
        let _guard = self.write_lock.lock().await;

        let path = self.path_for(&snapshot.metadata.backup_id);
        let body =
            serde_json::to_vec_pretty(snapshot).map_err(|e| BackupError::PersistFailed {
                reason: e.to_string(),
            })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &body).map_err(|e| BackupError::PersistFailed {
            reason: e.to_string(),
        })?;
        fs::rename(&tmp, &path).map_err(|e| BackupError::PersistFailed {
            reason: e.to_string(),
        })?;
        Ok(path)
    }

    /// Load a snapshot by id, enforcing the major-version gate.
    pub fn load(&self, backup_id: &BackupId) -> Result<BackupSnapshot, BackupError> {
        let path = self.path_for(backup_id);
        if !path.exists() {
            return Err(BackupError::NotFound {
                backup_id: backup_id.clone(),
            });
        }
        self.load_path(&path)
    }

    /// Load a snapshot from an explicit path.
    pub fn load_path(&self, path: &Path) -> Result<BackupSnapshot, BackupError> {
        let raw = fs::read_to_string(path).map_err(|e| BackupError::FormatInvalid {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let snapshot: BackupSnapshot =
            serde_json::from_str(&raw).map_err(|e| BackupError::FormatInvalid {
                reason: e.to_string(),
            })?;
        check_format_version(&snapshot.metadata.format_version)?;
        Ok(snapshot)
    }

    /// Metadata of every snapshot on disk, newest first.
    pub fn list(&self) -> Result<Vec<BackupMetadata>, BackupError> {
        let mut out = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| BackupError::FormatInvalid {
            reason: e.to_string(),
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("backup_") || !name.ends_with(".json") {
                continue;
            }
            match self.load_path(&path) {
                Ok(snapshot) => out.push(snapshot.metadata),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable backup");
                }
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn path_for(&self, backup_id: &BackupId) -> PathBuf {
        self.dir.join(format!("{}.json", backup_id))
    }
}

/// Accept only snapshots whose format major matches ours.
fn check_format_version(version: &str) -> Result<(), BackupError> {
    let ours = crate::FORMAT_VERSION.split('.').next().unwrap_or("1");
    let theirs = version.split('.').next().unwrap_or("");
    if ours != theirs {
        return Err(BackupError::UnsupportedVersion {
            version: version.to_string(),
        });
    }
    Ok(())
}

/// `.tmp` orphans are transient by contract and safe to delete.
fn sweep_orphans(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "tmp").unwrap_or(false) {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to sweep tmp orphan");
            } else {
                tracing::info!(path = %path.display(), "swept orphaned tmp file");
            }
        }
    }
}
