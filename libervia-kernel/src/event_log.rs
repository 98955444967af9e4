//! Segmented, hash-chained event log.
//!
//! Entries live under `<dataDir>/event-log/` as JSONL segment files of at
//! most [`SEGMENT_CAPACITY`] entries. Every entry's `current_hash` is the
//! SHA-256 of its canonical serialization (without `current_hash`) and every
//! entry links to its predecessor via `previous_hash`, so any mutation of
//! history is detectable by a chain walk.

use chrono::Utc;
use libervia_core::{ChainVerification, EventLogStatus, EventRecord, StorageError, GENESIS_HASH};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Entries per segment file before a new segment is started.
const SEGMENT_CAPACITY: u64 = 1000;

/// Mutable log state guarded by the instance lock.
struct LogState {
    total: u64,
    segments: u32,
    last_id: Option<String>,
    last_hash: Option<String>,
}

/// File-backed, append-only event chain for one tenant.
pub struct EventLog {
    dir: PathBuf,
    state: RwLock<LogState>,
}

impl EventLog {
    /// Open (or initialize) the log under `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StorageError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut total = 0u64;
        let mut last: Option<EventRecord> = None;
        let mut segments = 0u32;
        for path in segment_paths(&dir)? {
            segments += 1;
            for record in read_segment(&path)? {
                total += 1;
                last = Some(record);
            }
        }

        Ok(Self {
            dir,
            state: RwLock::new(LogState {
                total,
                segments,
                last_id: last.as_ref().map(|r| r.id.clone()),
                last_hash: last.map(|r| r.current_hash),
            }),
        })
    }

    /// Append a new entry, chaining it to the current tail.
    pub fn append(
        &self,
        evento: &str,
        entidade: &str,
        entidade_id: &str,
        actor: &str,
        payload: serde_json::Value,
    ) -> Result<EventRecord, StorageError> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;

        let seq = state.total + 1;
        let previous_hash = state
            .last_hash
            .clone()
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let mut record = EventRecord {
            id: format!("evt_{:010}", seq),
            timestamp: Utc::now(),
            evento: evento.to_string(),
            entidade: entidade.to_string(),
            entidade_id: entidade_id.to_string(),
            actor: actor.to_string(),
            previous_hash,
            current_hash: String::new(),
            payload,
        };
        record.current_hash = entry_hash(&record)?;

        let segment_index = state.total / SEGMENT_CAPACITY + 1;
        let path = segment_path(&self.dir, segment_index as u32);
        let mut line = serde_json::to_string(&record).map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        file.write_all(line.as_bytes())
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        state.total = seq;
        state.segments = state.segments.max(segment_index as u32);
        state.last_id = Some(record.id.clone());
        state.last_hash = Some(record.current_hash.clone());
        Ok(record)
    }

    /// Append a pre-hashed entry verbatim, used by restore. The entry must
    /// link to the current tail (or be a genesis entry on an empty log) and
    /// its `current_hash` must verify; history is never rewritten.
    pub fn append_existing(&self, record: EventRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;

        let expected_previous = state
            .last_hash
            .clone()
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        if record.previous_hash != expected_previous {
            return Err(StorageError::ChainBroken {
                entry_id: record.id.clone(),
                reason: "previous_hash does not match the live tail".to_string(),
            });
        }
        let expected_hash = entry_hash(&record)?;
        if expected_hash != record.current_hash {
            return Err(StorageError::ChainBroken {
                entry_id: record.id.clone(),
                reason: "current_hash does not match entry content".to_string(),
            });
        }

        let segment_index = state.total / SEGMENT_CAPACITY + 1;
        let path = segment_path(&self.dir, segment_index as u32);
        let mut line = serde_json::to_string(&record).map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        file.write_all(line.as_bytes())
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        state.total += 1;
        state.segments = state.segments.max(segment_index as u32);
        state.last_id = Some(record.id.clone());
        state.last_hash = Some(record.current_hash);
        Ok(())
    }

    /// Whether an entry with this id exists anywhere in the chain.
    pub fn contains(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.all()?.iter().any(|r| r.id == id))
    }

    /// Read entries in order, optionally filtered by `entidade`, newest last.
    /// Returns at most `limit` entries from the tail plus the total count of
    /// matching entries.
    pub fn list(
        &self,
        limit: usize,
        entidade: Option<&str>,
    ) -> Result<(Vec<EventRecord>, u64), StorageError> {
        let mut matching = Vec::new();
        for path in segment_paths(&self.dir)? {
            for record in read_segment(&path)? {
                if entidade.map_or(true, |e| record.entidade == e) {
                    matching.push(record);
                }
            }
        }
        let total = matching.len() as u64;
        let skip = matching.len().saturating_sub(limit);
        Ok((matching.split_off(skip), total))
    }

    /// Current tail summary.
    pub fn status(&self) -> Result<EventLogStatus, StorageError> {
        let state = self.state.read().map_err(|_| self.poisoned())?;
        Ok(EventLogStatus {
            total_events: state.total,
            last_event_id: state.last_id.clone(),
            last_event_hash: state.last_hash.clone(),
            segments: state.segments,
        })
    }

    /// Full chain walk: recomputes every hash and checks every link.
    pub fn verify(&self) -> Result<ChainVerification, StorageError> {
        self.verify_records(self.all()?)
    }

    /// Tail-window walk: checks linkage and hashes for the last `window`
    /// entries only. Much cheaper on large logs.
    pub fn verify_fast(&self, window: usize) -> Result<ChainVerification, StorageError> {
        let mut records = self.all()?;
        let skip = records.len().saturating_sub(window);
        // Linkage into the skipped prefix was validated when those entries
        // were appended; only the tail is re-walked here.
        self.verify_records(records.split_off(skip))
    }

    /// Export the full log as JSONL.
    pub fn export(&self) -> Result<String, StorageError> {
        let mut out = String::new();
        for record in self.all()? {
            let line = serde_json::to_string(&record).map_err(|e| StorageError::Io {
                path: self.dir.display().to_string(),
                reason: e.to_string(),
            })?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    /// All entries in chain order.
    pub fn all(&self) -> Result<Vec<EventRecord>, StorageError> {
        let mut records = Vec::new();
        for path in segment_paths(&self.dir)? {
            records.extend(read_segment(&path)?);
        }
        Ok(records)
    }

    fn verify_records(&self, records: Vec<EventRecord>) -> Result<ChainVerification, StorageError> {
        Ok(verify_chain(&records))
    }

    fn poisoned(&self) -> StorageError {
        StorageError::Io {
            path: self.dir.display().to_string(),
            reason: "event log lock poisoned".to_string(),
        }
    }
}

/// Compute an entry's `current_hash`: SHA-256 over the canonical (key-sorted)
/// serialization of everything but `current_hash` itself.
pub fn entry_hash(record: &EventRecord) -> Result<String, StorageError> {
    let canonical = json!({
        "actor": record.actor,
        "entidade": record.entidade,
        "entidade_id": record.entidade_id,
        "evento": record.evento,
        "id": record.id,
        "payload": record.payload,
        "previous_hash": record.previous_hash,
        "timestamp": record.timestamp.to_rfc3339(),
    });
    let body = serde_json::to_vec(&canonical).map_err(|e| StorageError::Io {
        path: "<memory>".to_string(),
        reason: e.to_string(),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&body);
    Ok(hex::encode(hasher.finalize()))
}

/// Verify linkage and recomputed hashes over an in-memory slice of entries.
///
/// Used both for the live log and for the events carried inside a backup
/// snapshot (restore continuity check).
pub fn verify_chain(records: &[EventRecord]) -> ChainVerification {
    let mut previous: Option<&str> = None;
    for (index, record) in records.iter().enumerate() {
        if let Some(prev_hash) = previous {
            if record.previous_hash != prev_hash {
                return ChainVerification::broken(
                    index as u64,
                    record.id.clone(),
                    "previous_hash does not match predecessor",
                );
            }
        }
        match entry_hash(record) {
            Ok(expected) if expected == record.current_hash => {}
            Ok(_) => {
                return ChainVerification::broken(
                    index as u64,
                    record.id.clone(),
                    "current_hash does not match entry content",
                );
            }
            Err(e) => {
                return ChainVerification::broken(index as u64, record.id.clone(), e.to_string());
            }
        }
        previous = Some(&record.current_hash);
    }
    ChainVerification::intact(records.len() as u64)
}

fn segment_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("segment-{:05}.jsonl", index))
}

fn segment_paths(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut paths = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| StorageError::Io {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("segment-") && name.ends_with(".jsonl") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn read_segment(path: &Path) -> Result<Vec<EventRecord>, StorageError> {
    let raw = fs::read_to_string(path).map_err(|e| StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut records = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let record: EventRecord =
            serde_json::from_str(line).map_err(|e| StorageError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        records.push(record);
    }
    Ok(records)
}
