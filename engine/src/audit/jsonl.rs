//! JSONL audit log: one `<task_id>.jsonl` file per task, one entry per line.

use super::{replay, AuditEntry, AuditSink};
use crate::error::AuditError;
use crate::escalation::state::EscalationHistory;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, Weak};
use tokio::io::AsyncWriteExt;

pub struct JsonlAuditLog {
    dir: PathBuf,
    /// Per-file write locks, alive only while a write holds them
    locks: std::sync::Mutex<HashMap<PathBuf, Weak<tokio::sync::Mutex<()>>>>,
}

impl JsonlAuditLog {
    /// Open (creating if needed) an audit directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| AuditError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a task's trail: `<readable>-<digest>.jsonl`.
    ///
    /// The readable part keeps `[A-Za-z0-9_-]` and replaces everything else
    /// so ids can't escape the directory. The digest is the first 16 hex
    /// chars of the blake3 hash of the raw id, so ids that sanitize alike
    /// still get their own file.
    pub fn path_for(&self, task_id: &str) -> PathBuf {
        let readable: String = task_id
            .chars()
            .take(64)
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let digest = blake3::hash(task_id.as_bytes()).to_hex();
        self.dir
            .join(format!("{readable}-{}.jsonl", &digest.as_str()[..16]))
    }

    /// Read every entry recorded for a task, in write order.
    pub async fn load(&self, task_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let path = self.path_for(task_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(AuditError::Io { path, source }),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AuditError::from))
            .collect()
    }

    /// Rebuild the attempt history of a task from disk.
    pub async fn load_history(&self, task_id: &str) -> Result<EscalationHistory, AuditError> {
        Ok(replay(&self.load(task_id).await?))
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(path).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(path.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    /// Files with a write in flight.
    pub fn open_writes(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let path = self.path_for(entry.task_id());
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        let io_err = |source| AuditError::Io {
            path: path.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

impl std::fmt::Debug for JsonlAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlAuditLog").field("dir", &self.dir).finish()
    }
}
