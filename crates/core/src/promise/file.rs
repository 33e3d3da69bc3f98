//! Directory-backed promise store.
//!
//! Each promise is a `{id}.json` document inside the state directory, so
//! a later process can look up a result recorded by an earlier one.
//! Writes go through a temporary file followed by a rename. Settlement is
//! serialized inside one process only. Each open store holds an owner lease
//! and stamps it on the records it creates, so a later process can tell
//! which pending records nobody will settle.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;

use super::lease::{self, OwnerLease};
use super::{Created, PromiseRecord, PromiseStore, ABANDONED_MESSAGE};
use crate::error::{CoreError, CoreResult};
use crate::types::JobId;

#[derive(Debug)]
pub struct FilePromiseStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
    lease: OwnerLease,
}

impl FilePromiseStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let lease = OwnerLease::acquire(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            lease,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &JobId) -> CoreResult<PathBuf> {
        if !id.is_file_safe() {
            return Err(CoreError::InvalidJobId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read_record(&self, id: &JobId) -> CoreResult<Option<PromiseRecord>> {
        let path = self.record_path(id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, record: &PromiseRecord) -> CoreResult<()> {
        let path = self.record_path(&record.id)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn settle(
        &self,
        id: &JobId,
        apply: impl FnOnce(&mut PromiseRecord) -> CoreResult<()> + Send,
    ) -> CoreResult<PromiseRecord> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .read_record(id)
            .await?
            .ok_or_else(|| CoreError::PromiseNotFound(id.clone()))?;
        apply(&mut record)?;
        self.write_record(&record).await?;
        Ok(record)
    }
}

#[async_trait]
impl PromiseStore for FilePromiseStore {
    async fn create(&self, id: &JobId) -> CoreResult<Created> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.read_record(id).await? {
            return Ok(Created {
                record: existing,
                fresh: false,
            });
        }
        let mut record = PromiseRecord::pending(id.clone());
        record.owner = Some(self.lease.token().to_string());
        self.write_record(&record).await?;
        Ok(Created {
            record,
            fresh: true,
        })
    }

    async fn get(&self, id: &JobId) -> CoreResult<Option<PromiseRecord>> {
        self.read_record(id).await
    }

    async fn resolve(&self, id: &JobId, value: Value) -> CoreResult<PromiseRecord> {
        self.settle(id, move |record| record.resolve(value)).await
    }

    async fn reject(&self, id: &JobId, message: String) -> CoreResult<PromiseRecord> {
        self.settle(id, move |record| record.reject(message)).await
    }

    async fn reject_orphans(&self) -> CoreResult<Vec<JobId>> {
        let _guard = self.write_lock.lock().await;
        let mut rejected = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let mut record = match read_path(&path).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable promise record");
                    continue;
                }
            };
            if record.state.is_settled() {
                continue;
            }
            let owned = match record.owner.as_deref() {
                Some(token) if token == self.lease.token() => true,
                Some(token) => lease::is_held(&self.dir, token)?,
                None => false,
            };
            if owned {
                continue;
            }

            record.reject(ABANDONED_MESSAGE.to_string())?;
            self.write_record(&record).await?;
            tracing::warn!(job_id = %record.id, "Pending promise has no live owner, rejected");
            rejected.push(record.id);
        }
        Ok(rejected)
    }
}

async fn read_path(path: &Path) -> CoreResult<PromiseRecord> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
