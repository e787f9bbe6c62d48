//! JSON file device store.
//!
//! The whole store is one small JSON document. Writes go to a sibling
//! temporary file that is renamed over the original, so a crash mid-write
//! leaves either the old or the new record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{Credentials, DeviceStore, StoreBackend};
use crate::error::StoreError;

const RECORD_VERSION: u32 = 1;

/// On-disk layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreRecord {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    device: Option<Credentials>,
}

impl StoreRecord {
    fn empty() -> Self {
        Self {
            version: RECORD_VERSION,
            device: None,
        }
    }
}

/// Backend for a JSON file at a fixed path.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StoreBackend for FileBackend {
    async fn open(&self) -> Result<Arc<dyn DeviceStore>, StoreError> {
        let store = FileDeviceStore::open(&self.path).await?;
        Ok(Arc::new(store))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        write_record(&self.path, &StoreRecord::empty()).await
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Device store removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }
}

/// An open JSON file store. `record` is `None` once closed.
#[derive(Debug)]
pub struct FileDeviceStore {
    path: PathBuf,
    record: Mutex<Option<StoreRecord>>,
}

impl FileDeviceStore {
    /// Open the store at `path`, creating an empty one if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let record = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice::<StoreRecord>(&bytes).map_err(|e| {
                    StoreError::Corrupted {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let record = StoreRecord::empty();
                write_record(&path, &record).await?;
                tracing::info!(path = %path.display(), "Created empty device store");
                record
            }
            Err(e) => return Err(io_error(&path, e)),
        };

        Ok(Self {
            path,
            record: Mutex::new(Some(record)),
        })
    }

    fn closed(&self) -> StoreError {
        StoreError::Closed {
            path: self.path.display().to_string(),
        }
    }
}

#[async_trait]
impl DeviceStore for FileDeviceStore {
    async fn first_identity(&self) -> Result<Option<Credentials>, StoreError> {
        let record = self.record.lock().await;
        let record = record.as_ref().ok_or_else(|| self.closed())?;
        Ok(record.device.clone())
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let mut guard = self.record.lock().await;
        let record = guard.as_mut().ok_or_else(|| self.closed())?;

        let mut updated = record.clone();
        updated.version = RECORD_VERSION;
        updated.device = Some(credentials.clone());
        write_record(&self.path, &updated).await?;
        *record = updated;
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let mut guard = self.record.lock().await;
        let record = guard.as_mut().ok_or_else(|| self.closed())?;

        let updated = StoreRecord::empty();
        write_record(&self.path, &updated).await?;
        *record = updated;
        Ok(())
    }

    async fn close(&self) {
        self.record.lock().await.take();
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

async fn write_record(path: &Path, record: &StoreRecord) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let bytes = serde_json::to_vec_pretty(record)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
