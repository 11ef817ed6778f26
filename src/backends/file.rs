// File-backed durable store - one JSON document of string entries

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::{BoxFuture, DurableStore};
use crate::components::{PushError, PushResult};

/// Durable store persisting all entries as a JSON object on disk.
///
/// Writes go to a sibling temp file which is then renamed over the document,
/// so a crash mid-write leaves the previous contents intact.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> PushResult<BTreeMap<String, String>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&raw).map_err(|source| PushError::SerializationError {
            key: self.path.display().to_string(),
            source,
        })
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> PushResult<()> {
        let encoded =
            serde_json::to_string_pretty(entries).map_err(|source| PushError::SerializationError {
                key: self.path.display().to_string(),
                source,
            })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PushResult<Option<String>>> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            Ok(self.load().await?.remove(key))
        })
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, PushResult<()>> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let mut entries = self.load().await?;
            entries.insert(key.to_string(), value);
            self.save(&entries).await
        })
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, PushResult<()>> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let mut entries = self.load().await?;
            if entries.remove(key).is_some() {
                self.save(&entries).await?;
            }
            Ok(())
        })
    }
}
