use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

use super::models::KeyRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// key: license-keys-store
/// Backing storage for key records. Mutations persist the whole mapping before returning.
#[async_trait]
pub trait KeyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<KeyRecord>;
    fn list(&self) -> Vec<(String, KeyRecord)>;
    async fn put(&mut self, key: &str, record: KeyRecord) -> Result<(), StoreError>;
    async fn delete(&mut self, key: &str) -> Result<bool, StoreError>;
}

/// Volatile store with no persistence.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: BTreeMap<String, KeyRecord>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    fn get(&self, key: &str) -> Option<KeyRecord> {
        self.entries.get(key).cloned()
    }

    fn list(&self) -> Vec<(String, KeyRecord)> {
        self.entries
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    async fn put(&mut self, key: &str, record: KeyRecord) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// JSON file store. The file holds a single object mapping key strings to records and is
/// rewritten through a sibling temp file plus rename on every mutation.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
    entries: BTreeMap<String, KeyRecord>,
}

impl FileKeyStore {
    /// Loads the store from `path`. A missing file starts an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(path = %path.display(), keys = entries.len(), "loaded key store");
        Ok(Self { path, entries })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "keys.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        let temp = self.temp_path();
        fs::write(&temp, &bytes).await?;
        if let Err(err) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }
        Ok(())
    }

    fn restore(&mut self, key: &str, previous: Option<KeyRecord>) {
        match previous {
            Some(record) => {
                self.entries.insert(key.to_string(), record);
            }
            None => {
                self.entries.remove(key);
            }
        }
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    fn get(&self, key: &str) -> Option<KeyRecord> {
        self.entries.get(key).cloned()
    }

    fn list(&self) -> Vec<(String, KeyRecord)> {
        self.entries
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    async fn put(&mut self, key: &str, record: KeyRecord) -> Result<(), StoreError> {
        let previous = self.entries.insert(key.to_string(), record);
        if let Err(err) = self.flush().await {
            tracing::error!(?err, path = %self.path.display(), "failed to persist key store");
            self.restore(key, previous);
            return Err(err);
        }
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        let Some(previous) = self.entries.remove(key) else {
            return Ok(false);
        };
        if let Err(err) = self.flush().await {
            tracing::error!(?err, path = %self.path.display(), "failed to persist key store");
            self.restore(key, Some(previous));
            return Err(err);
        }
        Ok(true)
    }
}
