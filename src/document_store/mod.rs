//! Whole-document JSON stores.
//!
//! Neither backend supports partial updates or transactions: a write replaces the entire
//! document.  [`SharedDocument`] therefore funnels every read-modify-write against one document
//! through a single mutex; going around it risks lost updates.

mod file;
mod json_bin;

pub use file::FileStore;
pub use json_bin::{JsonBinStore, DEFAULT_BASE_URL};

use crate::config::{Config, DocumentStoreConfig};
use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

#[serenity::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable location, for logging
    fn describe(&self) -> String;
    /// Latest version of the document.  An absent document is `Value::Null`.
    async fn get(&self) -> Result<Value>;
    /// Replace the document.
    async fn put(&self, doc: &Value) -> Result<()>;
}

/// A document store plus the one lock every read-modify-write must hold.
pub struct SharedDocument {
    store: Box<dyn DocumentStore>,
    lock: Mutex<()>,
}

impl SharedDocument {
    pub fn new(store: impl DocumentStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            lock: Mutex::new(()),
        }
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }

    pub async fn read<T: DeserializeOwned + Default>(&self) -> Result<T> {
        let _guard = self.lock.lock().await;
        self.get_typed().await
    }

    /// Fetch, modify and write back the document while holding the lock.
    pub async fn update<T, F>(&self, f: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut doc: T = self.get_typed().await?;
        f(&mut doc);
        let value = serde_json::to_value(&doc)
            .map_err(|e| anyhow!("Could not serialize document for {}: {}", self.describe(), e))?;
        self.store.put(&value).await
    }

    async fn get_typed<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match self.store.get().await? {
            Value::Null => Ok(T::default()),
            value => serde_json::from_value(value)
                .map_err(|e| anyhow!("Could not parse document from {}: {}", self.describe(), e)),
        }
    }
}

impl DocumentStoreConfig {
    pub fn open(&self) -> Result<SharedDocument> {
        let doc = match self {
            DocumentStoreConfig::File { path } => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    Config::config_dir()?.join(path)
                };
                SharedDocument::new(FileStore::new(path))
            }
            DocumentStoreConfig::JsonBin {
                bin_id,
                api_key,
                base_url,
            } => SharedDocument::new(JsonBinStore::new(base_url, bin_id, api_key)),
        };
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default, serde::Serialize, serde::Deserialize)]
    struct Counter {
        n: u32,
    }

    #[tokio::test]
    async fn missing_document_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let doc = SharedDocument::new(FileStore::new(dir.path().join("doc.json")));
        let counter: Counter = doc.read().await.unwrap();
        assert_eq!(counter.n, 0);
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let doc = Arc::new(SharedDocument::new(FileStore::new(
            dir.path().join("doc.json"),
        )));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                doc.update(|c: &mut Counter| c.n += 1).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let counter: Counter = doc.read().await.unwrap();
        assert_eq!(counter.n, 20);
    }

    #[tokio::test]
    async fn malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        tokio::fs::write(&path, r#"{"n": "not a number"}"#).await.unwrap();

        let doc = SharedDocument::new(FileStore::new(path));
        assert!(doc.read::<Counter>().await.is_err());
        assert!(doc.update(|c: &mut Counter| c.n += 1).await.is_err());
    }
}
