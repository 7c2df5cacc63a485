use super::DocumentStore;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::{io::ErrorKind, path::PathBuf};

/// Document kept as a JSON file on local disk
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[serenity::async_trait]
impl DocumentStore for FileStore {
    fn describe(&self) -> String {
        format!("`{}`", self.path.to_string_lossy())
    }

    async fn get(&self) -> Result<Value> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Value::Null),
            Err(e) => {
                return Err(anyhow!(
                    "Could not read document at `{}`: {}",
                    self.path.to_string_lossy(),
                    e
                ))
            }
        };

        serde_json::from_slice(&data).map_err(|e| {
            anyhow!(
                "Could not parse document at `{}`: {}",
                self.path.to_string_lossy(),
                e
            )
        })
    }

    async fn put(&self, doc: &Value) -> Result<()> {
        let serialized = serde_json::to_string_pretty(doc)
            .map_err(|e| anyhow!("Could not serialize document: {}", e))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow!(
                    "Could not create directory `{}`: {}",
                    parent.to_string_lossy(),
                    e
                )
            })?;
        }

        // Write next to the target, then atomically rename over it.
        let tmp_path = self.path.with_extension("json.new");

        tokio::fs::write(&tmp_path, serialized).await.map_err(|e| {
            anyhow!(
                "Could not write document to temporary file `{}`: {}",
                tmp_path.to_string_lossy(),
                e
            )
        })?;

        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            anyhow!(
                "Could not rename temporary file `{}` to `{}`: {}",
                tmp_path.to_string_lossy(),
                self.path.to_string_lossy(),
                e
            )
        })?;

        Ok(())
    }
}
