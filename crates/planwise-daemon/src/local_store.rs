//! File-backed local entity store
//!
//! The daemon has no application model of its own, so remote state it pulls
//! is kept in one JSON document per data type (`{root}/{data_type}.json`,
//! mapping id to payload). Embedding applications supply their own
//! [`ILocalStore`] instead.
//!
//! Writes go to a temporary file that is renamed over the target, so a
//! crash never leaves a half-written document behind.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use planwise_core::{
    domain::{DataType, Payload},
    ports::ILocalStore,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

type Documents = BTreeMap<String, Payload>;

pub struct JsonFileStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, data_type: DataType) -> PathBuf {
        self.root.join(format!("{}.json", data_type.as_str()))
    }

    async fn load(&self, data_type: DataType) -> anyhow::Result<Documents> {
        let path = self.document_path(data_type);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt local document {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Documents::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn store(&self, data_type: DataType, documents: &Documents) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let target = self.document_path(data_type);
        let tmp_path = target.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(documents)?;

        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &target).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ILocalStore for JsonFileStore {
    async fn snapshot(&self, data_type: DataType, id: &str) -> anyhow::Result<Option<Payload>> {
        Ok(self.load(data_type).await?.remove(id))
    }

    #[instrument(skip(self, payload))]
    async fn apply_remote(&self, data_type: DataType, id: &str, payload: &Payload) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut documents = self.load(data_type).await?;
        documents.insert(id.to_string(), payload.clone());
        self.store(data_type, &documents).await?;
        debug!(entities = documents.len(), "Local document updated");
        Ok(())
    }
}
