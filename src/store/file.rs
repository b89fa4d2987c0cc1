//! JSON-file document store.
//!
//! The whole collection lives in `<data_dir>/customers.json`. It is loaded
//! once on `connect` and rewritten on every mutation through a temp file
//! and rename, so readers never observe a partially-written file and a
//! failed write leaves both disk and memory unchanged.

use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;

use super::collection::{Collection, FORMAT_VERSION};
use super::{DocumentStore, Filter};
use crate::error::StoreError;
use crate::record::{CustomerRecord, RecordId};

/// File name of the collection inside the data directory.
pub const STORE_FILE_NAME: &str = "customers.json";

/// `DocumentStore` persisted as a single JSON document on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// `None` while closed.
    state: RwLock<Option<Collection>>,
}

impl FileStore {
    /// Create a store rooted at `data_dir`.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory holding `customers.json`. It does not need
    ///   to exist yet; `connect` creates it.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STORE_FILE_NAME),
            state: RwLock::new(None),
        }
    }

    /// Returns the path of the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the collection from disk. A missing file is an empty registry.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Unavailable`] if the directory cannot be created or
    ///   the file cannot be read.
    /// * [`StoreError::Corrupt`] if the file does not decode or carries an
    ///   unknown format version.
    async fn load(&self) -> Result<Collection, StoreError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", dir.display())))?;
        }

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Collection::new()),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
        };

        let collection: Collection = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))?;
        if collection.version() != FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "{}: unsupported format version {}",
                self.path.display(),
                collection.version()
            )));
        }
        Ok(collection)
    }

    /// Write the collection atomically via temp file + rename.
    async fn persist(&self, collection: &Collection) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(collection)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Apply `op` to a copy of the open collection, persist it, then commit.
    async fn mutate<F>(&self, op: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Collection) -> Result<(), StoreError> + Send,
    {
        let mut guard = self.state.write().await;
        let current = guard.as_ref().ok_or(StoreError::NotConnected)?;
        let mut next = current.clone();
        op(&mut next)?;
        self.persist(&next).await?;
        *guard = Some(next);
        Ok(())
    }
}

impl DocumentStore for FileStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let collection = self.load().await?;
        tracing::debug!(
            path = %self.path.display(),
            customers = collection.len(),
            "file store opened"
        );
        *guard = Some(collection);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        // Every mutation is already on disk; closing only drops the cache.
        self.state.write().await.take();
        Ok(())
    }

    async fn insert(&self, record: CustomerRecord) -> Result<(), StoreError> {
        self.mutate(move |c| c.insert(record)).await
    }

    async fn find(&self, filter: Filter) -> Result<Vec<CustomerRecord>, StoreError> {
        let guard = self.state.read().await;
        let collection = guard.as_ref().ok_or(StoreError::NotConnected)?;
        Ok(collection.find(&filter))
    }

    async fn replace(&self, record: CustomerRecord) -> Result<(), StoreError> {
        self.mutate(move |c| c.replace(record)).await
    }

    async fn remove(&self, id: RecordId) -> Result<(), StoreError> {
        self.mutate(move |c| c.remove(&id)).await
    }
}
