//! In-memory document store, for tests and throwaway sessions.

use tokio::sync::RwLock;

use super::collection::Collection;
use super::{DocumentStore, Filter};
use crate::error::StoreError;
use crate::record::{CustomerRecord, RecordId};

struct MemInner {
    open: bool,
    collection: Collection,
}

/// In-memory `DocumentStore` backed by a [`Collection`].
///
/// Data survives `close`/`connect` cycles but not the process. Intended for
/// tests and for running the backend without a data directory.
pub struct MemoryStore {
    inner: RwLock<MemInner>,
    reachable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: RwLock::new(MemInner {
                open: false,
                collection: Collection::new(),
            }),
            reachable: true,
        }
    }

    /// A store whose `connect` always fails with [`StoreError::Unavailable`].
    pub fn unreachable() -> Self {
        MemoryStore {
            reachable: false,
            ..Self::new()
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    async fn connect(&self) -> Result<(), StoreError> {
        if !self.reachable {
            return Err(StoreError::Unavailable("memory store is unreachable".into()));
        }
        self.inner.write().await.open = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.write().await.open = false;
        Ok(())
    }

    async fn insert(&self, record: CustomerRecord) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        if !g.open {
            return Err(StoreError::NotConnected);
        }
        g.collection.insert(record)
    }

    async fn find(&self, filter: Filter) -> Result<Vec<CustomerRecord>, StoreError> {
        let g = self.inner.read().await;
        if !g.open {
            return Err(StoreError::NotConnected);
        }
        Ok(g.collection.find(&filter))
    }

    async fn replace(&self, record: CustomerRecord) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        if !g.open {
            return Err(StoreError::NotConnected);
        }
        g.collection.replace(record)
    }

    async fn remove(&self, id: RecordId) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        if !g.open {
            return Err(StoreError::NotConnected);
        }
        g.collection.remove(&id)
    }
}
