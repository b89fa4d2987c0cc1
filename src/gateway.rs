//! Store gateway: sole owner of the document-store connection.
//!
//! The gateway wraps a [`DocumentStore`] with the process-wide connection
//! lifecycle. `connect` runs once at startup and `disconnect` once at
//! shutdown; both are serialized through an internal lock so concurrent
//! calls collapse. The current [`ConnectionStatus`] is published on a
//! `watch` channel that the orchestrator gates commands on and the UI
//! mirrors into its indicator.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};

use crate::error::StoreError;
use crate::record::{CustomerRecord, RecordId};
use crate::store::{DocumentStore, Filter};

/// Process-wide database connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No connection: before startup, after a failed connect, or after shutdown.
    Disconnected,
    /// `connect` is in flight.
    Connecting,
    /// The store confirmed the connection.
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Never connected, or the last attempt failed.
    Idle,
    Open,
    /// `disconnect` ran; terminal.
    Closed,
}

/// Owns the store and its connection lifecycle.
///
/// Shared behind an `Arc` by the repository and the orchestrator.
pub struct StoreGateway<S: DocumentStore> {
    store: S,
    lifecycle: Mutex<Lifecycle>,
    closed: AtomicBool,
    status: watch::Sender<ConnectionStatus>,
}

impl<S: DocumentStore> StoreGateway<S> {
    /// Wrap a store. The gateway starts disconnected.
    pub fn new(store: S) -> Self {
        let (status, _rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            store,
            lifecycle: Mutex::new(Lifecycle::Idle),
            closed: AtomicBool::new(false),
            status,
        }
    }

    /// Open the connection.
    ///
    /// A no-op when already connected; a concurrent caller waits for the
    /// in-flight attempt and then observes its outcome. A failed attempt
    /// leaves the status `Disconnected` and may be retried.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotConnected`] after [`disconnect`](Self::disconnect).
    /// * Whatever the store's `connect` returned.
    pub async fn connect(&self) -> Result<(), StoreError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Open => return Ok(()),
            Lifecycle::Closed => return Err(StoreError::NotConnected),
            Lifecycle::Idle => {}
        }

        self.status.send_replace(ConnectionStatus::Connecting);
        match self.store.connect().await {
            Ok(()) => {
                *lifecycle = Lifecycle::Open;
                self.status.send_replace(ConnectionStatus::Connected);
                tracing::info!("store connected");
                Ok(())
            }
            Err(e) => {
                self.status.send_replace(ConnectionStatus::Disconnected);
                tracing::error!(error = %e, "store connection failed");
                Err(e)
            }
        }
    }

    /// Close the connection for good.
    ///
    /// Idempotent. After this call every operation, including `connect`,
    /// fails with [`StoreError::NotConnected`].
    ///
    /// # Errors
    ///
    /// Whatever the store's `close` returned; the gateway is closed anyway.
    pub async fn disconnect(&self) -> Result<(), StoreError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let was_open = *lifecycle == Lifecycle::Open;
        *lifecycle = Lifecycle::Closed;
        self.closed.store(true, Ordering::Release);
        self.status.send_replace(ConnectionStatus::Disconnected);
        if was_open {
            self.store.close().await?;
            tracing::info!("store disconnected");
        }
        Ok(())
    }

    /// Publish `Connecting` ahead of a [`connect`](Self::connect) that is
    /// about to run, so commands queued behind it wait for its outcome.
    ///
    /// No-op unless currently disconnected and not shut down.
    pub(crate) fn announce_connect(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.status.send_if_modified(|status| {
            if *status == ConnectionStatus::Disconnected {
                *status = ConnectionStatus::Connecting;
                true
            } else {
                false
            }
        });
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Wait until no connect attempt is in flight and return the outcome.
    pub async fn settled_status(&self) -> ConnectionStatus {
        let mut rx = self.status.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            if status != ConnectionStatus::Connecting {
                return status;
            }
            // The sender lives as long as `self`, so this only fails if
            // the gateway is being torn down.
            if rx.changed().await.is_err() {
                return ConnectionStatus::Disconnected;
            }
        }
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        match self.status() {
            ConnectionStatus::Connected => Ok(()),
            _ => Err(StoreError::NotConnected),
        }
    }

    /// Insert a record.
    pub async fn create(&self, record: CustomerRecord) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.insert(record).await
    }

    /// Find records matching `filter`.
    pub async fn find(&self, filter: Filter) -> Result<Vec<CustomerRecord>, StoreError> {
        self.ensure_connected()?;
        self.store.find(filter).await
    }

    /// Replace the record with the same id.
    pub async fn update(&self, record: CustomerRecord) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.replace(record).await
    }

    /// Remove the record with this id.
    pub async fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.remove(id).await
    }
}

impl<S: DocumentStore> std::fmt::Debug for StoreGateway<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreGateway")
            .field("status", &self.status())
            .finish()
    }
}
