//! Document store trait and built-in backends.
//!
//! The store is the opaque persistence engine behind the repository. It
//! knows nothing about validation; it only keeps documents, answers
//! filters, and enforces the unique index on tax-id atomically with each
//! write.

use std::future::Future;

use crate::error::StoreError;
use crate::record::{CustomerRecord, RecordId};

mod collection;
mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Selection criteria for [`DocumentStore::find`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Every document, in store-native order.
    All,
    /// The document with exactly this identifier.
    Id(RecordId),
    /// Documents whose tax-id equals the value exactly.
    TaxId(String),
    /// Documents whose name contains the value, ignoring case.
    NameContains(String),
}

/// A document store holding customer records.
///
/// Methods use RPITIT (`-> impl Future + Send`) so backends can be plain
/// `async fn` impls without an `async-trait` dependency.
///
/// # Contract
///
/// - `connect` opens the store and is a no-op when already open.
/// - Every record operation fails with [`StoreError::NotConnected`] while
///   the store is closed.
/// - `insert` and `replace` reject a tax-id held by a different document
///   with [`StoreError::DuplicateKey`], leaving the store unchanged.
/// - Each operation is atomic for the single document it touches.
pub trait DocumentStore: Send + Sync + 'static {
    /// Open the store.
    fn connect(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Close the store. Later operations fail until `connect` is called again.
    fn close(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert a new document.
    fn insert(&self, record: CustomerRecord)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Return all documents matching `filter`, in store-native order.
    fn find(
        &self,
        filter: Filter,
    ) -> impl Future<Output = Result<Vec<CustomerRecord>, StoreError>> + Send;

    /// Replace the document with the same id as `record`.
    fn replace(
        &self,
        record: CustomerRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the document with this id.
    fn remove(&self, id: RecordId) -> impl Future<Output = Result<(), StoreError>> + Send;
}
