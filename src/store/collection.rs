//! In-memory document collection shared by the store backends.

use serde::{Deserialize, Serialize};

use super::Filter;
use crate::error::StoreError;
use crate::record::{CustomerRecord, RecordId};

/// Current on-disk format version of a serialized collection.
pub(crate) const FORMAT_VERSION: u32 = 1;

/// Ordered set of customer documents with a unique index on tax-id.
///
/// Documents keep insertion order, which is the store-native order
/// returned by [`find`](Collection::find).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Collection {
    version: u32,
    customers: Vec<CustomerRecord>,
}

impl Collection {
    pub(crate) fn new() -> Self {
        Self {
            version: FORMAT_VERSION,
            customers: Vec::new(),
        }
    }

    pub(crate) fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn len(&self) -> usize {
        self.customers.len()
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.customers.iter().position(|c| &c.id == id)
    }

    /// Whether a document other than `except` holds this tax-id.
    fn tax_id_taken(&self, tax_id: &str, except: Option<&RecordId>) -> bool {
        self.customers
            .iter()
            .any(|c| c.fields.tax_id == tax_id && Some(&c.id) != except)
    }

    pub(crate) fn insert(&mut self, record: CustomerRecord) -> Result<(), StoreError> {
        if self.position(&record.id).is_some() {
            return Err(StoreError::DuplicateKey { field: "id" });
        }
        if self.tax_id_taken(&record.fields.tax_id, None) {
            return Err(StoreError::DuplicateKey { field: "tax_id" });
        }
        self.customers.push(record);
        Ok(())
    }

    pub(crate) fn find(&self, filter: &Filter) -> Vec<CustomerRecord> {
        match filter {
            Filter::All => self.customers.clone(),
            Filter::Id(id) => self
                .customers
                .iter()
                .filter(|c| &c.id == id)
                .cloned()
                .collect(),
            Filter::TaxId(tax_id) => self
                .customers
                .iter()
                .filter(|c| &c.fields.tax_id == tax_id)
                .cloned()
                .collect(),
            Filter::NameContains(needle) => {
                let needle = needle.to_lowercase();
                self.customers
                    .iter()
                    .filter(|c| c.name_contains(&needle))
                    .cloned()
                    .collect()
            }
        }
    }

    pub(crate) fn replace(&mut self, record: CustomerRecord) -> Result<(), StoreError> {
        let pos = self.position(&record.id).ok_or(StoreError::NotFound)?;
        if self.tax_id_taken(&record.fields.tax_id, Some(&record.id)) {
            return Err(StoreError::DuplicateKey { field: "tax_id" });
        }
        self.customers[pos] = record;
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &RecordId) -> Result<(), StoreError> {
        let pos = self.position(id).ok_or(StoreError::NotFound)?;
        self.customers.remove(pos);
        Ok(())
    }
}
