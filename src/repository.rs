//! Customer repository: validation and mapping between UI field sets and
//! persisted records.

use std::sync::Arc;

use crate::error::RepositoryError;
use crate::gateway::StoreGateway;
use crate::record::{CustomerFields, CustomerRecord, RecordId};
use crate::store::{DocumentStore, Filter};

/// Typed CRUD access to customer records.
///
/// Validation happens here, before any store call. The tax-id uniqueness
/// check is delegated to the store's unique index so it is atomic with the
/// write.
///
/// `Clone` is cheap; the gateway is `Arc`-shared.
pub struct CustomerRepository<S: DocumentStore> {
    gateway: Arc<StoreGateway<S>>,
}

impl<S: DocumentStore> Clone for CustomerRepository<S> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<S: DocumentStore> CustomerRepository<S> {
    /// Create a repository over a shared gateway.
    pub fn new(gateway: Arc<StoreGateway<S>>) -> Self {
        Self { gateway }
    }

    /// Validate `fields` and persist a new record.
    ///
    /// # Returns
    ///
    /// The identifier assigned to the new record.
    ///
    /// # Errors
    ///
    /// * [`RepositoryError::Validation`] -- a required field is missing or malformed.
    /// * [`RepositoryError::DuplicateKey`] -- the tax-id is already in use.
    /// * [`RepositoryError::Connection`] -- the store is not connected.
    pub async fn create(&self, fields: CustomerFields) -> Result<RecordId, RepositoryError> {
        let fields = fields.validate()?;
        let id = RecordId::generate();
        let tax_id = fields.tax_id.clone();
        self.gateway
            .create(CustomerRecord::new(id.clone(), fields))
            .await
            .map_err(|e| RepositoryError::from_store(e, Some(&tax_id), None))?;
        tracing::info!(id = %id, "customer created");
        Ok(id)
    }

    /// Records whose name contains `substring`, ignoring case.
    ///
    /// An empty substring matches every record. Results are in store order.
    pub async fn find_by_name(
        &self,
        substring: &str,
    ) -> Result<Vec<CustomerRecord>, RepositoryError> {
        self.find(Filter::NameContains(substring.to_owned())).await
    }

    /// Records whose tax-id equals `tax_id` exactly (zero or one).
    pub async fn find_by_tax_id(
        &self,
        tax_id: &str,
    ) -> Result<Vec<CustomerRecord>, RepositoryError> {
        self.find(Filter::TaxId(tax_id.trim().to_owned())).await
    }

    /// The record with this id, as a zero- or one-element list.
    pub async fn find_by_id(&self, id: &RecordId) -> Result<Vec<CustomerRecord>, RepositoryError> {
        self.find(Filter::Id(id.clone())).await
    }

    /// Every record ordered by name ascending, ignoring case.
    ///
    /// Ties keep store order.
    pub async fn list_sorted_by_name(&self) -> Result<Vec<CustomerRecord>, RepositoryError> {
        let mut records = self.find(Filter::All).await?;
        records.sort_by_cached_key(|r| r.fields.name.to_lowercase());
        Ok(records)
    }

    async fn find(&self, filter: Filter) -> Result<Vec<CustomerRecord>, RepositoryError> {
        self.gateway
            .find(filter)
            .await
            .map_err(|e| RepositoryError::from_store(e, None, None))
    }

    /// Validate `fields` and replace the record `id` in place.
    ///
    /// # Errors
    ///
    /// * [`RepositoryError::Validation`] -- a required field is missing or malformed.
    /// * [`RepositoryError::NotFound`] -- no record has this id.
    /// * [`RepositoryError::DuplicateKey`] -- the new tax-id belongs to another record.
    /// * [`RepositoryError::Connection`] -- the store is not connected.
    pub async fn update(
        &self,
        id: &RecordId,
        fields: CustomerFields,
    ) -> Result<(), RepositoryError> {
        let fields = fields.validate()?;
        let tax_id = fields.tax_id.clone();
        self.gateway
            .update(CustomerRecord::new(id.clone(), fields))
            .await
            .map_err(|e| RepositoryError::from_store(e, Some(&tax_id), Some(id.as_str())))?;
        tracing::info!(id = %id, "customer updated");
        Ok(())
    }

    /// Remove the record `id`.
    ///
    /// # Errors
    ///
    /// * [`RepositoryError::NotFound`] -- no record has this id.
    /// * [`RepositoryError::Connection`] -- the store is not connected.
    pub async fn delete(&self, id: &RecordId) -> Result<(), RepositoryError> {
        self.gateway
            .delete(id.clone())
            .await
            .map_err(|e| RepositoryError::from_store(e, None, Some(id.as_str())))?;
        tracing::info!(id = %id, "customer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_fixtures::fields;
    use crate::store::MemoryStore;

    async fn connected_repo() -> CustomerRepository<MemoryStore> {
        let gateway = Arc::new(StoreGateway::new(MemoryStore::new()));
        gateway.connect().await.expect("connect should succeed");
        CustomerRepository::new(gateway)
    }

    async fn count(repo: &CustomerRepository<MemoryStore>) -> usize {
        repo.find_by_name("").await.expect("find").len()
    }

    #[tokio::test]
    async fn create_then_find_by_tax_id_returns_one() {
        let repo = connected_repo().await;
        let id = repo.create(fields("Ana", "111")).await.expect("create");

        let found = repo.find_by_tax_id("111").await.expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].fields.name, "Ana");
    }

    #[tokio::test]
    async fn duplicate_tax_id_rejected_and_store_unchanged() {
        let repo = connected_repo().await;
        repo.create(fields("Ana", "111")).await.expect("create");

        let err = repo.create(fields("Bia", "111")).await.unwrap_err();
        assert!(
            matches!(&err, RepositoryError::DuplicateKey { tax_id } if tax_id == "111"),
            "expected DuplicateKey, got: {err:?}"
        );
        assert_eq!(count(&repo).await, 1);
    }

    #[tokio::test]
    async fn duplicate_detection_uses_trimmed_tax_id() {
        let repo = connected_repo().await;
        repo.create(fields("Ana", "111")).await.expect("create");
        let err = repo.create(fields("Bia", " 111 ")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn invalid_fields_never_reach_store() {
        let repo = connected_repo().await;
        let err = repo.create(fields("", "111")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(ref f) if f.field == "name"));
        assert_eq!(count(&repo).await, 0);
    }

    #[tokio::test]
    async fn update_then_find_returns_new_values() {
        let repo = connected_repo().await;
        let id = repo.create(fields("Ana", "111")).await.expect("create");

        let mut changed = fields("Ana Souza", "112");
        changed.city = "Campinas".into();
        repo.update(&id, changed).await.expect("update");

        assert!(repo.find_by_tax_id("111").await.expect("find").is_empty());
        let found = repo.find_by_tax_id("112").await.expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].fields.name, "Ana Souza");
        assert_eq!(found[0].fields.city, "Campinas");
    }

    #[tokio::test]
    async fn update_missing_id_is_not_found() {
        let repo = connected_repo().await;
        repo.create(fields("Ana", "111")).await.expect("create");
        let before = repo.find_by_name("").await.expect("find");

        let ghost = RecordId::new("no-such-id");
        let err = repo.update(&ghost, fields("Bia", "222")).await.unwrap_err();
        assert!(
            matches!(&err, RepositoryError::NotFound { id } if id == "no-such-id"),
            "expected NotFound, got: {err:?}"
        );
        assert_eq!(repo.find_by_name("").await.expect("find"), before);
    }

    #[tokio::test]
    async fn update_to_other_records_tax_id_is_duplicate() {
        let repo = connected_repo().await;
        repo.create(fields("Ana", "111")).await.expect("create");
        let bia = repo.create(fields("Bia", "222")).await.expect("create");

        let err = repo.update(&bia, fields("Bia", "111")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateKey { .. }));
        assert_eq!(repo.find_by_tax_id("222").await.expect("find").len(), 1);
    }

    #[tokio::test]
    async fn delete_then_find_is_empty() {
        let repo = connected_repo().await;
        let id = repo.create(fields("Ana", "111")).await.expect("create");
        repo.delete(&id).await.expect("delete");

        assert!(repo.find_by_id(&id).await.expect("find").is_empty());
        assert!(repo.find_by_tax_id("111").await.expect("find").is_empty());
        assert!(repo.find_by_name("Ana").await.expect("find").is_empty());
    }

    #[tokio::test]
    async fn delete_missing_id_is_not_found() {
        let repo = connected_repo().await;
        let err = repo.delete(&RecordId::new("gone")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn find_by_name_is_case_insensitive_substring() {
        let repo = connected_repo().await;
        repo.create(fields("Ana", "111")).await.expect("create");
        repo.create(fields("Bia", "222")).await.expect("create");
        repo.create(fields("Luciana", "333")).await.expect("create");

        let names = |records: Vec<CustomerRecord>| -> Vec<String> {
            records.into_iter().map(|r| r.fields.name).collect()
        };

        assert_eq!(
            names(repo.find_by_name("AN").await.expect("find")),
            vec!["Ana", "Luciana"]
        );
        assert_eq!(repo.find_by_name("").await.expect("find").len(), 3);
        assert!(repo.find_by_name("zz").await.expect("find").is_empty());
    }

    #[tokio::test]
    async fn list_sorted_by_name_ignores_case() {
        let repo = connected_repo().await;
        repo.create(fields("carla", "333")).await.expect("create");
        repo.create(fields("Bia", "222")).await.expect("create");
        repo.create(fields("Ana", "111")).await.expect("create");

        let names: Vec<_> = repo
            .list_sorted_by_name()
            .await
            .expect("list")
            .into_iter()
            .map(|r| r.fields.name)
            .collect();
        assert_eq!(names, vec!["Ana", "Bia", "carla"]);
    }

    #[tokio::test]
    async fn disconnected_store_maps_to_connection_error() {
        let gateway = Arc::new(StoreGateway::new(MemoryStore::new()));
        let repo = CustomerRepository::new(gateway);
        let err = repo.create(fields("Ana", "111")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Connection(_)));
    }
}
