use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::database::store::{DocumentStore, Selector, StoreError};

/// Errors from the repository layer. `InvalidKey` covers every
/// "looked it up, found nothing" verdict the handlers translate to 401.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("no document matched the given key")]
    InvalidKey,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stored document did not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Typed access to one top-level collection.
pub struct ParentRepository<T> {
    store: Arc<dyn DocumentStore>,
    collection: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ParentRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection,
            _marker: PhantomData,
        }
    }
}

impl<T> ParentRepository<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn DocumentStore>, collection: &'static str) -> Self {
        Self { store, collection, _marker: PhantomData }
    }

    fn decode(&self, doc: Value) -> Result<T, RepositoryError> {
        Ok(serde_json::from_value(doc)?)
    }

    /// Conditional write keyed on a natural field, then a re-fetch by the
    /// same key for the full projected document. An upsert that neither
    /// matched nor inserted is a store anomaly and surfaces as `InvalidKey`,
    /// as does losing the re-fetch race.
    pub async fn upsert_by_key(
        &self,
        key_field: &str,
        key_value: &str,
        set_fields: Value,
    ) -> Result<T, RepositoryError> {
        let outcome = self
            .store
            .upsert(self.collection, key_field, key_value, set_fields)
            .await?;
        if !outcome.matched_any() {
            return Err(RepositoryError::InvalidKey);
        }

        let selector = Selector::field(key_field, key_value);
        let doc = self
            .store
            .find_one(self.collection, &selector)
            .await?
            .ok_or(RepositoryError::InvalidKey)?;
        self.decode(doc)
    }

    /// Plain insert for collections with no natural-key upsert path.
    pub async fn insert(&self, document: &T) -> Result<T, RepositoryError> {
        let fields = serde_json::to_value(document)?;
        let created = self.store.insert(self.collection, fields).await?;
        self.decode(created)
    }

    /// Unfiltered scan. An empty collection is an empty vec, never an error.
    pub async fn find_all(&self) -> Result<Vec<T>, RepositoryError> {
        let docs = self.store.find_all(self.collection).await?;
        docs.into_iter().map(|doc| self.decode(doc)).collect()
    }

    pub async fn find_by_id(&self, id: uuid::Uuid) -> Result<Option<T>, RepositoryError> {
        match self.store.find_one(self.collection, &Selector::id(id)).await? {
            Some(doc) => Ok(Some(self.decode(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_field(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Option<T>, RepositoryError> {
        let selector = Selector::field(field, value);
        match self.store.find_one(self.collection, &selector).await? {
            Some(doc) => Ok(Some(self.decode(doc)?)),
            None => Ok(None),
        }
    }

    /// Delete by id, returning the pre-deletion snapshot.
    pub async fn delete_by_id(&self, id: uuid::Uuid) -> Result<T, RepositoryError> {
        let snapshot = self
            .store
            .delete_by_id(self.collection, id)
            .await?
            .ok_or(RepositoryError::InvalidKey)?;
        self.decode(snapshot)
    }
}
