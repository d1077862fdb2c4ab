use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::database::repository::RepositoryError;
use crate::database::store::{without_id, DocumentStore, Selector};

/// Mutator for one embedded array: sub-documents of type `S` living inside
/// parents of type `P`.
///
/// Appends are a two-phase protocol: an atomic add-if-absent push, then a
/// separate re-fetch. The parent can be deleted between the phases; that
/// window is inherent to the protocol and resolves to `InvalidKey`, the
/// same verdict as a parent that never existed.
pub struct EmbeddedDocuments<P, S> {
    store: Arc<dyn DocumentStore>,
    collection: &'static str,
    array_field: &'static str,
    _marker: PhantomData<fn() -> (P, S)>,
}

impl<P, S> Clone for EmbeddedDocuments<P, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection,
            array_field: self.array_field,
            _marker: PhantomData,
        }
    }
}

impl<P, S> EmbeddedDocuments<P, S>
where
    P: DeserializeOwned + Send + Sync,
    S: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: &'static str,
        array_field: &'static str,
    ) -> Self {
        Self { store, collection, array_field, _marker: PhantomData }
    }

    async fn fetch_parent(&self, selector: &Selector) -> Result<Value, RepositoryError> {
        self.store
            .find_one(self.collection, selector)
            .await?
            .ok_or(RepositoryError::InvalidKey)
    }

    /// Append `element` and return it with its store-assigned identity.
    ///
    /// Phase (a) pushes with add-if-absent semantics: an element whose
    /// business fields already exist on the parent collapses into the
    /// existing entry, and phase (b) then returns that entry. A push that
    /// matched no parent, or a re-fetch that comes back empty (parent
    /// deleted between phases), is `InvalidKey`.
    pub async fn append(&self, selector: &Selector, element: &S) -> Result<S, RepositoryError> {
        let element_value = serde_json::to_value(element)?;

        let outcome = self
            .store
            .push_unique(self.collection, selector, self.array_field, element_value.clone())
            .await?;
        if !outcome.matched_any() {
            return Err(RepositoryError::InvalidKey);
        }

        let parent = self.fetch_parent(selector).await?;
        let wanted = without_id(&element_value);
        let found = parent
            .get(self.array_field)
            .and_then(Value::as_array)
            .and_then(|items| items.iter().find(|item| without_id(item) == wanted))
            .cloned()
            .ok_or(RepositoryError::InvalidKey)?;

        Ok(serde_json::from_value(found)?)
    }

    /// Append variant for parents located by a natural key: same phase (a),
    /// but phase (b) is a straight re-fetch by the same key returning the
    /// whole updated parent instead of searching the array.
    pub async fn append_returning_parent(
        &self,
        selector: &Selector,
        element: &S,
    ) -> Result<P, RepositoryError> {
        let element_value = serde_json::to_value(element)?;

        let outcome = self
            .store
            .push_unique(self.collection, selector, self.array_field, element_value)
            .await?;
        if !outcome.matched_any() {
            return Err(RepositoryError::InvalidKey);
        }

        let parent = self.fetch_parent(selector).await?;
        Ok(serde_json::from_value(parent)?)
    }

    /// All sub-documents of the selected parent, insertion order. A parent
    /// that exists but has never been appended to yields an empty list.
    pub async fn list(&self, selector: &Selector) -> Result<Vec<S>, RepositoryError> {
        let parent = self.fetch_parent(selector).await?;
        let items = parent
            .get(self.array_field)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        Ok(serde_json::from_value(items)?)
    }

    /// Pull the element with identity `sub_id` and return the updated
    /// parent. A matched parent holding no such element is a silent no-op
    /// returning the unchanged parent; only a missing parent is an error.
    /// The asymmetry with `append` is deliberate, inherited behavior.
    pub async fn remove(&self, selector: &Selector, sub_id: uuid::Uuid) -> Result<P, RepositoryError> {
        let outcome = self
            .store
            .pull_by_id(self.collection, selector, self.array_field, sub_id)
            .await?;
        if !outcome.matched_any() {
            return Err(RepositoryError::InvalidKey);
        }

        let parent = self.fetch_parent(selector).await?;
        Ok(serde_json::from_value(parent)?)
    }
}
