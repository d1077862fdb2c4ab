//! Test doubles. `MemoryStore` mirrors the Postgres adapter's observable
//! semantics (projection, matched/modified outcomes, add-if-absent
//! comparison, silent zero-pull) so repository and handler logic can be
//! exercised without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::{
    ensure_collection, without_id, DocumentStore, Selector, StoreError, WriteOutcome,
};
use crate::handlers::AppState;

#[derive(Debug, Clone)]
struct StoredDocument {
    id: Uuid,
    doc: Value,
}

pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<StoredDocument>>>,
    failure: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            failure: RwLock::new(None),
        }
    }

    /// Make every subsequent store call fail, for exercising the
    /// store-error surface.
    pub async fn fail_with(&self, message: &str) {
        *self.failure.write().await = Some(message.to_string());
    }

    /// Insert a document directly, bypassing the trait, and return the
    /// projection. Panics on malformed fixtures.
    pub async fn seed(&self, collection: &str, fields: Value) -> Value {
        ensure_collection(collection).expect("seed: unknown collection");
        let doc = match fields {
            Value::Object(_) => fields,
            other => panic!("seed: expected object, found {other}"),
        };
        let id = Uuid::new_v4();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument { id, doc: doc.clone() });
        project(id, doc)
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn check_failure(&self) -> Result<(), StoreError> {
        match self.failure.read().await.as_ref() {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn project(id: Uuid, doc: Value) -> Value {
    let mut map = match doc {
        Value::Object(map) => map,
        other => panic!("memory store held a non-object document: {other}"),
    };
    map.insert("_id".to_string(), json!(id.to_string()));
    Value::Object(map)
}

fn matches(selector: &Selector, stored: &StoredDocument) -> bool {
    match selector {
        Selector::Id(id) => stored.id == *id,
        Selector::Field { field, value } => {
            stored.doc.get(field).and_then(Value::as_str) == Some(value.as_str())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        self.check_failure().await?;
        ensure_collection(collection)?;

        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().map(|d| project(d.id, d.doc.clone())).collect())
            .unwrap_or_default())
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Option<Value>, StoreError> {
        self.check_failure().await?;
        ensure_collection(collection)?;

        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|d| matches(selector, d))
                .map(|d| project(d.id, d.doc.clone()))
        }))
    }

    async fn insert(&self, collection: &str, fields: Value) -> Result<Value, StoreError> {
        self.check_failure().await?;
        ensure_collection(collection)?;

        if !fields.is_object() {
            return Err(StoreError::MalformedDocument {
                collection: collection.to_string(),
                detail: "expected object".to_string(),
            });
        }

        let id = Uuid::new_v4();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument { id, doc: fields.clone() });
        Ok(project(id, fields))
    }

    async fn upsert(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &str,
        set_fields: Value,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_failure().await?;
        ensure_collection(collection)?;

        let set_map = match set_fields {
            Value::Object(map) => map,
            _ => {
                return Err(StoreError::MalformedDocument {
                    collection: collection.to_string(),
                    detail: "expected object".to_string(),
                })
            }
        };

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        let existing = docs
            .iter()
            .position(|d| d.doc.get(key_field).and_then(Value::as_str) == Some(key_value));

        match existing {
            Some(index) => {
                if let Value::Object(target) = &mut docs[index].doc {
                    for (key, value) in set_map {
                        target.insert(key, value);
                    }
                }
            }
            None => {
                let mut doc = set_map;
                doc.insert(key_field.to_string(), json!(key_value));
                docs.push(StoredDocument { id: Uuid::new_v4(), doc: Value::Object(doc) });
            }
        }

        Ok(WriteOutcome { matched: 1, modified: 1 })
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<Value>, StoreError> {
        self.check_failure().await?;
        ensure_collection(collection)?;

        let mut collections = self.collections.write().await;
        let docs = match collections.get_mut(collection) {
            Some(docs) => docs,
            None => return Ok(None),
        };

        match docs.iter().position(|d| d.id == id) {
            Some(index) => {
                let removed = docs.remove(index);
                Ok(Some(project(removed.id, removed.doc)))
            }
            None => Ok(None),
        }
    }

    async fn push_unique(
        &self,
        collection: &str,
        selector: &Selector,
        array_field: &str,
        element: Value,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_failure().await?;
        ensure_collection(collection)?;

        let compare = without_id(&element);
        let mut stored = match element {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::MalformedDocument {
                    collection: collection.to_string(),
                    detail: format!("expected object, found {other}"),
                })
            }
        };
        stored.insert("_id".to_string(), json!(Uuid::new_v4().to_string()));

        let mut collections = self.collections.write().await;
        let parent = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| matches(selector, d)));

        let parent = match parent {
            Some(parent) => parent,
            None => return Ok(WriteOutcome { matched: 0, modified: 0 }),
        };

        let map = parent.doc.as_object_mut().expect("memory store document");
        let items = map
            .entry(array_field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let items = items.as_array_mut().expect("embedded array field");

        if items.iter().any(|item| without_id(item) == compare) {
            return Ok(WriteOutcome { matched: 1, modified: 0 });
        }

        items.push(Value::Object(stored));
        Ok(WriteOutcome { matched: 1, modified: 1 })
    }

    async fn pull_by_id(
        &self,
        collection: &str,
        selector: &Selector,
        array_field: &str,
        element_id: Uuid,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_failure().await?;
        ensure_collection(collection)?;

        let mut collections = self.collections.write().await;
        let parent = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| matches(selector, d)));

        let parent = match parent {
            Some(parent) => parent,
            None => return Ok(WriteOutcome { matched: 0, modified: 0 }),
        };

        let wanted = element_id.to_string();
        if let Some(items) = parent
            .doc
            .as_object_mut()
            .and_then(|map| map.get_mut(array_field))
            .and_then(Value::as_array_mut)
        {
            items.retain(|item| item.get("_id").and_then(Value::as_str) != Some(wanted.as_str()));
        }

        Ok(WriteOutcome { matched: 1, modified: 1 })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_failure().await
    }
}

/// An `AppState` wired to a fresh in-memory store, plus the store handle
/// for seeding and fault injection.
pub fn memory_state() -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone());
    (state, store)
}
