use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Collections this service is allowed to touch. Anything else is rejected
/// before a name gets anywhere near a query string.
pub const COLLECTIONS: &[&str] = &["teams", "customers", "users"];

/// Errors from the document store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("invalid field name: {0}")]
    InvalidField(String),

    #[error("malformed document in {collection}: {detail}")]
    MalformedDocument { collection: String, detail: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// How a write resolved on the store side. `matched` counts parents the
/// filter found; `modified` counts parents actually rewritten. The two
/// diverge for add-if-absent pushes that collapsed a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub matched: u64,
    pub modified: u64,
}

impl WriteOutcome {
    pub fn matched_any(&self) -> bool {
        self.matched > 0
    }
}

/// Locates a single parent document: by store-assigned id, or by a natural
/// key field compared as text (e.g. `userName`).
#[derive(Debug, Clone)]
pub enum Selector {
    Id(Uuid),
    Field { field: String, value: String },
}

impl Selector {
    pub fn id(id: Uuid) -> Self {
        Selector::Id(id)
    }

    pub fn field(field: impl Into<String>, value: impl Into<String>) -> Self {
        Selector::Field { field: field.into(), value: value.into() }
    }
}

/// The black-box document store: one JSON document per row, embedded arrays
/// inside the document, read-your-writes after every call returns.
///
/// Single calls are atomic on the store side. Sequences of calls are not;
/// the layers above own whatever interleavings that allows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in the collection, natural store order.
    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, StoreError>;

    /// First document matching the selector, if any.
    async fn find_one(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Option<Value>, StoreError>;

    /// Insert a new document. The store assigns `_id` and returns the
    /// projected document.
    async fn insert(&self, collection: &str, fields: Value) -> Result<Value, StoreError>;

    /// Conditional write: update `set_fields` on the document whose
    /// `key_field` equals `key_value`, inserting `{key_field: key_value} ∪
    /// set_fields` when no such document exists.
    async fn upsert(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &str,
        set_fields: Value,
    ) -> Result<WriteOutcome, StoreError>;

    /// Remove a document by id, returning the pre-deletion snapshot.
    async fn delete_by_id(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<Value>, StoreError>;

    /// Append `element` to the parent's `array_field` unless an element with
    /// the same business value is already present. Comparison ignores the
    /// store-assigned `_id`; the store mints one for the element before
    /// writing. `matched == 0` means no parent; `modified == 0` with a match
    /// means the duplicate collapsed.
    async fn push_unique(
        &self,
        collection: &str,
        selector: &Selector,
        array_field: &str,
        element: Value,
    ) -> Result<WriteOutcome, StoreError>;

    /// Remove the element whose `_id` equals `element_id` from the parent's
    /// `array_field`. Pulling zero elements from a matched parent is a
    /// success, not an error.
    async fn pull_by_id(
        &self,
        collection: &str,
        selector: &Selector,
        array_field: &str,
        element_id: Uuid,
    ) -> Result<WriteOutcome, StoreError>;

    /// Ping the backing store.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Reject collection names outside the fixed whitelist.
pub fn ensure_collection(name: &str) -> Result<(), StoreError> {
    if COLLECTIONS.contains(&name) {
        Ok(())
    } else {
        Err(StoreError::UnknownCollection(name.to_string()))
    }
}

/// Field names are spliced into query text after this check.
pub fn ensure_field(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidField(name.to_string()))
    }
}

/// The element value with the store-assigned identity stripped, which is
/// what add-if-absent pushes compare on.
pub fn without_id(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let stripped: serde_json::Map<String, Value> =
                map.iter().filter(|(k, _)| k.as_str() != "_id").map(|(k, v)| (k.clone(), v.clone())).collect();
            Value::Object(stripped)
        }
        other => other.clone(),
    }
}
