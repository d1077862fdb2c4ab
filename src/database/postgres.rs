use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::database::store::{
    ensure_collection, ensure_field, without_id, DocumentStore, Selector, StoreError, WriteOutcome,
    COLLECTIONS,
};

/// Postgres-backed document store. Each collection is a table of
/// `(id uuid, revision bigint, doc jsonb)`; embedded arrays live inside
/// `doc`. The `revision` column is internal and never projected.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the collection tables if they are missing. The `teams` natural
    /// key gets a unique expression index so upserts can target it. `users`
    /// deliberately gets none: signup uniqueness stays a check-then-act in
    /// the account service, matching the historical behavior.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for collection in COLLECTIONS {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                     id uuid PRIMARY KEY,
                     revision bigint NOT NULL DEFAULT 0,
                     doc jsonb NOT NULL
                 )",
                table = quote_ident(collection)
            );
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS teams_name_key ON teams ((doc->>'name'))")
            .execute(&self.pool)
            .await?;

        info!("document store schema ready ({} collections)", COLLECTIONS.len());
        Ok(())
    }

    /// SQL fragment locating the selected parent inside the `target` CTE.
    fn selector_condition(selector: &Selector) -> Result<String, StoreError> {
        match selector {
            Selector::Id(_) => Ok("id = $1".to_string()),
            Selector::Field { field, .. } => {
                ensure_field(field)?;
                Ok(format!("doc->>'{field}' = $1"))
            }
        }
    }
}

/// Merge the row id into the document as `_id`, the only projection the
/// store exposes (`revision` stays behind).
fn project(collection: &str, id: Uuid, doc: Value) -> Result<Value, StoreError> {
    match doc {
        Value::Object(mut map) => {
            map.insert("_id".to_string(), json!(id.to_string()));
            Ok(Value::Object(map))
        }
        other => Err(StoreError::MalformedDocument {
            collection: collection.to_string(),
            detail: format!("expected object, found {other}"),
        }),
    }
}

fn as_object(collection: &str, value: Value) -> Result<serde_json::Map<String, Value>, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::MalformedDocument {
            collection: collection.to_string(),
            detail: format!("expected object, found {other}"),
        }),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        ensure_collection(collection)?;

        let sql = format!("SELECT id, doc FROM {}", quote_ident(collection));
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                let doc: Value = row.try_get("doc")?;
                project(collection, id, doc)
            })
            .collect()
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Option<Value>, StoreError> {
        ensure_collection(collection)?;

        let sql = format!(
            "SELECT id, doc FROM {table} WHERE {cond} LIMIT 1",
            table = quote_ident(collection),
            cond = Self::selector_condition(selector)?,
        );

        let query = sqlx::query(&sql);
        let query = match selector {
            Selector::Id(id) => query.bind(*id),
            Selector::Field { value, .. } => query.bind(value.clone()),
        };

        match query.fetch_optional(&self.pool).await? {
            Some(row) => {
                let id: Uuid = row.try_get("id")?;
                let doc: Value = row.try_get("doc")?;
                Ok(Some(project(collection, id, doc)?))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, collection: &str, fields: Value) -> Result<Value, StoreError> {
        ensure_collection(collection)?;
        let doc = Value::Object(as_object(collection, fields)?);

        let id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO {table} (id, doc) VALUES ($1, $2)",
            table = quote_ident(collection)
        );
        sqlx::query(&sql).bind(id).bind(&doc).execute(&self.pool).await?;

        project(collection, id, doc)
    }

    async fn upsert(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &str,
        set_fields: Value,
    ) -> Result<WriteOutcome, StoreError> {
        ensure_collection(collection)?;
        ensure_field(key_field)?;

        let mut insert_doc = as_object(collection, set_fields.clone())?;
        insert_doc.insert(key_field.to_string(), json!(key_value));

        // ON CONFLICT against the unique expression index on the key. The
        // statement always inserts or updates exactly one row; a zero
        // outcome is the store anomaly the repository layer guards for.
        let sql = format!(
            "INSERT INTO {table} (id, doc) VALUES ($1, $2)
             ON CONFLICT ((doc->>'{key}')) DO UPDATE
             SET doc = {table}.doc || $3, revision = {table}.revision + 1",
            table = quote_ident(collection),
            key = key_field,
        );

        let result = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(Value::Object(insert_doc))
            .bind(set_fields)
            .execute(&self.pool)
            .await?;

        let affected = result.rows_affected();
        Ok(WriteOutcome { matched: affected, modified: affected })
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<Value>, StoreError> {
        ensure_collection(collection)?;

        let sql = format!(
            "DELETE FROM {table} WHERE id = $1 RETURNING id, doc",
            table = quote_ident(collection)
        );

        match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await? {
            Some(row) => {
                let id: Uuid = row.try_get("id")?;
                let doc: Value = row.try_get("doc")?;
                Ok(Some(project(collection, id, doc)?))
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
        ensure_collection(collection)?;
        ensure_field(array_field)?;

        // The comparison value carries no identity; the stored element does.
        let compare = without_id(&element);
        let mut stored = as_object(collection, element)?;
        stored.insert("_id".to_string(), json!(Uuid::new_v4().to_string()));
        let wrapped = Value::Array(vec![Value::Object(stored)]);

        // Single statement so the found-parent and append observations come
        // from one snapshot. `modified = 0` with a match means the element's
        // business value was already present and the append collapsed.
        let sql = format!(
            "WITH target AS (
                 SELECT id, doc FROM {table} WHERE {cond} LIMIT 1
             ),
             updated AS (
                 UPDATE {table}
                    SET doc = jsonb_set({table}.doc, '{{{field}}}',
                              COALESCE({table}.doc->'{field}', '[]'::jsonb) || $2, true),
                        revision = {table}.revision + 1
                   FROM target
                  WHERE {table}.id = target.id
                    AND NOT EXISTS (
                        SELECT 1
                          FROM jsonb_array_elements(COALESCE(target.doc->'{field}', '[]'::jsonb))
                               AS existing(value)
                         WHERE existing.value - '_id' = $3
                    )
              RETURNING {table}.id
             )
             SELECT (SELECT count(*) FROM target) AS matched,
                    (SELECT count(*) FROM updated) AS modified",
            table = quote_ident(collection),
            cond = Self::selector_condition(selector)?,
            field = array_field,
        );

        let query = sqlx::query(&sql);
        let query = match selector {
            Selector::Id(id) => query.bind(*id),
            Selector::Field { value, .. } => query.bind(value.clone()),
        };
        let row = query.bind(wrapped).bind(compare).fetch_one(&self.pool).await?;

        let matched: i64 = row.try_get("matched")?;
        let modified: i64 = row.try_get("modified")?;
        Ok(WriteOutcome { matched: matched as u64, modified: modified as u64 })
    }

    async fn pull_by_id(
        &self,
        collection: &str,
        selector: &Selector,
        array_field: &str,
        element_id: Uuid,
    ) -> Result<WriteOutcome, StoreError> {
        ensure_collection(collection)?;
        ensure_field(array_field)?;

        // The array is rewritten whenever the parent matches; a pull that
        // removes nothing still reports the match, which is exactly the
        // contract the mutator relies on.
        let sql = format!(
            "WITH target AS (
                 SELECT id FROM {table} WHERE {cond} LIMIT 1
             ),
             updated AS (
                 UPDATE {table}
                    SET doc = jsonb_set({table}.doc, '{{{field}}}',
                              COALESCE(
                                  (SELECT jsonb_agg(existing.value ORDER BY existing.ordinality)
                                     FROM jsonb_array_elements({table}.doc->'{field}')
                                          WITH ORDINALITY AS existing(value, ordinality)
                                    WHERE existing.value->>'_id' IS DISTINCT FROM $2),
                                  '[]'::jsonb),
                              true),
                        revision = {table}.revision + 1
                   FROM target
                  WHERE {table}.id = target.id
              RETURNING {table}.id
             )
             SELECT (SELECT count(*) FROM target) AS matched,
                    (SELECT count(*) FROM updated) AS modified",
            table = quote_ident(collection),
            cond = Self::selector_condition(selector)?,
            field = array_field,
        );

        let query = sqlx::query(&sql);
        let query = match selector {
            Selector::Id(id) => query.bind(*id),
            Selector::Field { value, .. } => query.bind(value.clone()),
        };
        let row = query.bind(element_id.to_string()).fetch_one(&self.pool).await?;

        let matched: i64 = row.try_get("matched")?;
        let modified: i64 = row.try_get("modified")?;
        Ok(WriteOutcome { matched: matched as u64, modified: modified as u64 })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
