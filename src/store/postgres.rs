use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{DocPath, Document, DocumentStore};
use crate::error::StoreError;

/// Documents kept in one JSONB table keyed by `(collection, id)`.
/// `updated_at` is assigned by the server on every write.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("connection pool is closed".into()));
        }
        Ok(())
    }
}

/// Containment on a single top-level field, so the `jsonb_path_ops` GIN index
/// serves every field. For scalar values it is plain equality.
const QUERY_EQ_SQL: &str = r#"
    SELECT id, data
    FROM documents
    WHERE collection = $1 AND data @> jsonb_build_object($2::text, $3::jsonb)
    ORDER BY id
"#;

fn rows_to_documents(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<Document>, StoreError> {
    let mut documents = Vec::with_capacity(rows.len());
    for row in rows {
        documents.push(Document {
            id: row.try_get("id")?,
            data: row.try_get("data")?,
        });
    }
    Ok(documents)
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(path.collection())
            .bind(path.id())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("data")?)),
            None => Ok(None),
        }
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        self.ensure_open()?;
        let rows = sqlx::query(QUERY_EQ_SQL)
            .bind(collection)
            .bind(field)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        debug!(collection, field, matched = rows.len(), "query_eq");
        rows_to_documents(rows)
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.ensure_open()?;
        let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = $1 ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        rows_to_documents(rows)
    }

    async fn set_merge(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
        self.ensure_open()?;
        if !data.is_object() {
            return Err(StoreError::NotAnObject(path.to_string()));
        }
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE
            SET data = documents.data || EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(path.collection())
        .bind(path.id())
        .bind(&data)
        .execute(&self.pool)
        .await?;
        debug!(%path, "set_merge");
        Ok(())
    }

    async fn array_union(
        &self,
        path: &DocPath,
        field: &str,
        items: Vec<Value>,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let items = Value::Array(items);
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, jsonb_build_object($3::text, $4::jsonb))
            ON CONFLICT (collection, id) DO UPDATE
            SET data = jsonb_set(
                    documents.data,
                    ARRAY[$3::text],
                    COALESCE(documents.data -> $3::text, '[]'::jsonb) || COALESCE((
                        SELECT jsonb_agg(item)
                        FROM jsonb_array_elements($4::jsonb) AS item
                        WHERE NOT COALESCE(documents.data -> $3::text, '[]'::jsonb)
                            @> jsonb_build_array(item)
                    ), '[]'::jsonb),
                    true
                ),
                updated_at = now()
            "#,
        )
        .bind(path.collection())
        .bind(path.id())
        .bind(field)
        .bind(&items)
        .execute(&self.pool)
        .await?;
        debug!(%path, field, "array_union");
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.ensure_open()?;
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(path.collection())
            .bind(path.id())
            .execute(&self.pool)
            .await?;
        debug!(%path, "delete");
        Ok(())
    }
}
