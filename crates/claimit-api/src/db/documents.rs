//! Postgres-backed document store
//!
//! Documents are JSONB rows keyed by their full path. Collection and
//! collection-group queries filter on the stored `collection` / `group_name`
//! columns; equality filters are pushed down as JSONB containment and then
//! rechecked exactly.

use async_trait::async_trait;
use claimit_core::store::{
    apply_updates, CollectionPath, DocPath, Document, DocumentStore, FieldUpdate, Query, Source,
    StoreError, StoreResult, WriteBatch, WriteOp,
};
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};
use tracing::debug;

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn into_body(path: &DocPath, value: Value) -> StoreResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidDocument(path.to_string())),
    }
}

async fn load(
    conn: &mut PgConnection,
    path: &DocPath,
    for_update: bool,
) -> StoreResult<Option<Map<String, Value>>> {
    let sql = if for_update {
        "SELECT data FROM documents WHERE path = $1 FOR UPDATE"
    } else {
        "SELECT data FROM documents WHERE path = $1"
    };
    let row: Option<(Value,)> = sqlx::query_as(sql)
        .bind(path.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

    row.map(|(data,)| into_body(path, data)).transpose()
}

async fn put(conn: &mut PgConnection, path: &DocPath, data: Map<String, Value>) -> StoreResult<()> {
    let collection = path.collection();
    sqlx::query(
        r#"
        INSERT INTO documents (path, collection, group_name, doc_id, data)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (path) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
        "#,
    )
    .bind(path.to_string())
    .bind(collection.to_string())
    .bind(collection.name())
    .bind(path.id())
    .bind(Value::Object(data))
    .execute(&mut *conn)
    .await
    .map_err(backend)?;
    Ok(())
}

async fn patch(conn: &mut PgConnection, path: &DocPath, updates: &[FieldUpdate]) -> StoreResult<()> {
    let mut data = load(conn, path, true)
        .await?
        .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
    apply_updates(&mut data, updates)?;

    sqlx::query("UPDATE documents SET data = $2, updated_at = NOW() WHERE path = $1")
        .bind(path.to_string())
        .bind(Value::Object(data))
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
    Ok(())
}

async fn remove(conn: &mut PgConnection, path: &DocPath) -> StoreResult<()> {
    sqlx::query("DELETE FROM documents WHERE path = $1")
        .bind(path.to_string())
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        let data = load(&mut conn, path, false).await?;
        Ok(data.map(|data| Document::new(path.clone(), data)))
    }

    async fn list(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let (column, key) = match &query.source {
            Source::Collection(collection) => ("collection", collection.to_string()),
            Source::Group(name) => ("group_name", name.clone()),
        };
        let containment: Map<String, Value> = query
            .filters
            .iter()
            .map(|f| (f.field.clone(), f.equals.clone()))
            .collect();

        let sql = format!(
            "SELECT path, data FROM documents WHERE {} = $1 AND data @> $2 ORDER BY path",
            column
        );
        let rows: Vec<(String, Value)> = sqlx::query_as(&sql)
            .bind(key)
            .bind(Value::Object(containment))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut docs = Vec::with_capacity(rows.len());
        for (raw, data) in rows {
            let path = DocPath::parse(&raw)?;
            let data = into_body(&path, data)?;
            docs.push(Document::new(path, data));
        }
        docs.retain(|doc| query.matches(doc));
        query.sort(&mut docs);

        debug!(count = docs.len(), "Query over {} '{}'", column, query_key(query));
        Ok(docs)
    }

    async fn add(
        &self,
        collection: &CollectionPath,
        data: Map<String, Value>,
    ) -> StoreResult<DocPath> {
        let path = collection.new_doc();
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        put(&mut conn, &path, data).await?;
        Ok(path)
    }

    async fn update(&self, path: &DocPath, updates: &[FieldUpdate]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        patch(&mut tx, path, updates).await?;
        tx.commit().await.map_err(backend)
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        remove(&mut conn, path).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let count = batch.len();
        let mut tx = self.pool.begin().await.map_err(backend)?;
        // Locked rows stay locked until commit, so the ops see what was checked
        for precondition in &batch.expect {
            let current = load(&mut tx, &precondition.path, true).await?;
            precondition.check(current.as_ref())?;
        }
        for op in batch.ops {
            match op {
                WriteOp::Set { path, data } => put(&mut tx, &path, data).await?,
                WriteOp::Update { path, updates } => patch(&mut tx, &path, &updates).await?,
                WriteOp::Delete { path } => remove(&mut tx, &path).await?,
            }
        }
        tx.commit().await.map_err(backend)?;

        debug!(ops = count, "Batch committed");
        Ok(())
    }
}

fn query_key(query: &Query) -> String {
    match &query.source {
        Source::Collection(collection) => collection.to_string(),
        Source::Group(name) => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(matches!(
            backend(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            backend(sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn test_non_object_rows_rejected() {
        let path = DocPath::parse("found_items/i1").unwrap();
        assert!(into_body(&path, json!({"name": "Keys"})).is_ok());
        assert!(matches!(
            into_body(&path, json!([1, 2])),
            Err(StoreError::InvalidDocument(_))
        ));
    }
}
