//! Database operations for the documents table.

use farmasync_engine::{Document, DocumentPath, EntityType};
use sqlx::{PgPool, Row};

/// A stored document row from the database.
#[derive(Debug)]
pub struct StoredDocument {
    pub doc_id: String,
    pub data: serde_json::Value,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredDocument {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            doc_id: row.try_get("doc_id")?,
            data: row.try_get("data")?,
        })
    }
}

impl StoredDocument {
    /// Convert database row to the wire document.
    pub fn into_document(self) -> Document {
        Document {
            id: self.doc_id,
            data: self.data,
        }
    }
}

/// Insert or fully replace a document.
pub async fn set_document(
    pool: &PgPool,
    path: &DocumentPath,
    data: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO documents (user_id, collection, doc_id, data)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, collection, doc_id) DO UPDATE SET
            data = EXCLUDED.data,
            updated_at = now()
        "#,
    )
    .bind(&path.user_id)
    .bind(path.entity_type.as_str())
    .bind(&path.entity_id)
    .bind(data)
    .execute(pool)
    .await?;

    Ok(())
}

/// Shallow-merge `fields` into an existing document.
///
/// Returns `false` when the document does not exist.
pub async fn merge_document(
    pool: &PgPool,
    path: &DocumentPath,
    fields: &serde_json::Value,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET data = data || $4, updated_at = now()
        WHERE user_id = $1 AND collection = $2 AND doc_id = $3
        "#,
    )
    .bind(&path.user_id)
    .bind(path.entity_type.as_str())
    .bind(&path.entity_id)
    .bind(fields)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a document. Returns whether a row was removed.
pub async fn delete_document(pool: &PgPool, path: &DocumentPath) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM documents
        WHERE user_id = $1 AND collection = $2 AND doc_id = $3
        "#,
    )
    .bind(&path.user_id)
    .bind(path.entity_type.as_str())
    .bind(&path.entity_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get a single document.
pub async fn get_document(
    pool: &PgPool,
    path: &DocumentPath,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT doc_id, data
        FROM documents
        WHERE user_id = $1 AND collection = $2 AND doc_id = $3
        "#,
    )
    .bind(&path.user_id)
    .bind(path.entity_type.as_str())
    .bind(&path.entity_id)
    .fetch_optional(pool)
    .await
}

/// Get every document of one user's collection, oldest first.
pub async fn list_documents(
    pool: &PgPool,
    user_id: &str,
    collection: EntityType,
) -> Result<Vec<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT doc_id, data
        FROM documents
        WHERE user_id = $1 AND collection = $2
        ORDER BY created_at, doc_id
        "#,
    )
    .bind(user_id)
    .bind(collection.as_str())
    .fetch_all(pool)
    .await
}
