//! Document handlers - apply client mutations to the documents table.

use crate::db;
use crate::error::{AppError, Result};
use farmasync_engine::{Document, DocumentPath, EntityType};
use sqlx::PgPool;

/// Resolve a collection name from the URL into an entity type.
pub fn parse_collection(name: &str) -> Result<EntityType> {
    EntityType::parse(name).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unknown collection '{}', expected one of: {}",
            name,
            EntityType::ALL.map(|t| t.as_str()).join(", ")
        ))
    })
}

/// Document bodies and merge patches must be JSON objects.
pub fn require_object(body: &serde_json::Value) -> Result<()> {
    if body.is_object() {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "Document body must be a JSON object".to_string(),
        ))
    }
}

/// List one user's collection.
pub async fn handle_list(
    pool: &PgPool,
    user_id: &str,
    collection: EntityType,
) -> Result<Vec<Document>> {
    let stored = db::list_documents(pool, user_id, collection).await?;
    Ok(stored.into_iter().map(db::StoredDocument::into_document).collect())
}

/// Fetch a single document.
pub async fn handle_get(pool: &PgPool, path: &DocumentPath) -> Result<Document> {
    db::get_document(pool, path)
        .await?
        .map(db::StoredDocument::into_document)
        .ok_or_else(|| AppError::DocumentNotFound(format!("Document {} does not exist", path)))
}

/// Create or replace a document.
pub async fn handle_set(pool: &PgPool, path: &DocumentPath, data: &serde_json::Value) -> Result<()> {
    require_object(data)?;
    db::set_document(pool, path, data).await?;
    tracing::debug!(%path, "document set");
    Ok(())
}

/// Merge fields into an existing document.
pub async fn handle_merge(
    pool: &PgPool,
    path: &DocumentPath,
    fields: &serde_json::Value,
) -> Result<()> {
    require_object(fields)?;
    if !db::merge_document(pool, path, fields).await? {
        return Err(AppError::DocumentNotFound(format!(
            "Document {} does not exist",
            path
        )));
    }
    tracing::debug!(%path, "document merged");
    Ok(())
}

/// Delete a document; deleting an absent document succeeds.
pub async fn handle_delete(pool: &PgPool, path: &DocumentPath) -> Result<()> {
    let removed = db::delete_document(pool, path).await?;
    tracing::debug!(%path, removed, "document deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collections_map_to_entity_types() {
        assert_eq!(parse_collection("medication").unwrap(), EntityType::Medication);
        assert_eq!(parse_collection("favorite").unwrap(), EntityType::Favorite);

        let err = parse_collection("todos").unwrap_err();
        assert!(err.to_string().contains("medication, adherence, favorite"));
    }

    #[test]
    fn bodies_must_be_objects() {
        assert!(require_object(&json!({"a": 1})).is_ok());
        assert!(require_object(&json!([1, 2])).is_err());
        assert!(require_object(&json!(null)).is_err());
    }
}
