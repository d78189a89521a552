//! In-process document store.

use super::{merge_fields, Document, DocumentPath, DocumentStore, RemoteResult};
use crate::error::RemoteError;
use crate::record::EntityType;
use crate::{EntityId, UserId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

type Key = (UserId, EntityType, EntityId);

/// Document store held in memory, ordered by path.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<Key, serde_json::Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a single document.
    pub async fn get(&self, path: &DocumentPath) -> Option<serde_json::Value> {
        self.documents.read().await.get(&key(path)).cloned()
    }

    /// Total number of stored documents across users and collections.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn key(path: &DocumentPath) -> Key {
    (
        path.user_id.clone(),
        path.entity_type,
        path.entity_id.clone(),
    )
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn set(&self, path: &DocumentPath, data: &serde_json::Value) -> RemoteResult<()> {
        if !data.is_object() {
            return Err(RemoteError::Rejected(format!(
                "{path}: document must be a JSON object"
            )));
        }
        self.documents.write().await.insert(key(path), data.clone());
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, fields: &serde_json::Value) -> RemoteResult<()> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&key(path))
            .ok_or_else(|| RemoteError::NotFound(path.entity_id.clone()))?;
        merge_fields(document, fields)
    }

    async fn delete(&self, path: &DocumentPath) -> RemoteResult<()> {
        self.documents.write().await.remove(&key(path));
        Ok(())
    }

    async fn list(&self, user_id: &str, entity_type: EntityType) -> RemoteResult<Vec<Document>> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|((uid, kind, _), _)| uid == user_id && *kind == entity_type)
            .map(|((_, _, id), data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect())
    }
}
