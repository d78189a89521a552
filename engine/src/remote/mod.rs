//! Remote document store abstraction.
//!
//! Documents live in hierarchical collections addressed by
//! `users/{userId}/{entityType}/{entityId}`. The queue only needs four
//! operations from a store:
//!
//! | operation | semantics                                    |
//! |-----------|----------------------------------------------|
//! | `set`     | replace the document, creating it if absent  |
//! | `update`  | shallow merge, [`RemoteError::NotFound`] if absent |
//! | `delete`  | remove, absent documents are not an error    |
//! | `list`    | every document of one collection             |

mod http;
mod memory;

pub use http::HttpDocumentStore;
pub use memory::MemoryDocumentStore;

use crate::error::RemoteError;
use crate::record::EntityType;
use crate::{EntityId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `error` field of the document server's answer for a missing document.
pub const DOCUMENT_NOT_FOUND: &str = "Document not found";

/// Result of a remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub user_id: UserId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl DocumentPath {
    pub fn new(
        user_id: impl Into<UserId>,
        entity_type: EntityType,
        entity_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "users/{}/{}/{}",
            self.user_id, self.entity_type, self.entity_id
        )
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: EntityId,
    pub data: serde_json::Value,
}

/// A remote document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replace the document at `path`.
    async fn set(&self, path: &DocumentPath, data: &serde_json::Value) -> RemoteResult<()>;

    /// Merge `fields` into the existing document at `path`.
    async fn update(&self, path: &DocumentPath, fields: &serde_json::Value) -> RemoteResult<()>;

    /// Delete the document at `path`.
    async fn delete(&self, path: &DocumentPath) -> RemoteResult<()>;

    /// Every document in one of the user's collections.
    async fn list(&self, user_id: &str, entity_type: EntityType) -> RemoteResult<Vec<Document>>;
}

/// Shallow-merge `fields` into `target`. Both must be JSON objects.
pub fn merge_fields(target: &mut serde_json::Value, fields: &serde_json::Value) -> RemoteResult<()> {
    let (Some(target), Some(fields)) = (target.as_object_mut(), fields.as_object()) else {
        return Err(RemoteError::Rejected(
            "documents and updates must be JSON objects".to_string(),
        ));
    };
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
    Ok(())
}
