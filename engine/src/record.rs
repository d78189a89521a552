//! Queue record types for pending mutations.

use crate::{EntityId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Replace the whole document
    Create,
    /// Merge fields into an existing document
    Update,
    /// Remove the document
    Delete,
}

/// Entity kinds that are synced through the queue.
///
/// The lower-case name doubles as the remote collection name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Medication,
    Adherence,
    Favorite,
}

impl EntityType {
    /// All entity types, in a stable order.
    pub const ALL: [EntityType; 3] = [
        EntityType::Medication,
        EntityType::Adherence,
        EntityType::Favorite,
    ];

    /// Collection name on the remote store.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Medication => "medication",
            EntityType::Adherence => "adherence",
            EntityType::Favorite => "favorite",
        }
    }

    /// Parse a collection name back into an entity type.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One pending local mutation awaiting remote application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    /// Unique identifier for this record
    pub id: RecordId,
    /// What to do with the target document
    pub action: Action,
    /// Collection the target document lives in
    pub entity_type: EntityType,
    /// Target document identifier
    pub entity_id: EntityId,
    /// Document body (CREATE) or fields to merge (UPDATE); empty for DELETE
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
    /// When the record was enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed application attempts so far
    #[serde(default)]
    pub retry_count: u32,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl QueueRecord {
    /// Create a new record with a fresh id and zero retries.
    pub fn new(
        action: Action,
        entity_type: EntityType,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_timestamp(action, entity_type, entity_id, payload, Utc::now())
    }

    /// Create a new record enqueued at a given time.
    pub fn with_timestamp(
        action: Action,
        entity_type: EntityType,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            payload,
            enqueued_at,
            retry_count: 0,
        }
    }

    /// Set the retry count (used when restoring or seeding queues).
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Register one failed attempt and return the new retry count.
    pub fn record_failure(&mut self) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }
}

/// A record dropped from the queue after permanent failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadRecord {
    /// The record as it was when dropped (retry count included)
    pub record: QueueRecord,
    /// Last failure reported by the remote store
    pub reason: String,
    /// When the record was dropped
    pub dropped_at: DateTime<Utc>,
}
