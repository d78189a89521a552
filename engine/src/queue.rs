//! Per-user durable queue of pending mutations, plus the dead-letter log.
//!
//! Both are JSON arrays stored under a single key per user. Every write to a
//! user's queue is a read-modify-write done under that user's lock, shared by
//! all clones of a [`DurableQueue`].

use crate::error::Result;
use crate::record::{DeadRecord, QueueRecord};
use crate::storage::KeyValueStore;
use crate::{RecordId, UserId};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const SYNC_QUEUE_KEY: &str = "sync_queue";
const DEAD_LETTER_KEY: &str = "sync_dead_letter";

/// Storage key of a user's queue.
pub fn queue_key(user_id: &str) -> String {
    format!("{SYNC_QUEUE_KEY}_{user_id}")
}

/// Storage key of a user's dead-letter log.
pub fn dead_letter_key(user_id: &str) -> String {
    format!("{DEAD_LETTER_KEY}_{user_id}")
}

/// Read a JSON list, treating an absent key or unparsable contents as empty.
async fn read_list<S, T>(storage: &S, key: &str) -> Result<Vec<T>>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let Some(raw) = storage.get(key).await? else {
        return Ok(Vec::new());
    };

    match serde_json::from_str(&raw) {
        Ok(items) => Ok(items),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding unreadable list");
            Ok(Vec::new())
        }
    }
}

/// Write a JSON list; an empty list removes the key.
async fn write_list<S, T>(storage: &S, key: &str, items: &[T]) -> Result<()>
where
    S: KeyValueStore + ?Sized,
    T: Serialize,
{
    if items.is_empty() {
        return storage.remove(key).await;
    }
    let raw = serde_json::to_string(items)?;
    storage.set(key, raw).await
}

/// Ordered list of pending [`QueueRecord`]s for each user.
pub struct DurableQueue<S: ?Sized> {
    storage: Arc<S>,
    locks: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl<S: ?Sized> Clone for DurableQueue<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: KeyValueStore + ?Sized> DurableQueue<S> {
    /// Create a queue over the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            locks: Arc::new(DashMap::new()),
        }
    }

    async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&self.locks.entry(user_id.to_string()).or_default());
        lock.lock_owned().await
    }

    /// Append a record at the tail.
    pub async fn append(&self, user_id: &str, record: QueueRecord) -> Result<()> {
        let _guard = self.lock(user_id).await;
        let key = queue_key(user_id);
        let mut records: Vec<QueueRecord> = read_list(self.storage.as_ref(), &key).await?;
        tracing::debug!(
            user_id,
            record_id = %record.id,
            action = %record.action,
            entity_type = %record.entity_type,
            "queueing mutation"
        );
        records.push(record);
        write_list(self.storage.as_ref(), &key, &records).await
    }

    /// All pending records in FIFO order.
    pub async fn read_all(&self, user_id: &str) -> Result<Vec<QueueRecord>> {
        read_list(self.storage.as_ref(), &queue_key(user_id)).await
    }

    /// Overwrite the queue. An empty list deletes the key entirely.
    pub async fn replace(&self, user_id: &str, records: &[QueueRecord]) -> Result<()> {
        let _guard = self.lock(user_id).await;
        write_list(self.storage.as_ref(), &queue_key(user_id), records).await
    }

    /// Rewrite the queue after a pass: `retained` first, then every queued
    /// record whose id is not in `seen`. Returns the resulting queue length.
    pub async fn merge_retained(
        &self,
        user_id: &str,
        seen: &HashSet<RecordId>,
        mut retained: Vec<QueueRecord>,
    ) -> Result<usize> {
        let _guard = self.lock(user_id).await;
        let key = queue_key(user_id);
        let current: Vec<QueueRecord> = read_list(self.storage.as_ref(), &key).await?;
        retained.extend(current.into_iter().filter(|r| !seen.contains(&r.id)));
        write_list(self.storage.as_ref(), &key, &retained).await?;
        Ok(retained.len())
    }

    /// Drop every pending record.
    pub async fn clear(&self, user_id: &str) -> Result<()> {
        let _guard = self.lock(user_id).await;
        self.storage.remove(&queue_key(user_id)).await
    }

    /// Number of pending records.
    pub async fn len(&self, user_id: &str) -> Result<usize> {
        Ok(self.read_all(user_id).await?.len())
    }

    /// Whether any record is pending.
    pub async fn has_pending(&self, user_id: &str) -> Result<bool> {
        Ok(self.len(user_id).await? > 0)
    }
}

/// Records dropped from the queue after permanent failure.
pub struct DeadLetterLog<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: ?Sized> Clone for DeadLetterLog<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: KeyValueStore + ?Sized> DeadLetterLog<S> {
    /// Create a log over the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Append dropped records.
    pub async fn append(&self, user_id: &str, dead: Vec<DeadRecord>) -> Result<()> {
        if dead.is_empty() {
            return Ok(());
        }
        let key = dead_letter_key(user_id);
        let mut entries: Vec<DeadRecord> = read_list(self.storage.as_ref(), &key).await?;
        entries.extend(dead);
        write_list(self.storage.as_ref(), &key, &entries).await
    }

    /// All dropped records, oldest first.
    pub async fn read_all(&self, user_id: &str) -> Result<Vec<DeadRecord>> {
        read_list(self.storage.as_ref(), &dead_letter_key(user_id)).await
    }

    /// Forget all dropped records.
    pub async fn clear(&self, user_id: &str) -> Result<()> {
        self.storage.remove(&dead_letter_key(user_id)).await
    }
}
