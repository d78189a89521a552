//! Sync service - the composed queue, dead-letter log and processor.
//!
//! Construct one per application and share it behind an `Arc`; there is no
//! global instance.

use crate::applier::Applier;
use crate::backoff::Backoff;
use crate::config::{ConfigError, SyncConfig};
use crate::error::Result;
use crate::processor::{PassOutcome, QueueProcessor, SyncProgress};
use crate::queue::{DeadLetterLog, DurableQueue};
use crate::record::{Action, DeadRecord, EntityType, QueueRecord};
use crate::remote::{DocumentStore, HttpDocumentStore};
use crate::storage::{FileStorage, KeyValueStore, MemoryStorage};
use crate::EntityId;
use std::sync::Arc;

/// Service over type-erased storage and remote store.
pub type DynSyncService = SyncService<dyn KeyValueStore, dyn DocumentStore>;

/// Offline mutation queue for all users of one device.
pub struct SyncService<S: ?Sized, D: ?Sized> {
    queue: DurableQueue<S>,
    dead_letters: DeadLetterLog<S>,
    processor: QueueProcessor<S, D>,
}

impl<S, D> SyncService<S, D>
where
    S: KeyValueStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    /// Create a service over the given storage and remote store.
    pub fn new(storage: Arc<S>, remote: Arc<D>, config: &SyncConfig) -> Self {
        let queue = DurableQueue::new(Arc::clone(&storage));
        let dead_letters = DeadLetterLog::new(storage);
        let applier = Applier::new(remote, Backoff::new(config.base_delay));
        let processor = QueueProcessor::new(
            queue.clone(),
            dead_letters.clone(),
            applier,
            config.max_retries,
        );

        Self {
            queue,
            dead_letters,
            processor,
        }
    }

    /// Queue an already built record.
    pub async fn add_to_sync_queue(&self, user_id: &str, record: QueueRecord) -> Result<()> {
        self.queue.append(user_id, record).await
    }

    /// Build and queue a record, returning it.
    pub async fn enqueue(
        &self,
        user_id: &str,
        action: Action,
        entity_type: EntityType,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
    ) -> Result<QueueRecord> {
        let record = QueueRecord::new(action, entity_type, entity_id, payload);
        self.queue.append(user_id, record.clone()).await?;
        Ok(record)
    }

    /// Run one pass over the user's queue.
    pub async fn process_sync_queue<F>(&self, user_id: &str, on_progress: F) -> Result<PassOutcome>
    where
        F: FnMut(SyncProgress) + Send,
    {
        self.processor
            .process_with_progress(user_id, on_progress)
            .await
    }

    /// Pending records in FIFO order.
    pub async fn get_sync_queue(&self, user_id: &str) -> Result<Vec<QueueRecord>> {
        self.queue.read_all(user_id).await
    }

    pub async fn clear_sync_queue(&self, user_id: &str) -> Result<()> {
        tracing::info!(user_id, "clearing sync queue");
        self.queue.clear(user_id).await
    }

    pub async fn queue_size(&self, user_id: &str) -> Result<usize> {
        self.queue.len(user_id).await
    }

    pub async fn has_pending_sync(&self, user_id: &str) -> Result<bool> {
        self.queue.has_pending(user_id).await
    }

    /// Whether a pass is currently running for the user.
    pub fn is_syncing(&self, user_id: &str) -> bool {
        self.processor.is_running(user_id)
    }

    /// Records dropped after permanent failure.
    pub async fn dead_letters(&self, user_id: &str) -> Result<Vec<DeadRecord>> {
        self.dead_letters.read_all(user_id).await
    }

    pub async fn clear_dead_letters(&self, user_id: &str) -> Result<()> {
        self.dead_letters.clear(user_id).await
    }
}

impl DynSyncService {
    /// Build a service from configuration: directory storage when
    /// `storage_dir` is set (memory otherwise) and the HTTP document store.
    pub async fn connect(config: &SyncConfig) -> Result<Arc<Self>> {
        let storage: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::open(dir.clone()).await?),
            None => Arc::new(MemoryStorage::new()),
        };

        let url = config
            .remote_url
            .as_deref()
            .ok_or(ConfigError::MissingRemoteUrl)?;
        let mut http = HttpDocumentStore::new(url, config.remote_timeout)?;
        if let Some(secret) = &config.remote_auth_secret {
            http = http.with_signing_secret(secret.clone());
        }
        let remote: Arc<dyn DocumentStore> = Arc::new(http);

        tracing::info!(
            remote_url = url,
            signed = config.remote_auth_secret.is_some(),
            "sync service ready"
        );
        Ok(Arc::new(Self::new(storage, remote, config)))
    }
}
