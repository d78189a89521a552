//! Applies one queued mutation against the remote document store.

use crate::backoff::Backoff;
use crate::record::{Action, QueueRecord};
use crate::remote::{DocumentPath, DocumentStore, RemoteResult};
use std::sync::Arc;

/// Maps queue records onto document store calls.
///
/// Every attempt waits the backoff delay for the record's current retry
/// count first, so even a fresh record is throttled by the base delay.
pub struct Applier<D: ?Sized> {
    store: Arc<D>,
    backoff: Backoff,
}

impl<D: ?Sized> Clone for Applier<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            backoff: self.backoff,
        }
    }
}

impl<D: DocumentStore + ?Sized> Applier<D> {
    pub fn new(store: Arc<D>, backoff: Backoff) -> Self {
        Self { store, backoff }
    }

    /// The backoff scheduler in use.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Wait, then apply `record` for `user_id`.
    pub async fn apply(&self, user_id: &str, record: &QueueRecord) -> RemoteResult<()> {
        self.backoff.wait(record.retry_count).await;

        let path = DocumentPath::new(user_id, record.entity_type, record.entity_id.clone());
        tracing::trace!(%path, action = %record.action, retry_count = record.retry_count, "applying");

        match record.action {
            Action::Create => self.store.set(&path, &record.payload).await,
            Action::Update => self.store.update(&path, &record.payload).await,
            Action::Delete => self.store.delete(&path).await,
        }
    }
}
