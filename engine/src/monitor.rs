//! Queue-state observer for the UI layer.
//!
//! A [`SyncMonitor`] is bound to the signed-in user (or to nobody, in which
//! case every call is a no-op) and publishes a [`SyncStatus`] through a
//! `tokio::sync::watch` channel. Failures are logged and folded into the
//! status instead of being returned.

use crate::processor::{PassOutcome, SyncProgress, SyncReport};
use crate::record::{DeadRecord, QueueRecord};
use crate::remote::DocumentStore;
use crate::service::SyncService;
use crate::storage::KeyValueStore;
use crate::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What the UI shows about synchronization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub queue_size: usize,
    pub is_syncing: bool,
    pub sync_progress: SyncProgress,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
}

/// Observes one user's queue and drives passes on demand.
pub struct SyncMonitor<S: ?Sized, D: ?Sized> {
    service: Arc<SyncService<S, D>>,
    user_id: Option<UserId>,
    status: watch::Sender<SyncStatus>,
}

impl<S, D> SyncMonitor<S, D>
where
    S: KeyValueStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    pub fn new(service: Arc<SyncService<S, D>>, user_id: Option<UserId>) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            service,
            user_id,
            status,
        }
    }

    /// The observed user, if signed in.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Receive every status change.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Refresh the queue size. Returns the new size when it could be read.
    pub async fn check_queue_size(&self) -> Option<usize> {
        let user_id = self.user_id.as_deref()?;

        match self.service.queue_size(user_id).await {
            Ok(size) => {
                self.status.send_if_modified(|s| {
                    let changed = s.queue_size != size;
                    s.queue_size = size;
                    changed
                });
                Some(size)
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "failed to check queue size");
                None
            }
        }
    }

    /// Queue a mutation. Returns whether it was persisted.
    ///
    /// A storage failure is logged and swallowed: the caller's local change
    /// stands, but it will not reach the remote store.
    pub async fn add_to_queue(&self, record: QueueRecord) -> bool {
        let Some(user_id) = self.user_id.as_deref() else {
            return false;
        };

        if let Err(e) = self.service.add_to_sync_queue(user_id, record).await {
            tracing::error!(user_id, error = %e, "failed to add to sync queue");
            return false;
        }
        self.check_queue_size().await;
        true
    }

    /// Run a pass unless one is already running from this monitor.
    ///
    /// Returns the report of the pass that ran, `None` otherwise.
    pub async fn process_sync_queue(&self) -> Option<SyncReport> {
        let user_id = self.user_id.as_deref()?;

        let started = self.status.send_if_modified(|s| {
            if s.is_syncing {
                return false;
            }
            s.is_syncing = true;
            s.sync_error = None;
            true
        });
        if !started {
            return None;
        }

        let outcome = self
            .service
            .process_sync_queue(user_id, |progress| {
                self.status.send_modify(|s| s.sync_progress = progress);
            })
            .await;

        let report = match outcome {
            Ok(PassOutcome::Completed(report)) => {
                self.status.send_modify(|s| {
                    s.last_sync_time = Some(Utc::now());
                    if !report.success && report.failed > 0 {
                        s.sync_error = Some(format!("{} item(s) failed to sync", report.failed));
                    }
                });
                Some(report)
            }
            Ok(PassOutcome::AlreadyRunning) => None,
            Err(e) => {
                tracing::error!(user_id, error = %e, "sync pass failed");
                self.status.send_modify(|s| s.sync_error = Some(e.to_string()));
                None
            }
        };

        self.check_queue_size().await;
        self.status.send_modify(|s| {
            s.is_syncing = false;
            s.sync_progress = SyncProgress::idle();
        });

        report
    }

    /// Drop every pending record.
    pub async fn clear_queue(&self) -> bool {
        let Some(user_id) = self.user_id.as_deref() else {
            return false;
        };

        match self.service.clear_sync_queue(user_id).await {
            Ok(()) => {
                self.status.send_modify(|s| s.queue_size = 0);
                true
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "failed to clear sync queue");
                false
            }
        }
    }

    /// Whether anything is waiting to be synced.
    pub async fn has_pending_sync(&self) -> bool {
        let Some(user_id) = self.user_id.as_deref() else {
            return false;
        };

        match self.service.has_pending_sync(user_id).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(user_id, error = %e, "failed to check pending sync");
                false
            }
        }
    }

    /// Records dropped after permanent failure.
    pub async fn dead_letters(&self) -> Vec<DeadRecord> {
        let Some(user_id) = self.user_id.as_deref() else {
            return Vec::new();
        };

        self.service.dead_letters(user_id).await.unwrap_or_else(|e| {
            tracing::error!(user_id, error = %e, "failed to read dead letters");
            Vec::new()
        })
    }

    pub async fn clear_dead_letters(&self) -> bool {
        let Some(user_id) = self.user_id.as_deref() else {
            return false;
        };

        match self.service.clear_dead_letters(user_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(user_id, error = %e, "failed to clear dead letters");
                false
            }
        }
    }
}

impl<S, D> SyncMonitor<S, D>
where
    S: KeyValueStore + ?Sized + 'static,
    D: DocumentStore + ?Sized + 'static,
{
    /// Refresh the queue size now and then every `interval`.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> PollingHandle {
        let monitor = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.check_queue_size().await;
            }
        });
        PollingHandle { task }
    }
}

/// Background queue-size poll; stops when dropped.
#[derive(Debug)]
pub struct PollingHandle {
    task: JoinHandle<()>,
}

impl PollingHandle {
    /// Stop polling.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
