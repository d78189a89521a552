//! Queue processor - drains a user's queue in one pass.
//!
//! A pass snapshots the queue, applies each record in FIFO order and then
//! rewrites the queue with the records that are worth retrying. A failing
//! record never aborts the pass.
//!
//! ## Failure handling
//!
//! - Retryable failure ([`RemoteError::is_retryable`]): `retry_count` goes up
//!   by one. The record stays queued while `retry_count < max_retries` and is
//!   dropped once it reaches the limit.
//! - Any other failure: the record is dropped immediately, since retrying a
//!   missing document or a refused payload cannot succeed.
//!
//! Dropped records are counted in [`SyncReport::failed`] and appended to the
//! [`DeadLetterLog`].
//!
//! [`RemoteError::is_retryable`]: crate::error::RemoteError::is_retryable

use crate::applier::Applier;
use crate::error::Result;
use crate::queue::{DeadLetterLog, DurableQueue};
use crate::record::{DeadRecord, QueueRecord};
use crate::remote::DocumentStore;
use crate::storage::KeyValueStore;
use crate::{RecordId, UserId};
use chrono::Utc;
use dashmap::DashSet;
use serde::Serialize;
use std::collections::HashSet;

/// Attempts after which a failing record is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Progress of the pass currently running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    /// 1-based index of the record being applied
    pub current: usize,
    /// Queue length when the pass started
    pub total: usize,
    /// `current / total` as a rounded percentage
    pub percentage: u32,
}

impl SyncProgress {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((current * 200 + total) / (total * 2)) as u32
        };
        Self {
            current,
            total,
            percentage,
        }
    }

    /// Progress when no pass is running.
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Summary of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// `true` when no record was dropped
    pub success: bool,
    /// Records applied successfully
    pub processed: usize,
    /// Records dropped for good
    pub failed: usize,
    /// Queue length after the pass: retained retries plus records
    /// enqueued while the pass was running
    pub remaining: usize,
}

impl SyncReport {
    fn empty() -> Self {
        Self {
            success: true,
            processed: 0,
            failed: 0,
            remaining: 0,
        }
    }
}

/// What happened when a pass was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pass ran to completion.
    Completed(SyncReport),
    /// Another pass for the same user was still running; nothing was done.
    AlreadyRunning,
}

impl PassOutcome {
    /// The report, if the pass ran.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            PassOutcome::AlreadyRunning => None,
        }
    }
}

/// Holds a user's pass slot; releases it on drop.
struct PassToken<'a> {
    running: &'a DashSet<UserId>,
    user_id: &'a str,
}

impl Drop for PassToken<'_> {
    fn drop(&mut self) {
        self.running.remove(self.user_id);
    }
}

/// Drains per-user queues against a document store.
pub struct QueueProcessor<S: ?Sized, D: ?Sized> {
    queue: DurableQueue<S>,
    dead_letters: DeadLetterLog<S>,
    applier: Applier<D>,
    max_retries: u32,
    running: DashSet<UserId>,
}

impl<S, D> QueueProcessor<S, D>
where
    S: KeyValueStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    pub fn new(
        queue: DurableQueue<S>,
        dead_letters: DeadLetterLog<S>,
        applier: Applier<D>,
        max_retries: u32,
    ) -> Self {
        Self {
            queue,
            dead_letters,
            applier,
            max_retries,
            running: DashSet::new(),
        }
    }

    /// Maximum attempts per record.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether a pass is running for `user_id`.
    pub fn is_running(&self, user_id: &str) -> bool {
        self.running.contains(user_id)
    }

    fn try_begin<'a>(&'a self, user_id: &'a str) -> Option<PassToken<'a>> {
        if !self.running.insert(user_id.to_string()) {
            return None;
        }
        Some(PassToken {
            running: &self.running,
            user_id,
        })
    }

    /// Run one pass for `user_id`.
    pub async fn process(&self, user_id: &str) -> Result<PassOutcome> {
        self.process_with_progress(user_id, |_| {}).await
    }

    /// Run one pass for `user_id`, reporting progress before each record.
    pub async fn process_with_progress<F>(
        &self,
        user_id: &str,
        mut on_progress: F,
    ) -> Result<PassOutcome>
    where
        F: FnMut(SyncProgress) + Send,
    {
        let Some(_token) = self.try_begin(user_id) else {
            tracing::debug!(user_id, "sync pass already running, ignoring request");
            return Ok(PassOutcome::AlreadyRunning);
        };

        let snapshot = self.queue.read_all(user_id).await?;
        if snapshot.is_empty() {
            return Ok(PassOutcome::Completed(SyncReport::empty()));
        }

        let total = snapshot.len();
        let seen: HashSet<RecordId> = snapshot.iter().map(|r| r.id.clone()).collect();
        tracing::info!(user_id, total, "starting sync pass");

        let mut processed = 0;
        let mut retained: Vec<QueueRecord> = Vec::new();
        let mut dead: Vec<DeadRecord> = Vec::new();

        for (index, mut record) in snapshot.into_iter().enumerate() {
            on_progress(SyncProgress::new(index + 1, total));

            let err = match self.applier.apply(user_id, &record).await {
                Ok(()) => {
                    tracing::debug!(user_id, record_id = %record.id, "record synced");
                    processed += 1;
                    continue;
                }
                Err(err) => err,
            };

            let retry_count = record.record_failure();
            if err.is_retryable() && retry_count < self.max_retries {
                tracing::warn!(
                    user_id,
                    record_id = %record.id,
                    retry_count,
                    max_retries = self.max_retries,
                    error = %err,
                    "sync failed, will retry"
                );
                retained.push(record);
            } else {
                tracing::error!(
                    user_id,
                    record_id = %record.id,
                    retry_count,
                    error = %err,
                    "sync failed permanently, dropping record"
                );
                dead.push(DeadRecord {
                    record,
                    reason: err.to_string(),
                    dropped_at: Utc::now(),
                });
            }
        }

        let failed = dead.len();
        if let Err(e) = self.dead_letters.append(user_id, dead).await {
            tracing::error!(user_id, error = %e, "failed to record dropped mutations");
        }

        // Anything enqueued while the pass was running goes behind the retries.
        let remaining = self.queue.merge_retained(user_id, &seen, retained).await?;

        let report = SyncReport {
            success: failed == 0,
            processed,
            failed,
            remaining,
        };
        tracing::info!(
            user_id,
            processed = report.processed,
            failed = report.failed,
            remaining = report.remaining,
            "sync pass finished"
        );

        Ok(PassOutcome::Completed(report))
    }
}
