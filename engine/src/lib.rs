//! # FarmaSync Engine
//!
//! Offline mutation queue for the FarmaSync medication and pharmacy app.
//!
//! Every local change to medication, adherence or favorite data becomes a
//! [`QueueRecord`] appended to a per-user queue in local key-value storage.
//! A pass replays the queue against a remote [`DocumentStore`] with
//! exponential backoff and keeps only the records worth retrying.
//!
//! ## Components
//!
//! - [`DurableQueue`] - per-user FIFO list persisted as JSON
//! - [`Backoff`] - `base * 2^retry_count` before each attempt
//! - [`Applier`] - maps CREATE/UPDATE/DELETE onto set/merge/delete
//! - [`QueueProcessor`] - one pass per user at a time, partial-failure tolerant
//! - [`SyncMonitor`] - status for the UI, 30 s polling, manual trigger
//! - [`DeadLetterLog`] - records dropped after permanent failure
//!
//! [`SyncService`] wires them together; construct it once at startup.
//!
//! ## Failure semantics
//!
//! - A record is removed when it is applied, or when it fails permanently:
//!   after `max_retries` transient failures (3 by default), or at once for a
//!   non-retryable failure such as an UPDATE of a missing document.
//! - One failing record never aborts a pass.
//! - Local storage failures surface as [`Error::Storage`] from the service and
//!   as `syncError` text from the monitor.
//!
//! ## Quick Start
//!
//! ```no_run
//! use farmasync_engine::{
//!     mutation, MemoryDocumentStore, MemoryStorage, SyncConfig, SyncMonitor, SyncService,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let service = Arc::new(SyncService::new(
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(MemoryDocumentStore::new()),
//!     &SyncConfig::default(),
//! ));
//! let monitor = Arc::new(SyncMonitor::new(service, Some("user-1".to_string())));
//! let _polling = monitor.spawn_polling(SyncConfig::default().poll_interval);
//!
//! monitor.add_to_queue(mutation::add_favorite("ph-1")).await;
//! let report = monitor.process_sync_queue().await.unwrap();
//! assert_eq!(report.processed, 1);
//! # }
//! ```

pub mod applier;
pub mod auth;
pub mod backoff;
pub mod config;
pub mod error;
pub mod monitor;
pub mod mutation;
pub mod processor;
pub mod queue;
pub mod record;
pub mod remote;
pub mod service;
pub mod storage;

// Re-export main types at crate root
pub use applier::Applier;
pub use auth::{sign_user_token, verify_user_token};
pub use backoff::Backoff;
pub use config::{ConfigError, SyncConfig};
pub use error::{Error, RemoteError};
pub use monitor::{PollingHandle, SyncMonitor, SyncStatus};
pub use processor::{PassOutcome, QueueProcessor, SyncProgress, SyncReport, DEFAULT_MAX_RETRIES};
pub use queue::{DeadLetterLog, DurableQueue};
pub use record::{Action, DeadRecord, EntityType, QueueRecord};
pub use remote::{
    Document, DocumentPath, DocumentStore, HttpDocumentStore, MemoryDocumentStore,
    DOCUMENT_NOT_FOUND,
};
pub use service::{DynSyncService, SyncService};
pub use storage::{FileStorage, KeyValueStore, MemoryStorage};

/// Type aliases for clarity
pub type UserId = String;
pub type EntityId = String;
pub type RecordId = String;
