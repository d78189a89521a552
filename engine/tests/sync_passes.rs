//! End-to-end tests for sync passes.
//!
//! These drive the service against an in-memory document store whose
//! failures are scripted per document.

use async_trait::async_trait;
use farmasync_engine::{
    mutation, Action, Document, DocumentPath, DocumentStore, EntityType, FileStorage,
    KeyValueStore, MemoryDocumentStore, MemoryStorage, PassOutcome, QueueRecord, RemoteError,
    SyncConfig, SyncMonitor, SyncProgress, SyncReport, SyncService,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Memory store that can be told to fail for specific documents.
#[derive(Default)]
struct ScriptedStore {
    inner: MemoryDocumentStore,
    calls: AtomicUsize,
    applied: Mutex<Vec<String>>,
    always_fail: Mutex<HashSet<String>>,
    scripted: Mutex<HashMap<String, VecDeque<RemoteError>>>,
}

impl ScriptedStore {
    fn fail_always(&self, entity_id: &str) {
        self.always_fail
            .lock()
            .unwrap()
            .insert(entity_id.to_string());
    }

    fn fail_times(&self, entity_id: &str, times: usize) {
        let errors = (0..times)
            .map(|_| RemoteError::Unavailable("network down".to_string()))
            .collect();
        self.scripted
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), errors);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    fn check(&self, path: &DocumentPath) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = &path.entity_id;
        if self.always_fail.lock().unwrap().contains(id) {
            return Err(RemoteError::Unavailable("network down".to_string()));
        }
        if let Some(errors) = self.scripted.lock().unwrap().get_mut(id) {
            if let Some(err) = errors.pop_front() {
                return Err(err);
            }
        }
        self.applied.lock().unwrap().push(id.clone());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn set(&self, path: &DocumentPath, data: &serde_json::Value) -> Result<(), RemoteError> {
        self.check(path)?;
        self.inner.set(path, data).await
    }

    async fn update(
        &self,
        path: &DocumentPath,
        fields: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        self.check(path)?;
        self.inner.update(path, fields).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), RemoteError> {
        self.check(path)?;
        self.inner.delete(path).await
    }

    async fn list(
        &self,
        user_id: &str,
        entity_type: EntityType,
    ) -> Result<Vec<Document>, RemoteError> {
        self.inner.list(user_id, entity_type).await
    }
}

type Service = SyncService<MemoryStorage, ScriptedStore>;

fn setup(base_delay: Duration) -> (Arc<Service>, Arc<ScriptedStore>) {
    let remote = Arc::new(ScriptedStore::default());
    let config = SyncConfig {
        base_delay,
        ..SyncConfig::default()
    };
    let service = Arc::new(SyncService::new(
        Arc::new(MemoryStorage::new()),
        remote.clone(),
        &config,
    ));
    (service, remote)
}

fn favorite(id: &str) -> QueueRecord {
    QueueRecord::new(
        Action::Create,
        EntityType::Favorite,
        id,
        json!({"pharmacyId": id}),
    )
}

async fn pass(service: &Service, user_id: &str) -> SyncReport {
    match service.process_sync_queue(user_id, |_| {}).await.unwrap() {
        PassOutcome::Completed(report) => report,
        PassOutcome::AlreadyRunning => panic!("unexpected concurrent pass"),
    }
}

// ============================================================================
// Success Paths
// ============================================================================

#[tokio::test]
async fn all_success_leaves_empty_queue() {
    let (service, remote) = setup(Duration::ZERO);
    for id in ["ph-1", "ph-2", "ph-3"] {
        service.add_to_sync_queue("u1", favorite(id)).await.unwrap();
    }

    let report = pass(&service, "u1").await;

    assert_eq!(
        report,
        SyncReport {
            success: true,
            processed: 3,
            failed: 0,
            remaining: 0
        }
    );
    assert!(service.get_sync_queue("u1").await.unwrap().is_empty());
    assert_eq!(remote.applied(), vec!["ph-1", "ph-2", "ph-3"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_successful_queue_drains_completely(n in 0usize..24) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (service, remote) = setup(Duration::ZERO);
            for i in 0..n {
                service
                    .add_to_sync_queue("u1", favorite(&format!("ph-{i}")))
                    .await
                    .unwrap();
            }

            let report = pass(&service, "u1").await;
            assert!(report.success);
            assert_eq!(report.processed, n);
            assert_eq!(report.failed, 0);
            assert_eq!(remote.calls(), n);
            assert_eq!(service.queue_size("u1").await.unwrap(), 0);
        });
    }
}

#[tokio::test]
async fn mixed_mutations_reach_remote_in_order() {
    let (service, remote) = setup(Duration::ZERO);
    let med = mutation::Medication::new(
        "Metformina",
        "850mg",
        mutation::Frequency::Twice,
        vec!["08:00".into(), "20:00".into()],
    );

    service
        .add_to_sync_queue("u1", mutation::create_medication(&med).unwrap())
        .await
        .unwrap();
    service
        .add_to_sync_queue(
            "u1",
            mutation::update_medication(med.id.clone(), json!({"dosage": "1000mg"})).unwrap(),
        )
        .await
        .unwrap();
    service
        .add_to_sync_queue("u1", mutation::add_favorite("ph-7"))
        .await
        .unwrap();
    service
        .add_to_sync_queue("u1", mutation::remove_favorite("ph-7"))
        .await
        .unwrap();

    let report = pass(&service, "u1").await;
    assert_eq!(report.processed, 4);

    let doc = remote
        .inner
        .get(&DocumentPath::new("u1", EntityType::Medication, med.id.clone()))
        .await
        .unwrap();
    assert_eq!(doc["dosage"], "1000mg");
    assert_eq!(doc["medicationName"], "Metformina");
    assert!(remote
        .inner
        .get(&DocumentPath::new("u1", EntityType::Favorite, "ph-7"))
        .await
        .is_none());
}

// ============================================================================
// Retry Semantics
// ============================================================================

#[tokio::test]
async fn always_failing_record_is_dropped_after_three_passes() {
    let (service, remote) = setup(Duration::ZERO);
    remote.fail_always("ph-1");
    service.add_to_sync_queue("u1", favorite("ph-1")).await.unwrap();

    let mut failed = 0;
    for expected_retry in 1..=2 {
        let report = pass(&service, "u1").await;
        failed += report.failed;
        assert_eq!(report.remaining, 1);

        let queue = service.get_sync_queue("u1").await.unwrap();
        assert_eq!(queue[0].retry_count, expected_retry);
    }

    let report = pass(&service, "u1").await;
    failed += report.failed;
    assert!(!report.success);
    assert_eq!(failed, 1);
    assert!(service.get_sync_queue("u1").await.unwrap().is_empty());
    assert_eq!(remote.calls(), 3);

    // Never attempted a fourth time
    let report = pass(&service, "u1").await;
    assert_eq!(report.failed, 0);
    assert_eq!(remote.calls(), 3);

    let dead = service.dead_letters("u1").await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].record.entity_id, "ph-1");
    assert_eq!(dead[0].record.retry_count, 3);
}

#[tokio::test]
async fn fail_twice_then_succeed_leaves_no_trace() {
    let (service, remote) = setup(Duration::ZERO);
    remote.fail_times("ph-1", 2);
    service.add_to_sync_queue("u1", favorite("ph-1")).await.unwrap();

    pass(&service, "u1").await;
    pass(&service, "u1").await;
    let report = pass(&service, "u1").await;

    assert_eq!(report.processed, 1);
    assert!(report.success);
    assert!(service.get_sync_queue("u1").await.unwrap().is_empty());
    assert!(service.dead_letters("u1").await.unwrap().is_empty());
    assert_eq!(remote.calls(), 3);
}

#[tokio::test]
async fn update_at_last_retry_is_dropped() {
    let (service, remote) = setup(Duration::ZERO);
    remote.fail_always("m1");
    let record = QueueRecord::new(
        Action::Update,
        EntityType::Medication,
        "m1",
        json!({"notes": "after lunch"}),
    )
    .with_retry_count(2);
    service.add_to_sync_queue("u1", record).await.unwrap();

    let report = pass(&service, "u1").await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 0);
    assert!(service.get_sync_queue("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_of_missing_document_fails_fast() {
    let (service, remote) = setup(Duration::ZERO);
    service
        .add_to_sync_queue(
            "u1",
            mutation::update_medication("never-created", json!({"notes": "x"})).unwrap(),
        )
        .await
        .unwrap();

    let report = pass(&service, "u1").await;

    assert_eq!(report.failed, 1);
    assert_eq!(remote.calls(), 1);
    assert!(service.get_sync_queue("u1").await.unwrap().is_empty());
    let dead = service.dead_letters("u1").await.unwrap();
    assert_eq!(dead[0].reason, "document not found: never-created");
}

#[tokio::test]
async fn one_failure_does_not_abort_the_pass() {
    let (service, remote) = setup(Duration::ZERO);
    remote.fail_always("ph-2");
    for id in ["ph-1", "ph-2", "ph-3"] {
        service.add_to_sync_queue("u1", favorite(id)).await.unwrap();
    }

    let report = pass(&service, "u1").await;

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.remaining, 1);
    assert!(report.success);
    assert_eq!(remote.applied(), vec!["ph-1", "ph-3"]);

    let queue = service.get_sync_queue("u1").await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].entity_id, "ph-2");
}

#[tokio::test]
async fn delete_applied_twice_is_not_an_error() {
    let (service, _) = setup(Duration::ZERO);
    let delete = mutation::remove_favorite("ph-1");

    // Same record replayed, as after a crash between apply and queue rewrite
    service.add_to_sync_queue("u1", delete.clone()).await.unwrap();
    assert_eq!(pass(&service, "u1").await.processed, 1);

    service.add_to_sync_queue("u1", delete).await.unwrap();
    let report = pass(&service, "u1").await;
    assert_eq!(report.processed, 1);
    assert!(report.success);
}

// ============================================================================
// Timing And Concurrency
// ============================================================================

/// Memory storage whose writes suspend several times before landing.
#[derive(Default)]
struct SlowWriteStorage {
    inner: MemoryStorage,
    gets: AtomicUsize,
}

impl SlowWriteStorage {
    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    async fn stall() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl KeyValueStore for SlowWriteStorage {
    async fn get(&self, key: &str) -> farmasync_engine::error::Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> farmasync_engine::error::Result<()> {
        Self::stall().await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> farmasync_engine::error::Result<()> {
        Self::stall().await;
        self.inner.remove(key).await
    }
}

#[tokio::test]
async fn append_during_final_rewrite_is_kept() {
    let storage = Arc::new(SlowWriteStorage::default());
    let config = SyncConfig {
        base_delay: Duration::ZERO,
        ..SyncConfig::default()
    };
    let service = SyncService::new(
        storage.clone(),
        Arc::new(MemoryDocumentStore::new()),
        &config,
    );
    service.add_to_sync_queue("u1", favorite("ph-1")).await.unwrap();
    let gets_before = storage.gets();

    // The second read of the pass is the end-of-pass re-read
    let (outcome, appended) = tokio::join!(
        service.process_sync_queue("u1", |_| {}),
        async {
            while storage.gets() < gets_before + 2 {
                tokio::task::yield_now().await;
            }
            service.add_to_sync_queue("u1", favorite("ph-2")).await
        },
    );
    appended.unwrap();
    assert_eq!(outcome.unwrap().report().unwrap().processed, 1);

    let queue = service.get_sync_queue("u1").await.unwrap();
    let ids: Vec<_> = queue.iter().map(|r| r.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["ph-2"]);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_is_throttled_by_backoff() {
    let (service, remote) = setup(Duration::from_millis(1000));
    remote.fail_times("ph-2", 1);
    service.add_to_sync_queue("u1", favorite("ph-1")).await.unwrap();
    service.add_to_sync_queue("u1", favorite("ph-2")).await.unwrap();

    let start = tokio::time::Instant::now();
    pass(&service, "u1").await;
    assert_eq!(start.elapsed(), Duration::from_millis(2000));

    // ph-2 now carries retry_count 1
    let start = tokio::time::Instant::now();
    pass(&service, "u1").await;
    assert_eq!(start.elapsed(), Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn second_pass_while_running_is_ignored() {
    let (service, remote) = setup(Duration::from_millis(1000));
    for id in ["ph-1", "ph-2", "ph-3"] {
        service.add_to_sync_queue("u1", favorite(id)).await.unwrap();
    }

    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.process_sync_queue("u1", |_| {}).await })
    };
    tokio::task::yield_now().await;
    assert!(service.is_syncing("u1"));

    let second = service.process_sync_queue("u1", |_| {}).await.unwrap();
    assert_eq!(second, PassOutcome::AlreadyRunning);
    assert_eq!(service.queue_size("u1").await.unwrap(), 3);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.report().unwrap().processed, 3);
    assert_eq!(remote.calls(), 3);
    assert!(!service.is_syncing("u1"));
}

#[tokio::test(start_paused = true)]
async fn passes_for_different_users_do_not_block_each_other() {
    let (service, _) = setup(Duration::from_millis(1000));
    service.add_to_sync_queue("alice", favorite("ph-1")).await.unwrap();
    service.add_to_sync_queue("bob", favorite("ph-2")).await.unwrap();

    let (alice, bob) = tokio::join!(
        service.process_sync_queue("alice", |_| {}),
        service.process_sync_queue("bob", |_| {}),
    );

    assert_eq!(alice.unwrap().report().unwrap().processed, 1);
    assert_eq!(bob.unwrap().report().unwrap().processed, 1);
}

#[tokio::test(start_paused = true)]
async fn records_queued_mid_pass_survive() {
    let (service, _) = setup(Duration::from_millis(1000));
    service.add_to_sync_queue("u1", favorite("ph-1")).await.unwrap();

    let running = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.process_sync_queue("u1", |_| {}).await })
    };
    tokio::task::yield_now().await;

    service.add_to_sync_queue("u1", favorite("ph-2")).await.unwrap();

    let outcome = running.await.unwrap().unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.remaining, 1);

    let queue = service.get_sync_queue("u1").await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].entity_id, "ph-2");
    assert_eq!(queue[0].retry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn interrupted_pass_keeps_original_retry_counts() {
    let (service, remote) = setup(Duration::from_millis(1000));
    remote.fail_always("ph-1");
    service.add_to_sync_queue("u1", favorite("ph-1")).await.unwrap();
    service.add_to_sync_queue("u1", favorite("ph-2")).await.unwrap();

    // ph-1 fails at t=1s, ph-2 would be applied at t=2s
    let interrupted = tokio::time::timeout(
        Duration::from_millis(1500),
        service.process_sync_queue("u1", |_| {}),
    )
    .await;
    assert!(interrupted.is_err());

    let queue = service.get_sync_queue("u1").await.unwrap();
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|r| r.retry_count == 0));
    assert!(!service.is_syncing("u1"));
}

// ============================================================================
// Monitor Scenarios
// ============================================================================

#[tokio::test]
async fn favorite_scenario_updates_status() {
    let (service, _) = setup(Duration::ZERO);
    let monitor = SyncMonitor::new(service, Some("u1".to_string()));

    assert!(monitor.add_to_queue(favorite("ph-1")).await);
    assert_eq!(monitor.status().queue_size, 1);

    let report = monitor.process_sync_queue().await.unwrap();
    assert_eq!(report.processed, 1);

    let status = monitor.status();
    assert_eq!(status.queue_size, 0);
    assert!(status.last_sync_time.is_some());
    assert_eq!(status.sync_progress, SyncProgress::idle());
    assert_eq!(status.sync_error, None);
    assert!(!status.is_syncing);
}

#[tokio::test]
async fn queue_survives_restart_with_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig {
        base_delay: Duration::ZERO,
        ..SyncConfig::default()
    };

    {
        let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
        let service = SyncService::new(storage, Arc::new(ScriptedStore::default()), &config);
        service
            .add_to_sync_queue("u1", mutation::add_favorite("ph-1"))
            .await
            .unwrap();
    }

    let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
    let remote = Arc::new(ScriptedStore::default());
    let service = SyncService::new(storage, remote.clone(), &config);

    assert!(service.has_pending_sync("u1").await.unwrap());
    let report = service
        .process_sync_queue("u1", |_| {})
        .await
        .unwrap()
        .report()
        .cloned()
        .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(remote.applied(), vec!["ph-1"]);
    assert!(!dir.path().join("sync_queue_u1.json").exists());
}
