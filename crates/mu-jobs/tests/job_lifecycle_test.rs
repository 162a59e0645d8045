//! Integration tests for the batch job lifecycle.
//!
//! This suite covers:
//! - A full run over a large catalog
//! - Cancellation while the worker is mid-run
//! - Empty catalogs and idempotent start
//! - Resuming a queued job from a second manager over the same file store
//! - Re-queueing after an invalidation

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use mu_core::{
    Config, ContentSources, EntityEntry, EntityId, EntityKey, FileKvStore, JobState,
    KeyValueStore, MemoryContentStore, MemoryKvStore, ResourceId,
};
use mu_jobs::{JobEvent, JobManager, WorkerExit};
use tokio::time::timeout;

fn site_with(resources: i64) -> Arc<MemoryContentStore> {
    let site = Arc::new(MemoryContentStore::default());
    for id in 1..=resources {
        site.add_resource(id, None);
    }
    site.upsert_entity(EntityEntry::new(1, "Home").with_primary_reference(1));
    site
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.jobs = config.jobs.with_chunk_delay_ms(0).with_cancel_wait(10, 5_000);
    config
}

fn manager_over(
    site: &Arc<MemoryContentStore>,
    store: Arc<dyn KeyValueStore>,
    config: Config,
) -> JobManager {
    JobManager::new(ContentSources::from_store(Arc::clone(site)), store, config)
}

// ============================================================================
// Full runs
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_run_over_five_hundred_resources() {
    let site = site_with(500);
    let manager = manager_over(&site, Arc::new(MemoryKvStore::new()), fast_config());

    let report = manager.start_job().await.unwrap();
    assert!(report.started);
    assert_eq!(report.enqueued, 500);

    let exit = timeout(Duration::from_secs(30), manager.join_worker())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit, Some(WorkerExit::Completed));

    let progress = manager.request_progress().unwrap();
    assert_eq!((progress.processed, progress.pending, progress.total), (500, 0, 500));
    assert!(progress.estimated_time.abs() < f64::EPSILON);
    assert_eq!(manager.state().unwrap(), JobState::Completed);
    assert!(!manager.is_running().unwrap());

    // Scanning after the run hits the cache.
    let usage = manager.request_scan("1").unwrap();
    assert!(usage.used);
    assert_eq!(usage.references[0].label, "Home");
    assert!(manager.service().stats().cache_hits >= 1);

    let again = manager.start_job().await.unwrap();
    assert!(!again.started);
}

#[tokio::test]
async fn test_empty_catalog_reports_nothing_to_do() {
    let site = Arc::new(MemoryContentStore::default());
    let manager = manager_over(&site, Arc::new(MemoryKvStore::new()), fast_config());

    let report = manager.start_job().await.unwrap();
    assert!(!report.started);
    assert_eq!(report.enqueued, 0);
    assert!(report.message.starts_with("Nothing to do"));
    assert_eq!(manager.state().unwrap(), JobState::Idle);

    let progress = manager.request_progress().unwrap();
    assert_eq!((progress.processed, progress.pending, progress.total), (0, 0, 0));
}

#[tokio::test]
async fn test_start_report_shape() {
    let site = site_with(3);
    let manager = manager_over(&site, Arc::new(MemoryKvStore::new()), fast_config());

    let report = manager.enqueue_job().await.unwrap();
    insta::assert_json_snapshot!(report, @r#"
    {
      "started": true,
      "message": "Processing started for 3 resources",
      "enqueued": 3
    }
    "#);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_mid_run_keeps_partial_progress() {
    let site = site_with(200);
    let store = Arc::new(MemoryKvStore::new());
    let mut config = fast_config();
    config.jobs = config.jobs.with_chunk_size(5).with_chunk_delay_ms(50);
    let manager = manager_over(&site, Arc::clone(&store) as Arc<dyn KeyValueStore>, config);

    let mut events = manager.subscribe();
    assert!(manager.start_job().await.unwrap().started);

    timeout(Duration::from_secs(10), async {
        loop {
            if let JobEvent::UnitProcessed { .. } = events.recv().await.unwrap() {
                break;
            }
        }
    })
    .await
    .unwrap();

    let report = manager.cancel_job().await.unwrap();
    assert!(report.cancelled, "{}", report.message);
    assert_eq!(manager.state().unwrap(), JobState::Cancelled);

    let progress = manager.request_progress().unwrap();
    assert!(progress.processed >= 1);
    assert!(progress.processed < 200);
    assert!(progress.pending > 0);
    assert_eq!(progress.processed + progress.pending, progress.total);

    assert!(!manager.is_running().unwrap());
    assert!(store.keys_with_prefix("media_usage:jobs:queue:").unwrap().is_empty());
    assert_eq!(store.get("media_usage:jobs:cancel").unwrap(), None);
    assert_eq!(manager.join_worker().await.unwrap(), Some(WorkerExit::Cancelled));
}

#[tokio::test]
async fn test_cancel_while_idle_is_noop() {
    let site = site_with(3);
    let manager = manager_over(&site, Arc::new(MemoryKvStore::new()), fast_config());

    let report = manager.cancel_job().await.unwrap();
    assert!(!report.cancelled);
    assert_eq!(manager.state().unwrap(), JobState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_after_cancel_resets_progress() {
    let site = site_with(10);
    let manager = manager_over(&site, Arc::new(MemoryKvStore::new()), fast_config());

    manager.enqueue_job().await.unwrap();
    assert!(manager.cancel_job().await.unwrap().cancelled);

    let report = manager.start_job().await.unwrap();
    assert_eq!(report.enqueued, 10);
    manager.join_worker().await.unwrap();

    let progress = manager.request_progress().unwrap();
    assert_eq!((progress.processed, progress.pending, progress.total), (10, 0, 10));
}

// ============================================================================
// Restart and resume
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_process_resumes_queued_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("state")).unwrap();
    let site = site_with(20);

    {
        let store = Arc::new(FileKvStore::open(path.clone()).unwrap());
        let first = manager_over(&site, store, fast_config());
        let report = first.enqueue_job().await.unwrap();
        assert_eq!(report.enqueued, 20);
        assert!(!first.worker_active());
    }

    let store = Arc::new(FileKvStore::open(path).unwrap());
    let second = manager_over(&site, store, fast_config());
    assert!(second.is_running().unwrap());
    assert!(!second.start_job().await.unwrap().started);

    assert!(second.resume().await.unwrap());
    assert_eq!(second.join_worker().await.unwrap(), Some(WorkerExit::Completed));

    let progress = second.request_progress().unwrap();
    assert_eq!((progress.processed, progress.pending, progress.total), (20, 0, 20));
    assert!(!second.resume().await.unwrap());
}

#[tokio::test]
async fn test_second_process_cancels_queued_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("state")).unwrap();
    let site = site_with(4);

    let first = manager_over(
        &site,
        Arc::new(FileKvStore::open(path.clone()).unwrap()),
        fast_config(),
    );
    first.enqueue_job().await.unwrap();

    let second = manager_over(&site, Arc::new(FileKvStore::open(path).unwrap()), fast_config());
    assert!(second.cancel_job().await.unwrap().cancelled);
    assert!(!first.is_running().unwrap());
    assert_eq!(first.state().unwrap(), JobState::Cancelled);
}

// ============================================================================
// Invalidation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_entity_mutation_requeues_its_resources() {
    let site = site_with(5);
    let manager = manager_over(&site, Arc::new(MemoryKvStore::new()), fast_config());
    manager.start_job().await.unwrap();
    manager.join_worker().await.unwrap();

    let invalidated = manager
        .on_entity_mutated(&EntityKey::Entity(EntityId::new(1)))
        .unwrap();
    assert_eq!(invalidated, vec![ResourceId::new(1).unwrap()]);

    let report = manager.start_job().await.unwrap();
    assert_eq!(report.enqueued, 1);
    manager.join_worker().await.unwrap();
    assert!(manager.request_scan("1").unwrap().used);
}
