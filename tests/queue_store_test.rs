//! Queue store properties against a real PostgreSQL database.
//!
//! Each test gets a fresh database with migrations applied.
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test queue_store_test -- --ignored

use std::io::Write;
use std::sync::Arc;

use dyno_queue::models::job::{JobState, JobType};
use dyno_queue::services::loader;
use dyno_queue::services::queue::{PgQueueStore, QueueStore, StoreError};
use futures::future::join_all;
use sqlx::PgPool;

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("10.1000/Item-{}", i)).collect()
}

async fn assert_partition(store: &PgQueueStore) {
    let counts = store.counts().await.unwrap();
    assert_eq!(counts.total, counts.waiting + counts.claimed + counts.done);
    assert_eq!(counts.total, store.count_total().await.unwrap());
    assert_eq!(counts.waiting, store.count_waiting().await.unwrap());
    assert_eq!(counts.unfinished(), store.count_unfinished().await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires PostgreSQL via DATABASE_URL
async fn test_counts_partition_the_queue(pool: PgPool) {
    let store = PgQueueStore::new(pool, JobType::Normal);
    store.bulk_insert(&ids(50)).await.unwrap();
    assert_partition(&store).await;

    let mut claimed = Vec::new();
    for _ in 0..20 {
        claimed.push(store.claim_next("run.1").await.unwrap().unwrap());
    }
    assert_partition(&store).await;

    for id in &claimed[..5] {
        assert!(store.mark_finished(id).await.unwrap());
    }
    assert_partition(&store).await;

    let counts = store.counts().await.unwrap();
    assert_eq!((counts.waiting, counts.claimed, counts.done), (30, 15, 5));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_bulk_insert_lowercases_and_rejects_duplicates(pool: PgPool) {
    let store = PgQueueStore::new(pool, JobType::Normal);
    assert_eq!(store.bulk_insert(&ids(3)).await.unwrap(), 3);
    assert!(store.get_job("10.1000/item-0").await.unwrap().is_some());
    assert!(store.get_job("10.1000/Item-0").await.unwrap().is_none());

    let result = store.bulk_insert(&["10.1000/ITEM-1".to_string()]).await;
    assert!(matches!(result, Err(StoreError::Conflict { .. })));

    // The failed batch rolled back entirely.
    let result = store
        .bulk_insert(&["10.9/new".to_string(), "10.9/NEW".to_string()])
        .await;
    assert!(matches!(result, Err(StoreError::Conflict { .. })));
    assert_eq!(store.count_total().await.unwrap(), 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_load_thousand_ids_from_file(pool: PgPool) {
    let store = PgQueueStore::new(pool, JobType::Normal);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for id in ids(1000) {
        writeln!(file, "{}", id).unwrap();
    }

    let inserted = loader::load_from_file(&store, file.path()).await.unwrap();
    assert_eq!(inserted, 1000);
    assert_eq!(store.count_total().await.unwrap(), 1000);
    assert_eq!(store.count_waiting().await.unwrap(), 1000);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_kick_returns_claims_to_waiting(pool: PgPool) {
    let store = PgQueueStore::new(pool, JobType::Normal);
    store.bulk_insert(&ids(10)).await.unwrap();
    for i in 0..10 {
        store.claim_next(&format!("run.{}", i)).await.unwrap().unwrap();
    }
    assert_eq!(store.count_waiting().await.unwrap(), 0);

    assert_eq!(store.kick().await.unwrap(), 10);

    for id in ids(10) {
        let job = store.get_job(&id.to_lowercase()).await.unwrap().unwrap();
        assert_eq!(job.state(), Some(JobState::Waiting));
        assert!(job.started.is_none());
        assert!(job.finished.is_none());
        assert!(job.dyno.is_none());
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_kick_is_idempotent_and_spares_done_jobs(pool: PgPool) {
    let store = PgQueueStore::new(pool, JobType::Normal);
    store.bulk_insert(&ids(10)).await.unwrap();
    let first = store.claim_next("run.1").await.unwrap().unwrap();
    store.claim_next("run.2").await.unwrap().unwrap();
    store.mark_finished(&first).await.unwrap();

    assert_eq!(store.kick().await.unwrap(), 1);
    let once = store.counts().await.unwrap();
    assert_eq!(store.kick().await.unwrap(), 0);
    let twice = store.counts().await.unwrap();

    assert_eq!(once, twice);
    assert_eq!((twice.waiting, twice.claimed, twice.done), (9, 0, 1));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_reset_all_makes_everything_unfinished(pool: PgPool) {
    let store = PgQueueStore::new(pool, JobType::Normal);
    store.bulk_insert(&ids(8)).await.unwrap();
    for _ in 0..4 {
        let id = store.claim_next("run.1").await.unwrap().unwrap();
        store.mark_finished(&id).await.unwrap();
    }
    store.claim_next("run.1").await.unwrap().unwrap();

    store.reset_all().await.unwrap();
    assert_eq!(store.count_unfinished().await.unwrap(), store.count_total().await.unwrap());
    assert_eq!(store.count_waiting().await.unwrap(), 8);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_claims_on_single_row(pool: PgPool) {
    let store = Arc::new(PgQueueStore::new(pool, JobType::Normal));
    store.bulk_insert(&["10.1/only".to_string()]).await.unwrap();

    let attempts = (0..16).map(|i| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.claim_next(&format!("run.{}", i)).await })
    });
    let results: Vec<Option<String>> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let winners: Vec<&String> = results.iter().flatten().collect();
    assert_eq!(winners, vec!["10.1/only"]);
    assert_eq!(store.count_waiting().await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_completion_after_concurrent_kick_is_accepted(pool: PgPool) {
    let store = PgQueueStore::new(pool, JobType::Normal);
    store.bulk_insert(&["10.1/slow".to_string()]).await.unwrap();
    let id = store.claim_next("run.1").await.unwrap().unwrap();

    store.kick().await.unwrap();
    assert!(store.mark_finished(&id).await.unwrap());

    let job = store.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state(), Some(JobState::Done));
    assert!(job.started.is_some());

    // Finishing twice is a no-op.
    assert!(!store.mark_finished(&id).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_job_types_are_isolated(pool: PgPool) {
    let normal = PgQueueStore::new(pool.clone(), JobType::Normal);
    let dates = PgQueueStore::new(pool, JobType::Dates);
    normal.bulk_insert(&ids(5)).await.unwrap();
    dates.bulk_insert(&["2019-01-01".to_string()]).await.unwrap();

    assert_eq!(normal.count_total().await.unwrap(), 5);
    assert_eq!(dates.count_total().await.unwrap(), 1);

    dates.truncate().await.unwrap();
    assert_eq!(dates.count_total().await.unwrap(), 0);
    assert_eq!(normal.count_total().await.unwrap(), 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_in_flight_workers(pool: PgPool) {
    let store = PgQueueStore::new(pool, JobType::Hybrid);
    store.bulk_insert(&ids(4)).await.unwrap();
    store.claim_next("run_with_hybrid.2").await.unwrap();
    store.claim_next("run_with_hybrid.1").await.unwrap();
    let done = store.claim_next("run_with_hybrid.3").await.unwrap().unwrap();
    store.mark_finished(&done).await.unwrap();

    assert_eq!(
        store.in_flight_workers().await.unwrap(),
        vec!["run_with_hybrid.1".to_string(), "run_with_hybrid.2".to_string()]
    );
}
