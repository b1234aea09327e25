//! Segment sync orchestration tests.

use super::{client_with, filter_for};
use crate::errors::{DirectoryError, RequestError};
use crate::fixtures;
use crate::mocks::MockDirectory;
use crate::store::{MemoryStore, SyncStore};
use crate::sync::SyncObserver;
use crate::types::{SyncProgress, SyncState, WalkTermination};
use crate::DirectoryClient;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn vip_directory() -> Arc<MockDirectory> {
    Arc::new(MockDirectory::new().with_segment(
        &filter_for("VIP"),
        &[&["v1", "v2"], &["v3", "v4"], &["v5"]],
    ))
}

#[tokio::test(start_paused = true)]
async fn test_sync_is_cached_until_forced() {
    let directory = vip_directory();
    let client = client_with(directory.clone());

    let first = client.sync_segment("VIP", false, None).await.unwrap();
    assert_eq!(first.actual_count, 5);
    assert_eq!(directory.list_calls(), 3);

    let cached = client.sync_segment("vip", false, None).await.unwrap();
    assert_eq!(cached.actual_count, 5);
    assert_eq!(directory.list_calls(), 3);
    assert_eq!(client.segment_state("VIP"), SyncState::Idle);

    client.sync_segment("VIP", true, None).await.unwrap();
    assert_eq!(directory.list_calls(), 6);
    assert_eq!(client.segment_state("VIP"), SyncState::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_cache_expires_after_ttl() {
    let directory = vip_directory();
    let config = crate::DirectoryConfig::builder()
        .access_token("tok")
        .cache_ttl(Duration::from_secs(60))
        .build_unchecked();
    let client =
        DirectoryClient::with_directory(config, directory.clone(), Arc::new(MemoryStore::new()))
            .unwrap();

    client.sync_segment("VIP", false, None).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    client.sync_segment("VIP", false, None).await.unwrap();

    assert_eq!(directory.list_calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_segment_is_empty_not_error() {
    let directory = vip_directory();
    let client = client_with(directory.clone());

    let result = client.sync_segment("Lapsed Whales", false, None).await.unwrap();

    assert_eq!(result.actual_count, 0);
    assert!(result.records.is_empty());
    assert!(!result.partial);
    assert_eq!(directory.list_calls(), 0);
    assert_eq!(client.segment_state("Lapsed Whales"), SyncState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_buyers_needs_configured_filter() {
    let client = client_with(vip_directory());

    let err = client.sync_segment("Repeat Buyers", false, None).await.unwrap_err();
    assert!(matches!(err, DirectoryError::UnresolvedSegment { ref segment } if segment == "Repeat Buyers"));
    assert_eq!(client.segment_state("Repeat Buyers"), SyncState::Failed);

    let directory = Arc::new(MockDirectory::new().with_segment("orders_count:>1", &[&["r1"]]));
    let config = crate::DirectoryConfig::builder()
        .access_token("tok")
        .segment_filter("Repeat Buyers", "orders_count:>1")
        .build_unchecked();
    let client =
        DirectoryClient::with_directory(config, directory, Arc::new(MemoryStore::new())).unwrap();

    let result = client.sync_segment("Repeat Buyers", false, None).await.unwrap();
    assert_eq!(result.actual_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_reported_per_page() {
    let client = client_with(vip_directory());
    let seen = Mutex::new(Vec::new());
    let record = |progress: &SyncProgress| seen.lock().push(progress.clone());
    let observer: &dyn SyncObserver = &record;

    client.sync_segment("VIP", false, Some(observer)).await.unwrap();

    let seen = seen.into_inner();
    let counts: Vec<(u32, usize)> = seen
        .iter()
        .map(|p| (p.pages_completed, p.records_so_far))
        .collect();
    assert_eq!(counts, vec![(1, 2), (2, 4), (3, 5)]);
    assert!(seen.iter().all(|p| p.expected_count == Some(5) && p.segment == "VIP"));
}

#[tokio::test(start_paused = true)]
async fn test_progress_over_channel() {
    let client = client_with(vip_directory());
    let (tx, mut rx) = mpsc::unbounded_channel::<SyncProgress>();
    let observer: &dyn SyncObserver = &tx;

    client.sync_segment("VIP", false, Some(observer)).await.unwrap();
    drop(tx);

    let mut pages = Vec::new();
    while let Some(progress) = rx.recv().await {
        pages.push(progress.pages_completed);
    }
    assert_eq!(pages, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_ceiling_is_partial_complete() {
    let directory = Arc::new(MockDirectory::new().with_endless_segment(&filter_for("VIP"), 10));
    let config = crate::DirectoryConfig::builder()
        .access_token("tok")
        .max_pages(4)
        .build_unchecked();
    let client =
        DirectoryClient::with_directory(config, directory, Arc::new(MemoryStore::new())).unwrap();

    let result = client.sync_segment("VIP", false, None).await.unwrap();

    assert!(result.partial);
    assert_eq!(result.actual_count, 40);
    assert_eq!(client.segment_state("VIP"), SyncState::PartialComplete);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_keeps_partial_records() {
    let directory = Arc::new(
        MockDirectory::new()
            .with_segment(&filter_for("VIP"), &[&["v1", "v2"], &["v3"], &["v4"]])
            .fail_page(2, 1, || {
                DirectoryError::Request(RequestError::Unauthorized { status: 403 })
            }),
    );
    let client = client_with(directory);

    let err = client.sync_segment("VIP", false, None).await.unwrap_err();

    match err {
        DirectoryError::WalkAborted {
            segment,
            retrieved,
            partial,
            source,
        } => {
            assert_eq!(segment, "VIP");
            assert_eq!(retrieved, 3);
            assert_eq!(partial.actual_count, 3);
            assert_eq!(partial.termination, WalkTermination::Aborted);
            assert!(matches!(*source, DirectoryError::Request(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.segment_state("VIP"), SyncState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_sync_returns_partial_and_is_not_cached() {
    let directory = Arc::new(MockDirectory::new().with_endless_segment(&filter_for("VIP"), 5));
    let store = Arc::new(MemoryStore::new());
    let client =
        DirectoryClient::with_directory(fixtures::config(), directory.clone(), store.clone())
            .unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let stop_after_two = move |progress: &SyncProgress| {
        if progress.pages_completed == 2 {
            trigger.cancel();
        }
    };
    let observer: &dyn SyncObserver = &stop_after_two;

    let result = client
        .orchestrator()
        .sync("VIP", false, Some(observer), &cancel)
        .await
        .unwrap();

    assert_eq!(result.termination, WalkTermination::Cancelled);
    assert_eq!(result.actual_count, 10);
    assert_eq!(directory.list_calls(), 2);
    assert_eq!(client.segment_state("VIP"), SyncState::PartialComplete);
    assert!(store.get_cached_sync("VIP").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_preview_reads_one_small_page() {
    let directory = Arc::new(MockDirectory::new().with_endless_segment(&filter_for("New Customers"), 25));
    let client = client_with(directory.clone());

    let records = client.preview_segment("New Customers").await.unwrap();

    assert_eq!(records.len(), 10);
    assert_eq!(directory.list_calls(), 1);
    assert_eq!(client.segment_state("New Customers"), SyncState::Idle);
}

#[tokio::test]
async fn test_list_segments() {
    let client = client_with(vip_directory());
    let names: Vec<String> = client.list_segments().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["New Customers", "VIP", "Subscribers", "Repeat Buyers"]);
}
