//! Bulk mutator tests.

use crate::bulk::{BulkConfig, BulkMutator};
use crate::errors::{DirectoryError, NetworkError, ServerError, ValidationError};
use crate::fixtures;
use crate::mocks::MockDirectory;
use crate::resilience::{RetryConfig, ThrottleConfig};
use crate::types::{CustomerId, TagAction, TagSet};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn mutator(directory: &Arc<MockDirectory>, concurrency: usize) -> BulkMutator {
    BulkMutator::new(
        directory.clone(),
        Arc::new(fixtures::executor(
            ThrottleConfig::default(),
            RetryConfig::new().max_retries(2),
        )),
        BulkConfig { concurrency },
    )
}

fn ids(raw: &[&str]) -> Vec<CustomerId> {
    raw.iter().map(|id| CustomerId::new(*id)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_add_is_idempotent_and_skips_unchanged_writes() {
    let directory = Arc::new(
        MockDirectory::new()
            .with_customer(fixtures::customer("1", "VIP"))
            .with_customer(fixtures::customer("2", "VIP, New")),
    );

    let outcome = mutator(&directory, 4)
        .apply(&ids(&["1", "2"]), &[TagAction::add("New").unwrap()], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.unchanged, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(directory.tags_of("1").unwrap(), TagSet::parse("VIP, New"));
    assert_eq!(directory.tags_of("2").unwrap(), TagSet::parse("VIP, New"));
    assert_eq!(directory.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_actions_apply_in_order() {
    let directory = Arc::new(MockDirectory::new().with_customer(fixtures::customer("1", "Lead, Trial")));
    let actions = [
        TagAction::remove("Trial").unwrap(),
        TagAction::add("Paid").unwrap(),
        TagAction::remove("Lead").unwrap(),
    ];

    mutator(&directory, 1)
        .apply(&ids(&["1"]), &actions, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(directory.tags_of("1").unwrap().as_slice(), &["Paid"]);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_isolated_and_ordered() {
    let directory = Arc::new(
        MockDirectory::new()
            .with_customer(fixtures::customer("1", ""))
            .with_customer(fixtures::customer("3", ""))
            .with_customer(fixtures::customer("4", ""))
            .with_customer(fixtures::customer("5", ""))
            .fail_write("4", || DirectoryError::Server(ServerError::Unavailable))
            .with_latency(Duration::from_millis(50)),
    );
    let input = ids(&["1", "missing", "3", "4", "5"]);

    let outcome = mutator(&directory, 4)
        .apply(&input, &[TagAction::add("Q3").unwrap()], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.succeeded + outcome.failed, input.len());
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.errors.len(), outcome.failed);
    assert!(outcome.errors[0].starts_with("missing: read failed"));
    assert!(outcome.errors[1].starts_with("4: write failed"));
    assert!(!outcome.cancelled);
    assert_eq!(directory.tags_of("5").unwrap().as_slice(), &["Q3"]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_read_errors_are_retried_then_reported() {
    let directory = Arc::new(
        MockDirectory::new()
            .with_customer(fixtures::customer("1", ""))
            .fail_read("1", || DirectoryError::Network(NetworkError::Timeout)),
    );

    let outcome = mutator(&directory, 1)
        .apply(&ids(&["1"]), &[TagAction::add("X").unwrap()], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.failed, 1);
    // initial attempt plus two retries
    assert_eq!(directory.read_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let mut directory = MockDirectory::new().with_latency(Duration::from_millis(100));
    let raw: Vec<String> = (0..20).map(|n| format!("c{n}")).collect();
    for id in &raw {
        directory = directory.with_customer(fixtures::customer(id, ""));
    }
    let directory = Arc::new(directory);
    let input: Vec<CustomerId> = raw.iter().map(|id| CustomerId::new(id.as_str())).collect();

    let outcome = mutator(&directory, 3)
        .apply(&input, &[TagAction::add("Bulk").unwrap()], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 20);
    assert!(directory.max_in_flight() <= 3);
    assert!(directory.max_in_flight() > 1);
}

#[tokio::test]
async fn test_invalid_input_makes_no_upstream_calls() {
    let directory = Arc::new(MockDirectory::new().with_customer(fixtures::customer("1", "")));
    let mutator = mutator(&directory, 2);
    let cancel = CancellationToken::new();

    let err = mutator.apply(&ids(&["1"]), &[], &cancel).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Validation(ValidationError::EmptyActions)));

    let err = mutator
        .apply(&ids(&["1", "  "]), &[TagAction::add("A").unwrap()], &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::Validation(ValidationError::EmptyIdentifier)));

    assert_eq!(directory.read_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_batch_still_accounts_for_every_identifier() {
    let directory = Arc::new(MockDirectory::new().with_customer(fixtures::customer("1", "")));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = mutator(&directory, 2)
        .apply(&ids(&["1", "2", "3"]), &[TagAction::add("A").unwrap()], &cancel)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.failed, 3);
    assert_eq!(outcome.total(), 3);
    assert!(outcome.errors.iter().all(|e| e.ends_with("cancelled before processing")));
    assert_eq!(directory.read_calls(), 0);
}
