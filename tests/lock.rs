//! Tests for the lease lock.

mod common;

use common::{manual_client, manual_client_with_config};
use std::time::Duration;
use trellis::core::config::Config;
use trellis::core::time::Millis;
use trellis::core::Clock;
use trellis::lock::{LockDescriptor, OwnerIdentity};

/// A distinct logical owner, as if acquiring from another process.
fn rival(n: u32) -> OwnerIdentity {
    OwnerIdentity {
        process_id: 900_000 + n,
        thread_id: format!("rival-{}", n),
    }
}

#[tokio::test]
async fn acquire_and_release_round_trip() {
    let (client, _clock) = manual_client().await;
    let mut lock = client.lock("job");

    assert!(!lock.is_held());
    assert!(lock.acquire(false).await);
    assert!(lock.is_held());

    lock.release().await;
    assert!(!lock.is_held());
    assert!(client.store().fetch_any("lock_job").await.unwrap().is_none());
}

#[tokio::test]
async fn reacquire_by_the_same_handle_is_idempotent() {
    let (client, _clock) = manual_client().await;
    let mut lock = client.lock("job");

    assert!(lock.acquire(false).await);
    assert!(lock.acquire(false).await);
    lock.release().await;
}

#[tokio::test]
async fn held_lock_shuts_out_other_owners() {
    let (client, _clock) = manual_client().await;
    let mut first = client.lock("job");
    let mut second = client.lock("job").with_owner(rival(1));

    assert!(first.acquire(false).await);
    assert!(!second.acquire(false).await);

    first.release().await;
    assert!(second.acquire(false).await);
    second.release().await;
}

#[tokio::test]
async fn stale_lock_is_taken_over_and_old_release_is_fenced() {
    let (client, clock) = manual_client().await;
    let mut first = client.lock("job");
    let mut second = client.lock("job").with_owner(rival(1));
    let mut third = client.lock("job").with_owner(rival(2));

    assert!(first.acquire(false).await);

    // Push the first holder's lease past its TTL.
    clock.advance(first.ttl() + Duration::from_millis(1));
    assert!(second.acquire(false).await);

    // The original holder's release must not disturb the new owner.
    first.release().await;
    assert!(!first.is_held());
    assert!(!third.acquire(false).await);

    let row = client
        .store()
        .fetch_any("lock_job")
        .await
        .unwrap()
        .expect("row should survive the fenced release");
    let descriptor = LockDescriptor::decode(&row.value).unwrap();
    assert!(descriptor.is_owned_by(&rival(1)));

    second.release().await;
}

#[tokio::test]
async fn corrupt_lock_row_is_taken_over() {
    let (client, clock) = manual_client().await;

    client
        .store()
        .upsert("lock_job", b"garbage payload", None, clock.now())
        .await
        .unwrap();

    let mut lock = client.lock("job");
    assert!(lock.acquire(false).await);

    let row = client.store().fetch_any("lock_job").await.unwrap().unwrap();
    assert!(LockDescriptor::decode(&row.value).is_some());
    lock.release().await;
}

#[tokio::test]
async fn release_of_a_corrupt_row_deletes_it() {
    let (client, clock) = manual_client().await;
    let mut lock = client.lock("job");

    assert!(lock.acquire(false).await);

    // Someone scribbled over our descriptor while we hold the flag.
    client
        .store()
        .upsert("lock_job", b"\xff\xfe", None, clock.now())
        .await
        .unwrap();

    lock.release().await;
    assert!(!lock.is_held());
    assert!(client.store().fetch_any("lock_job").await.unwrap().is_none());
}

#[tokio::test]
async fn with_lock_runs_the_body_and_releases() {
    let (client, _clock) = manual_client().await;
    let mut lock = client.lock("job");

    let result = lock.with_lock(|| async { 41 + 1 }).await.unwrap();
    assert_eq!(result, 42);
    assert!(!lock.is_held());

    // Released on the way out, so another owner can get in.
    let mut other = client.lock("job").with_owner(rival(1));
    assert!(other.acquire(false).await);
    other.release().await;
}

#[tokio::test]
async fn with_lock_fails_hard_when_unavailable() {
    let (client, _clock) = manual_client().await;
    let mut holder = client.lock("job");
    let mut blocked = client.lock("job").with_owner(rival(1));

    assert!(holder.acquire(false).await);

    let mut ran = false;
    let result = blocked
        .with_lock(|| {
            ran = true;
            async { 0 }
        })
        .await;
    assert!(matches!(
        result,
        Err(trellis::TrellisError::LockUnavailable { .. })
    ));
    assert!(!ran);

    holder.release().await;
}

#[tokio::test]
#[should_panic(expected = "does not support blocking")]
async fn blocking_acquisition_is_a_precondition_violation() {
    let (client, _clock) = manual_client().await;
    let mut lock = client.lock("job");
    let _ = lock.acquire(true).await;
}

#[tokio::test]
async fn acquire_sweeps_abandoned_lock_rows_when_rolled() {
    let mut config = Config::default();
    config.lock.cleanup_probability = 1.0;
    let (client, clock) = manual_client_with_config(config).await;

    // An abandoned lock twice the TTL old, and an unreadable one.
    let stale = LockDescriptor::new(&rival(7), Millis::new(common::START_MS - 120_000))
        .encode()
        .unwrap();
    client
        .store()
        .upsert("lock_abandoned", &stale, None, clock.now())
        .await
        .unwrap();
    client
        .store()
        .upsert("lock_scrambled", b"not a descriptor", None, clock.now())
        .await
        .unwrap();

    // Ordinary cache rows under other keys are untouched by the sweep.
    client.set("cache_row", "v", None).await;

    let mut lock = client.lock("fresh");
    assert!(lock.acquire(false).await);

    assert!(client
        .store()
        .fetch_any("lock_abandoned")
        .await
        .unwrap()
        .is_none());
    assert!(client
        .store()
        .fetch_any("lock_scrambled")
        .await
        .unwrap()
        .is_none());
    assert!(client.store().fetch_any("cache_row").await.unwrap().is_some());

    lock.release().await;
}
