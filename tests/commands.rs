//! Tests for the command emulator.

mod common;

use common::{assert_value_eq, manual_client};
use std::time::Duration;
use trellis::core::time::Millis;

// ============================================================================
// Plain key/value commands
// ============================================================================

#[tokio::test]
async fn get_missing_key_is_absent() {
    let (client, _clock) = manual_client().await;
    assert_eq!(client.get("nope").await, None);
}

#[tokio::test]
async fn set_then_get_round_trips_bytes() {
    let (client, _clock) = manual_client().await;

    client.set("text", "hello", None).await;
    assert_value_eq(client.get("text").await, "hello");

    // Arbitrary non-UTF-8 payloads survive byte for byte.
    let raw = vec![0u8, 159, 146, 150, 255];
    client.set("binary", &raw, None).await;
    assert_eq!(client.get("binary").await, Some(raw));
}

#[tokio::test]
async fn set_overwrites_value_and_ttl() {
    let (client, clock) = manual_client().await;

    client
        .set("k", "short-lived", Some(Duration::from_secs(1)))
        .await;
    client.set("k", "permanent", None).await;

    clock.advance(Duration::from_secs(10));
    assert_value_eq(client.get("k").await, "permanent");
}

#[tokio::test]
async fn get_after_delete_is_absent() {
    let (client, _clock) = manual_client().await;

    client.set("k", "v", None).await;
    client.delete(&["k"]).await;
    assert_eq!(client.get("k").await, None);
}

#[tokio::test]
async fn delete_handles_multiple_and_missing_keys() {
    let (client, _clock) = manual_client().await;

    client.set("a", "1", None).await;
    client.set("b", "2", None).await;
    client.delete(&["a", "b", "never-existed"]).await;

    assert_eq!(client.get("a").await, None);
    assert_eq!(client.get("b").await, None);
    assert_eq!(client.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn setnx_keeps_the_first_value() {
    let (client, _clock) = manual_client().await;

    client.setnx("claim", "first").await;
    client.setnx("claim", "second").await;
    assert_value_eq(client.get("claim").await, "first");
}

// ============================================================================
// TTL behavior
// ============================================================================

#[tokio::test]
async fn expired_entry_is_lazily_absent_then_swept() {
    let (client, clock) = manual_client().await;

    client
        .setex("ephemeral", "soon", Duration::from_secs(1))
        .await;
    assert_value_eq(client.get("ephemeral").await, "soon");

    clock.advance(Duration::from_millis(1_001));

    // Logically gone before any sweep runs.
    assert_eq!(client.get("ephemeral").await, None);
    assert_eq!(client.store().count().await.unwrap(), 1);

    // The sweep reclaims the row physically.
    assert_eq!(client.run_sweep_once().await, 1);
    assert_eq!(client.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn expire_applies_a_ttl_to_an_existing_key() {
    let (client, clock) = manual_client().await;

    client.set("k", "v", None).await;
    client.expire("k", Duration::from_secs(5)).await;

    clock.advance(Duration::from_secs(4));
    assert_value_eq(client.get("k").await, "v");

    clock.advance(Duration::from_secs(2));
    assert_eq!(client.get("k").await, None);
}

#[tokio::test]
async fn expire_on_missing_key_is_a_noop() {
    let (client, _clock) = manual_client().await;
    client.expire("ghost", Duration::from_secs(5)).await;
    assert_eq!(client.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn setnx_is_blocked_by_an_expired_row_until_swept() {
    let (client, clock) = manual_client().await;

    client.set("k", "old", Some(Duration::from_secs(1))).await;
    clock.advance(Duration::from_secs(2));

    // The expired row is invisible to reads but still blocks the insert.
    client.setnx("k", "new").await;
    assert_eq!(client.get("k").await, None);

    // Once swept, the insert lands.
    assert_eq!(client.run_sweep_once().await, 1);
    client.setnx("k", "new").await;
    assert_value_eq(client.get("k").await, "new");
}

// ============================================================================
// Counters
// ============================================================================

#[tokio::test]
async fn incr_on_absent_key_starts_from_zero() {
    let (client, _clock) = manual_client().await;
    assert_eq!(client.incr("counter", 10).await, 10);
    assert_value_eq(client.get("counter").await, "10");
}

#[tokio::test]
async fn incr_accumulates_and_accepts_negative_amounts() {
    let (client, _clock) = manual_client().await;

    assert_eq!(client.incr("counter", 5).await, 5);
    assert_eq!(client.incr("counter", 1).await, 6);
    assert_eq!(client.incr("counter", -4).await, 2);
}

#[tokio::test]
async fn incr_treats_unparsable_values_as_zero() {
    let (client, _clock) = manual_client().await;

    client.set("counter", "not a number", None).await;
    assert_eq!(client.incr("counter", 5).await, 5);
}

#[tokio::test]
async fn concurrent_incrs_lose_no_updates() {
    let (client, _clock) = manual_client().await;

    let (a, b) = tokio::join!(client.incr("counter", 1), client.incr("counter", 1));
    assert_eq!(a + b, 3); // one observed 1, the other 2, in either order
    assert_value_eq(client.get("counter").await, "2");
}

#[tokio::test]
async fn incr_preserves_an_existing_ttl() {
    let (client, clock) = manual_client().await;

    client.set("counter", "1", Some(Duration::from_secs(60))).await;
    client.incr("counter", 1).await;

    let entry = client
        .store()
        .fetch_any("counter")
        .await
        .unwrap()
        .expect("row should exist");
    assert_eq!(
        entry.expires_at,
        Some(Millis::new(common::START_MS).add(Duration::from_secs(60)).ms)
    );
}

// ============================================================================
// Sorted-set emulation
// ============================================================================

#[tokio::test]
async fn zadd_merges_and_zcard_counts() {
    let (client, _clock) = manual_client().await;

    client
        .zadd("s", [("a".to_string(), 1.0), ("b".to_string(), 2.0)])
        .await;
    client
        .zadd("s", [("c".to_string(), 3.0), ("d".to_string(), 4.0)])
        .await;
    assert_eq!(client.zcard("s").await, 4);

    // Existing members get their score overwritten, not duplicated.
    client.zadd("s", [("a".to_string(), 9.0)]).await;
    assert_eq!(client.zcard("s").await, 4);
}

#[tokio::test]
async fn zremrangebyscore_removes_inclusive_range() {
    let (client, _clock) = manual_client().await;

    client
        .zadd(
            "s",
            [
                ("a".to_string(), 1.0),
                ("b".to_string(), 2.0),
                ("c".to_string(), 3.0),
                ("d".to_string(), 4.0),
            ],
        )
        .await;

    assert_eq!(client.zremrangebyscore("s", 2.0, 3.0).await, 2);
    assert_eq!(client.zcard("s").await, 2);
}

#[tokio::test]
async fn zremrangebyscore_accepts_infinite_bounds() {
    let (client, _clock) = manual_client().await;

    client
        .zadd("s", [("a".to_string(), -100.0), ("b".to_string(), 100.0)])
        .await;

    let removed = client
        .zremrangebyscore("s", f64::NEG_INFINITY, f64::INFINITY)
        .await;
    assert_eq!(removed, 2);
    assert_eq!(client.zcard("s").await, 0);
}

#[tokio::test]
async fn zrem_and_zcard_on_absent_key_return_zero() {
    let (client, _clock) = manual_client().await;
    assert_eq!(client.zremrangebyscore("ghost", 0.0, 10.0).await, 0);
    assert_eq!(client.zcard("ghost").await, 0);
}

#[tokio::test]
async fn corrupt_set_payload_reads_as_empty_and_heals_on_write() {
    let (client, _clock) = manual_client().await;

    client.set("s", "definitely not json", None).await;
    assert_eq!(client.zcard("s").await, 0);
    assert_eq!(client.zremrangebyscore("s", 0.0, 10.0).await, 0);

    // The corrupt payload is still there; removal did not destroy it.
    assert_value_eq(client.get("s").await, "definitely not json");

    // A merge replaces it wholesale.
    client.zadd("s", [("a".to_string(), 1.0)]).await;
    assert_eq!(client.zcard("s").await, 1);
}
