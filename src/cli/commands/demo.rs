//! Demo command: exercise the command surface end to end.

use crate::cache::CacheClient;
use crate::core::config::Config;
use crate::store::RecordStore;
use anyhow::{Context, Result};
use clap::Args;
use std::time::Duration;

/// Run a scripted tour of the emulated commands.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Database file to run against; defaults to a private in-memory store.
    #[arg(long)]
    pub db: Option<String>,
}

/// Run the demo command.
pub async fn run_demo(args: DemoArgs, mut config: Config) -> Result<()> {
    if let Some(db) = args.db {
        config.storage.path = db;
    } else {
        config.storage.path = ":memory:".to_string();
    }

    let store = RecordStore::from_config(&config.storage)
        .await
        .context("failed to open record store")?;
    let client = CacheClient::new(store, config);

    println!("record store ready ({} rows)", client.store().count().await?);

    // Plain set/get round trip.
    client.set("greeting", "hello", None).await;
    let got = client.get("greeting").await;
    println!(
        "set/get:          {:?}",
        got.as_deref().map(String::from_utf8_lossy)
    );

    // setnx keeps the first writer's value.
    client.setnx("claimed", "first").await;
    client.setnx("claimed", "second").await;
    let claimed = client.get("claimed").await;
    println!(
        "setnx precedence: {:?}",
        claimed.as_deref().map(String::from_utf8_lossy)
    );

    // Counters start from zero.
    client.incr("visits", 10).await;
    let count = client.incr("visits", 1).await;
    println!("incr:             visits = {}", count);

    // Sorted-set emulation.
    client
        .zadd(
            "scores",
            [
                ("alice".to_string(), 1.0),
                ("bob".to_string(), 2.0),
                ("carol".to_string(), 3.0),
                ("dave".to_string(), 4.0),
            ],
        )
        .await;
    println!("zcard:            {}", client.zcard("scores").await);
    let removed = client.zremrangebyscore("scores", 2.0, 3.0).await;
    println!(
        "zrem [2,3]:       removed {}, {} remain",
        removed,
        client.zcard("scores").await
    );

    // TTL expiry is lazy; the sweep reclaims the row afterwards.
    client
        .setex("ephemeral", "soon gone", Duration::from_millis(50))
        .await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    println!("expired get:      {:?}", client.get("ephemeral").await);
    let swept = client.run_sweep_once().await;
    println!("sweep:            removed {} rows", swept);

    // Lease lock: second owner is shut out until release.
    let mut first = client.lock("demo");
    let mut second = client
        .lock("demo")
        .with_owner(crate::lock::OwnerIdentity {
            process_id: u32::MAX,
            thread_id: "demo-rival".to_string(),
        });

    println!("lock #1 acquire:  {}", first.acquire(false).await);
    println!("lock #2 acquire:  {}", second.acquire(false).await);
    first.release().await;
    println!("after release:    {}", second.acquire(false).await);
    second.release().await;

    client.delete(&["greeting", "claimed", "visits", "scores"]).await;
    println!("cleaned up ({} rows)", client.store().count().await?);

    Ok(())
}
