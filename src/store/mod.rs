//! Record store: the shared relational table behind every command.
//!
//! One table, `entries`, holds cache values and lock descriptors alike. The
//! store exposes exactly the primitives the engine can make atomic — upsert,
//! insert-or-ignore, value-guarded conditional update, and deletes with
//! affected-row counts — and nothing higher-level. Command semantics live in
//! [`crate::cache`] and [`crate::lock`].
//!
//! SQLite notes: the pool is capped at one connection with a busy timeout,
//! which serializes in-process writers; cross-process writers serialize on
//! the database write lock. `rows_affected()` is the concurrency signal for
//! the insert-race and compare-and-swap paths.

use crate::core::error::TrellisResult;
use crate::core::time::Millis;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;

use crate::core::config::StorageConfig;

/// Schema for the shared table.
///
/// `expires_at` is nullable unix milliseconds; NULL means the row never
/// expires. `created_at` is written once at insert and never updated.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    key        TEXT    NOT NULL UNIQUE,
    value      BLOB    NOT NULL,
    expires_at INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_key        ON entries (key);
CREATE INDEX IF NOT EXISTS idx_entries_expires_at ON entries (expires_at);
"#;

/// One row of the shared table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Entry {
    /// Surrogate identity, assigned by the store.
    pub id: i64,

    /// Unique addressing key.
    pub key: String,

    /// Opaque payload; its structure is whatever the writing command chose.
    pub value: Vec<u8>,

    /// Expiry instant in unix milliseconds; NULL never expires.
    pub expires_at: Option<i64>,

    /// Insertion instant in unix milliseconds, immutable.
    pub created_at: i64,
}

impl Entry {
    /// Check if this row is visible to ordinary reads at the given instant.
    pub fn is_visible_at(&self, now: Millis) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => now.is_before(Millis::new(at)),
        }
    }
}

/// Handle to the shared table.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    /// Open (or create) a store at the given database file.
    pub async fn open(path: &str) -> TrellisResult<Self> {
        Self::from_config(&StorageConfig {
            path: path.to_string(),
            ..StorageConfig::default()
        })
        .await
    }

    /// Open a private in-memory store.
    ///
    /// The data lives in the pool's single connection, so the pool must
    /// never recycle it.
    pub async fn open_in_memory() -> TrellisResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open a store from configuration.
    pub async fn from_config(config: &StorageConfig) -> TrellisResult<Self> {
        if config.path == ":memory:" {
            return Self::open_in_memory().await;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run the idempotent schema migration.
    pub async fn migrate(&self) -> TrellisResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction for multi-statement operations.
    pub async fn begin(&self) -> TrellisResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Fetch the row for `key` if it is visible at `now`.
    pub async fn fetch_visible(&self, key: &str, now: Millis) -> TrellisResult<Option<Entry>> {
        let row = sqlx::query_as::<_, Entry>(
            "SELECT * FROM entries WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now.ms)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Fetch the row for `key` regardless of expiry.
    pub async fn fetch_any(&self, key: &str) -> TrellisResult<Option<Entry>> {
        Self::fetch_any_in(&self.pool, key).await
    }

    /// Fetch the row for `key` on an arbitrary executor (pool or open
    /// transaction).
    pub async fn fetch_any_in<'e, E>(ex: E, key: &str) -> TrellisResult<Option<Entry>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, Entry>("SELECT * FROM entries WHERE key = ?")
            .bind(key)
            .fetch_optional(ex)
            .await?;
        Ok(row)
    }

    /// Fetch all rows whose key starts with `prefix`.
    pub async fn fetch_prefixed(&self, prefix: &str) -> TrellisResult<Vec<Entry>> {
        let rows = sqlx::query_as::<_, Entry>("SELECT * FROM entries WHERE key LIKE ? || '%'")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Insert or overwrite the row for `key` in a single statement.
    ///
    /// The conflict arm updates only `value` and `expires_at`; `created_at`
    /// keeps the original insertion instant. Racing upserts on the same key
    /// converge to whichever commits last.
    pub async fn upsert(
        &self,
        key: &str,
        value: &[u8],
        expires_at: Option<Millis>,
        now: Millis,
    ) -> TrellisResult<()> {
        Self::upsert_in(&self.pool, key, value, expires_at, now).await
    }

    /// [`Self::upsert`] on an arbitrary executor.
    pub async fn upsert_in<'e, E>(
        ex: E,
        key: &str,
        value: &[u8],
        expires_at: Option<Millis>,
        now: Millis,
    ) -> TrellisResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO entries (key, value, expires_at, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at.map(|at| at.ms))
        .bind(now.ms)
        .execute(ex)
        .await?;
        Ok(())
    }

    /// Insert the row for `key` only if no row exists, expired or not.
    ///
    /// Returns true iff the insert landed. A conflicting row — including an
    /// expired one awaiting the sweeper — leaves the statement a silent
    /// no-op with zero affected rows.
    pub async fn insert_if_absent(
        &self,
        key: &str,
        value: &[u8],
        expires_at: Option<Millis>,
        now: Millis,
    ) -> TrellisResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO entries (key, value, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at.map(|at| at.ms))
        .bind(now.ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the value for `key` only if the stored value still equals
    /// `expected`.
    ///
    /// Returns true iff exactly one row changed. Zero rows means another
    /// writer got there first (or the row vanished); the caller decides
    /// whether to retry.
    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        replacement: &[u8],
    ) -> TrellisResult<bool> {
        let result = sqlx::query("UPDATE entries SET value = ? WHERE key = ? AND value = ?")
            .bind(replacement)
            .bind(key)
            .bind(expected)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the expiry for `key` unconditionally.
    ///
    /// A missing key affects zero rows and is not an error.
    pub async fn set_expiry(&self, key: &str, expires_at: Millis) -> TrellisResult<u64> {
        let result = sqlx::query("UPDATE entries SET expires_at = ? WHERE key = ?")
            .bind(expires_at.ms)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every row whose key is in `keys`, visible or not.
    pub async fn delete_keys(&self, keys: &[&str]) -> TrellisResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let placeholders: Vec<&str> = keys.iter().map(|_| "?").collect();
        let sql = format!(
            "DELETE FROM entries WHERE key IN ({})",
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for key in keys {
            query = query.bind(*key);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Physically delete every row whose expiry has passed.
    pub async fn delete_expired(&self, now: Millis) -> TrellisResult<u64> {
        let result =
            sqlx::query("DELETE FROM entries WHERE expires_at IS NOT NULL AND expires_at < ?")
                .bind(now.ms)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Count all rows, expired or not.
    pub async fn count(&self) -> TrellisResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
