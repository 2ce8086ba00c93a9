//! # rr-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rr-core` store records.
//!
//! # Developer Note
//! SQLite has no unsigned 64-bit integer, so forum ids are stored as `i64`
//! bit patterns. Every id the forum hands out fits without loss.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rr_core::error::StoreError;
use rr_core::records::PermissionRecord;
use rr_core::traits::{DedupStore, PermissionStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS permissions (
        user_id     INTEGER PRIMARY KEY,
        level       INTEGER NOT NULL,
        note        TEXT NOT NULL DEFAULT '',
        recorded_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS dedup_records (
        node_id     INTEGER PRIMARY KEY,
        tag         INTEGER NOT NULL,
        recorded_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS dedup_records_recorded_at ON dedup_records (recorded_at)",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

// Forum ids are u64 on the wire; see the developer note above.
fn to_db(id: u64) -> i64 {
    id as i64
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and bootstraps the schema.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await.map_err(backend)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// A private in-memory database. One connection, since every new
    /// connection to `:memory:` would see an empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await.map_err(backend)?;
        }
        Ok(())
    }

    /// Drops dedup records older than `days`. Returns how many were removed.
    pub async fn truncate_dedup(&self, days: u32) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let removed = sqlx::query("DELETE FROM dedup_records WHERE recorded_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();
        info!(days, removed, "dedup records truncated");
        Ok(removed)
    }

    /// Every user with a non-neutral level, most severe first.
    pub async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        let rows = sqlx::query("SELECT user_id, level, note, recorded_at FROM permissions ORDER BY level ASC, user_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| PermissionRecord {
                user_id: row.get::<i64, _>("user_id") as u64,
                level: row.get("level"),
                note: row.get("note"),
                recorded_at: row.get::<DateTime<Utc>, _>("recorded_at"),
            })
            .collect())
    }
}

#[async_trait]
impl PermissionStore for SqliteStore {
    async fn get(&self, user_id: u64) -> Result<PermissionRecord, StoreError> {
        let row = sqlx::query("SELECT level, note, recorded_at FROM permissions WHERE user_id = ?")
            .bind(to_db(user_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        Ok(match row {
            Some(row) => PermissionRecord {
                user_id,
                level: row.get("level"),
                note: row.get("note"),
                recorded_at: row.get("recorded_at"),
            },
            None => PermissionRecord::neutral(user_id),
        })
    }

    /// Writing a neutral level removes the row instead.
    async fn set(&self, record: PermissionRecord) -> Result<(), StoreError> {
        if record.level == 0 {
            return self.remove(record.user_id).await;
        }
        sqlx::query("INSERT OR REPLACE INTO permissions (user_id, level, note, recorded_at) VALUES (?, ?, ?, ?)")
            .bind(to_db(record.user_id))
            .bind(record.level)
            .bind(&record.note)
            .bind(record.recorded_at)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn remove(&self, user_id: u64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM permissions WHERE user_id = ?")
            .bind(to_db(user_id))
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl DedupStore for SqliteStore {
    async fn get(&self, node_id: u64) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT tag FROM dedup_records WHERE node_id = ?")
            .bind(to_db(node_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(|row| row.get("tag")))
    }

    async fn put(&self, node_id: u64, tag: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO dedup_records (node_id, tag, recorded_at) VALUES (?, ?, ?)")
            .bind(to_db(node_id))
            .bind(tag)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permission_round_trip_and_neutral_default() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(PermissionStore::get(&store, 42).await.unwrap().level, 0);

        store.set(PermissionRecord::new(42, -5, "spammer")).await.unwrap();
        let record = PermissionStore::get(&store, 42).await.unwrap();
        assert_eq!(record.level, -5);
        assert_eq!(record.note, "spammer");

        store.set(PermissionRecord::new(42, 0, "")).await.unwrap();
        assert!(store.list_permissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_large_ids_survive_storage() {
        let store = SqliteStore::in_memory().await.unwrap();
        let id = u64::MAX - 3;
        store.put(id, 7).await.unwrap();
        assert_eq!(DedupStore::get(&store, id).await.unwrap(), Some(7));

        store.set(PermissionRecord::new(id, 2, "")).await.unwrap();
        assert_eq!(store.list_permissions().await.unwrap()[0].user_id, id);
    }

    #[tokio::test]
    async fn test_dedup_zero_tag_is_distinct_from_missing() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(DedupStore::get(&store, 1).await.unwrap(), None);
        store.put(1, 0).await.unwrap();
        assert_eq!(DedupStore::get(&store, 1).await.unwrap(), Some(0));
        store.put(1, 5).await.unwrap();
        assert_eq!(DedupStore::get(&store, 1).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_truncate_drops_only_stale_records() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.put(1, 1).await.unwrap();
        sqlx::query("INSERT INTO dedup_records (node_id, tag, recorded_at) VALUES (?, ?, ?)")
            .bind(2_i64)
            .bind(1_i64)
            .bind(Utc::now() - Duration::days(30))
            .execute(&store.pool)
            .await
            .unwrap();

        assert_eq!(store.truncate_dedup(7).await.unwrap(), 1);
        assert_eq!(DedupStore::get(&store, 1).await.unwrap(), Some(1));
        assert_eq!(DedupStore::get(&store, 2).await.unwrap(), None);
    }
}
