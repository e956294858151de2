//! SQLite implementation of IStateStore
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                        |
//! |-----------------|----------|-------------------------------------------------|
//! | SyncPath        | TEXT     | Path string via `.to_string()` / `SyncPath::new()` |
//! | RemotePath      | TEXT     | String via `.as_str()` / `RemotePath::new()`    |
//! | RemoteId        | TEXT     | String via `.as_str()` / `RemoteId::new()`      |
//! | FileHash        | TEXT     | String via `.as_str()` / `FileHash::new()`      |
//! | ChangeToken     | TEXT     | `settings` row keyed `change_log_token`         |
//! | OperationKind   | TEXT     | `.as_str()` / `FromStr`                         |
//! | DateTime<Utc>   | TEXT     | ISO 8601 via `to_rfc3339()` / `DateTime::parse_from_rfc3339()` |

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docsync_core::domain::{
    newtypes::{ChangeToken, FileHash, RemoteId, RemotePath, SyncPath},
    sync_item::{OperationKind, RetryCounters, SyncItem},
};
use docsync_core::ports::IStateStore;

use crate::subtree::{descendant_prefix, relocate};
use crate::{StateStoreError, CHANGE_TOKEN_KEY};

/// SQLite-based implementation of the state store port
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Loads the retry counters recorded for one path
    async fn load_counters(&self, local_path: &str) -> Result<RetryCounters, StateStoreError> {
        let rows = sqlx::query("SELECT operation, attempts FROM retry_counters WHERE local_path = ?")
            .bind(local_path)
            .fetch_all(&self.pool)
            .await?;

        let mut counters = RetryCounters::default();
        for row in rows {
            let (kind, attempts) = counter_from_row(&row)?;
            counters.set(kind, attempts);
        }
        Ok(counters)
    }

    /// Fetches one item by an indexed column, filling in its counters
    async fn fetch_one_by(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<SyncItem>, StateStoreError> {
        let sql = format!("SELECT * FROM sync_items WHERE {column} = ? ORDER BY local_path LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let item = sync_item_from_row(&row)?;
                let counters = self.load_counters(&item.local_path().to_string()).await?;
                Ok(Some(item.with_retry_counters(counters)))
            }
            None => Ok(None),
        }
    }

    /// Items at `path` or below it, without counters
    async fn fetch_subtree(&self, path: &SyncPath) -> Result<Vec<SyncItem>, StateStoreError> {
        let exact = path.to_string();
        let prefix = descendant_prefix(path);
        let rows = sqlx::query(
            "SELECT * FROM sync_items \
             WHERE local_path = ?1 OR substr(local_path, 1, ?2) = ?3",
        )
        .bind(&exact)
        .bind(prefix.chars().count() as i64)
        .bind(&prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(sync_item_from_row).collect()
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StateStoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StateStoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StateStoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a SyncItem from a `sync_items` row
fn sync_item_from_row(row: &SqliteRow) -> Result<SyncItem, StateStoreError> {
    let local_path_str: String = row.get("local_path");
    let remote_path_str: String = row.get("remote_path");
    let remote_id_str: Option<String> = row.get("remote_id");
    let is_folder: bool = row.get("is_folder");
    let remote_last_modified_str: Option<String> = row.get("remote_last_modified");
    let local_checksum_str: Option<String> = row.get("local_checksum");

    let local_path = SyncPath::new(PathBuf::from(local_path_str))?;
    let remote_path = RemotePath::new(remote_path_str)?;

    let mut item = if is_folder {
        SyncItem::new_folder(local_path, remote_path)
    } else {
        SyncItem::new_file(local_path, remote_path)
    };
    if let Some(id) = remote_id_str {
        item = item.with_remote_id(RemoteId::new(id)?);
    }
    if let Some(at) = parse_optional_datetime(remote_last_modified_str)? {
        item = item.with_remote_last_modified(at);
    }
    if let Some(hash) = local_checksum_str {
        item = item.with_checksum(FileHash::new(hash)?);
    }
    Ok(item)
}

/// Read one `retry_counters` row
fn counter_from_row(row: &SqliteRow) -> Result<(OperationKind, u32), StateStoreError> {
    let operation: String = row.get("operation");
    let attempts: i64 = row.get("attempts");
    let kind = operation.parse::<OperationKind>()?;
    let attempts = u32::try_from(attempts).map_err(|_| {
        StateStoreError::SerializationError(format!("Invalid retry counter value: {attempts}"))
    })?;
    Ok((kind, attempts))
}

/// Insert or replace a record inside a transaction or on the pool
async fn upsert_item<'e, E>(executor: E, item: &SyncItem) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT OR REPLACE INTO sync_items \
         (local_path, remote_path, remote_id, is_folder, remote_last_modified, local_checksum) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(item.local_path().to_string())
    .bind(item.remote_path().as_str().to_string())
    .bind(item.remote_id().map(|id| id.as_str().to_string()))
    .bind(item.is_folder())
    .bind(item.remote_last_modified().map(|dt| dt.to_rfc3339()))
    .bind(item.local_checksum().map(|h| h.as_str().to_string()))
    .execute(executor)
    .await?;
    Ok(())
}

// ============================================================================
// IStateStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateStore for SqliteStateStore {
    async fn save_item(&self, item: &SyncItem) -> anyhow::Result<()> {
        upsert_item(&self.pool, item).await?;
        Ok(())
    }

    async fn get_item(&self, local_path: &SyncPath) -> anyhow::Result<Option<SyncItem>> {
        Ok(self
            .fetch_one_by("local_path", &local_path.to_string())
            .await?)
    }

    async fn get_item_by_remote_path(
        &self,
        remote_path: &RemotePath,
    ) -> anyhow::Result<Option<SyncItem>> {
        Ok(self.fetch_one_by("remote_path", remote_path.as_str()).await?)
    }

    async fn get_item_by_remote_id(
        &self,
        remote_id: &RemoteId,
    ) -> anyhow::Result<Option<SyncItem>> {
        Ok(self.fetch_one_by("remote_id", remote_id.as_str()).await?)
    }

    async fn remove_item(&self, local_path: &SyncPath) -> anyhow::Result<u64> {
        let exact = local_path.to_string();
        let prefix = descendant_prefix(local_path);
        let prefix_len = prefix.chars().count() as i64;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query(
            "DELETE FROM sync_items WHERE local_path = ?1 OR substr(local_path, 1, ?2) = ?3",
        )
        .bind(&exact)
        .bind(prefix_len)
        .bind(&prefix)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query(
            "DELETE FROM retry_counters WHERE local_path = ?1 OR substr(local_path, 1, ?2) = ?3",
        )
        .bind(&exact)
        .bind(prefix_len)
        .bind(&prefix)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(path = %local_path, removed, "Removed sync records");
        Ok(removed)
    }

    async fn move_item(
        &self,
        from: &SyncPath,
        to_local: &SyncPath,
        to_remote: &RemotePath,
    ) -> anyhow::Result<()> {
        let items = self.fetch_subtree(from).await?;
        if items.is_empty() {
            return Ok(());
        }

        let mut moved = Vec::with_capacity(items.len());
        let mut counter_moves = Vec::with_capacity(items.len());
        for item in items {
            let old = item.local_path().to_string();
            let item = relocate(item, from, to_local, to_remote)?;
            counter_moves.push((old, item.local_path().to_string()));
            moved.push(item);
        }

        let mut tx = self.pool.begin().await?;
        for (old, new) in &counter_moves {
            sqlx::query("DELETE FROM sync_items WHERE local_path = ?")
                .bind(old)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM retry_counters WHERE local_path = ?")
                .bind(new)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE retry_counters SET local_path = ? WHERE local_path = ?")
                .bind(new)
                .bind(old)
                .execute(&mut *tx)
                .await?;
        }
        for item in &moved {
            upsert_item(&mut *tx, item).await?;
        }
        tx.commit().await?;

        tracing::debug!(
            from = %from,
            to = %to_local,
            records = moved.len(),
            "Moved sync records"
        );
        Ok(())
    }

    async fn list_items(&self) -> anyhow::Result<Vec<SyncItem>> {
        let rows = sqlx::query("SELECT * FROM sync_items")
            .fetch_all(&self.pool)
            .await?;
        let counter_rows = sqlx::query("SELECT local_path, operation, attempts FROM retry_counters")
            .fetch_all(&self.pool)
            .await?;

        let mut counters: std::collections::HashMap<String, RetryCounters> =
            std::collections::HashMap::new();
        for row in &counter_rows {
            let path: String = row.get("local_path");
            let (kind, attempts) = counter_from_row(row)?;
            counters.entry(path).or_default().set(kind, attempts);
        }

        let mut items = rows
            .iter()
            .map(|row| {
                let item = sync_item_from_row(row)?;
                let c = counters
                    .get(&item.local_path().to_string())
                    .copied()
                    .unwrap_or_default();
                Ok(item.with_retry_counters(c))
            })
            .collect::<Result<Vec<_>, StateStoreError>>()?;
        items.sort_by(|a, b| a.local_path().cmp(b.local_path()));
        Ok(items)
    }

    async fn get_retry_counter(
        &self,
        local_path: &SyncPath,
        kind: OperationKind,
    ) -> anyhow::Result<u32> {
        let attempts: Option<i64> = sqlx::query_scalar(
            "SELECT attempts FROM retry_counters WHERE local_path = ? AND operation = ?",
        )
        .bind(local_path.to_string())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempts.map(|a| a.max(0) as u32).unwrap_or(0))
    }

    async fn set_retry_counter(
        &self,
        local_path: &SyncPath,
        kind: OperationKind,
        value: u32,
    ) -> anyhow::Result<()> {
        if value == 0 {
            sqlx::query("DELETE FROM retry_counters WHERE local_path = ? AND operation = ?")
                .bind(local_path.to_string())
                .bind(kind.as_str())
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query(
                "INSERT OR REPLACE INTO retry_counters (local_path, operation, attempts) \
                 VALUES (?, ?, ?)",
            )
            .bind(local_path.to_string())
            .bind(kind.as_str())
            .bind(i64::from(value))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_change_token(&self) -> anyhow::Result<Option<ChangeToken>> {
        match self.get_setting(CHANGE_TOKEN_KEY).await? {
            Some(token) => Ok(Some(ChangeToken::new(token)?)),
            None => Ok(None),
        }
    }

    async fn set_change_token(&self, token: &ChangeToken) -> anyhow::Result<()> {
        self.set_setting(CHANGE_TOKEN_KEY, token.as_str()).await
    }

    async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
