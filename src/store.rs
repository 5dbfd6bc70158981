//! Persistence layer for records.
//!
//! [`DocumentStore`] is the narrow set of document operations the repository
//! needs. [`SqliteStore`] implements it on the process-wide sqlx pool, one row
//! per record with the fields kept as a JSON document.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::db::bind_values;
use crate::id::RecordId;
use crate::queries::records;
use crate::record::{Fields, Record};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Document operations over one collection per resource kind.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, kind: &str, record: &Record) -> StoreResult<()>;

    /// Newest first, skipping `skip` records.
    async fn find_page(&self, kind: &str, skip: u64, limit: u64) -> StoreResult<Vec<Record>>;

    async fn count(&self, kind: &str) -> StoreResult<u64>;

    async fn find_by_id(&self, kind: &str, id: &RecordId) -> StoreResult<Option<Record>>;

    /// Overwrite the stored fields and `updatedAt`. Returns false when no record matched.
    async fn replace(&self, kind: &str, record: &Record) -> StoreResult<bool>;

    /// Remove one record, returning it as it was stored.
    async fn delete_by_id(&self, kind: &str, id: &RecordId) -> StoreResult<Option<Record>>;

    /// Remove every record of a kind, returning what was removed.
    async fn delete_many(&self, kind: &str) -> StoreResult<Vec<Record>>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn timestamp_from_ms(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn record_from_row(row: &SqliteRow) -> StoreResult<Record> {
    let raw_id: String = row.try_get(0)?;
    let fields_json: String = row.try_get(1)?;
    let created_at_ms: i64 = row.try_get(2)?;
    let updated_at_ms: i64 = row.try_get(3)?;

    let id = RecordId::parse(&raw_id)
        .ok_or_else(|| StoreError::Corrupt(format!("malformed id: {}", raw_id)))?;
    let fields: Fields = serde_json::from_str(&fields_json)?;

    Ok(Record {
        id,
        fields,
        created_at: timestamp_from_ms(created_at_ms)?,
        updated_at: timestamp_from_ms(updated_at_ms)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, kind: &str, record: &Record) -> StoreResult<()> {
        let fields_json = serde_json::to_string(&record.fields)?;
        let (sql, values) = records::insert(
            record.id.as_str(),
            kind,
            &fields_json,
            record.created_at.timestamp_millis(),
            record.updated_at.timestamp_millis(),
        );
        bind_values(sqlx::query(&sql), &values)?
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_page(&self, kind: &str, skip: u64, limit: u64) -> StoreResult<Vec<Record>> {
        let (sql, values) = records::select_page(kind, skip, limit);
        let rows = bind_values(sqlx::query(&sql), &values)?
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn count(&self, kind: &str) -> StoreResult<u64> {
        let (sql, values) = records::count(kind);
        let row = bind_values(sqlx::query(&sql), &values)?
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_id(&self, kind: &str, id: &RecordId) -> StoreResult<Option<Record>> {
        let (sql, values) = records::select_by_id(kind, id.as_str());
        let row = bind_values(sqlx::query(&sql), &values)?
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn replace(&self, kind: &str, record: &Record) -> StoreResult<bool> {
        let fields_json = serde_json::to_string(&record.fields)?;
        let (sql, values) = records::update_by_id(
            kind,
            record.id.as_str(),
            &fields_json,
            record.updated_at.timestamp_millis(),
        );
        let result = bind_values(sqlx::query(&sql), &values)?
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_id(&self, kind: &str, id: &RecordId) -> StoreResult<Option<Record>> {
        let (sql, values) = records::delete_by_id(kind, id.as_str());
        let rows = bind_values(sqlx::query(&sql), &values)?
            .fetch_all(&self.pool)
            .await?;
        rows.first().map(record_from_row).transpose()
    }

    async fn delete_many(&self, kind: &str) -> StoreResult<Vec<Record>> {
        let (sql, values) = records::delete_all(kind);
        let rows = bind_values(sqlx::query(&sql), &values)?
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}
