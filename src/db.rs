use sea_query::{Value, Values};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

use crate::constants::{generate_db_unique_id, EXPECTED_DB_VERSION};
use crate::queries::{ddl, metadata};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Open (creating if needed) the SQLite database backing every resource.
/// Enables WAL mode and foreign keys; writers wait up to 5s on a locked database
pub async fn open_database(db_path: &Path) -> Result<SqlitePool, DynError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist yet
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), DynError> {
    sqlx::query(&ddl::create_metadata_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_records_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_records_kind_created_index())
        .execute(pool)
        .await?;
    Ok(())
}

/// Stamp a fresh database with the schema version, or verify an existing one.
///
/// Returns the database unique id.
pub async fn ensure_database_version(pool: &SqlitePool) -> Result<String, DynError> {
    let version = read_metadata(pool, "version").await?;

    match version {
        None => {
            let unique_id = generate_db_unique_id();
            write_metadata(pool, "version", EXPECTED_DB_VERSION).await?;
            write_metadata(pool, "unique_id", &unique_id).await?;
            Ok(unique_id)
        }
        Some(version) if version != EXPECTED_DB_VERSION => Err(format!(
            "Unsupported database version: '{}'. This application only supports version '{}'",
            version, EXPECTED_DB_VERSION
        )
        .into()),
        Some(_) => Ok(read_metadata(pool, "unique_id")
            .await?
            .ok_or("Database is missing its unique_id metadata")?),
    }
}

async fn read_metadata(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let (sql, values) = metadata::select_by_key(key);
    let row = bind_values(sqlx::query(&sql), &values)?
        .fetch_optional(pool)
        .await?;
    row.map(|r| r.try_get::<String, _>(0)).transpose()
}

async fn write_metadata(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    let (sql, values) = metadata::insert(key, value);
    bind_values(sqlx::query(&sql), &values)?
        .execute(pool)
        .await?;
    Ok(())
}

/// Bind sea-query placeholder values onto a sqlx query, in order.
pub fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &Values,
) -> Result<Query<'q, Sqlite, SqliteArguments<'q>>, sqlx::Error> {
    for value in values.0.iter() {
        query = match value {
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::BigInt(v) => query.bind(*v),
            Value::Unsigned(v) => query.bind(*v),
            Value::BigUnsigned(v) => {
                let v = v
                    .map(i64::try_from)
                    .transpose()
                    .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
                query.bind(v)
            }
            Value::String(v) => query.bind(v.as_ref().map(|s| s.to_string())),
            other => {
                return Err(sqlx::Error::Encode(
                    format!("unsupported bind value: {:?}", other).into(),
                ))
            }
        };
    }
    Ok(query)
}

/// Create a file-backed database inside a temporary directory for testing.
/// Keep the returned guard alive for as long as the pool is used
pub async fn create_test_connection_in_temporary_file(
) -> Result<(SqlitePool, tempfile::TempDir), DynError> {
    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("test.sqlite");
    let pool = open_database(&db_path).await?;
    Ok((pool, temp_dir))
}
