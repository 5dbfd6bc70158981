use sea_query::{ColumnDef, Index, SqliteQueryBuilder, Table};

use crate::schema::{Metadata, Records};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS records (
///     seq INTEGER PRIMARY KEY AUTOINCREMENT,
///     id TEXT NOT NULL UNIQUE,
///     kind TEXT NOT NULL,
///     fields TEXT NOT NULL,
///     created_at_ms INTEGER NOT NULL,
///     updated_at_ms INTEGER NOT NULL
/// )
///
/// `seq` only exists to break `created_at_ms` ties in insertion order.
pub fn create_records_table() -> String {
    Table::create()
        .table(Records::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Records::Seq)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Records::Id).string().not_null().unique_key())
        .col(ColumnDef::new(Records::Kind).string().not_null())
        .col(ColumnDef::new(Records::Fields).text().not_null())
        .col(ColumnDef::new(Records::CreatedAtMs).big_integer().not_null())
        .col(ColumnDef::new(Records::UpdatedAtMs).big_integer().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_records_kind_created ON records(kind, created_at_ms)
pub fn create_records_kind_created_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_records_kind_created")
        .table(Records::Table)
        .col(Records::Kind)
        .col(Records::CreatedAtMs)
        .to_string(SqliteQueryBuilder)
}
