use sea_query::{Expr, Func, Order, Query, SqliteQueryBuilder, Values};

use crate::schema::Records;

const RECORD_COLUMNS: [Records; 4] = [
    Records::Id,
    Records::Fields,
    Records::CreatedAtMs,
    Records::UpdatedAtMs,
];

/// INSERT INTO records (id, kind, fields, created_at_ms, updated_at_ms) VALUES (?, ?, ?, ?, ?)
pub fn insert(id: &str, kind: &str, fields_json: &str, created_at_ms: i64, updated_at_ms: i64) -> (String, Values) {
    Query::insert()
        .into_table(Records::Table)
        .columns([
            Records::Id,
            Records::Kind,
            Records::Fields,
            Records::CreatedAtMs,
            Records::UpdatedAtMs,
        ])
        .values_panic([
            id.into(),
            kind.into(),
            fields_json.into(),
            created_at_ms.into(),
            updated_at_ms.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// SELECT id, fields, created_at_ms, updated_at_ms FROM records WHERE kind = ?
/// ORDER BY created_at_ms DESC, seq DESC LIMIT ? OFFSET ?
pub fn select_page(kind: &str, skip: u64, limit: u64) -> (String, Values) {
    Query::select()
        .columns(RECORD_COLUMNS)
        .from(Records::Table)
        .and_where(Expr::col(Records::Kind).eq(kind))
        .order_by(Records::CreatedAtMs, Order::Desc)
        .order_by(Records::Seq, Order::Desc)
        .limit(limit)
        .offset(skip)
        .build(SqliteQueryBuilder)
}

/// SELECT COUNT(seq) FROM records WHERE kind = ?
pub fn count(kind: &str) -> (String, Values) {
    Query::select()
        .expr(Func::count(Expr::col(Records::Seq)))
        .from(Records::Table)
        .and_where(Expr::col(Records::Kind).eq(kind))
        .build(SqliteQueryBuilder)
}

/// SELECT id, fields, created_at_ms, updated_at_ms FROM records WHERE kind = ? AND id = ?
pub fn select_by_id(kind: &str, id: &str) -> (String, Values) {
    Query::select()
        .columns(RECORD_COLUMNS)
        .from(Records::Table)
        .and_where(Expr::col(Records::Kind).eq(kind))
        .and_where(Expr::col(Records::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// UPDATE records SET fields = ?, updated_at_ms = ? WHERE kind = ? AND id = ?
pub fn update_by_id(kind: &str, id: &str, fields_json: &str, updated_at_ms: i64) -> (String, Values) {
    Query::update()
        .table(Records::Table)
        .value(Records::Fields, fields_json)
        .value(Records::UpdatedAtMs, updated_at_ms)
        .and_where(Expr::col(Records::Kind).eq(kind))
        .and_where(Expr::col(Records::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// DELETE FROM records WHERE kind = ? AND id = ?
/// RETURNING id, fields, created_at_ms, updated_at_ms
///
/// Single statement: no read snapshot is held across the write.
pub fn delete_by_id(kind: &str, id: &str) -> (String, Values) {
    Query::delete()
        .from_table(Records::Table)
        .and_where(Expr::col(Records::Kind).eq(kind))
        .and_where(Expr::col(Records::Id).eq(id))
        .returning(Query::returning().columns(RECORD_COLUMNS))
        .build(SqliteQueryBuilder)
}

/// DELETE FROM records WHERE kind = ? RETURNING id, fields, created_at_ms, updated_at_ms
pub fn delete_all(kind: &str) -> (String, Values) {
    Query::delete()
        .from_table(Records::Table)
        .and_where(Expr::col(Records::Kind).eq(kind))
        .returning(Query::returning().columns(RECORD_COLUMNS))
        .build(SqliteQueryBuilder)
}
