use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Records table - one row per entity record, all resource kinds together
#[derive(Iden)]
pub enum Records {
    Table,
    Seq,
    Id,
    Kind,
    Fields,
    CreatedAtMs,
    UpdatedAtMs,
}
