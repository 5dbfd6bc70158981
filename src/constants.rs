use rand::Rng;

/// Expected database schema version
/// Databases created with another version are refused at startup
pub const EXPECTED_DB_VERSION: &str = "1";

/// Directory (relative to the data dir) that holds every system-managed upload.
/// Paths stored on records start with this prefix.
pub const UPLOAD_ROOT: &str = "uploads";

/// Page size used when a resource does not declare one
pub const DEFAULT_PAGE_LIMIT: u64 = 10;

/// Page size for media-heavy resources (gallery and the like)
pub const MEDIA_PAGE_LIMIT: u64 = 20;

/// Upper bound on `limit` unless the config overrides it
pub const DEFAULT_MAX_PAGE_LIMIT: u64 = 100;

/// Keys owned by the server; callers cannot set them through record fields
pub const RESERVED_FIELDS: [&str; 4] = ["_id", "id", "createdAt", "updatedAt"];

/// Generate a unique database ID, stored in the metadata table on creation
pub fn generate_db_unique_id() -> String {
    format!(
        "db_{}",
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(12)
            .map(char::from)
            .collect::<String>()
    )
}
