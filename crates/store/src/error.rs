use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration error: {0}")]
    Migration(#[from] crate::migration::MigrationError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
