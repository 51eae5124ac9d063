//! Database error types.

use thiserror::Error;

/// Connection-level database errors.
///
/// Errors raised inside a transaction surface as
/// [`StoreError`](crate::store::StoreError) instead.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/reviewer-service.")]
    MigrationDirNotFound { tried: String, last_error: String },
}
