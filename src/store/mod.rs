//! Persistence layer for posts and their images.
//!
//! Stores hold no in-process state between calls; every operation runs under
//! its own deadline against the shared pool and all coordination is left to
//! Postgres (conditional updates and transactions).

pub mod featured;
pub mod images;
pub mod posts;

use std::{future::Future, time::Duration};

use thiserror::Error;

pub use images::{ImageRepository, PgImageStore};
pub use posts::{PgPostStore, PostRepository};

/// Postgres SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum DataError {
    /// No matching row for the given key.
    #[error("record not found")]
    NotFound,

    /// The row's version no longer matches the one the caller presented.
    #[error("edit conflict")]
    EditConflict,

    #[error("database call exceeded {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

impl DataError {
    /// True when the failure was a unique constraint (duplicate slug or filename).
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DataError::Storage(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| code == UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }

    /// Name of the violated constraint, if the database reported one.
    pub fn constraint(&self) -> Option<&str> {
        match self {
            DataError::Storage(sqlx::Error::Database(db)) => db.constraint(),
            _ => None,
        }
    }
}

/// Runs a unit of store work under `limit`.
///
/// On expiry the future is dropped; an open transaction inside it is rolled
/// back when the connection is returned to the pool.
pub(crate) async fn bounded<T, F>(limit: Duration, work: F) -> Result<T, DataError>
where
    F: Future<Output = Result<T, DataError>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout = ?limit, "database call timed out");
            Err(DataError::Timeout(limit))
        }
    }
}

/// Maps `RowNotFound` to [`DataError::NotFound`].
pub(crate) fn not_found(err: sqlx::Error) -> DataError {
    match err {
        sqlx::Error::RowNotFound => DataError::NotFound,
        other => DataError::Storage(other),
    }
}
