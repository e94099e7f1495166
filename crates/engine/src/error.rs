use serde::Serialize;
use verso_core::error::CoreError;
use verso_db::StoreError;

/// Error type for versioning operations.
///
/// Wraps [`CoreError`] for domain errors and [`sqlx::Error`] for backend
/// failures that are not otherwise classified.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain-level error from `verso_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(constraint) => Self::Core(CoreError::Conflict(format!(
                "Duplicate value violates unique constraint: {constraint}"
            ))),
            StoreError::Database(e) => Self::Database(e),
        }
    }
}

/// Coarse classification callers can branch on without matching nested
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    IntegrityFailure,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(core) => match core {
                CoreError::NotFound { .. } => ErrorKind::NotFound,
                CoreError::Validation(_) => ErrorKind::Validation,
                CoreError::Conflict(_) => ErrorKind::Conflict,
                CoreError::IntegrityFailure { .. } => ErrorKind::IntegrityFailure,
                CoreError::Internal(_) => ErrorKind::Internal,
            },
            Self::Database(err) => classify_sqlx_error(err),
        }
    }
}

/// - `RowNotFound` maps to `NotFound`.
/// - Unique constraint violations (`23505`) map to `Conflict`.
/// - Everything else is `Internal`.
fn classify_sqlx_error(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            ErrorKind::Conflict
        }
        _ => ErrorKind::Internal,
    }
}
