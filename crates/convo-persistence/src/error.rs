//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y, en el borde
//! con el core, a `StoreError`.

use convo_core::errors::StoreError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("configuration: {0}")]
    Config(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
    /// Error devuelto por el trabajo del engine dentro de la transacción.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Store(inner) => inner,
            PersistenceError::SerializationConflict => StoreError::Conflict(err.to_string()),
            PersistenceError::UniqueViolation(_) => StoreError::Conflict(err.to_string()),
            PersistenceError::TransientIo(_) | PersistenceError::Config(_) => StoreError::Unavailable(err.to_string()),
            PersistenceError::CheckViolation(_) | PersistenceError::NotFound | PersistenceError::Unknown(_) => {
                StoreError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_pass_through_unchanged() {
        let inner = StoreError::Corrupt("bad context".into());
        let mapped: StoreError = PersistenceError::Store(inner.clone()).into();
        assert_eq!(mapped, inner);
        let io: StoreError = PersistenceError::TransientIo("pool".into()).into();
        assert!(matches!(io, StoreError::Unavailable(_)));
        let not_found: StoreError = PersistenceError::from(DieselError::NotFound).into();
        assert!(matches!(not_found, StoreError::Internal(_)));
    }
}
