//! Database errors and their mapping onto [`PortError`]
//!
//! SQLx failures are classified by SQLSTATE
//! (<https://www.postgresql.org/docs/current/errcodes-appendix.html>).
//! Lock waits and deadlocks become `Contention`, unique violations become
//! `Conflict`; the domain services rely on that split to tell a retryable
//! race from a duplicate.

use thiserror::Error;

use core_kernel::PortError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Timed out waiting for a pooled connection")]
    PoolExhausted,

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 23505
    #[error("Unique violation: {0}")]
    DuplicateEntry(String),

    /// 23503
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// 23514, e.g. a wallet balance check
    #[error("Check violation: {0}")]
    ConstraintViolation(String),

    /// 40001, 40P01, 55P03, 57014
    #[error("Lock contention: {0}")]
    LockContention(String),

    /// A row that does not decode into a domain value
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error(transparent)]
    SqlError(#[from] sqlx::Error),
}

impl DatabaseError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        DatabaseError::CorruptRow(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted)
    }

    /// Replaces a raw `SqlError` with its classified variant, if it has one
    fn classify(self) -> Self {
        match self {
            DatabaseError::SqlError(source) => match classify_sqlx(&source) {
                Some(classified) => classified,
                None => DatabaseError::SqlError(source),
            },
            other => other,
        }
    }
}

fn classify_sqlx(error: &sqlx::Error) -> Option<DatabaseError> {
    let classified = match error {
        sqlx::Error::RowNotFound => DatabaseError::NotFound("row".to_string()),
        sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            DatabaseError::ConnectionFailed(error.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => DatabaseError::CorruptRow(error.to_string()),
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db.code().as_deref() {
                Some("23505") => DatabaseError::DuplicateEntry(message),
                Some("23503") => DatabaseError::ForeignKeyViolation(message),
                Some("23514") => DatabaseError::ConstraintViolation(message),
                Some("40001" | "40P01" | "55P03" | "57014") => DatabaseError::LockContention(message),
                _ => return None,
            }
        }
        _ => return None,
    };
    Some(classified)
}

impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error.classify() {
            DatabaseError::NotFound(what) => PortError::not_found("Record", what),
            DatabaseError::DuplicateEntry(message) => PortError::conflict(message),
            DatabaseError::LockContention(message) => PortError::contention(message),
            DatabaseError::CorruptRow(message) => PortError::corrupt(message),
            error if error.is_connection_error() => PortError::Connection {
                message: error.to_string(),
                source: Some(Box::new(error)),
            },
            error => PortError::Internal {
                message: error.to_string(),
                source: Some(Box::new(error)),
            },
        }
    }
}

/// Maps a raw SQLx failure straight to the port error the domain sees
pub(crate) fn port_error(error: sqlx::Error) -> PortError {
    PortError::from(DatabaseError::SqlError(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(port_error(sqlx::Error::RowNotFound).is_not_found());
    }

    #[test]
    fn test_pool_timeout_is_transient_but_not_a_conflict() {
        let error = port_error(sqlx::Error::PoolTimedOut);
        assert!(error.is_transient());
        assert!(!error.is_conflict());
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let error = PortError::from(DatabaseError::DuplicateEntry("cash_transactions_idempotency_key".into()));
        assert!(error.is_conflict());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_lock_contention_is_retryable() {
        let error = PortError::from(DatabaseError::LockContention("deadlock detected".into()));
        assert!(error.is_transient());
        assert!(!error.is_conflict());
    }

    #[test]
    fn test_check_violation_is_internal() {
        let error = PortError::from(DatabaseError::ConstraintViolation("wallets_balance_check".into()));
        assert!(matches!(error, PortError::Internal { .. }));
        assert!(DatabaseError::ConstraintViolation(String::new()).is_constraint_violation());
    }

    #[test]
    fn test_corrupt_row() {
        let error = PortError::from(DatabaseError::corrupt("unknown status PAYED"));
        assert!(matches!(error, PortError::Corrupt { .. }));
    }

    #[test]
    fn test_unclassified_sql_error_keeps_source() {
        let error = port_error(sqlx::Error::Protocol("unexpected message".into()));
        match error {
            PortError::Internal { source, .. } => assert!(source.is_some()),
            other => panic!("expected internal error, got {other:?}"),
        }
    }
}
