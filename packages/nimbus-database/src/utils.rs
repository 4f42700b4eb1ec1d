use sqlx::error::DatabaseError;

use crate::DbErr;

/// SQLSTATE codes for faults that are expected to clear on their own,
/// retrying the statement after a backoff is safe and likely to succeed
const RETRYABLE_SQLSTATE: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57P03", // cannot_connect_now
];

/// Database error extension helper to determine common types of database
/// errors that can be safely caught
pub trait DatabaseErrorExt {
    fn is_duplicate_record(&self) -> bool;

    fn is_table_does_not_exist(&self) -> bool;

    /// Whether the error is a transient fault (connectivity, lock
    /// contention) rather than a problem with the statement itself.
    ///
    /// Content faults like syntax errors (42xxx) and constraint violations
    /// (23xxx) are deliberately not retryable, re-running a broken
    /// migration can never succeed.
    fn is_retryable(&self) -> bool;
}

impl DatabaseErrorExt for &dyn DatabaseError {
    fn is_duplicate_record(&self) -> bool {
        self.code().is_some_and(|code| {
            code.to_string().eq("23505" /* Unique violation */)
        })
    }

    fn is_table_does_not_exist(&self) -> bool {
        self.code().is_some_and(|code| {
            code.to_string().eq("42P01" /* Table does not exist */)
        })
    }

    fn is_retryable(&self) -> bool {
        self.code()
            .is_some_and(|code| is_retryable_sqlstate(&code.to_string()))
    }
}

impl DatabaseErrorExt for DbErr {
    fn is_duplicate_record(&self) -> bool {
        self.as_database_error()
            .is_some_and(|error| error.is_duplicate_record())
    }

    fn is_table_does_not_exist(&self) -> bool {
        self.as_database_error()
            .is_some_and(|error| error.is_table_does_not_exist())
    }

    fn is_retryable(&self) -> bool {
        match self {
            // Socket and pool level faults, the server or pool may recover
            DbErr::Io(_) | DbErr::Tls(_) | DbErr::PoolTimedOut | DbErr::PoolClosed => true,
            _ => self
                .as_database_error()
                .is_some_and(|error| error.is_retryable()),
        }
    }
}

/// Whether a SQLSTATE code represents a transient fault
pub fn is_retryable_sqlstate(code: &str) -> bool {
    // Class 08 covers connection exceptions (connection_failure,
    // connection_does_not_exist, ...)
    code.starts_with("08") || RETRYABLE_SQLSTATE.contains(&code)
}
