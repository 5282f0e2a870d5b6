use std::fmt;

use thiserror::Error;

/// Broad category of a [`StoreError`], for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connectivity,
    Schema,
    Validation,
    ForeignKey,
    Query,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Schema => "schema",
            ErrorKind::Validation => "validation",
            ErrorKind::ForeignKey => "foreign key",
            ErrorKind::Query => "query",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`crate::db::ClientStore`].
///
/// Every variant carries the statement that failed and the message reported
/// by the driver or the server.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection could not be established or was lost.
    #[error("connection error while running `{statement}`: {message}")]
    Connectivity { statement: String, message: String },

    /// The server rejected schema DDL.
    #[error("schema error while running `{statement}`: {message}")]
    Schema { statement: String, message: String },

    /// A value violated a column constraint such as a length bound.
    #[error("validation error while running `{statement}`: {message}")]
    Validation { statement: String, message: String },

    /// The statement referenced a parent row that does not exist.
    #[error("foreign key violation while running `{statement}`: {message}")]
    ForeignKey { statement: String, message: String },

    /// Malformed statement, parameter mismatch or undecodable row.
    #[error("query error while running `{statement}`: {message}")]
    Query { statement: String, message: String },
}

impl StoreError {
    /// Classify a driver error raised by a data statement.
    pub fn from_sqlx(statement: &str, err: sqlx::Error) -> Self {
        let kind = classify(&err, ErrorKind::Query);
        Self::new(kind, statement, message_of(&err))
    }

    /// Classify a driver error raised while running DDL. Server-side
    /// rejections become [`ErrorKind::Schema`]; transport failures stay
    /// [`ErrorKind::Connectivity`].
    pub fn from_sqlx_ddl(statement: &str, err: sqlx::Error) -> Self {
        let kind = match classify(&err, ErrorKind::Query) {
            ErrorKind::Connectivity => ErrorKind::Connectivity,
            _ if matches!(err, sqlx::Error::Database(_)) => ErrorKind::Schema,
            other => other,
        };
        Self::new(kind, statement, message_of(&err))
    }

    pub fn new(kind: ErrorKind, statement: &str, message: impl Into<String>) -> Self {
        let statement = statement.trim().to_string();
        let message = message.into();
        match kind {
            ErrorKind::Connectivity => StoreError::Connectivity { statement, message },
            ErrorKind::Schema => StoreError::Schema { statement, message },
            ErrorKind::Validation => StoreError::Validation { statement, message },
            ErrorKind::ForeignKey => StoreError::ForeignKey { statement, message },
            ErrorKind::Query => StoreError::Query { statement, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connectivity { .. } => ErrorKind::Connectivity,
            StoreError::Schema { .. } => ErrorKind::Schema,
            StoreError::Validation { .. } => ErrorKind::Validation,
            StoreError::ForeignKey { .. } => ErrorKind::ForeignKey,
            StoreError::Query { .. } => ErrorKind::Query,
        }
    }

    /// The SQL text (or `BEGIN`/`COMMIT`/`CONNECT`) that was running when the error occurred.
    pub fn statement(&self) -> &str {
        match self {
            StoreError::Connectivity { statement, .. }
            | StoreError::Schema { statement, .. }
            | StoreError::Validation { statement, .. }
            | StoreError::ForeignKey { statement, .. }
            | StoreError::Query { statement, .. } => statement,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StoreError::Connectivity { message, .. }
            | StoreError::Schema { message, .. }
            | StoreError::Validation { message, .. }
            | StoreError::ForeignKey { message, .. }
            | StoreError::Query { message, .. } => message,
        }
    }
}

fn message_of(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    }
}

fn classify(err: &sqlx::Error, fallback: ErrorKind) -> ErrorKind {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ErrorKind::Connectivity,
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => kind_for_sqlstate(&code).unwrap_or(fallback),
            None => fallback,
        },
        _ => fallback,
    }
}

/// Map a PostgreSQL SQLSTATE to an error kind, if it belongs to one of the
/// classes the store distinguishes.
pub(crate) fn kind_for_sqlstate(code: &str) -> Option<ErrorKind> {
    match code {
        // foreign_key_violation
        "23503" => Some(ErrorKind::ForeignKey),
        // not_null_violation, check_violation
        "23502" | "23514" => Some(ErrorKind::Validation),
        // admin_shutdown, crash_shutdown, cannot_connect_now
        "57P01" | "57P02" | "57P03" => Some(ErrorKind::Connectivity),
        // data exceptions, e.g. 22001 string_data_right_truncation
        c if c.starts_with("22") => Some(ErrorKind::Validation),
        // connection exceptions
        c if c.starts_with("08") => Some(ErrorKind::Connectivity),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classes() {
        assert_eq!(kind_for_sqlstate("23503"), Some(ErrorKind::ForeignKey));
        assert_eq!(kind_for_sqlstate("22001"), Some(ErrorKind::Validation));
        assert_eq!(kind_for_sqlstate("22P02"), Some(ErrorKind::Validation));
        assert_eq!(kind_for_sqlstate("23502"), Some(ErrorKind::Validation));
        assert_eq!(kind_for_sqlstate("08006"), Some(ErrorKind::Connectivity));
        assert_eq!(kind_for_sqlstate("57P01"), Some(ErrorKind::Connectivity));
        assert_eq!(kind_for_sqlstate("42601"), None);
        assert_eq!(kind_for_sqlstate("23505"), None);
    }

    #[test]
    fn transport_errors_are_connectivity() {
        let err = StoreError::from_sqlx("SELECT 1", sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Connectivity);

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = StoreError::from_sqlx_ddl("CREATE TABLE t ()", sqlx::Error::Io(io));
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[test]
    fn non_database_errors_fall_back_to_query() {
        let err = StoreError::from_sqlx("SELECT id FROM clients", sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::Query);

        let err = StoreError::from_sqlx_ddl("CREATE TABLE t ()", sqlx::Error::ColumnNotFound("id".into()));
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[test]
    fn statement_and_message_are_attached() {
        let err = StoreError::new(
            ErrorKind::ForeignKey,
            "\n  INSERT INTO phones (client_id, phone_number) VALUES ($1, $2)\n",
            "violates foreign key constraint",
        );
        assert_eq!(err.statement(), "INSERT INTO phones (client_id, phone_number) VALUES ($1, $2)");
        assert_eq!(err.message(), "violates foreign key constraint");
        assert!(err.to_string().starts_with("foreign key violation while running `INSERT INTO phones"));
    }
}
