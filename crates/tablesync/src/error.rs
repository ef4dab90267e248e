use tablesync_schema::ShapeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("no connection target given")]
    MissingConnectionTarget,

    #[error("invalid connection target: {0}")]
    InvalidConnectionTarget(String),

    #[error("connection target names no database")]
    MissingCatalogName,

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("database {name} does not exist and could not be created")]
    DatabaseCreationFailed { name: String },

    #[error("table {table} does not exist and could not be created")]
    TableCreationFailed { table: String },

    #[error("table {table} is unavailable: {message}")]
    TableUnavailable { table: String, message: String },

    #[error("{}", format_statement_error(.sql, .message, .code.as_deref()))]
    Statement {
        sql: String,
        message: String,
        /// SQLSTATE, when the server reported one.
        code: Option<String>,
    },

    #[error("cannot rebuild {table}.{column}: temporary column {temp} already exists")]
    TempColumnConflict {
        table: String,
        column: String,
        temp: String,
    },
}

fn format_statement_error(sql: &str, message: &str, code: Option<&str>) -> String {
    match code {
        Some(code) => format!("statement failed [{code}]: {message}\n  {sql}"),
        None => format!("statement failed: {message}\n  {sql}"),
    }
}

/// Coarse classification of [`Error`], for callers that branch on the
/// failure class rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, detected before any I/O.
    Validation,
    /// A field type has no native column type.
    UnmappableType,
    /// The database or table could not be created.
    Provisioning,
    /// The live table could not be described.
    Introspection,
    /// A schema-altering statement was rejected.
    Statement,
    /// Connecting or talking to the server failed.
    Connection,
    /// A generated name collides with an existing column.
    Conflict,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingConnectionTarget
            | Error::InvalidConnectionTarget(_)
            | Error::MissingCatalogName => ErrorKind::Validation,
            Error::Shape(ShapeError::UnmappableFieldType { .. }) => ErrorKind::UnmappableType,
            Error::Shape(_) => ErrorKind::Validation,
            Error::DatabaseCreationFailed { .. } | Error::TableCreationFailed { .. } => {
                ErrorKind::Provisioning
            }
            Error::TableUnavailable { .. } => ErrorKind::Introspection,
            Error::Statement { .. } => ErrorKind::Statement,
            Error::Postgres(_) => ErrorKind::Connection,
            Error::TempColumnConflict { .. } => ErrorKind::Conflict,
        }
    }

    /// Wrap a failed statement together with the SQL that was sent.
    pub(crate) fn statement(sql: impl Into<String>, err: &tokio_postgres::Error) -> Self {
        Error::Statement {
            sql: sql.into(),
            message: server_message(err),
            code: err.code().map(|c| c.code().to_string()),
        }
    }
}

/// The server's own message when there is one, else the client-side error.
pub(crate) fn server_message(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
