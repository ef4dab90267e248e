//! The seam between the migration executor and a database.

use std::future::Future;
use std::pin::Pin;

use tablesync_schema::{ColumnDescriptor, NativeType};
use tablesync_sql::{Ddl, Ident};

use crate::error::server_message;
use crate::traced::{Connection, ConnectionExt};
use crate::{Error, Result};

#[cfg(test)]
pub(crate) mod memory;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the executor needs from a database session.
///
/// Every call is awaited before the next one is issued.
pub trait Session: Send + Sync {
    /// Run a schema-altering statement, returning the number of rows affected.
    ///
    /// A rejected statement is an [`Error::Statement`].
    fn execute<'a>(&'a self, ddl: &'a Ddl) -> BoxFuture<'a, Result<u64>>;

    /// The columns of `table`, in table order.
    ///
    /// A table that cannot be read (usually: does not exist) is an
    /// [`Error::TableUnavailable`].
    fn describe<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ColumnDescriptor>>>;

    /// Whether a database named `name` exists on the server.
    fn database_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// A [`Session`] over a live Postgres connection.
pub struct PgSession<'c, C: Connection> {
    conn: &'c C,
}

impl<'c, C: Connection> PgSession<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }
}

impl<C: Connection> Session for PgSession<'_, C> {
    fn execute<'a>(&'a self, ddl: &'a Ddl) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let sql = ddl.to_string();
            self.conn
                .traced()
                .execute(&sql, &[])
                .await
                .map_err(|e| Error::statement(sql, &e))
        })
    }

    fn describe<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ColumnDescriptor>>> {
        Box::pin(async move {
            // Preparing a zero-row projection yields the column list without
            // touching any rows or catalog views.
            let sql = format!("SELECT * FROM {} WHERE 1=2", Ident(table));
            let statement = self.conn.traced().prepare(&sql).await.map_err(|e| {
                Error::TableUnavailable {
                    table: table.to_string(),
                    message: server_message(&e),
                }
            })?;

            Ok(statement
                .columns()
                .iter()
                .map(|col| {
                    ColumnDescriptor::new(col.name(), NativeType::from_pg_name(col.type_().name()))
                })
                .collect())
        })
    }

    fn database_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let sql = "SELECT 1 FROM pg_database WHERE datname = $1";
            let row = self
                .conn
                .traced()
                .query_opt(sql, &[&name])
                .await
                .map_err(|e| Error::statement(sql, &e))?;
            Ok(row.is_some())
        })
    }
}
