//! Read the live shape of a table.

use tablesync_schema::ColumnDescriptor;

use crate::session::Session;
use crate::{Error, Result};

/// The live columns of `table`, in table order.
pub async fn describe<S: Session>(session: &S, table: &str) -> Result<Vec<ColumnDescriptor>> {
    let columns = session.describe(table).await?;
    tracing::debug!(table, columns = columns.len(), "described table");
    Ok(columns)
}

/// Like [`describe`], but a table that cannot be read is `None` instead of
/// an error. Other failures still propagate.
pub(crate) async fn probe<S: Session>(
    session: &S,
    table: &str,
) -> Result<Option<Vec<ColumnDescriptor>>> {
    match describe(session, table).await {
        Ok(columns) => Ok(Some(columns)),
        Err(Error::TableUnavailable { message, .. }) => {
            tracing::debug!(table, %message, "table not available");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
