//! Bring a table in line with a record shape.
//!
//! A migration runs strictly in order:
//!
//! 1. make sure the database exists (on a short-lived admin connection)
//! 2. make sure the table exists, creating it with only the identity column
//! 3. describe the live table and diff it against the declared schema
//! 4. add missing columns
//! 5. drop undeclared columns
//! 6. change column types
//!
//! A type change is first tried in place. When the server rejects that, the
//! column is rebuilt: the old column is parked under a temporary name, a fresh
//! nullable column is added, values are copied over with a cast, and the
//! parked column is dropped. A failed copy leaves the new column NULL and is
//! reported as a [`ConversionWarning`] instead of failing the migration.

use indexmap::IndexMap;
use tablesync_schema::{
    ColumnDescriptor, ColumnType, DeclaredSchema, FieldDescriptor, IDENTITY_COLUMN, NativeType,
    RecordShape,
};
use tablesync_sql::{ColumnDef, Ddl, json_check_name, temp_column_name};
use tracing::Instrument;

use crate::diff::{SchemaDiff, diff};
use crate::introspect::probe;
use crate::session::{PgSession, Session};
use crate::target::{self, ConnectionTarget};
use crate::traced::Connection;
use crate::{Error, Result};

/// Database the admin connection uses unless told otherwise.
pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";

/// Migrate the table for `shape` on the database named in `connection_string`.
///
/// The table is `table`, or the shape's name when `table` is `None` or blank.
/// The connection string and the shape are both validated before anything is
/// sent to the server.
pub async fn migrate(
    shape: &RecordShape,
    connection_string: &str,
    table: Option<&str>,
) -> Result<MigrationReport> {
    let target = ConnectionTarget::parse(connection_string)?;
    let mut migrator = Migrator::new(target);
    if let Some(table) = table {
        migrator = migrator.table_name(table);
    }
    migrator.migrate(shape).await
}

/// Runs migrations against one connection target.
///
/// # Example
///
/// ```ignore
/// use tablesync::{ConnectionTarget, Migrator, RecordShape, ShapeField};
///
/// let shape = RecordShape::new("Customer")
///     .field(ShapeField::new("Email", "String").max_length(320));
///
/// let report = Migrator::new(ConnectionTarget::from_env()?)
///     .table_name("customer_v2")
///     .migrate(&shape)
///     .await?;
/// println!("{}", report.diff);
/// ```
#[derive(Debug, Clone)]
pub struct Migrator {
    target: ConnectionTarget,
    table: Option<String>,
    admin_database: String,
    create_database: bool,
}

impl Migrator {
    pub fn new(target: ConnectionTarget) -> Self {
        Self {
            target,
            table: None,
            admin_database: DEFAULT_ADMIN_DATABASE.to_string(),
            create_database: true,
        }
    }

    /// Migrate this table instead of the one named after the shape.
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Database to connect to while checking for and creating the target
    /// database.
    pub fn admin_database(mut self, database: impl Into<String>) -> Self {
        self.admin_database = database.into();
        self
    }

    /// Whether a missing database is created (the default) or is an error.
    pub fn create_database(mut self, create: bool) -> Self {
        self.create_database = create;
        self
    }

    /// Run the full migration, connecting as needed.
    pub async fn migrate(&self, shape: &RecordShape) -> Result<MigrationReport> {
        let schema = shape.resolve(self.table.as_deref())?;
        let catalog = self.target.catalog_name();

        let span = tracing::info_span!("migrate", database = %catalog, table = %schema.table());
        async {
            let created = {
                let admin_config = self.target.with_database(&self.admin_database);
                let admin = target::connect(&admin_config).await?;
                ensure_database(&PgSession::new(&admin), catalog, self.create_database).await?
            };

            let client = self.target.connect().await?;
            let mut report = apply(&PgSession::new(&client), &schema).await?;
            if let Some(ddl) = created {
                report.database_created = true;
                report.statements.insert(0, ddl);
            }
            Ok::<_, Error>(report)
        }
        .instrument(span)
        .await
    }

    /// Migrate using a connection the caller already holds.
    ///
    /// The connection must already be on the target database; the database
    /// itself is neither checked nor created.
    pub async fn migrate_on<C: Connection>(
        &self,
        conn: &C,
        shape: &RecordShape,
    ) -> Result<MigrationReport> {
        let schema = shape.resolve(self.table.as_deref())?;
        let span = tracing::info_span!("migrate", table = %schema.table());
        apply(&PgSession::new(conn), &schema).instrument(span).await
    }
}

/// What a migration did.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub table: String,
    pub database_created: bool,
    pub table_created: bool,
    /// The diff computed right after the table was ensured.
    pub diff: SchemaDiff,
    /// How each changed column got its new type, in diff order.
    pub type_changes: Vec<TypeChange>,
    /// Columns whose values could not be carried over.
    pub warnings: Vec<ConversionWarning>,
    /// Every statement the server accepted, in order.
    pub statements: Vec<Ddl>,
}

impl MigrationReport {
    /// Whether the table already matched its declaration.
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeChange {
    pub column: String,
    pub outcome: TypeChangeOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeChangeOutcome {
    /// The server converted the column in place.
    Direct,
    /// The column was rebuilt. `converted` is the number of values copied
    /// over, `None` when the copy failed and the column was left NULL.
    Fallback { converted: Option<u64> },
}

/// Values of a rebuilt column could not be cast to the new type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionWarning {
    pub column: String,
    pub from: NativeType,
    pub to: ColumnType,
    pub message: String,
}

impl std::fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "values of {} could not be converted from {} to {}: {}",
            self.column, self.from, self.to, self.message
        )
    }
}

/// Result of trying to change a column type in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterOutcome {
    Direct,
    FallbackRequired { reason: String },
}

/// Make sure `name` exists, returning the statement that created it.
pub(crate) async fn ensure_database<S: Session>(
    admin: &S,
    name: &str,
    create: bool,
) -> Result<Option<Ddl>> {
    if admin.database_exists(name).await? {
        return Ok(None);
    }

    let missing = || Error::DatabaseCreationFailed {
        name: name.to_string(),
    };
    if !create {
        return Err(missing());
    }

    tracing::info!(database = name, "creating database");
    let ddl = Ddl::CreateDatabase {
        name: name.to_string(),
    };
    admin.execute(&ddl).await?;

    if !admin.database_exists(name).await? {
        return Err(missing());
    }
    Ok(Some(ddl))
}

/// Bring the table for `schema` in line with it, on an open session.
pub(crate) async fn apply<S: Session>(
    session: &S,
    schema: &DeclaredSchema,
) -> Result<MigrationReport> {
    let table = schema.table();
    let mut run = Run::new(session, table);

    let (live, table_created) = match probe(session, table).await? {
        Some(live) => (live, false),
        None => {
            tracing::info!(table, "creating table");
            run.exec(Ddl::CreateTable {
                table: table.to_string(),
                identity: IDENTITY_COLUMN.to_string(),
            })
            .await?;
            match probe(session, table).await? {
                Some(live) => (live, true),
                None => {
                    return Err(Error::TableCreationFailed {
                        table: table.to_string(),
                    });
                }
            }
        }
    };
    run.live.reset(&live);

    let diff = diff(schema, &live);
    if diff.is_empty() {
        tracing::debug!(table, "table is up to date");
    } else {
        tracing::info!(table, changes = diff.change_count(), "applying diff");
    }

    for field in &diff.additions {
        run.add_column(field).await?;
    }
    for column in &diff.removals {
        run.drop_column(column).await?;
    }

    let mut type_changes = Vec::with_capacity(diff.changes.len());
    for (column, change) in &diff.changes {
        let outcome = run.change_type(column, &change.from, &change.to).await?;
        type_changes.push(TypeChange {
            column: column.clone(),
            outcome,
        });
    }

    Ok(MigrationReport {
        table: table.to_string(),
        database_created: false,
        table_created,
        diff,
        type_changes,
        warnings: run.warnings,
        statements: run.statements,
    })
}

/// The live table as the statements issued so far have left it.
#[derive(Debug, Default)]
struct LiveTable {
    columns: IndexMap<String, NativeType>,
}

impl LiveTable {
    fn reset(&mut self, live: &[ColumnDescriptor]) {
        self.columns = live
            .iter()
            .map(|c| (c.name.clone(), c.native_type.clone()))
            .collect();
    }

    fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    fn apply(&mut self, ddl: &Ddl) {
        match ddl {
            Ddl::CreateTable { identity, .. } => {
                self.columns.insert(identity.clone(), NativeType::Integer);
            }
            Ddl::AddColumn { column, .. } => {
                self.columns
                    .insert(column.name.clone(), column.column_type.native.clone());
            }
            Ddl::DropColumn { column, .. } => {
                self.columns.shift_remove(column);
            }
            Ddl::AlterColumnType {
                column,
                column_type,
                ..
            } => {
                self.columns
                    .insert(column.clone(), column_type.native.clone());
            }
            Ddl::RenameColumn { from, to, .. } => {
                if let Some(ty) = self.columns.shift_remove(from) {
                    self.columns.insert(to.clone(), ty);
                }
            }
            Ddl::CreateDatabase { .. } | Ddl::DropConstraint { .. } | Ddl::ConvertColumn { .. } => {}
        }
    }
}

/// Steps of a column rebuild. Each step names what has been done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebuild {
    RenamePending,
    Renamed,
    Added,
    ConversionAttempted { converted: Option<u64> },
    TempDropped { converted: Option<u64> },
}

/// One migration in progress.
struct Run<'s, S: Session> {
    session: &'s S,
    table: String,
    live: LiveTable,
    statements: Vec<Ddl>,
    warnings: Vec<ConversionWarning>,
}

impl<'s, S: Session> Run<'s, S> {
    fn new(session: &'s S, table: &str) -> Self {
        Self {
            session,
            table: table.to_string(),
            live: LiveTable::default(),
            statements: Vec::new(),
            warnings: Vec::new(),
        }
    }

    async fn exec(&mut self, ddl: Ddl) -> Result<u64> {
        let affected = self.session.execute(&ddl).await?;
        tracing::debug!(kind = ddl.kind(), table = ddl.table(), affected, "statement applied");
        self.live.apply(&ddl);
        self.statements.push(ddl);
        Ok(affected)
    }

    async fn add_column(&mut self, field: &FieldDescriptor) -> Result<()> {
        let mut column = ColumnDef::new(field.name(), field.column_type(), field.nullable());
        if field.json_constrained() {
            column = column.json_check(json_check_name(&self.table, field.name()));
        }
        tracing::info!(column = field.name(), column_type = %field.column_type(), "adding column");
        self.exec(Ddl::AddColumn {
            table: self.table.clone(),
            column,
        })
        .await?;
        Ok(())
    }

    async fn drop_column(&mut self, column: &str) -> Result<()> {
        tracing::info!(column, "dropping column");
        // The JSON check may or may not be there; drop it before the column.
        self.exec(Ddl::DropConstraint {
            table: self.table.clone(),
            constraint: json_check_name(&self.table, column),
        })
        .await?;
        self.exec(Ddl::DropColumn {
            table: self.table.clone(),
            column: column.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn change_type(
        &mut self,
        column: &str,
        from: &NativeType,
        to: &FieldDescriptor,
    ) -> Result<TypeChangeOutcome> {
        let temp = temp_column_name(column);
        if self.live.contains(&temp) {
            return Err(Error::TempColumnConflict {
                table: self.table.clone(),
                column: column.to_string(),
                temp,
            });
        }

        match self.alter_in_place(column, to).await? {
            AlterOutcome::Direct => {
                tracing::info!(column, %from, to = %to.column_type(), "changed column type");
                Ok(TypeChangeOutcome::Direct)
            }
            AlterOutcome::FallbackRequired { reason } => {
                tracing::warn!(column, %from, to = %to.column_type(), %reason, "rebuilding column");
                self.rebuild(column, &temp, from, to).await
            }
        }
    }

    async fn alter_in_place(&mut self, column: &str, to: &FieldDescriptor) -> Result<AlterOutcome> {
        let ddl = Ddl::AlterColumnType {
            table: self.table.clone(),
            column: column.to_string(),
            column_type: to.column_type(),
        };
        match self.exec(ddl).await {
            Ok(_) => Ok(AlterOutcome::Direct),
            Err(Error::Statement { message, .. }) => {
                Ok(AlterOutcome::FallbackRequired { reason: message })
            }
            Err(e) => Err(e),
        }
    }

    /// Park the column under `temp`, add it back with the new type, copy the
    /// values over, and drop the parked column.
    async fn rebuild(
        &mut self,
        column: &str,
        temp: &str,
        from: &NativeType,
        to: &FieldDescriptor,
    ) -> Result<TypeChangeOutcome> {
        let column_type = to.column_type();
        let mut step = Rebuild::RenamePending;

        loop {
            tracing::trace!(column, ?step, "rebuild step");
            step = match step {
                Rebuild::RenamePending => {
                    self.exec(Ddl::RenameColumn {
                        table: self.table.clone(),
                        from: column.to_string(),
                        to: temp.to_string(),
                    })
                    .await?;
                    Rebuild::Renamed
                }
                Rebuild::Renamed => {
                    // Nullable, so rows the copy cannot fill stay valid.
                    self.exec(Ddl::AddColumn {
                        table: self.table.clone(),
                        column: ColumnDef::new(column, column_type.clone(), true),
                    })
                    .await?;
                    Rebuild::Added
                }
                Rebuild::Added => {
                    let convert = Ddl::ConvertColumn {
                        table: self.table.clone(),
                        target: column.to_string(),
                        source: temp.to_string(),
                        column_type: column_type.clone(),
                    };
                    let converted = match self.exec(convert).await {
                        Ok(n) => Some(n),
                        Err(Error::Statement { message, .. }) => {
                            tracing::warn!(
                                column,
                                %from,
                                to = %column_type,
                                %message,
                                "values could not be converted, column left NULL"
                            );
                            self.warnings.push(ConversionWarning {
                                column: column.to_string(),
                                from: from.clone(),
                                to: column_type.clone(),
                                message,
                            });
                            None
                        }
                        Err(e) => return Err(e),
                    };
                    Rebuild::ConversionAttempted { converted }
                }
                Rebuild::ConversionAttempted { converted } => {
                    self.exec(Ddl::DropColumn {
                        table: self.table.clone(),
                        column: temp.to_string(),
                    })
                    .await?;
                    Rebuild::TempDropped { converted }
                }
                Rebuild::TempDropped { converted } => {
                    return Ok(TypeChangeOutcome::Fallback { converted });
                }
            };
        }
    }
}
