//! Keep a Postgres table in line with a declared record shape.
//!
//! Given a [`RecordShape`] (a name plus typed fields) and a connection
//! target, tablesync makes sure the database and table exist, then adds,
//! drops and retypes columns until the table matches the shape:
//!
//! ```ignore
//! use tablesync::{RecordShape, ShapeField};
//!
//! let shape = RecordShape::new("TestClass")
//!     .field(ShapeField::new("StringField", "String").max_length(6))
//!     .field(ShapeField::new("When", "Option<chrono::NaiveDateTime>"));
//!
//! let report = tablesync::migrate(&shape, "host=localhost user=postgres dbname=app", None).await?;
//! for warning in &report.warnings {
//!     eprintln!("{warning}");
//! }
//! ```
//!
//! Every table carries an integer identity column named `Id`, created with
//! the table and never touched afterwards. Columns are matched by exact name;
//! a declared field missing from the table is added, a column no longer
//! declared is dropped, and a column whose type changed is converted in place
//! or, when the server refuses, rebuilt with its values cast over.
//!
//! Running the same migration twice issues no statements the second time.
//!
//! Migrations of one table must not run concurrently; nothing here takes a
//! lock.

mod diff;
mod error;
mod introspect;
mod migrate;
mod session;
mod target;
mod traced;

pub use diff::{ColumnChange, SchemaDiff, diff};
pub use error::{Error, ErrorKind, Result};
pub use introspect::describe;
pub use migrate::{
    AlterOutcome, ConversionWarning, DEFAULT_ADMIN_DATABASE, MigrationReport, Migrator,
    TypeChange, TypeChangeOutcome, migrate,
};
pub use session::{BoxFuture, PgSession, Session};
pub use target::{ConnectionTarget, DATABASE_URL};
pub use traced::{Connection, ConnectionExt, TracedConn};

pub use tablesync_schema::{
    ColumnDescriptor, ColumnType, DeclaredSchema, FieldDescriptor, IDENTITY_COLUMN, Modifier,
    NativeType, RecordShape, SemanticType, ShapeError, ShapeField, UnknownType,
};
pub use tablesync_sql::{ColumnDef, Ddl};
