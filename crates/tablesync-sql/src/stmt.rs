//! Schema-altering statements.

use tablesync_schema::ColumnType;

/// A schema-altering statement against one database or table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ddl {
    /// `CREATE DATABASE`
    CreateDatabase { name: String },

    /// `CREATE TABLE` with a single identity primary-key column.
    CreateTable { table: String, identity: String },

    /// `ALTER TABLE .. ADD COLUMN`
    AddColumn { table: String, column: ColumnDef },

    /// `ALTER TABLE .. DROP CONSTRAINT IF EXISTS`
    DropConstraint { table: String, constraint: String },

    /// `ALTER TABLE .. DROP COLUMN`
    DropColumn { table: String, column: String },

    /// `ALTER TABLE .. ALTER COLUMN .. TYPE`, without a `USING` clause: the
    /// engine either converts implicitly or rejects the change.
    AlterColumnType {
        table: String,
        column: String,
        column_type: ColumnType,
    },

    /// `ALTER TABLE .. RENAME COLUMN`
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },

    /// `UPDATE .. SET target = CAST(source AS type) WHERE source IS NOT NULL`
    ConvertColumn {
        table: String,
        target: String,
        source: String,
        column_type: ColumnType,
    },
}

impl Ddl {
    /// The table this statement alters, `None` for database-level statements.
    pub fn table(&self) -> Option<&str> {
        match self {
            Ddl::CreateDatabase { .. } => None,
            Ddl::CreateTable { table, .. }
            | Ddl::AddColumn { table, .. }
            | Ddl::DropConstraint { table, .. }
            | Ddl::DropColumn { table, .. }
            | Ddl::AlterColumnType { table, .. }
            | Ddl::RenameColumn { table, .. }
            | Ddl::ConvertColumn { table, .. } => Some(table),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Ddl::CreateDatabase { .. } => "create database",
            Ddl::CreateTable { .. } => "create table",
            Ddl::AddColumn { .. } => "add column",
            Ddl::DropConstraint { .. } => "drop constraint",
            Ddl::DropColumn { .. } => "drop column",
            Ddl::AlterColumnType { .. } => "alter column type",
            Ddl::RenameColumn { .. } => "rename column",
            Ddl::ConvertColumn { .. } => "convert column",
        }
    }
}

/// A column definition inside `ADD COLUMN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Name of an attached `CHECK (col IS JSON)` constraint.
    pub json_check: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
            json_check: None,
        }
    }

    /// Attach a named "is valid JSON" check.
    pub fn json_check(mut self, constraint: impl Into<String>) -> Self {
        self.json_check = Some(constraint.into());
        self
    }
}
