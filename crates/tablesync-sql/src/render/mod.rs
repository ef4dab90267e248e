//! Render DDL statements to Postgres SQL.

use std::fmt;

use crate::{ColumnDef, Ddl, Ident};

impl fmt::Display for Ddl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ddl::CreateDatabase { name } => write!(f, "CREATE DATABASE {}", Ident(name)),
            Ddl::CreateTable { table, identity } => write!(
                f,
                "CREATE TABLE {} ({} INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY)",
                Ident(table),
                Ident(identity)
            ),
            Ddl::AddColumn { table, column } => {
                write!(f, "ALTER TABLE {} ADD COLUMN {}", Ident(table), column)
            }
            Ddl::DropConstraint { table, constraint } => write!(
                f,
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
                Ident(table),
                Ident(constraint)
            ),
            Ddl::DropColumn { table, column } => write!(
                f,
                "ALTER TABLE {} DROP COLUMN {}",
                Ident(table),
                Ident(column)
            ),
            Ddl::AlterColumnType {
                table,
                column,
                column_type,
            } => write!(
                f,
                "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                Ident(table),
                Ident(column),
                column_type
            ),
            Ddl::RenameColumn { table, from, to } => write!(
                f,
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                Ident(table),
                Ident(from),
                Ident(to)
            ),
            Ddl::ConvertColumn {
                table,
                target,
                source,
                column_type,
            } => write!(
                f,
                "UPDATE {} SET {} = CAST({} AS {}) WHERE {} IS NOT NULL",
                Ident(table),
                Ident(target),
                Ident(source),
                column_type,
                Ident(source)
            ),
        }
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let null = if self.nullable { "NULL" } else { "NOT NULL" };
        write!(f, "{} {} {}", Ident(&self.name), self.column_type, null)?;
        if let Some(constraint) = &self.json_check {
            write!(
                f,
                " CONSTRAINT {} CHECK ({} IS JSON)",
                Ident(constraint),
                Ident(&self.name)
            )?;
        }
        Ok(())
    }
}
