//! An in-memory stand-in for a Postgres server, for executor tests.
//!
//! Tables hold typed columns and text-encoded rows. Statements are checked and
//! applied the way Postgres would: `ALTER COLUMN .. TYPE` only succeeds through
//! an assignment cast, a cast failure on any row fails the whole statement, and
//! a `NOT NULL` column cannot be added to a table that already has rows.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use tablesync_schema::{ColumnDescriptor, ColumnType, NativeType};
use tablesync_sql::Ddl;

use super::{BoxFuture, Session};
use crate::{Error, Result};

type Predicate = Box<dyn Fn(&Ddl) -> bool + Send>;

#[derive(Default)]
pub(crate) struct MemorySession {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    databases: BTreeSet<String>,
    tables: BTreeMap<String, Table>,
    log: Vec<Ddl>,
    fail: Vec<Predicate>,
    swallow: Vec<Predicate>,
}

#[derive(Default)]
struct Table {
    columns: Vec<Column>,
    rows: Vec<BTreeMap<String, Option<String>>>,
    /// constraint name -> column it checks
    constraints: BTreeMap<String, String>,
}

struct Column {
    name: String,
    column_type: ColumnType,
    nullable: bool,
}

impl Table {
    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }
}

fn rejected(ddl: &Ddl, code: &str, message: impl Into<String>) -> Error {
    Error::Statement {
        sql: ddl.to_string(),
        message: message.into(),
        code: Some(code.to_string()),
    }
}

fn is_numeric(ty: &NativeType) -> bool {
    matches!(
        ty,
        NativeType::SmallInt
            | NativeType::Integer
            | NativeType::BigInt
            | NativeType::Numeric
            | NativeType::DoublePrecision
            | NativeType::Real
    )
}

/// Whether `ALTER COLUMN .. TYPE` without `USING` is accepted.
fn assignment_cast(from: &NativeType, to: &NativeType) -> bool {
    from == to || (is_numeric(from) && is_numeric(to)) || *to == NativeType::Varchar
}

/// Convert one stored value, `None` when the value does not fit.
fn cast_value(value: &str, to: &ColumnType) -> Option<String> {
    let trimmed = value.trim();
    match &to.native {
        NativeType::SmallInt => trimmed.parse::<i16>().ok().map(|v| v.to_string()),
        NativeType::Integer => trimmed.parse::<i32>().ok().map(|v| v.to_string()),
        NativeType::BigInt => trimmed.parse::<i64>().ok().map(|v| v.to_string()),
        NativeType::Numeric | NativeType::DoublePrecision | NativeType::Real => {
            trimmed.parse::<f64>().ok().map(|_| trimmed.to_string())
        }
        NativeType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Some("true".to_string()),
            "false" | "f" | "no" | "0" => Some("false".to_string()),
            _ => None,
        },
        NativeType::Varchar => match to.length {
            Some(n) if value.chars().count() > n as usize => None,
            _ => Some(value.to_string()),
        },
        _ => Some(value.to_string()),
    }
}

impl MemorySession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_database(self, name: &str) -> Self {
        self.state.lock().unwrap().databases.insert(name.to_string());
        self
    }

    /// Add a table with the given columns (the identity column is not implied).
    pub(crate) fn with_table(self, table: &str, columns: &[(&str, ColumnType, bool)]) -> Self {
        let columns = columns
            .iter()
            .map(|(name, column_type, nullable)| Column {
                name: name.to_string(),
                column_type: column_type.clone(),
                nullable: *nullable,
            })
            .collect();
        self.state.lock().unwrap().tables.insert(
            table.to_string(),
            Table {
                columns,
                ..Table::default()
            },
        );
        self
    }

    pub(crate) fn with_constraint(self, table: &str, name: &str, column: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .tables
            .get_mut(table)
            .unwrap()
            .constraints
            .insert(name.to_string(), column.to_string());
        self
    }

    /// Insert a row; columns left out are NULL.
    pub(crate) fn insert(&self, table: &str, values: &[(&str, Option<&str>)]) {
        let mut state = self.state.lock().unwrap();
        let table = state.tables.get_mut(table).unwrap();
        let mut row: BTreeMap<String, Option<String>> = table
            .columns
            .iter()
            .map(|c| (c.name.clone(), None))
            .collect();
        for (column, value) in values {
            assert!(row.contains_key(*column), "no column {column}");
            row.insert(column.to_string(), value.map(str::to_string));
        }
        table.rows.push(row);
    }

    /// Fail every statement matching `predicate` as the server would.
    pub(crate) fn fail_when(self, predicate: impl Fn(&Ddl) -> bool + Send + 'static) -> Self {
        self.state.lock().unwrap().fail.push(Box::new(predicate));
        self
    }

    /// Accept every statement matching `predicate` without applying it.
    pub(crate) fn swallow_when(self, predicate: impl Fn(&Ddl) -> bool + Send + 'static) -> Self {
        self.state.lock().unwrap().swallow.push(Box::new(predicate));
        self
    }

    pub(crate) fn has_database(&self, name: &str) -> bool {
        self.state.lock().unwrap().databases.contains(name)
    }

    /// Column names and full types, in table order.
    pub(crate) fn columns(&self, table: &str) -> Vec<(String, ColumnType, bool)> {
        let state = self.state.lock().unwrap();
        state.tables[table]
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.column_type.clone(), c.nullable))
            .collect()
    }

    pub(crate) fn values(&self, table: &str, column: &str) -> Vec<Option<String>> {
        let state = self.state.lock().unwrap();
        state.tables[table]
            .rows
            .iter()
            .map(|row| row[column].clone())
            .collect()
    }

    pub(crate) fn constraints(&self, table: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.tables[table].constraints.keys().cloned().collect()
    }

    /// Every statement accepted so far, rendered.
    pub(crate) fn statements(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.log.iter().map(|ddl| ddl.to_string()).collect()
    }

    pub(crate) fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    fn run(&self, ddl: &Ddl) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if state.fail.iter().any(|p| p(ddl)) {
            return Err(rejected(ddl, "XX000", "injected failure"));
        }
        if state.swallow.iter().any(|p| p(ddl)) {
            state.log.push(ddl.clone());
            return Ok(0);
        }

        let affected = state.apply(ddl)?;
        state.log.push(ddl.clone());
        Ok(affected)
    }
}

impl State {
    fn table_mut(&mut self, ddl: &Ddl, table: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| rejected(ddl, "42P01", format!(r#"relation "{table}" does not exist"#)))
    }

    fn apply(&mut self, ddl: &Ddl) -> Result<u64> {
        let missing_column = |table: &str, column: &str| {
            rejected(
                ddl,
                "42703",
                format!(r#"column "{column}" of relation "{table}" does not exist"#),
            )
        };

        match ddl {
            Ddl::CreateDatabase { name } => {
                if !self.databases.insert(name.clone()) {
                    return Err(rejected(
                        ddl,
                        "42P04",
                        format!(r#"database "{name}" already exists"#),
                    ));
                }
            }
            Ddl::CreateTable { table, identity } => {
                if self.tables.contains_key(table) {
                    return Err(rejected(
                        ddl,
                        "42P07",
                        format!(r#"relation "{table}" already exists"#),
                    ));
                }
                let columns = vec![Column {
                    name: identity.clone(),
                    column_type: NativeType::Integer.into(),
                    nullable: false,
                }];
                self.tables.insert(
                    table.clone(),
                    Table {
                        columns,
                        ..Table::default()
                    },
                );
            }
            Ddl::AddColumn { table, column } => {
                let t = self.table_mut(ddl, table)?;
                if t.column(&column.name).is_some() {
                    return Err(rejected(
                        ddl,
                        "42701",
                        format!(r#"column "{}" of relation "{table}" already exists"#, column.name),
                    ));
                }
                if !column.nullable && !t.rows.is_empty() {
                    return Err(rejected(
                        ddl,
                        "23502",
                        format!(r#"column "{}" of relation "{table}" contains null values"#, column.name),
                    ));
                }
                t.columns.push(Column {
                    name: column.name.clone(),
                    column_type: column.column_type.clone(),
                    nullable: column.nullable,
                });
                for row in &mut t.rows {
                    row.insert(column.name.clone(), None);
                }
                if let Some(check) = &column.json_check {
                    t.constraints.insert(check.clone(), column.name.clone());
                }
            }
            Ddl::DropConstraint { table, constraint } => {
                self.table_mut(ddl, table)?.constraints.remove(constraint);
            }
            Ddl::DropColumn { table, column } => {
                let t = self.table_mut(ddl, table)?;
                if t.column(column).is_none() {
                    return Err(missing_column(table, column));
                }
                t.columns.retain(|c| &c.name != column);
                for row in &mut t.rows {
                    row.remove(column);
                }
                t.constraints.retain(|_, checked| *checked != *column);
            }
            Ddl::AlterColumnType {
                table,
                column,
                column_type,
            } => {
                let t = self.table_mut(ddl, table)?;
                let Some(current) = t.column(column) else {
                    return Err(missing_column(table, column));
                };
                if !assignment_cast(&current.column_type.native, &column_type.native) {
                    return Err(rejected(
                        ddl,
                        "42804",
                        format!(
                            r#"column "{column}" cannot be cast automatically to type {}"#,
                            column_type.native
                        ),
                    ));
                }

                let mut converted = Vec::with_capacity(t.rows.len());
                for row in &t.rows {
                    match &row[column] {
                        None => converted.push(None),
                        Some(value) => match cast_value(value, column_type) {
                            Some(v) => converted.push(Some(v)),
                            None => {
                                return Err(rejected(
                                    ddl,
                                    "22003",
                                    format!("value {value} out of range for {column_type}"),
                                ));
                            }
                        },
                    }
                }
                for (row, value) in t.rows.iter_mut().zip(converted) {
                    row.insert(column.clone(), value);
                }
                if let Some(current) = t.column_mut(column) {
                    current.column_type = column_type.clone();
                }
            }
            Ddl::RenameColumn { table, from, to } => {
                let t = self.table_mut(ddl, table)?;
                if t.column(to).is_some() {
                    return Err(rejected(
                        ddl,
                        "42701",
                        format!(r#"column "{to}" of relation "{table}" already exists"#),
                    ));
                }
                let Some(current) = t.column_mut(from) else {
                    return Err(missing_column(table, from));
                };
                current.name = to.clone();
                for row in &mut t.rows {
                    let value = row.remove(from).flatten();
                    row.insert(to.clone(), value);
                }
                for checked in t.constraints.values_mut() {
                    if *checked == *from {
                        *checked = to.clone();
                    }
                }
            }
            Ddl::ConvertColumn {
                table,
                target,
                source,
                column_type,
            } => {
                let t = self.table_mut(ddl, table)?;
                for name in [target, source] {
                    if t.column(name).is_none() {
                        return Err(missing_column(table, name));
                    }
                }

                let mut converted = Vec::new();
                for (index, row) in t.rows.iter().enumerate() {
                    if let Some(value) = &row[source] {
                        match cast_value(value, column_type) {
                            Some(v) => converted.push((index, v)),
                            None => {
                                return Err(rejected(
                                    ddl,
                                    "22P02",
                                    format!(r#"invalid input syntax for type {column_type}: "{value}""#),
                                ));
                            }
                        }
                    }
                }
                let affected = converted.len() as u64;
                for (index, value) in converted {
                    t.rows[index].insert(target.clone(), Some(value));
                }
                return Ok(affected);
            }
        }
        Ok(0)
    }
}

impl Session for MemorySession {
    fn execute<'a>(&'a self, ddl: &'a Ddl) -> BoxFuture<'a, Result<u64>> {
        Box::pin(std::future::ready(self.run(ddl)))
    }

    fn describe<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ColumnDescriptor>>> {
        let state = self.state.lock().unwrap();
        let result = match state.tables.get(table) {
            Some(t) => Ok(t
                .columns
                .iter()
                .map(|c| ColumnDescriptor::new(&c.name, c.column_type.native.clone()))
                .collect()),
            None => Err(Error::TableUnavailable {
                table: table.to_string(),
                message: format!(r#"relation "{table}" does not exist"#),
            }),
        };
        Box::pin(std::future::ready(result))
    }

    fn database_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
        let exists = self.has_database(name);
        Box::pin(std::future::ready(Ok(exists)))
    }
}
