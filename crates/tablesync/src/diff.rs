//! Compare a declared schema against a live table.

use indexmap::IndexMap;
use tablesync_schema::{
    ColumnDescriptor, DeclaredSchema, FieldDescriptor, IDENTITY_COLUMN, NativeType,
};

/// A column whose live type differs from its declared one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChange {
    /// Type the column has now.
    pub from: NativeType,
    /// What it is declared as.
    pub to: FieldDescriptor,
}

/// What it takes to bring a live table in line with its declaration.
///
/// The three parts never share a column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Declared fields missing from the table, in declaration order.
    pub additions: Vec<FieldDescriptor>,
    /// Live columns no longer declared, in table order.
    pub removals: Vec<String>,
    /// Columns present on both sides whose native type differs.
    pub changes: IndexMap<String, ColumnChange>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty() && self.changes.is_empty()
    }

    /// Total number of column operations.
    pub fn change_count(&self) -> usize {
        self.additions.len() + self.removals.len() + self.changes.len()
    }
}

/// Compute the diff between a declared schema and the live columns.
///
/// Names compare exactly. Only the native type is compared for columns on
/// both sides: a column whose nullability, length or JSON check differs but
/// whose native type matches is not a change. The identity column is never
/// part of the diff.
pub fn diff(declared: &DeclaredSchema, live: &[ColumnDescriptor]) -> SchemaDiff {
    let live_types: IndexMap<&str, &NativeType> = live
        .iter()
        .map(|c| (c.name.as_str(), &c.native_type))
        .collect();

    let mut result = SchemaDiff::default();

    for field in declared.fields() {
        match live_types.get(field.name()) {
            None => result.additions.push(field.clone()),
            Some(&from) if *from != field.native_type() => {
                result.changes.insert(
                    field.name().to_string(),
                    ColumnChange {
                        from: from.clone(),
                        to: field.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for column in live {
        if column.name != IDENTITY_COLUMN && !declared.contains(&column.name) {
            result.removals.push(column.name.clone());
        }
    }

    result
}

impl std::fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }
        for field in &self.additions {
            let nullable = if field.nullable() { " (nullable)" } else { "" };
            let json = if field.json_constrained() { " (json)" } else { "" };
            writeln!(f, "+ {}: {}{}{}", field.name(), field.column_type(), nullable, json)?;
        }
        for name in &self.removals {
            writeln!(f, "- {}", name)?;
        }
        for (name, change) in &self.changes {
            writeln!(f, "~ {}: {} -> {}", name, change.from, change.to.column_type())?;
        }
        Ok(())
    }
}
