//! Record shape declarations.
//!
//! A record shape is the statically declared form of a model: a name and an
//! ordered list of fields, each with a type name and optional modifiers.
//!
//! ```
//! use tablesync_schema::{RecordShape, SemanticType, ShapeField};
//!
//! let shape = RecordShape::new("Customer")
//!     .field(ShapeField::new("Email", "String").max_length(320))
//!     .field(ShapeField::new("Nickname", "Option<String>"))
//!     .field(ShapeField::new("Settings", "String").json());
//!
//! let schema = shape.resolve(None).unwrap();
//! assert_eq!(schema.table(), "Customer");
//! assert_eq!(
//!     schema.get("Email").unwrap().semantic_type(),
//!     SemanticType::BoundedText(320)
//! );
//! assert!(schema.get("Nickname").unwrap().nullable());
//! assert!(schema.get("Settings").unwrap().json_constrained());
//! ```

use crate::{DeclaredSchema, FieldDescriptor, IDENTITY_COLUMN, SemanticType, ShapeError};

/// Per-field modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Maximum length for text fields. Zero or negative means unbounded.
    MaxLength(i32),
    /// The value must be valid JSON. Overrides any length.
    Json,
}

/// One field of a [`RecordShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeField {
    pub name: String,
    /// Rust spelling of the field type, e.g. `i64` or `Option<String>`.
    pub type_name: String,
    pub modifiers: Vec<Modifier>,
}

impl ShapeField {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            modifiers: Vec::new(),
        }
    }

    pub fn max_length(mut self, length: i32) -> Self {
        self.modifiers.push(Modifier::MaxLength(length));
        self
    }

    pub fn json(mut self) -> Self {
        self.modifiers.push(Modifier::Json);
        self
    }

    /// Resolve this field into a descriptor.
    ///
    /// A JSON field is unbounded text whether it is declared with `.json()`
    /// or with a JSON type name; any length is dropped.
    pub fn resolve(&self) -> Result<FieldDescriptor, ShapeError> {
        let (inner, nullable) = split_option(&self.type_name);
        let base =
            SemanticType::from_type_name(inner).map_err(|source| ShapeError::UnmappableFieldType {
                field: self.name.clone(),
                type_name: self.type_name.clone(),
                source,
            })?;

        let json = self.modifiers.contains(&Modifier::Json);
        let length = self.modifiers.iter().rev().find_map(|m| match m {
            Modifier::MaxLength(n) => Some(*n),
            Modifier::Json => None,
        });

        if json && !base.is_textual() {
            return Err(ShapeError::JsonOnNonText {
                field: self.name.clone(),
                type_name: self.type_name.clone(),
            });
        }

        let semantic_type = if !base.is_textual() {
            base
        } else if json || base == SemanticType::JsonText {
            SemanticType::JsonText
        } else {
            match length {
                Some(n) if n > 0 => SemanticType::BoundedText(n as u32),
                _ => base,
            }
        };

        Ok(FieldDescriptor::new(&self.name, semantic_type, nullable))
    }
}

/// A named, ordered field list describing one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    pub name: String,
    pub fields: Vec<ShapeField>,
}

impl RecordShape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: ShapeField) -> Self {
        self.fields.push(field);
        self
    }

    /// Resolve the shape into the schema for `table`, or for the shape's own
    /// name when no (non-blank) table name is given.
    ///
    /// A field named `Id` of type `i32` is the identity column every table
    /// carries and is left out of the result; any other `Id` is rejected.
    pub fn resolve(&self, table: Option<&str>) -> Result<DeclaredSchema, ShapeError> {
        let table = match table {
            Some(t) if !t.trim().is_empty() => t,
            _ => self.name.as_str(),
        };

        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let descriptor = field.resolve()?;
            if descriptor.name() == IDENTITY_COLUMN {
                if descriptor.semantic_type() == SemanticType::Integer && !descriptor.nullable() {
                    continue;
                }
                return Err(ShapeError::IdentityRedeclared {
                    type_name: field.type_name.clone(),
                });
            }
            fields.push(descriptor);
        }

        DeclaredSchema::new(table, fields)
    }
}

/// Split `Option<T>` into `(T, true)`; anything else is `(name, false)`.
fn split_option(type_name: &str) -> (&str, bool) {
    let trimmed = type_name.trim();
    let leaf_start = trimmed
        .find('<')
        .map(|lt| trimmed[..lt].rfind("::").map(|i| i + 2).unwrap_or(0));

    if let Some(start) = leaf_start {
        let rest = &trimmed[start..];
        if let Some(inner) = rest
            .strip_prefix("Option")
            .map(str::trim_start)
            .and_then(|r| r.strip_prefix('<'))
            .and_then(|r| r.strip_suffix('>'))
        {
            return (inner.trim(), true);
        }
    }
    (trimmed, false)
}
