//! Column types for tablesync.
//!
//! This crate holds the types shared between the declared side of a
//! migration (what a record shape says a table should look like) and the live
//! side (what Postgres reports):
//!
//! - [`SemanticType`]: the closed set of logical field kinds a shape may use
//! - [`NativeType`]: the Postgres column type a semantic type is stored as
//! - [`FieldDescriptor`] / [`DeclaredSchema`]: a resolved record shape
//! - [`ColumnDescriptor`]: one live column
//!
//! Record shapes are declared with [`RecordShape`] and resolved into a
//! [`DeclaredSchema`] with [`RecordShape::resolve`].

use indexmap::IndexMap;
use std::fmt;

mod error;
mod shape;

pub use error::{ShapeError, UnknownType};
pub use shape::{Modifier, RecordShape, ShapeField};

/// Name of the implicit identity column every managed table carries.
///
/// It is created together with the table and never takes part in diffing.
pub const IDENTITY_COLUMN: &str = "Id";

/// Longest identifier Postgres keeps (`NAMEDATALEN - 1`); longer ones are
/// silently truncated by the server.
pub const PG_IDENT_MAX: usize = 63;

/// Logical field kinds, independent of any engine's type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    /// `bool`
    Boolean,
    /// `u8`
    TinyInt,
    /// `i16`
    SmallInt,
    /// `i32`
    Integer,
    /// `i64`
    BigInt,
    /// Arbitrary precision decimal
    Decimal,
    /// `f64`
    Double,
    /// `f32`
    Float,
    /// Time of day / fixed duration
    Time,
    /// Date and time without zone
    DateTime,
    /// 128-bit unique identifier
    Uuid,
    /// Unbounded text
    Text,
    /// Text limited to the given number of characters
    BoundedText(u32),
    /// Raw bytes
    Bytes,
    /// Unbounded text that must hold valid JSON
    JsonText,
}

impl SemanticType {
    /// All kinds, with a representative bound for [`SemanticType::BoundedText`].
    pub const ALL: [SemanticType; 15] = [
        SemanticType::Boolean,
        SemanticType::TinyInt,
        SemanticType::SmallInt,
        SemanticType::Integer,
        SemanticType::BigInt,
        SemanticType::Decimal,
        SemanticType::Double,
        SemanticType::Float,
        SemanticType::Time,
        SemanticType::DateTime,
        SemanticType::Uuid,
        SemanticType::Text,
        SemanticType::BoundedText(255),
        SemanticType::Bytes,
        SemanticType::JsonText,
    ];

    /// The Postgres column type this kind is stored as.
    ///
    /// Several kinds share a native type: Postgres has no one-byte integer so
    /// `TinyInt` widens to `SMALLINT`, and all text kinds are `VARCHAR`
    /// (differing only in declared length and the JSON check).
    pub fn native_type(&self) -> NativeType {
        match self {
            SemanticType::Boolean => NativeType::Boolean,
            SemanticType::TinyInt | SemanticType::SmallInt => NativeType::SmallInt,
            SemanticType::Integer => NativeType::Integer,
            SemanticType::BigInt => NativeType::BigInt,
            SemanticType::Decimal => NativeType::Numeric,
            SemanticType::Double => NativeType::DoublePrecision,
            SemanticType::Float => NativeType::Real,
            SemanticType::Time => NativeType::Time,
            SemanticType::DateTime => NativeType::Timestamp,
            SemanticType::Uuid => NativeType::Uuid,
            SemanticType::Text | SemanticType::BoundedText(_) | SemanticType::JsonText => {
                NativeType::Varchar
            }
            SemanticType::Bytes => NativeType::Bytea,
        }
    }

    /// Whether this kind is stored as text (and so may carry a length).
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            SemanticType::Text | SemanticType::BoundedText(_) | SemanticType::JsonText
        )
    }

    /// Parse a field type name into a semantic type.
    ///
    /// Accepts the Rust spelling of each kind, with or without a crate path
    /// (`i64`, `Decimal`, `rust_decimal::Decimal`, `chrono::NaiveDateTime`,
    /// `Vec<u8>`, ...). Nullability (`Option<..>`) is handled by the shape
    /// resolver, not here. Anything outside the enumeration is rejected.
    pub fn from_type_name(name: &str) -> Result<SemanticType, UnknownType> {
        let name = name.trim();
        let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();

        if compact == "Vec<u8>" || compact == "[u8]" {
            return Ok(SemanticType::Bytes);
        }
        if compact == "serde_json::Value" {
            return Ok(SemanticType::JsonText);
        }

        let base = compact.split('<').next().unwrap_or_default();
        let leaf = base.rsplit("::").next().unwrap_or_default();

        // Generic arguments are only meaningful on `DateTime<Tz>`.
        if base.len() != compact.len() && leaf != "DateTime" {
            return Err(UnknownType(name.to_string()));
        }

        let ty = match leaf {
            "bool" => SemanticType::Boolean,
            "u8" => SemanticType::TinyInt,
            "i16" => SemanticType::SmallInt,
            "i32" => SemanticType::Integer,
            "i64" => SemanticType::BigInt,
            "Decimal" => SemanticType::Decimal,
            "f64" => SemanticType::Double,
            "f32" => SemanticType::Float,
            "Duration" | "NaiveTime" | "Time" => SemanticType::Time,
            "DateTime" | "NaiveDateTime" => SemanticType::DateTime,
            "Uuid" => SemanticType::Uuid,
            "String" => SemanticType::Text,
            "Json" => SemanticType::JsonText,
            _ => return Err(UnknownType(name.to_string())),
        };
        Ok(ty)
    }

    /// The canonical type name accepted by [`SemanticType::from_type_name`].
    pub fn type_name(&self) -> &'static str {
        match self {
            SemanticType::Boolean => "bool",
            SemanticType::TinyInt => "u8",
            SemanticType::SmallInt => "i16",
            SemanticType::Integer => "i32",
            SemanticType::BigInt => "i64",
            SemanticType::Decimal => "Decimal",
            SemanticType::Double => "f64",
            SemanticType::Float => "f32",
            SemanticType::Time => "NaiveTime",
            SemanticType::DateTime => "NaiveDateTime",
            SemanticType::Uuid => "Uuid",
            SemanticType::Text | SemanticType::BoundedText(_) => "String",
            SemanticType::Bytes => "Vec<u8>",
            SemanticType::JsonText => "Json",
        }
    }
}

/// Postgres column types.
///
/// The named variants are the types [`SemanticType::native_type`] produces.
/// Live columns of any other type are reported as [`NativeType::Other`] with
/// their catalog name; such a column never equals a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// BOOLEAN
    Boolean,
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// NUMERIC (arbitrary precision)
    Numeric,
    /// DOUBLE PRECISION (8 bytes floating point)
    DoublePrecision,
    /// REAL (4 bytes floating point)
    Real,
    /// TIME
    Time,
    /// TIMESTAMP
    Timestamp,
    /// UUID
    Uuid,
    /// VARCHAR, with or without a length
    Varchar,
    /// BYTEA (binary)
    Bytea,
    /// Any other type, by catalog name.
    Other(String),
}

impl NativeType {
    /// Map a Postgres catalog type name (`pg_type.typname`) to a native type.
    pub fn from_pg_name(name: &str) -> NativeType {
        match name {
            "bool" => NativeType::Boolean,
            "int2" => NativeType::SmallInt,
            "int4" => NativeType::Integer,
            "int8" => NativeType::BigInt,
            "numeric" => NativeType::Numeric,
            "float8" => NativeType::DoublePrecision,
            "float4" => NativeType::Real,
            "time" => NativeType::Time,
            "timestamp" => NativeType::Timestamp,
            "uuid" => NativeType::Uuid,
            "varchar" => NativeType::Varchar,
            "bytea" => NativeType::Bytea,
            other => NativeType::Other(other.to_string()),
        }
    }

    /// The catalog name of this type, the inverse of [`NativeType::from_pg_name`].
    pub fn pg_name(&self) -> &str {
        match self {
            NativeType::Boolean => "bool",
            NativeType::SmallInt => "int2",
            NativeType::Integer => "int4",
            NativeType::BigInt => "int8",
            NativeType::Numeric => "numeric",
            NativeType::DoublePrecision => "float8",
            NativeType::Real => "float4",
            NativeType::Time => "time",
            NativeType::Timestamp => "timestamp",
            NativeType::Uuid => "uuid",
            NativeType::Varchar => "varchar",
            NativeType::Bytea => "bytea",
            NativeType::Other(name) => name,
        }
    }

    /// Whether a `(n)` length clause applies to this type.
    pub fn accepts_length(&self) -> bool {
        matches!(self, NativeType::Varchar)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Boolean => write!(f, "BOOLEAN"),
            NativeType::SmallInt => write!(f, "SMALLINT"),
            NativeType::Integer => write!(f, "INTEGER"),
            NativeType::BigInt => write!(f, "BIGINT"),
            NativeType::Numeric => write!(f, "NUMERIC"),
            NativeType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            NativeType::Real => write!(f, "REAL"),
            NativeType::Time => write!(f, "TIME"),
            NativeType::Timestamp => write!(f, "TIMESTAMP"),
            NativeType::Uuid => write!(f, "UUID"),
            NativeType::Varchar => write!(f, "VARCHAR"),
            NativeType::Bytea => write!(f, "BYTEA"),
            NativeType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A native type plus its optional length clause, as written in DDL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnType {
    pub native: NativeType,
    /// `None` renders without a length (unbounded for `VARCHAR`).
    pub length: Option<u32>,
}

impl ColumnType {
    /// Create a column type; the length is dropped for types that take none.
    pub fn new(native: NativeType, length: Option<u32>) -> Self {
        let length = if native.accepts_length() { length } else { None };
        Self { native, length }
    }
}

impl From<NativeType> for ColumnType {
    fn from(native: NativeType) -> Self {
        Self::new(native, None)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.length {
            Some(n) => write!(f, "{}({})", self.native, n),
            None => write!(f, "{}", self.native),
        }
    }
}

/// One declared field of a record shape, after resolution.
///
/// Length bound and JSON constraint are carried by the semantic type
/// ([`SemanticType::BoundedText`], [`SemanticType::JsonText`]), so a
/// JSON-constrained field can never also be length-bounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    semantic_type: SemanticType,
    nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.semantic_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Declared maximum length, `None` meaning unbounded.
    pub fn length_bound(&self) -> Option<u32> {
        match self.semantic_type {
            SemanticType::BoundedText(n) => Some(n),
            _ => None,
        }
    }

    /// Whether the column must carry an "is valid JSON" check.
    pub fn json_constrained(&self) -> bool {
        self.semantic_type == SemanticType::JsonText
    }

    pub fn native_type(&self) -> NativeType {
        self.semantic_type.native_type()
    }

    /// The type as written in `ADD COLUMN` / `ALTER COLUMN ... TYPE`.
    pub fn column_type(&self) -> ColumnType {
        ColumnType::new(self.native_type(), self.length_bound())
    }
}

/// A live column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDescriptor {
    pub name: String,
    pub native_type: NativeType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            native_type,
        }
    }
}

/// The field list a table must be brought in line with.
///
/// Field names are unique and kept in declaration order. The identity column
/// ([`IDENTITY_COLUMN`]) is implied and not part of [`DeclaredSchema::fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSchema {
    table: String,
    fields: IndexMap<String, FieldDescriptor>,
}

impl DeclaredSchema {
    /// Build a declared schema, rejecting duplicate, reserved or over-long
    /// names.
    ///
    /// Names longer than [`PG_IDENT_MAX`] bytes are refused: the server would
    /// store them truncated and the next diff would no longer match them.
    pub fn new(
        table: impl Into<String>,
        fields: impl IntoIterator<Item = FieldDescriptor>,
    ) -> Result<Self, ShapeError> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(ShapeError::EmptyShapeName);
        }
        check_identifier(&table)?;

        let mut map = IndexMap::new();
        for field in fields {
            if field.name().trim().is_empty() {
                return Err(ShapeError::EmptyFieldName);
            }
            check_identifier(field.name())?;
            if field.name() == IDENTITY_COLUMN {
                return Err(ShapeError::IdentityRedeclared {
                    type_name: field.semantic_type().type_name().to_string(),
                });
            }
            if map.contains_key(field.name()) {
                return Err(ShapeError::DuplicateField(field.name().to_string()));
            }
            map.insert(field.name().to_string(), field);
        }

        Ok(Self { table, fields: map })
    }

    /// Table the schema applies to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared fields in declaration order (identity column excluded).
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The columns a fully migrated table has: identity first, then every
    /// declared field with its native type.
    pub fn projection(&self) -> Vec<ColumnDescriptor> {
        std::iter::once(ColumnDescriptor::new(IDENTITY_COLUMN, NativeType::Integer))
            .chain(
                self.fields()
                    .map(|f| ColumnDescriptor::new(f.name(), f.native_type())),
            )
            .collect()
    }
}

fn check_identifier(name: &str) -> Result<(), ShapeError> {
    if name.len() > PG_IDENT_MAX {
        return Err(ShapeError::IdentifierTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    Ok(())
}
