use thiserror::Error;

/// A field type name with no native mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no native column type for `{0}`")]
pub struct UnknownType(pub String);

/// Errors resolving a record shape into a declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("field `{field}` has unmappable type `{type_name}`")]
    UnmappableFieldType {
        field: String,
        type_name: String,
        #[source]
        source: UnknownType,
    },

    #[error("field `{0}` is declared more than once")]
    DuplicateField(String),

    #[error("field `{field}` is marked JSON but `{type_name}` is not a text type")]
    JsonOnNonText { field: String, type_name: String },

    #[error("`{name}` is {len} bytes; identifiers are limited to {max} bytes", max = crate::PG_IDENT_MAX)]
    IdentifierTooLong { name: String, len: usize },

    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("record shape has no name and no table name was given")]
    EmptyShapeName,

    #[error("`Id` is the identity column and must be a non-null i32, got `{type_name}`")]
    IdentityRedeclared { type_name: String },
}
