//! DDL statements and identifier rendering.
//!
//! Build schema-altering statements as a typed [`Ddl`] value, then render
//! them to Postgres SQL via `Display`. All identifiers are double-quoted, so
//! names keep their case exactly as declared.

mod render;

mod stmt;
pub use stmt::*;

pub use tablesync_schema::PG_IDENT_MAX;

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use tablesync_sql::Ident;
/// assert_eq!(format!("{}", Ident("StringField")), "\"StringField\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Name of the "is valid JSON" CHECK constraint attached to a column.
///
/// Derived only from the table and column names, so the constraint can be
/// found and dropped later without storing anything.
///
/// # Examples
///
/// ```
/// assert_eq!(tablesync_sql::json_check_name("Doc", "Body"), "ck_Doc_Body_json");
/// ```
pub fn json_check_name(table: &str, column: &str) -> String {
    fit_identifier(format!("ck_{}_{}_json", table, column))
}

/// Temporary name a column is parked under while its type is rebuilt.
///
/// # Examples
///
/// ```
/// assert_eq!(tablesync_sql::temp_column_name("LongField"), "TEMP_LongField_TEMP");
/// ```
pub fn temp_column_name(column: &str) -> String {
    fit_identifier(format!("TEMP_{}_TEMP", column))
}

/// Keep a generated identifier within [`PG_IDENT_MAX`] bytes.
///
/// Short names pass through unchanged. Longer ones keep a prefix and get a
/// stable hash of the full name appended, so two long names that share a
/// prefix still map to different identifiers, and the server never truncates
/// them behind our back.
pub fn fit_identifier(name: String) -> String {
    if name.len() <= PG_IDENT_MAX {
        return name;
    }

    let hex = blake3::hash(name.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];

    let max_prefix_len = PG_IDENT_MAX - suffix.len() - 1;
    let mut len = max_prefix_len.min(name.len());
    while len > 0 && !name.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}", &name[..len], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ident_doubles_quotes() {
        assert_eq!(Ident("user").to_string(), "\"user\"");
        assert_eq!(Ident("Mixed Case").to_string(), "\"Mixed Case\"");
        assert_eq!(Ident("a\"b").to_string(), "\"a\"\"b\"");
    }

    #[test]
    fn test_json_check_name_long_table() {
        let table = "a_table_with_a_name_long_enough_to_push_the_constraint_over_the_limit";
        let name = json_check_name(table, "Payload");
        assert_eq!(name.len(), PG_IDENT_MAX);
        assert!(name.starts_with("ck_a_table_with"));
        assert_eq!(name, json_check_name(table, "Payload"));
        assert_ne!(name, json_check_name(table, "Payload2"));
    }

    #[test]
    fn test_fit_identifier_multibyte() {
        let name = format!("TEMP_{}_TEMP", "é".repeat(40));
        let fitted = fit_identifier(name);
        assert!(fitted.len() <= PG_IDENT_MAX);
        assert!(fitted.starts_with("TEMP_é"));
    }

    proptest! {
        #[test]
        fn prop_fit_identifier_bounded_and_stable(name in "\\PC{0,120}") {
            let fitted = fit_identifier(name.clone());
            prop_assert!(fitted.len() <= PG_IDENT_MAX);
            prop_assert_eq!(&fitted, &fit_identifier(name.clone()));
            if name.len() <= PG_IDENT_MAX {
                prop_assert_eq!(fitted, name);
            }
        }

        #[test]
        fn prop_temp_name_differs_from_column(column in "[A-Za-z_][A-Za-z0-9_]{0,80}") {
            prop_assert_ne!(temp_column_name(&column), column);
        }
    }
}
