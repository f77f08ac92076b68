//! Identifier validation, quoting, and target name sanitisation.
//!
//! Source identifiers cannot be bound as query parameters, so row scans quote
//! them with dialect-specific quoting after validating them. Target
//! identifiers are sanitised into Spanner's `[A-Za-z_][A-Za-z0-9_]*` form and
//! de-duplicated case-insensitively, since Spanner compares names that way.

use crate::error::{MigrateError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Maximum Spanner identifier length.
pub const MAX_SPANNER_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is spliced into SQL.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding [`MAX_IDENTIFIER_LENGTH`].
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Qualify a MySQL table name with its database.
pub fn qualify_mysql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(schema)?, quote_mysql(table)?))
}

/// Rewrite a source name into a legal Spanner identifier.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, a leading digit or an empty
/// result gets a `_` prefix, and over-long names are truncated.
pub fn sanitize_spanner_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }

    out.truncate(MAX_SPANNER_IDENTIFIER_LENGTH);
    out
}

/// Pick a name not already taken, comparing case-insensitively.
///
/// Returns `candidate` when free, otherwise `candidate_N` for the smallest
/// free `N >= 1`.
pub fn unique_name<'a, I>(candidate: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: std::collections::HashSet<String> =
        taken.into_iter().map(|s| s.to_lowercase()).collect();

    if !taken.contains(&candidate.to_lowercase()) {
        return candidate.to_string();
    }

    let mut n = 1;
    loop {
        let next = format!("{}_{}", candidate, n);
        if !taken.contains(&next.to_lowercase()) {
            return next;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my table").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let err = validate_identifier("users\0; DROP TABLE x").unwrap_err();
        assert!(err.to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(&name).is_err());
    }

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_mysql_escapes_backtick() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mysql("table`name").unwrap(), "`table``name`");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify_pg("public", "users").unwrap(), "\"public\".\"users\"");
        assert_eq!(qualify_mysql("shop", "orders").unwrap(), "`shop`.`orders`");
        assert!(qualify_pg("", "users").is_err());
    }

    #[test]
    fn test_sanitize_spanner_name() {
        assert_eq!(sanitize_spanner_name("orders"), "orders");
        assert_eq!(sanitize_spanner_name("sales.orders"), "sales_orders");
        assert_eq!(sanitize_spanner_name("order date"), "order_date");
        assert_eq!(sanitize_spanner_name("1st"), "_1st");
        assert_eq!(sanitize_spanner_name(""), "_");
    }

    #[test]
    fn test_unique_name_is_case_insensitive() {
        assert_eq!(unique_name("id", ["name"]), "id");
        assert_eq!(unique_name("id", ["ID"]), "id_1");
        assert_eq!(unique_name("synth_id", ["synth_id", "synth_id_1"]), "synth_id_2");
    }
}
