//! Error types for the conversion library.

use thiserror::Error;

/// Main error type for schema and data conversion.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// MySQL source connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// PostgreSQL source connection or query error
    #[error("Source database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Catalog introspection failed for a table
    #[error("Introspection failed for table {table}: {message}")]
    Introspection { table: String, message: String },

    /// A table could not be converted
    #[error("Conversion failed for table {table}: {message}")]
    Conversion { table: String, message: String },

    /// A schema edit was rejected; the model is unchanged for that column
    #[error("Edit rejected for {table}.{column}: {message}")]
    Edit {
        table: String,
        column: String,
        message: String,
    },

    /// Table is not part of the schema model
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Internal consistency of the schema model is broken
    #[error("Schema model invariant violated: {0}")]
    ModelInvariant(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Conversion was cancelled (SIGINT, etc.)
    #[error("Conversion cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Introspection error
    pub fn introspection(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Introspection {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Conversion error
    pub fn conversion(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Conversion {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Edit error
    pub fn edit(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::Edit {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => 1,
            MigrateError::Source(_) | MigrateError::Postgres(_) | MigrateError::Pool { .. } => 2,
            MigrateError::Introspection { .. } => 3,
            MigrateError::Conversion { .. } => 4,
            MigrateError::Edit { .. } | MigrateError::UnknownTable(_) => 5,
            MigrateError::ModelInvariant(_) => 6,
            MigrateError::Io(_) => 7,
            MigrateError::Cancelled => 130,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 1);
        assert_eq!(MigrateError::pool("refused", "connect").exit_code(), 2);
        assert_eq!(MigrateError::edit("t", "c", "missing").exit_code(), 5);
        assert_eq!(
            MigrateError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).exit_code(),
            7
        );
        assert_eq!(MigrateError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::conversion("orders", "mapping not found");
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Conversion failed for table orders"));
        assert!(detailed.contains("mapping not found"));
    }
}
