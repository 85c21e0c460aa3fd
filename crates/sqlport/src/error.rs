//! Error types for the migration library.

use thiserror::Error;

/// Main error type for script generation runs.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// MSSQL source connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// PostgreSQL source connection or query error
    #[error("Source database error: {0}")]
    SourcePg(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Catalog introspection failed
    #[error("Catalog read failed: {0}")]
    Catalog(String),

    /// Row streaming failed for a specific table
    #[error("Streaming failed for table {table}: {message}")]
    Stream { table: String, message: String },

    /// A large-object field could not be materialized
    #[error("Large object read failed for {table}.{column}: {message}")]
    LargeObject {
        table: String,
        column: String,
        message: String,
    },

    /// The operation plan violates an ordering rule
    #[error("Invalid operation order: {0}")]
    Plan(String),

    /// IO error (script sink, config file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
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

    /// Create a Stream error
    pub fn stream(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Stream {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a LargeObject error
    pub fn large_object(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::LargeObject {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::Source(_) | MigrateError::SourcePg(_) | MigrateError::Pool { .. } => 2,
            MigrateError::Catalog(_) => 3,
            MigrateError::Stream { .. } | MigrateError::LargeObject { .. } => 4,
            MigrateError::Plan(_) => 5,
            MigrateError::Io(_) | MigrateError::Json(_) => 7,
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

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
