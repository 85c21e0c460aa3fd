//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dialect::DbKind;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration.
    pub source: SourceConfig,

    /// Target dialect configuration.
    pub target: TargetConfig,

    /// Script output configuration.
    #[serde(default)]
    pub output: OutputConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type: mssql, postgres or oracle.
    pub r#type: DbKind,

    /// Database host.
    pub host: String,

    /// Database port (default depends on type).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Source schema (default: "dbo" for MSSQL, "public" for PostgreSQL).
    #[serde(default)]
    pub schema: Option<String>,

    /// Encrypt MSSQL connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// PostgreSQL SSL mode: disable, require, verify-ca, verify-full.
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl SourceConfig {
    /// Effective port, falling back to the engine's well-known port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.r#type.default_port())
    }

    /// Effective source schema.
    pub fn schema(&self) -> &str {
        self.schema
            .as_deref()
            .unwrap_or_else(|| self.r#type.default_schema())
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema())
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target dialect configuration. The script is written, not executed, so no
/// connection settings are needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target dialect: mssql or postgres.
    pub r#type: DbKind,
}

/// Script output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Script file path. Omitted means stdout.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Prepend a UTF-8 byte-order mark when writing a file (default: true).
    #[serde(default = "default_true")]
    pub bom: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            bom: true,
        }
    }
}

/// Which tables are dropped and recreated.
///
/// `true` recreates everything, `false` refreshes data in place, and a list
/// refreshes in place while recreating only the named tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreateTable {
    All(bool),
    Only(Vec<String>),
}

impl Default for CreateTable {
    fn default() -> Self {
        CreateTable::All(true)
    }
}

impl CreateTable {
    /// Parse the CLI form: `true`, `false` or a comma-separated name list.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "all" => CreateTable::All(true),
            "false" | "no" | "none" | "" => CreateTable::All(false),
            _ => CreateTable::Only(
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        }
    }
}

/// Data reload scope for in-place refresh runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadScope {
    /// Truncate and reload every table.
    #[default]
    All,
    /// Reload only the recreated tables.
    Subset,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per multi-row INSERT (default: 100).
    #[serde(default = "default_batch_size")]
    pub data_batch_size: usize,

    /// Use case-insensitive character types on the target (default: false).
    #[serde(default)]
    pub force_case_insensitive: bool,

    /// Recreate strategy (default: true).
    #[serde(default)]
    pub create_table: CreateTable,

    /// Reload scope in refresh mode (default: all).
    #[serde(default)]
    pub reload: ReloadScope,

    /// Tables to skip entirely.
    #[serde(default)]
    pub ignore_tables: Vec<String>,

    /// When non-empty, only these tables are migrated.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Rows whose fields may resolve concurrently (default: 64).
    #[serde(default = "default_max_in_flight_rows")]
    pub max_in_flight_rows: usize,

    /// Rows buffered between the cursor and the resolver (default: 1024).
    #[serde(default = "default_read_ahead_rows")]
    pub read_ahead_rows: usize,

    /// Source pool size (default: 4).
    #[serde(default = "default_max_source_connections")]
    pub max_source_connections: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            data_batch_size: default_batch_size(),
            force_case_insensitive: false,
            create_table: CreateTable::default(),
            reload: ReloadScope::default(),
            ignore_tables: Vec::new(),
            tables: Vec::new(),
            max_in_flight_rows: default_max_in_flight_rows(),
            read_ahead_rows: default_read_ahead_rows(),
            max_source_connections: default_max_source_connections(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_max_in_flight_rows() -> usize {
    64
}

fn default_read_ahead_rows() -> usize {
    1024
}

fn default_max_source_connections() -> usize {
    4
}
