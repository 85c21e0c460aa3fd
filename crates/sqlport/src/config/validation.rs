//! Configuration validation.

use super::{Config, CreateTable, ReloadScope};
use crate::dialect::DbKind;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// SQL Server rejects INSERT ... VALUES lists longer than this (Msg 10738).
const MSSQL_MAX_VALUES_ROWS: usize = 1000;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if config.source.r#type == DbKind::Oracle {
        return Err(MigrateError::Config(
            "source.type 'oracle' has no live driver; only 'mssql' and 'postgres' sources can be read"
                .into(),
        ));
    }
    if config.source.r#type == DbKind::Postgres {
        SslMode::parse(&config.source.ssl_mode)?;
    }

    // Target validation
    if config.target.r#type == DbKind::Oracle {
        return Err(MigrateError::Config(
            "target.type must be 'mssql' or 'postgres', got 'oracle'".into(),
        ));
    }

    // Migration validation
    let migration = &config.migration;
    if migration.data_batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.data_batch_size must be at least 1".into(),
        ));
    }
    if config.target.r#type == DbKind::Mssql && migration.data_batch_size > MSSQL_MAX_VALUES_ROWS {
        return Err(MigrateError::Config(format!(
            "migration.data_batch_size must be at most {} for an mssql target (rows per VALUES list)",
            MSSQL_MAX_VALUES_ROWS
        )));
    }
    if migration.max_in_flight_rows == 0 {
        return Err(MigrateError::Config(
            "migration.max_in_flight_rows must be at least 1".into(),
        ));
    }
    if migration.read_ahead_rows == 0 {
        return Err(MigrateError::Config(
            "migration.read_ahead_rows must be at least 1".into(),
        ));
    }
    if migration.max_source_connections < 2 {
        return Err(MigrateError::Config(
            "migration.max_source_connections must be at least 2 (cursor plus large-object reads)"
                .into(),
        ));
    }
    if let CreateTable::Only(names) = &migration.create_table {
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(MigrateError::Config(
                "migration.create_table entries must not be empty".into(),
            ));
        }
    }
    if migration.reload == ReloadScope::Subset
        && migration.create_table == CreateTable::All(true)
    {
        return Err(MigrateError::Config(
            "migration.reload: subset requires create_table to be false or a table list".into(),
        ));
    }
    for name in &migration.tables {
        if migration
            .ignore_tables
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(name))
        {
            return Err(MigrateError::Config(format!(
                "table '{}' is listed in both migration.tables and migration.ignore_tables",
                name
            )));
        }
    }

    Ok(())
}
