//! Database driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server dialect and source
//! - [`postgres`]: PostgreSQL dialect and source
//! - `memory`: in-process source backing the unit tests (test builds only)
//! - [`common`]: shared TLS helpers
//!
//! Oracle has type-mapping rules only; there is neither a dialect nor a
//! source for it.

pub mod common;
#[cfg(test)]
pub mod memory;
pub mod mssql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use mssql::{MssqlDialect, MssqlSource};
pub use postgres::{PostgresDialect, PostgresSource};

use std::sync::Arc;

use crate::config::SourceConfig;
use crate::core::traits::{Dialect, SourceReader};
use crate::dialect::DbKind;
use crate::error::{MigrateError, Result};

/// Target dialects, selected by [`DbKind`].
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mssql(MssqlDialect),
    Postgres(PostgresDialect),
}

impl DialectImpl {
    /// Create the dialect for a target engine.
    ///
    /// # Errors
    ///
    /// Returns a config error for engines that can only be mapped to, not
    /// written for.
    pub fn for_kind(kind: DbKind) -> Result<Self> {
        match kind {
            DbKind::Mssql => Ok(DialectImpl::Mssql(MssqlDialect::new())),
            DbKind::Postgres => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            DbKind::Oracle => Err(MigrateError::Config(
                "no script dialect for 'oracle'. Supported targets: mssql, postgres".into(),
            )),
        }
    }

    pub fn as_dialect(&self) -> &dyn Dialect {
        match self {
            DialectImpl::Mssql(d) => d,
            DialectImpl::Postgres(d) => d,
        }
    }
}

/// Open a pooled source driver for the configured engine.
pub async fn connect_source(config: &SourceConfig, max_connections: usize) -> Result<Arc<dyn SourceReader>> {
    match config.r#type {
        DbKind::Mssql => {
            let size = u32::try_from(max_connections).unwrap_or(u32::MAX);
            Ok(Arc::new(MssqlSource::connect(config, size).await?))
        }
        DbKind::Postgres => Ok(Arc::new(PostgresSource::connect(config, max_connections).await?)),
        DbKind::Oracle => Err(MigrateError::Config(
            "no source driver for 'oracle'. Supported sources: mssql, postgres".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_kind() {
        let mssql = DialectImpl::for_kind(DbKind::Mssql).unwrap();
        assert_eq!(mssql.as_dialect().kind(), DbKind::Mssql);
        assert_eq!(mssql.as_dialect().quote_ident("table"), "[table]");

        let postgres = DialectImpl::for_kind(DbKind::Postgres).unwrap();
        assert_eq!(postgres.as_dialect().kind(), DbKind::Postgres);
        assert_eq!(postgres.as_dialect().quote_ident("table"), "\"table\"");

        assert!(DialectImpl::for_kind(DbKind::Oracle).is_err());
    }
}
