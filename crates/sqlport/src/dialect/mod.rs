//! Dialect identifiers and cross-dialect type mapping.
//!
//! Type rules live in a lookup table keyed by `(source, target)` dialect pair
//! and source type name; each entry is a small [`typemap::Rule`] value that
//! knows how to build the target declaration.
//!
//! ```rust,ignore
//! let mapper = TypeMapper::new(MapOptions::default());
//! let mapping = mapper.map_column(&column, DbKind::Mssql, DbKind::Postgres);
//! ```

mod typemap;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use typemap::{MapOptions, Rule, TypeMapper, TypeMapping};

/// Database engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    Mssql,
    Postgres,
    Oracle,
}

impl DbKind {
    /// Well-known listener port.
    pub fn default_port(&self) -> u16 {
        match self {
            DbKind::Mssql => 1433,
            DbKind::Postgres => 5432,
            DbKind::Oracle => 1521,
        }
    }

    /// Schema used when the configuration names none.
    pub fn default_schema(&self) -> &'static str {
        match self {
            DbKind::Mssql => "dbo",
            DbKind::Postgres => "public",
            DbKind::Oracle => "",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DbKind::Mssql => "mssql",
            DbKind::Postgres => "postgres",
            DbKind::Oracle => "oracle",
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
