//! # sqlport
//!
//! Streaming migration script generator for MSSQL and PostgreSQL.
//!
//! The library reads the catalog of a source schema and writes one script
//! that recreates or refreshes the schema and its data on a target engine:
//!
//! - **Type mapping** between MSSQL, PostgreSQL and Oracle type systems
//! - **Dependency ordering** so foreign keys are only created after the data
//!   of both tables is loaded
//! - **Streaming rows** straight from the source cursor into INSERT batches,
//!   with large objects read concurrently on a second connection
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlport::{Config, Orchestrator, ScriptSink};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> sqlport::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let sink = ScriptSink::open(&config.output).await?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let (result, _) = orchestrator.run(sink, CancellationToken::new()).await?;
//!     println!("Wrote {} rows", result.rows_written);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod emit;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod sink;
pub mod stream;

// Re-exports for convenience
pub use catalog::{Catalog, CatalogFilter, CatalogReader};
pub use config::{Config, CreateTable, MigrationConfig, OutputConfig, ReloadScope, SourceConfig};
pub use dialect::{DbKind, TypeMapper, TypeMapping};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationResult, Orchestrator};
pub use plan::{Plan, Strategy};
pub use sink::ScriptSink;
