//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: script syntax for PostgreSQL targets
//! - [`PostgresSource`]: catalog and row source over tokio-postgres

mod dialect;
mod reader;

pub use dialect::PostgresDialect;
pub use reader::{PgLobReader, PostgresSource};
