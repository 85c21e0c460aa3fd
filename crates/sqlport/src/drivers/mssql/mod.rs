//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: script syntax for MSSQL targets
//! - [`MssqlSource`]: catalog and row source over tiberius

mod dialect;
mod reader;

pub use dialect::MssqlDialect;
pub use reader::{MssqlSource, TiberiusConnectionManager};
