//! Core abstractions shared by the catalog reader, planner, streamer and emitter.
//!
//! - [`schema`]: table, column, key and compiled-object descriptors
//! - [`value`]: SQL values carried from the cursor to the emitter
//! - [`traits`]: source, large-object and dialect traits
//!
//! Drivers (`drivers/mssql`, `drivers/postgres`, `drivers/memory`) implement
//! these traits; everything else is written against them.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    Column, ColumnDefault, CompiledKind, CompiledObject, ForeignKey, Key, KeyKind, Table,
};
pub use traits::{
    escape_sql_string, CatalogSource, Dialect, LobReader, ReadOptions, RowSource, SourceReader,
};
pub use value::{LargeObject, LobKind, Row, SqlValue};
