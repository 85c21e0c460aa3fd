//! Core traits for dialect-agnostic script generation.
//!
//! - [`CatalogSource`]: flat, ordinal-tagged catalog records from a source database
//! - [`RowSource`]: streaming table rows through a bounded channel
//! - [`LobReader`]: secondary reads of large-object fields
//! - [`Dialect`]: SQL syntax strategy for the target engine
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` implementations provide interchangeable syntax
//! - **Template Method**: default methods on `Dialect` build statements from
//!   the few primitives each engine overrides

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::mpsc;

use crate::catalog::records::{
    ColumnRecord, CompiledRecord, DefaultRecord, ForeignKeyRecord, KeyRecord,
};
use crate::dialect::DbKind;
use crate::error::Result;

use super::schema::{Column, CompiledKind, ForeignKey, Key, KeyKind};
use super::value::Row;

/// Options for streaming rows from a table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Columns to select, in output order.
    pub columns: Vec<Column>,
    /// Bounded channel capacity between cursor and consumer.
    pub channel_capacity: usize,
}

/// Source of catalog records.
///
/// Every record sequence is ordered so that rows of one parent entity are
/// contiguous and carry an ordinal starting at 1.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Dialect of the source engine.
    fn db_kind(&self) -> DbKind;

    /// Columns of every base table in the schema.
    async fn column_records(&self, schema: &str) -> Result<Vec<ColumnRecord>>;

    /// Key and index columns.
    async fn key_records(&self, schema: &str) -> Result<Vec<KeyRecord>>;

    /// Foreign key column pairs.
    async fn foreign_key_records(&self, schema: &str) -> Result<Vec<ForeignKeyRecord>>;

    /// Column default constraints.
    async fn default_records(&self, schema: &str) -> Result<Vec<DefaultRecord>>;

    /// Definition text fragments of compiled objects of one kind.
    async fn compiled_records(&self, schema: &str, kind: CompiledKind)
        -> Result<Vec<CompiledRecord>>;

    /// Round-trip a trivial query.
    async fn test_connection(&self) -> Result<()>;
}

/// Source of table rows.
pub trait RowSource: Send + Sync {
    /// Start a cursor over the table. Rows arrive in cursor order; the
    /// channel closes when the cursor ends. A cursor error is delivered as
    /// the last item.
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Row>>;

    /// Whether the driver can deliver values of this column.
    fn can_stream(&self, _column: &Column) -> bool {
        true
    }
}

/// A complete source driver.
pub trait SourceReader: CatalogSource + RowSource {
    fn as_catalog(&self) -> &dyn CatalogSource;

    fn as_rows(&self) -> &dyn RowSource;
}

impl<T: CatalogSource + RowSource> SourceReader for T {
    fn as_catalog(&self) -> &dyn CatalogSource {
        self
    }

    fn as_rows(&self) -> &dyn RowSource {
        self
    }
}

/// Reads large objects by locator on a connection separate from the cursor.
#[async_trait]
pub trait LobReader: Send + Sync {
    async fn read_lob(&self, locator: i64) -> Result<Vec<u8>>;
}

/// SQL syntax strategy for the target engine.
pub trait Dialect: Send + Sync {
    /// Engine this dialect writes for.
    fn kind(&self) -> DbKind;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// Text appended after every statement or batch.
    fn terminator(&self) -> &'static str;

    /// Drop a table when it exists.
    fn drop_table_if_exists(&self, table: &str) -> String;

    /// Drop a foreign key constraint when it exists.
    fn drop_foreign_key_if_exists(&self, fk: &ForeignKey) -> String;

    /// Column declaration inside CREATE TABLE.
    fn column_definition(&self, column: &Column, target_type: &str) -> String;

    /// Statements suspending constraint and trigger checks on a table.
    fn disable_constraints(&self, table: &str) -> Vec<String>;

    /// Statements restoring constraint and trigger checks on a table.
    fn enable_constraints(&self, table: &str) -> Vec<String>;

    /// Attach a default expression to a column.
    fn add_default(&self, table: &str, name: &str, column: &str, expr: &str) -> String;

    /// Boolean literal.
    fn bool_literal(&self, value: bool) -> String;

    /// Binary literal.
    fn bytes_literal(&self, value: &[u8]) -> String;

    /// Current-timestamp expression.
    fn current_timestamp(&self) -> &'static str;

    /// New-uuid expression.
    fn new_uuid(&self) -> &'static str;

    /// Toggle explicit inserts into identity columns.
    fn identity_insert(&self, _table: &str, _on: bool) -> Option<String> {
        None
    }

    /// Realign an identity generator with the loaded data.
    fn reset_identity(&self, _table: &str, _column: &str) -> Option<String> {
        None
    }

    /// Statements emitted once at the top of the script.
    fn prelude(&self, _force_case_insensitive: bool) -> Vec<String> {
        Vec::new()
    }

    /// Earliest value a date/time column of this type can store.
    fn min_datetime(&self, _target_type: &str) -> Option<NaiveDateTime> {
        None
    }

    /// Whether string literals for this column type need a national prefix.
    fn is_wide_type(&self, _target_type: &str) -> bool {
        false
    }

    /// Append the terminator to a statement.
    fn statement(&self, sql: &str) -> String {
        format!("{}{}", sql, self.terminator())
    }

    /// Quoted, escaped string literal.
    fn string_literal(&self, value: &str, wide: bool) -> String {
        let quoted = format!("'{}'", escape_sql_string(value));
        if wide {
            format!("N{}", quoted)
        } else {
            quoted
        }
    }

    /// Create a table.
    fn create_table(&self, table: &str, column_defs: &[String]) -> String {
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(table),
            column_defs.join(",\n    ")
        )
    }

    /// Remove every row from a table, keeping its definition.
    fn truncate(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.quote_ident(table))
    }

    /// Comma-separated quoted identifiers.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Create a primary key, unique constraint or index.
    fn create_key(&self, table: &str, key: &Key) -> String {
        let cols = self.column_list(&key.columns);
        let table = self.quote_ident(table);
        let name = self.quote_ident(&key.name);
        match key.kind {
            KeyKind::Primary => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
                table, name, cols
            ),
            KeyKind::UniqueConstraint => {
                format!("ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})", table, name, cols)
            }
            KeyKind::UniqueIndex => {
                format!("CREATE UNIQUE INDEX {} ON {} ({})", name, table, cols)
            }
            KeyKind::Index => format!("CREATE INDEX {} ON {} ({})", name, table, cols),
        }
    }

    /// Add a foreign key constraint.
    fn add_foreign_key(&self, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_ident(&fk.parent_table),
            self.quote_ident(&fk.name),
            self.column_list(&fk.columns),
            self.quote_ident(&fk.ref_table),
            self.column_list(&fk.ref_columns)
        )
    }

    /// Header of a multi-row INSERT, up to and including VALUES.
    fn insert_header(&self, table: &str, columns: &[String]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ",
            self.quote_ident(table),
            self.column_list(columns)
        )
    }

    /// Section banner comment.
    fn section(&self, title: &str) -> String {
        format!(
            "/* ------------------------------ {} ------------------------------ */\n\n",
            title.to_uppercase()
        )
    }

    /// Per-table banner comment.
    fn banner(&self, name: &str) -> String {
        format!("/* -- {} -- */\n", name)
    }

    /// Body wrapped in a comment block flagged for manual review.
    fn review_block(&self, reason: &str, body: &str) -> String {
        format!(
            "/* REVIEW: {}\n{}\n*/\n\n",
            reason,
            body.trim_end().replace("*/", "* /")
        )
    }
}

/// Escape a string for use inside a single-quoted SQL literal.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_doubles_quotes() {
        assert_eq!(escape_sql_string("O'Brien"), "O''Brien");
        assert_eq!(escape_sql_string("''"), "''''");
        assert_eq!(escape_sql_string("plain"), "plain");
    }
}
