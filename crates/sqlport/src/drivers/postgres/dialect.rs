//! PostgreSQL script dialect (Strategy pattern).
//!
//! Statements end with a semicolon. Identity columns are declared as serial
//! types, so explicit inserts need no toggle but the sequence must be moved
//! past the loaded values afterwards.

use crate::core::schema::{Column, ForeignKey};
use crate::core::traits::{escape_sql_string, Dialect};
use crate::dialect::DbKind;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn terminator(&self) -> &'static str {
        ";\n\n"
    }

    fn drop_table_if_exists(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", self.quote_ident(table))
    }

    fn drop_foreign_key_if_exists(&self, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE IF EXISTS {} DROP CONSTRAINT IF EXISTS {}",
            self.quote_ident(&fk.parent_table),
            self.quote_ident(&fk.name)
        )
    }

    fn column_definition(&self, column: &Column, target_type: &str) -> String {
        let mut def = format!("{} {}", self.quote_ident(&column.name), target_type);
        if !column.is_nullable {
            def.push_str(" NOT NULL");
        }
        def
    }

    fn disable_constraints(&self, table: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE IF EXISTS {} DISABLE TRIGGER ALL",
            self.quote_ident(table)
        )]
    }

    fn enable_constraints(&self, table: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ENABLE TRIGGER ALL",
            self.quote_ident(table)
        )]
    }

    fn add_default(&self, table: &str, _name: &str, column: &str, expr: &str) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
            self.quote_ident(table),
            self.quote_ident(column),
            expr
        )
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "true" } else { "false" }.to_string()
    }

    fn bytes_literal(&self, value: &[u8]) -> String {
        format!("'\\x{}'::bytea", hex::encode(value))
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn new_uuid(&self) -> &'static str {
        "gen_random_uuid()"
    }

    fn reset_identity(&self, table: &str, column: &str) -> Option<String> {
        let quoted_table = self.quote_ident(table);
        let quoted_column = self.quote_ident(column);
        Some(format!(
            "SELECT setval(pg_get_serial_sequence('{}', '{}'), COALESCE(MAX({}), 1)) FROM {}",
            escape_sql_string(&quoted_table),
            escape_sql_string(column),
            quoted_column,
            quoted_table
        ))
    }

    fn prelude(&self, force_case_insensitive: bool) -> Vec<String> {
        if force_case_insensitive {
            vec!["CREATE EXTENSION IF NOT EXISTS citext".to_string()]
        } else {
            Vec::new()
        }
    }
}
