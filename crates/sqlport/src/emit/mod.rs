//! Statement emitter.
//!
//! [`ScriptEmitter`] renders plan operations as DDL text for the target
//! dialect. Row data goes through a per-table [`TableEmitter`], which owns the
//! batch boundaries and the identity toggles around the table's INSERTs.

mod defaults;
mod literal;

pub use defaults::rewrite as rewrite_default;
pub use literal::render as render_literal;

use chrono::NaiveDateTime;

use crate::catalog::Catalog;
use crate::core::schema::{CompiledObject, Table};
use crate::core::traits::Dialect;
use crate::core::value::SqlValue;
use crate::dialect::{DbKind, TypeMapper, TypeMapping};
use crate::error::{MigrateError, Result};
use crate::plan::Operation;

/// A source column resolved against the target dialect.
#[derive(Debug, Clone)]
pub struct TargetColumn {
    pub name: String,
    pub is_identity: bool,
    pub mapping: TypeMapping,
    /// String literals need a national prefix.
    pub wide: bool,
    /// Target stores booleans; integer values are rendered as boolean literals.
    pub boolean: bool,
    /// Earliest storable date/time, for clamping.
    pub min_datetime: Option<NaiveDateTime>,
}

impl TargetColumn {
    pub fn new(
        name: impl Into<String>,
        is_identity: bool,
        mapping: TypeMapping,
        dialect: &dyn Dialect,
    ) -> Self {
        let base = mapping.base_type();
        Self {
            name: name.into(),
            is_identity,
            wide: dialect.is_wide_type(&base),
            boolean: matches!(base.as_str(), "bit" | "boolean" | "bool"),
            min_datetime: dialect.min_datetime(&base),
            mapping,
        }
    }
}

/// Renders plan operations for one target dialect.
pub struct ScriptEmitter<'a> {
    dialect: &'a dyn Dialect,
    mapper: &'a TypeMapper,
    source: DbKind,
    batch_size: usize,
    force_case_insensitive: bool,
}

impl<'a> ScriptEmitter<'a> {
    pub fn new(
        dialect: &'a dyn Dialect,
        mapper: &'a TypeMapper,
        source: DbKind,
        batch_size: usize,
        force_case_insensitive: bool,
    ) -> Self {
        Self {
            dialect,
            mapper,
            source,
            batch_size: batch_size.max(1),
            force_case_insensitive,
        }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Resolve every column of a table against the target.
    pub fn layout(&self, table: &Table) -> Vec<TargetColumn> {
        table
            .columns
            .iter()
            .map(|c| {
                let mapping = self.mapper.map_column(c, self.source, self.dialect.kind());
                TargetColumn::new(&c.name, c.is_identity, mapping, self.dialect)
            })
            .collect()
    }

    /// Render a non-data operation. Data loads go through [`TableEmitter`].
    pub fn render(&self, op: &Operation, catalog: &Catalog) -> Result<String> {
        let d = self.dialect;
        let table = |i: &usize| {
            catalog
                .tables
                .get(*i)
                .ok_or_else(|| MigrateError::Plan(format!("unknown table index {}", i)))
        };

        let out = match op {
            Operation::Section(section) => d.section(section.title()),
            Operation::Prelude => self.statements(d.prelude(self.force_case_insensitive)),
            Operation::DropForeignKey(fk) => d.statement(&d.drop_foreign_key_if_exists(fk)),
            Operation::DisableConstraints(i) => self.statements(d.disable_constraints(&table(i)?.name)),
            Operation::DropTable(i) => d.statement(&d.drop_table_if_exists(&table(i)?.name)),
            Operation::CreateTable(i) => self.create_table(table(i)?),
            Operation::Truncate(i) => d.statement(&d.truncate(&table(i)?.name)),
            Operation::LoadData(i) => {
                return Err(MigrateError::Plan(format!(
                    "data of {} must be streamed, not rendered",
                    table(i)?.name
                )))
            }
            Operation::CreateKeys(i) => {
                let t = table(i)?;
                self.statements(t.all_keys().map(|k| d.create_key(&t.name, k)).collect())
            }
            Operation::CreateForeignKey(fk) => d.statement(&d.add_foreign_key(fk)),
            Operation::CreateDefaults(i) => self.create_defaults(table(i)?),
            Operation::EnableConstraints(i) => self.statements(d.enable_constraints(&table(i)?.name)),
            Operation::Compiled(i) => {
                let object = catalog
                    .compiled
                    .get(*i)
                    .ok_or_else(|| MigrateError::Plan(format!("unknown compiled object {}", i)))?;
                self.compiled(object)
            }
        };
        Ok(out)
    }

    /// Start emitting the rows of one table.
    pub fn table_emitter(&self, table: &'a Table, columns: Vec<TargetColumn>) -> TableEmitter<'a> {
        TableEmitter::new(self.dialect, table, columns, self.batch_size)
    }

    fn statements(&self, sql: Vec<String>) -> String {
        sql.iter().map(|s| self.dialect.statement(s)).collect()
    }

    fn create_table(&self, table: &Table) -> String {
        let defs: Vec<String> = self
            .layout(table)
            .iter()
            .zip(&table.columns)
            .map(|(target, column)| {
                self.dialect
                    .column_definition(column, &target.mapping.target_type)
            })
            .collect();
        format!(
            "{}{}",
            self.dialect.banner(&table.name),
            self.dialect
                .statement(&self.dialect.create_table(&table.name, &defs))
        )
    }

    fn create_defaults(&self, table: &Table) -> String {
        let layout = self.layout(table);
        table
            .defaults
            .iter()
            .filter_map(|default| {
                let column = layout
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&default.column))?;
                // Identity columns get their values from the generator
                if column.is_identity {
                    return None;
                }
                let expr = rewrite_default(&default.definition, self.source, self.dialect, column);
                Some(self.dialect.statement(&self.dialect.add_default(
                    &table.name,
                    &default.name,
                    &column.name,
                    &expr,
                )))
            })
            .collect()
    }

    fn compiled(&self, object: &CompiledObject) -> String {
        if self.source == self.dialect.kind() {
            self.dialect.statement(object.text.trim())
        } else {
            self.dialect.review_block(
                &format!(
                    "{} {} was written for {} and must be rewritten by hand",
                    object.kind.label().trim_end_matches('s'),
                    object.name,
                    self.source
                ),
                &object.text,
            )
        }
    }
}

/// Emits the INSERT batches of one table.
///
/// With a batch size of 1 every row is a standalone statement. Otherwise a
/// new INSERT header opens at every multiple of the batch size and the
/// previous batch is closed with the terminator.
pub struct TableEmitter<'a> {
    dialect: &'a dyn Dialect,
    table: &'a Table,
    columns: Vec<TargetColumn>,
    batch_size: usize,
    header: String,
    rows: u64,
}

impl<'a> TableEmitter<'a> {
    fn new(dialect: &'a dyn Dialect, table: &'a Table, columns: Vec<TargetColumn>, batch_size: usize) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let header = dialect.insert_header(&table.name, &names);
        Self {
            dialect,
            table,
            columns,
            batch_size: batch_size.max(1),
            header,
            rows: 0,
        }
    }

    /// Banner written when the cursor opens.
    pub fn begin(&self) -> String {
        self.dialect.banner(&format!("{} data", self.table.name))
    }

    /// Render one fully materialized row.
    pub fn emit_row(&mut self, values: &[SqlValue]) -> Result<String> {
        if values.len() != self.columns.len() {
            return Err(MigrateError::stream(
                &self.table.name,
                format!(
                    "row has {} values for {} columns",
                    values.len(),
                    self.columns.len()
                ),
            ));
        }
        let literals = self
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| render_literal(self.dialect, column, value))
            .collect::<Result<Vec<_>>>()?;
        let tuple = format!("({})", literals.join(", "));

        let mut out = String::new();
        if self.rows == 0 && self.has_identity() {
            if let Some(on) = self.dialect.identity_insert(&self.table.name, true) {
                out.push_str(&self.dialect.statement(&on));
            }
        }

        if self.batch_size == 1 {
            out.push_str(&self.dialect.statement(&format!("{}{}", self.header, tuple)));
        } else if self.rows % self.batch_size as u64 == 0 {
            if self.rows > 0 {
                out.push_str(self.dialect.terminator());
            }
            out.push_str(&self.header);
            out.push_str(&tuple);
        } else {
            out.push_str("\n,");
            out.push_str(&tuple);
        }

        self.rows += 1;
        Ok(out)
    }

    /// Close the last batch and restore identity handling. Empty when no row
    /// was written.
    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        if self.rows == 0 {
            return out;
        }
        if self.batch_size > 1 {
            out.push_str(self.dialect.terminator());
        }
        if self.has_identity() {
            if let Some(off) = self.dialect.identity_insert(&self.table.name, false) {
                out.push_str(&self.dialect.statement(&off));
            }
            for column in self.columns.iter().filter(|c| c.is_identity) {
                if let Some(reset) = self.dialect.reset_identity(&self.table.name, &column.name) {
                    out.push_str(&self.dialect.statement(&reset));
                }
            }
        }
        out
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn table(&self) -> &'a Table {
        self.table
    }

    fn has_identity(&self) -> bool {
        self.columns.iter().any(|c| c.is_identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, ColumnDefault, CompiledKind, Key, KeyKind};
    use crate::dialect::MapOptions;
    use crate::drivers::mssql::MssqlDialect;
    use crate::drivers::postgres::PostgresDialect;
    use crate::plan::Section;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn col(name: &str, data_type: &str, precision: i32, scale: i32, nullable: bool, identity: bool) -> Column {
        Column {
            name: name.into(),
            data_type: data_type.into(),
            max_length: 0,
            precision,
            scale,
            is_nullable: nullable,
            is_identity: identity,
            ordinal_pos: 0,
        }
    }

    fn orders() -> Table {
        let mut t = Table::new("dbo", "orders");
        t.columns = vec![
            col("id", "int", 10, 0, false, true),
            col("customer_id", "int", 10, 0, false, false),
            col("total", "decimal", 10, 2, true, false),
        ];
        t
    }

    fn rows() -> Vec<Vec<SqlValue>> {
        vec![
            vec![
                SqlValue::I32(1),
                SqlValue::I32(7),
                SqlValue::Decimal(Decimal::from_str("19.99").unwrap()),
            ],
            vec![SqlValue::I32(2), SqlValue::I32(8), SqlValue::Null],
        ]
    }

    fn emit_all(emitter: &mut TableEmitter<'_>, rows: &[Vec<SqlValue>]) -> String {
        let mut out = String::new();
        for row in rows {
            out.push_str(&emitter.emit_row(row).unwrap());
        }
        out.push_str(&emitter.finish());
        out
    }

    #[test]
    fn test_orders_batch_of_one() {
        let dialect = MssqlDialect::new();
        let mapper = TypeMapper::default();
        let emitter = ScriptEmitter::new(&dialect, &mapper, DbKind::Mssql, 1, false);
        let table = orders();
        let mut rows_out = emitter.table_emitter(&table, emitter.layout(&table));

        let script = emit_all(&mut rows_out, &rows());
        assert_eq!(
            script,
            "SET IDENTITY_INSERT [orders] ON\nGO\n\n\
             INSERT INTO [orders] ([id], [customer_id], [total]) VALUES (1, 7, 19.99)\nGO\n\n\
             INSERT INTO [orders] ([id], [customer_id], [total]) VALUES (2, 8, NULL)\nGO\n\n\
             SET IDENTITY_INSERT [orders] OFF\nGO\n\n"
        );
        assert_eq!(rows_out.rows_written(), 2);
    }

    #[test]
    fn test_batch_law() {
        let dialect = PostgresDialect::new();
        let mapper = TypeMapper::default();
        let emitter = ScriptEmitter::new(&dialect, &mapper, DbKind::Postgres, 3, false);
        let mut table = Table::new("public", "t");
        table.columns = vec![col("n", "integer", 32, 0, false, false)];

        for total in [1usize, 3, 4, 7, 9] {
            let mut rows_out = emitter.table_emitter(&table, emitter.layout(&table));
            let rows: Vec<Vec<SqlValue>> = (0..total).map(|n| vec![SqlValue::I32(n as i32)]).collect();
            let script = emit_all(&mut rows_out, &rows);

            let headers = script.matches("INSERT INTO").count();
            assert_eq!(headers, total.div_ceil(3), "headers for {} rows", total);

            let last = script.rsplit("INSERT INTO").next().unwrap();
            let expected_last = if total % 3 == 0 { 3 } else { total % 3 };
            assert_eq!(last.matches('(').count() - 1, expected_last, "last batch for {} rows", total);
            assert!(script.ends_with(";\n\n"));
        }
    }

    #[test]
    fn test_multi_row_layout() {
        let dialect = PostgresDialect::new();
        let mapper = TypeMapper::default();
        let emitter = ScriptEmitter::new(&dialect, &mapper, DbKind::Postgres, 2, false);
        let mut table = Table::new("public", "t");
        table.columns = vec![col("n", "integer", 32, 0, false, false)];
        let mut rows_out = emitter.table_emitter(&table, emitter.layout(&table));
        let rows: Vec<Vec<SqlValue>> = (1..=3).map(|n| vec![SqlValue::I32(n)]).collect();
        assert_eq!(
            emit_all(&mut rows_out, &rows),
            "INSERT INTO \"t\" (\"n\") VALUES (1)\n,(2);\n\nINSERT INTO \"t\" (\"n\") VALUES (3);\n\n"
        );
    }

    #[test]
    fn test_identity_law() {
        let dialect = MssqlDialect::new();
        let mapper = TypeMapper::default();
        let emitter = ScriptEmitter::new(&dialect, &mapper, DbKind::Mssql, 100, false);
        let table = orders();

        let mut empty = emitter.table_emitter(&table, emitter.layout(&table));
        assert_eq!(empty.finish(), "");

        let mut full = emitter.table_emitter(&table, emitter.layout(&table));
        let script = emit_all(&mut full, &rows());
        assert_eq!(script.matches("IDENTITY_INSERT [orders] ON").count(), 1);
        assert_eq!(script.matches("IDENTITY_INSERT [orders] OFF").count(), 1);
        assert!(script.starts_with("SET IDENTITY_INSERT [orders] ON"));
        assert!(script.ends_with("SET IDENTITY_INSERT [orders] OFF\nGO\n\n"));
    }

    #[test]
    fn test_postgres_target_resets_serial() {
        let dialect = PostgresDialect::new();
        let mapper = TypeMapper::default();
        let emitter = ScriptEmitter::new(&dialect, &mapper, DbKind::Mssql, 10, false);
        let table = orders();
        let mut rows_out = emitter.table_emitter(&table, emitter.layout(&table));
        let script = emit_all(&mut rows_out, &rows());
        assert!(!script.contains("IDENTITY_INSERT"));
        assert!(script.ends_with(
            "SELECT setval(pg_get_serial_sequence('\"orders\"', 'id'), COALESCE(MAX(\"id\"), 1)) FROM \"orders\";\n\n"
        ));
    }

    #[test]
    fn test_row_width_mismatch_is_an_error() {
        let dialect = MssqlDialect::new();
        let mapper = TypeMapper::default();
        let emitter = ScriptEmitter::new(&dialect, &mapper, DbKind::Mssql, 1, false);
        let table = orders();
        let mut rows_out = emitter.table_emitter(&table, emitter.layout(&table));
        assert!(rows_out.emit_row(&[SqlValue::I32(1)]).is_err());
    }

    #[test]
    fn test_create_table_maps_types() {
        let dialect = PostgresDialect::new();
        let mapper = TypeMapper::default();
        let emitter = ScriptEmitter::new(&dialect, &mapper, DbKind::Mssql, 1, false);
        let catalog = Catalog {
            tables: vec![orders()],
            compiled: Vec::new(),
        };
        let sql = emitter.render(&Operation::CreateTable(0), &catalog).unwrap();
        assert!(sql.contains("CREATE TABLE \"orders\" (\n    \"id\" serial NOT NULL,\n    \"customer_id\" integer NOT NULL,\n    \"total\" numeric(10,2)\n);"));
    }

    #[test]
    fn test_keys_and_defaults() {
        let dialect = MssqlDialect::new();
        let mapper = TypeMapper::new(MapOptions::default());
        let emitter = ScriptEmitter::new(&dialect, &mapper, DbKind::Postgres, 1, false);
        let mut table = Table::new("public", "orders");
        table.columns = vec![
            col("id", "integer", 32, 0, false, true),
            col("placed_at", "timestamp", 0, 0, false, false),
        ];
        table.primary_key = Some(Key {
            name: "orders_pkey".into(),
            columns: vec!["id".into()],
            kind: KeyKind::Primary,
        });
        table.defaults = vec![
            ColumnDefault {
                table: "orders".into(),
                column: "id".into(),
                name: "df_id".into(),
                definition: "nextval('orders_id_seq'::regclass)".into(),
            },
            ColumnDefault {
                table: "orders".into(),
                column: "placed_at".into(),
                name: "df_orders_placed_at".into(),
                definition: "now()".into(),
            },
        ];
        let catalog = Catalog {
            tables: vec![table],
            compiled: Vec::new(),
        };

        assert_eq!(
            emitter.render(&Operation::CreateKeys(0), &catalog).unwrap(),
            "ALTER TABLE [orders] ADD CONSTRAINT [orders_pkey] PRIMARY KEY ([id])\nGO\n\n"
        );
        assert_eq!(
            emitter.render(&Operation::CreateDefaults(0), &catalog).unwrap(),
            "ALTER TABLE [orders] ADD CONSTRAINT [df_orders_placed_at] DEFAULT GETDATE() FOR [placed_at]\nGO\n\n"
        );
    }

    #[test]
    fn test_compiled_objects() {
        let mssql = MssqlDialect::new();
        let mapper = TypeMapper::default();
        let catalog = Catalog {
            tables: Vec::new(),
            compiled: vec![CompiledObject {
                kind: CompiledKind::View,
                name: "v_totals".into(),
                text: "CREATE VIEW v_totals AS SELECT 1 AS n /* x */\n".into(),
            }],
        };

        let same = ScriptEmitter::new(&mssql, &mapper, DbKind::Mssql, 1, false);
        assert_eq!(
            same.render(&Operation::Compiled(0), &catalog).unwrap(),
            "CREATE VIEW v_totals AS SELECT 1 AS n /* x */\nGO\n\n"
        );

        let pg = PostgresDialect::new();
        let cross = ScriptEmitter::new(&pg, &mapper, DbKind::Mssql, 1, false);
        let sql = cross.render(&Operation::Compiled(0), &catalog).unwrap();
        assert!(sql.starts_with("/* REVIEW: view v_totals was written for mssql"));
        assert!(sql.contains("SELECT 1 AS n /* x * /"));
        assert!(sql.ends_with("*/\n\n"));
    }

    #[test]
    fn test_sections_and_prelude() {
        let pg = PostgresDialect::new();
        let mapper = TypeMapper::new(MapOptions {
            force_case_insensitive: true,
        });
        let emitter = ScriptEmitter::new(&pg, &mapper, DbKind::Mssql, 1, true);
        let catalog = Catalog::default();
        assert_eq!(
            emitter.render(&Operation::Prelude, &catalog).unwrap(),
            "CREATE EXTENSION IF NOT EXISTS citext;\n\n"
        );
        assert!(emitter
            .render(&Operation::Section(Section::ForeignKeys), &catalog)
            .unwrap()
            .contains("FOREIGN KEYS"));
        assert!(emitter.render(&Operation::LoadData(0), &catalog).is_err());
    }
}
