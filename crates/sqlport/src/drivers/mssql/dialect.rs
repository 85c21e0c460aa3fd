//! MSSQL script dialect (Strategy pattern).
//!
//! Scripts are split into batches with `GO`, so every statement is followed by
//! a `GO` line. Identity columns need `SET IDENTITY_INSERT` around explicit
//! inserts.

use chrono::{NaiveDate, NaiveDateTime};

use crate::core::schema::{Column, ForeignKey};
use crate::core::traits::{escape_sql_string, Dialect};
use crate::dialect::DbKind;

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn object_literal(&self, name: &str) -> String {
        format!("'{}'", escape_sql_string(&self.quote_ident(name)))
    }
}

fn earliest(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl Dialect for MssqlDialect {
    fn kind(&self) -> DbKind {
        DbKind::Mssql
    }

    fn quote_ident(&self, name: &str) -> String {
        // Closing brackets inside a name are doubled
        format!("[{}]", name.replace(']', "]]"))
    }

    fn terminator(&self) -> &'static str {
        "\nGO\n\n"
    }

    fn drop_table_if_exists(&self, table: &str) -> String {
        format!(
            "IF OBJECT_ID({}, 'U') IS NOT NULL\n    DROP TABLE {}",
            self.object_literal(table),
            self.quote_ident(table)
        )
    }

    fn drop_foreign_key_if_exists(&self, fk: &ForeignKey) -> String {
        format!(
            "IF OBJECT_ID({}, 'F') IS NOT NULL\n    ALTER TABLE {} DROP CONSTRAINT {}",
            self.object_literal(&fk.name),
            self.quote_ident(&fk.parent_table),
            self.quote_ident(&fk.name)
        )
    }

    fn column_definition(&self, column: &Column, target_type: &str) -> String {
        let mut def = format!("{} {}", self.quote_ident(&column.name), target_type);
        if column.is_identity {
            def.push_str(" IDENTITY");
        }
        def.push_str(if column.is_nullable { " NULL" } else { " NOT NULL" });
        def
    }

    fn disable_constraints(&self, table: &str) -> Vec<String> {
        let quoted = self.quote_ident(table);
        vec![format!(
            "IF OBJECT_ID({}, 'U') IS NOT NULL\nBEGIN\n    ALTER TABLE {} NOCHECK CONSTRAINT ALL\n    ALTER TABLE {} DISABLE TRIGGER ALL\nEND",
            self.object_literal(table),
            quoted,
            quoted
        )]
    }

    fn enable_constraints(&self, table: &str) -> Vec<String> {
        let quoted = self.quote_ident(table);
        vec![
            format!("ALTER TABLE {} WITH CHECK CHECK CONSTRAINT ALL", quoted),
            format!("ALTER TABLE {} ENABLE TRIGGER ALL", quoted),
        ]
    }

    fn add_default(&self, table: &str, name: &str, column: &str, expr: &str) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
            self.quote_ident(table),
            self.quote_ident(name),
            expr,
            self.quote_ident(column)
        )
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "1" } else { "0" }.to_string()
    }

    fn bytes_literal(&self, value: &[u8]) -> String {
        format!("0x{}", hex::encode_upper(value))
    }

    fn current_timestamp(&self) -> &'static str {
        "GETDATE()"
    }

    fn new_uuid(&self) -> &'static str {
        "NEWID()"
    }

    fn identity_insert(&self, table: &str, on: bool) -> Option<String> {
        Some(format!(
            "SET IDENTITY_INSERT {} {}",
            self.quote_ident(table),
            if on { "ON" } else { "OFF" }
        ))
    }

    fn min_datetime(&self, target_type: &str) -> Option<NaiveDateTime> {
        match target_type {
            "datetime" => earliest(1753),
            "smalldatetime" => earliest(1900),
            _ => None,
        }
    }

    fn is_wide_type(&self, target_type: &str) -> bool {
        matches!(target_type, "nchar" | "nvarchar" | "ntext")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Key, KeyKind};

    fn column(name: &str, nullable: bool, identity: bool) -> Column {
        Column {
            name: name.into(),
            data_type: "int".into(),
            max_length: 4,
            precision: 10,
            scale: 0,
            is_nullable: nullable,
            is_identity: identity,
            ordinal_pos: 1,
        }
    }

    #[test]
    fn test_quote_ident() {
        let d = MssqlDialect::new();
        assert_eq!(d.quote_ident("users"), "[users]");
        assert_eq!(d.quote_ident("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_statement_ends_with_go() {
        let d = MssqlDialect::new();
        assert_eq!(d.statement("SELECT 1"), "SELECT 1\nGO\n\n");
    }

    #[test]
    fn test_string_literal_national_prefix() {
        let d = MssqlDialect::new();
        assert_eq!(d.string_literal("O'Brien", false), "'O''Brien'");
        assert_eq!(d.string_literal("O'Brien", true), "N'O''Brien'");
    }

    #[test]
    fn test_column_definition() {
        let d = MssqlDialect::new();
        assert_eq!(
            d.column_definition(&column("id", false, true), "int"),
            "[id] int IDENTITY NOT NULL"
        );
        assert_eq!(
            d.column_definition(&column("total", true, false), "decimal(10,2)"),
            "[total] decimal(10,2) NULL"
        );
    }

    #[test]
    fn test_drop_table_guarded() {
        let d = MssqlDialect::new();
        assert_eq!(
            d.drop_table_if_exists("orders"),
            "IF OBJECT_ID('[orders]', 'U') IS NOT NULL\n    DROP TABLE [orders]"
        );
    }

    #[test]
    fn test_keys_and_foreign_keys() {
        let d = MssqlDialect::new();
        let pk = Key {
            name: "pk_orders".into(),
            columns: vec!["id".into()],
            kind: KeyKind::Primary,
        };
        assert_eq!(
            d.create_key("orders", &pk),
            "ALTER TABLE [orders] ADD CONSTRAINT [pk_orders] PRIMARY KEY ([id])"
        );
        let fk = ForeignKey {
            name: "fk_lines_orders".into(),
            parent_table: "order_lines".into(),
            columns: vec!["order_id".into()],
            ref_table: "orders".into(),
            ref_columns: vec!["id".into()],
        };
        assert_eq!(
            d.add_foreign_key(&fk),
            "ALTER TABLE [order_lines] ADD CONSTRAINT [fk_lines_orders] FOREIGN KEY ([order_id]) REFERENCES [orders] ([id])"
        );
        assert!(d
            .drop_foreign_key_if_exists(&fk)
            .starts_with("IF OBJECT_ID('[fk_lines_orders]', 'F') IS NOT NULL"));
    }

    #[test]
    fn test_literals() {
        let d = MssqlDialect::new();
        assert_eq!(d.bool_literal(true), "1");
        assert_eq!(d.bytes_literal(&[0xde, 0xad]), "0xDEAD");
        assert_eq!(
            d.identity_insert("orders", true).as_deref(),
            Some("SET IDENTITY_INSERT [orders] ON")
        );
        assert!(d.reset_identity("orders", "id").is_none());
    }

    #[test]
    fn test_min_datetime() {
        let d = MssqlDialect::new();
        assert_eq!(d.min_datetime("datetime"), earliest(1753));
        assert_eq!(d.min_datetime("smalldatetime"), earliest(1900));
        assert_eq!(d.min_datetime("datetime2"), None);
    }

    #[test]
    fn test_disable_and_enable_constraints() {
        let d = MssqlDialect::new();
        assert!(d.disable_constraints("orders")[0].contains("NOCHECK CONSTRAINT ALL"));
        assert_eq!(
            d.enable_constraints("orders"),
            vec![
                "ALTER TABLE [orders] WITH CHECK CHECK CONSTRAINT ALL".to_string(),
                "ALTER TABLE [orders] ENABLE TRIGGER ALL".to_string()
            ]
        );
    }
}
