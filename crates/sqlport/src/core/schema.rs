//! Schema and metadata types for tables, columns, keys and compiled objects.
//!
//! Descriptors are produced once per run by the catalog reader and are only
//! appended to by later catalog passes.

use serde::{Deserialize, Serialize};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Source type name, lower case (e.g. "nvarchar", "number").
    pub data_type: String,
    /// Declared length in storage units; -1 means unbounded.
    pub max_length: i32,
    /// Numeric precision (0 when unset).
    pub precision: i32,
    /// Numeric scale.
    pub scale: i32,
    /// Whether the column accepts NULL.
    pub is_nullable: bool,
    /// Whether the engine generates values for this column.
    pub is_identity: bool,
    /// 1-based position within the table.
    pub ordinal_pos: i32,
}

/// Kind of key or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Primary,
    UniqueConstraint,
    UniqueIndex,
    Index,
}

/// Primary key, unique constraint or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Constraint or index name.
    pub name: String,
    /// Key columns in key order.
    pub columns: Vec<String>,
    /// What the key is.
    pub kind: KeyKind,
}

/// Foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Child table (owner of the constraint).
    pub parent_table: String,
    /// Child columns, paired by position with `ref_columns`.
    pub columns: Vec<String>,
    /// Referenced (parent-side) table.
    pub ref_table: String,
    /// Referenced columns.
    pub ref_columns: Vec<String>,
}

impl ForeignKey {
    /// Whether the constraint touches the given table on either side.
    pub fn touches(&self, table: &str) -> bool {
        self.parent_table.eq_ignore_ascii_case(table) || self.ref_table.eq_ignore_ascii_case(table)
    }
}

/// Column default constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefault {
    pub table: String,
    pub column: String,
    /// Constraint name.
    pub name: String,
    /// Default expression as stored by the source.
    pub definition: String,
}

/// Kind of compiled object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompiledKind {
    Function,
    Procedure,
    View,
    Trigger,
}

impl CompiledKind {
    /// Emission order of compiled object sections.
    pub const ALL: [CompiledKind; 4] = [
        CompiledKind::Function,
        CompiledKind::Procedure,
        CompiledKind::View,
        CompiledKind::Trigger,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CompiledKind::Function => "functions",
            CompiledKind::Procedure => "procedures",
            CompiledKind::View => "views",
            CompiledKind::Trigger => "triggers",
        }
    }
}

/// Function, procedure, view or trigger, carried as opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledObject {
    pub kind: CompiledKind,
    pub name: String,
    /// Concatenated definition text.
    pub text: String,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Columns in catalog ordinal order.
    pub columns: Vec<Column>,
    /// Primary key, if any.
    pub primary_key: Option<Key>,
    /// Unique constraints, unique indexes and plain indexes.
    pub keys: Vec<Key>,
    /// Foreign keys owned by this table.
    pub foreign_keys: Vec<ForeignKey>,
    /// Foreign keys of other tables that reference this one.
    pub referencing_keys: Vec<ForeignKey>,
    /// Column defaults.
    pub defaults: Vec<ColumnDefault>,
}

impl Table {
    /// Create an empty table descriptor.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            keys: Vec::new(),
            foreign_keys: Vec::new(),
            referencing_keys: Vec::new(),
            defaults: Vec::new(),
        }
    }

    /// Get the fully qualified source table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Find a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check if any column is an identity column.
    pub fn has_identity(&self) -> bool {
        self.columns.iter().any(|c| c.is_identity)
    }

    /// Primary key followed by the other keys.
    pub fn all_keys(&self) -> impl Iterator<Item = &Key> {
        self.primary_key.iter().chain(self.keys.iter())
    }

    /// Whether this table matches a user-supplied name.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, identity: bool) -> Column {
        Column {
            name: name.into(),
            data_type: "int".into(),
            max_length: 4,
            precision: 10,
            scale: 0,
            is_nullable: false,
            is_identity: identity,
            ordinal_pos: 1,
        }
    }

    #[test]
    fn test_table_lookup_is_case_insensitive() {
        let mut table = Table::new("dbo", "Orders");
        table.columns.push(column("Id", true));
        assert!(table.column("ID").is_some());
        assert!(table.is_named("orders"));
        assert!(table.has_identity());
        assert_eq!(table.full_name(), "dbo.Orders");
    }

    #[test]
    fn test_all_keys_puts_primary_first() {
        let mut table = Table::new("dbo", "orders");
        table.keys.push(Key {
            name: "ix_orders_customer".into(),
            columns: vec!["customer_id".into()],
            kind: KeyKind::Index,
        });
        table.primary_key = Some(Key {
            name: "pk_orders".into(),
            columns: vec!["id".into()],
            kind: KeyKind::Primary,
        });
        let names: Vec<_> = table.all_keys().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["pk_orders", "ix_orders_customer"]);
    }

    #[test]
    fn test_foreign_key_touches_either_side() {
        let fk = ForeignKey {
            name: "fk_lines_orders".into(),
            parent_table: "order_lines".into(),
            columns: vec!["order_id".into()],
            ref_table: "orders".into(),
            ref_columns: vec!["id".into()],
        };
        assert!(fk.touches("ORDERS"));
        assert!(fk.touches("order_lines"));
        assert!(!fk.touches("customers"));
    }
}
