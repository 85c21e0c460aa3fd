//! Flat catalog record shapes returned by source drivers.
//!
//! Every sequence is ordered so that the rows of one parent entity are
//! contiguous and carry an ordinal starting at 1.

use crate::core::schema::{Column, KeyKind};

/// One column of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRecord {
    pub table: String,
    /// Position within the table, starting at 1.
    pub ordinal: i32,
    pub column: Column,
}

/// One column of one key or index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub table: String,
    pub key_name: String,
    /// Position within the key, starting at 1.
    pub ordinal: i32,
    pub column: String,
    pub kind: KeyKind,
}

/// One column pair of one foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRecord {
    pub name: String,
    /// Position within the constraint, starting at 1.
    pub ordinal: i32,
    pub parent_table: String,
    pub parent_column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// One column default. Defaults are not grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRecord {
    pub table: String,
    pub column: String,
    pub name: String,
    pub definition: String,
}

/// One text fragment of a compiled object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRecord {
    pub name: String,
    /// Fragment number, starting at 1.
    pub ordinal: i32,
    pub text: String,
}
