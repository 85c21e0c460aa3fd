//! SQL value types carried from the source cursor to the statement emitter.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::traits::LobReader;
use crate::error::{MigrateError, Result};

/// How a large object's bytes are interpreted once read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobKind {
    Text,
    Binary,
}

/// Deferred handle to a large-object field.
///
/// The handle owns nothing beyond a shared reference to the driver's reader;
/// the bytes are fetched by [`LargeObject::materialize`] on a separate
/// connection while the cursor keeps moving.
#[derive(Clone)]
pub struct LargeObject {
    /// Table the field belongs to.
    pub table: String,
    /// Column the field belongs to.
    pub column: String,
    /// Driver-specific locator (an OID for PostgreSQL `lo`).
    pub locator: i64,
    pub kind: LobKind,
    reader: Arc<dyn LobReader>,
}

impl LargeObject {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        locator: i64,
        kind: LobKind,
        reader: Arc<dyn LobReader>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            locator,
            kind,
            reader,
        }
    }

    /// Read the object and convert it to an inline value.
    pub async fn materialize(&self) -> Result<SqlValue> {
        let bytes = self.reader.read_lob(self.locator).await.map_err(|e| {
            MigrateError::large_object(&self.table, &self.column, e.to_string())
        })?;
        match self.kind {
            LobKind::Binary => Ok(SqlValue::Bytes(bytes)),
            LobKind::Text => String::from_utf8(bytes).map(SqlValue::Text).map_err(|e| {
                MigrateError::large_object(&self.table, &self.column, e.to_string())
            }),
        }
    }
}

impl fmt::Debug for LargeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LargeObject")
            .field("table", &self.table)
            .field("column", &self.column)
            .field("locator", &self.locator)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for LargeObject {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
            && self.column == other.column
            && self.locator == other.locator
            && self.kind == other.kind
    }
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint, tinyint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (float/double precision).
    F64(f64),

    /// Exact numeric (decimal, numeric, money).
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID (uniqueidentifier).
    Uuid(Uuid),

    /// Date without time.
    Date(NaiveDate),

    /// Time without date.
    Time(NaiveTime),

    /// Date and time without time zone.
    DateTime(NaiveDateTime),

    /// Date and time with offset (datetimeoffset, timestamptz).
    DateTimeOffset(DateTime<FixedOffset>),

    /// Field that must be read separately before emission.
    LargeObject(LargeObject),
}

impl SqlValue {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Whether this value still needs a secondary read.
    pub fn is_deferred(&self) -> bool {
        matches!(self, SqlValue::LargeObject(_))
    }
}

/// One source row, in selected column order.
pub type Row = Vec<SqlValue>;

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}
