//! Value-to-literal rendering for INSERT tuples.

use crate::core::traits::Dialect;
use crate::core::value::SqlValue;
use crate::dialect::DbKind;
use crate::error::{MigrateError, Result};
use chrono::Timelike;

use super::TargetColumn;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
// datetime and smalldatetime reject literals with more than three digits
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Render one value as a literal for the given target column.
///
/// Large objects must be materialized first; an unresolved handle is an error.
pub fn render(dialect: &dyn Dialect, column: &TargetColumn, value: &SqlValue) -> Result<String> {
    let quoted = |s: String| dialect.string_literal(&s, false);
    let literal = match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => dialect.bool_literal(*b),
        SqlValue::I16(n) => integer(dialect, column, *n as i64),
        SqlValue::I32(n) => integer(dialect, column, *n as i64),
        SqlValue::I64(n) => integer(dialect, column, *n),
        SqlValue::F32(f) => float(dialect, *f as f64, f.to_string()),
        SqlValue::F64(f) => float(dialect, *f, f.to_string()),
        SqlValue::Decimal(d) if column.boolean => dialect.bool_literal(!d.is_zero()),
        SqlValue::Decimal(d) => d.normalize().to_string(),
        SqlValue::Text(s) => dialect.string_literal(s, column.wide),
        SqlValue::Bytes(b) => dialect.bytes_literal(b),
        SqlValue::Uuid(u) => quoted(u.to_string()),
        SqlValue::Date(d) => {
            let d = match column.min_datetime {
                Some(min) if *d < min.date() => min.date(),
                _ => *d,
            };
            quoted(d.format(DATE_FORMAT).to_string())
        }
        SqlValue::Time(t) => quoted(format!(
            "{}{}",
            t.format(TIME_FORMAT),
            fraction(dialect, t.nanosecond())
        )),
        SqlValue::DateTime(dt) => match column.min_datetime {
            Some(min) => quoted((*dt).max(min).format(LEGACY_TIMESTAMP_FORMAT).to_string()),
            None => quoted(format!(
                "{}{}",
                dt.format(TIMESTAMP_FORMAT),
                fraction(dialect, dt.nanosecond())
            )),
        },
        SqlValue::DateTimeOffset(dto) => quoted(format!(
            "{}{}{}",
            dto.format(TIMESTAMP_FORMAT),
            fraction(dialect, dto.nanosecond()),
            dto.format("%:z")
        )),
        SqlValue::LargeObject(lob) => {
            return Err(MigrateError::large_object(
                &lob.table,
                &lob.column,
                "value reached the emitter before it was read",
            ))
        }
    };
    Ok(literal)
}

fn integer(dialect: &dyn Dialect, column: &TargetColumn, n: i64) -> String {
    if column.boolean {
        dialect.bool_literal(n != 0)
    } else {
        n.to_string()
    }
}

/// Fractional seconds with trailing zeros removed, cut to what the target
/// parses (100ns on MSSQL).
fn fraction(dialect: &dyn Dialect, nanos: u32) -> String {
    let max_digits = match dialect.kind() {
        DbKind::Mssql => 7,
        _ => 9,
    };
    // Leap seconds carry nanos past one second.
    let digits = format!("{:09}", nanos % 1_000_000_000);
    let digits = digits[..max_digits].trim_end_matches('0');
    if digits.is_empty() {
        String::new()
    } else {
        format!(".{}", digits)
    }
}

fn float(dialect: &dyn Dialect, f: f64, text: String) -> String {
    if f.is_finite() {
        return text;
    }
    match dialect.kind() {
        DbKind::Postgres if f.is_nan() => "'NaN'".to_string(),
        DbKind::Postgres if f.is_sign_positive() => "'Infinity'".to_string(),
        DbKind::Postgres => "'-Infinity'".to_string(),
        // No representation on MSSQL
        _ => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::TypeMapping;
    use crate::drivers::mssql::MssqlDialect;
    use crate::drivers::postgres::PostgresDialect;
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn column(target_type: &str, dialect: &dyn Dialect) -> TargetColumn {
        TargetColumn::new("c", false, TypeMapping::lossless(target_type), dialect)
    }

    #[test]
    fn test_strings_are_escaped_for_every_target() {
        let mssql = MssqlDialect::new();
        let pg = PostgresDialect::new();
        let value = SqlValue::from("O'Brien");
        assert_eq!(
            render(&mssql, &column("varchar(50)", &mssql), &value).unwrap(),
            "'O''Brien'"
        );
        assert_eq!(
            render(&mssql, &column("nvarchar(50)", &mssql), &value).unwrap(),
            "N'O''Brien'"
        );
        assert_eq!(
            render(&pg, &column("varchar(50)", &pg), &value).unwrap(),
            "'O''Brien'"
        );
    }

    #[test]
    fn test_numbers_and_null() {
        let d = MssqlDialect::new();
        let c = column("decimal(10,2)", &d);
        assert_eq!(render(&d, &c, &SqlValue::Null).unwrap(), "NULL");
        assert_eq!(
            render(&d, &c, &SqlValue::Decimal(Decimal::from_str("19.99").unwrap())).unwrap(),
            "19.99"
        );
        assert_eq!(render(&d, &column("int", &d), &SqlValue::I32(-7)).unwrap(), "-7");
    }

    #[test]
    fn test_integers_into_boolean_columns() {
        let pg = PostgresDialect::new();
        let c = column("boolean", &pg);
        assert_eq!(render(&pg, &c, &SqlValue::I16(1)).unwrap(), "true");
        assert_eq!(render(&pg, &c, &SqlValue::I32(0)).unwrap(), "false");

        let mssql = MssqlDialect::new();
        assert_eq!(
            render(&mssql, &column("bit", &mssql), &SqlValue::Bool(true)).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_non_finite_floats() {
        let pg = PostgresDialect::new();
        let mssql = MssqlDialect::new();
        let c = column("float", &pg);
        assert_eq!(render(&pg, &c, &SqlValue::F64(f64::NAN)).unwrap(), "'NaN'");
        assert_eq!(
            render(&pg, &c, &SqlValue::F64(f64::NEG_INFINITY)).unwrap(),
            "'-Infinity'"
        );
        assert_eq!(
            render(&mssql, &column("float", &mssql), &SqlValue::F32(f32::INFINITY)).unwrap(),
            "NULL"
        );
        assert_eq!(render(&pg, &c, &SqlValue::F64(1.5)).unwrap(), "1.5");
    }

    #[test]
    fn test_timestamps_are_iso8601() {
        let d = PostgresDialect::new();
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 678)
            .unwrap();
        assert_eq!(
            render(&d, &column("timestamp", &d), &SqlValue::DateTime(dt)).unwrap(),
            "'2024-01-02T03:04:05.678'"
        );
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let dto = offset.from_local_datetime(&dt).unwrap();
        assert_eq!(
            render(&d, &column("timestamptz", &d), &SqlValue::DateTimeOffset(dto)).unwrap(),
            "'2024-01-02T03:04:05.678+02:00'"
        );
    }

    #[test]
    fn test_sub_millisecond_precision_kept() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 123_456)
            .unwrap();
        let pg = PostgresDialect::new();
        assert_eq!(
            render(&pg, &column("timestamp", &pg), &SqlValue::DateTime(dt)).unwrap(),
            "'2024-01-02T03:04:05.123456'"
        );
        assert_eq!(
            render(&pg, &column("time", &pg), &SqlValue::Time(dt.time())).unwrap(),
            "'03:04:05.123456'"
        );

        let mssql = MssqlDialect::new();
        assert_eq!(
            render(&mssql, &column("datetime2(7)", &mssql), &SqlValue::DateTime(dt)).unwrap(),
            "'2024-01-02T03:04:05.123456'"
        );
        // datetime only takes milliseconds
        assert_eq!(
            render(&mssql, &column("datetime", &mssql), &SqlValue::DateTime(dt)).unwrap(),
            "'2024-01-02T03:04:05.123'"
        );

        let ticks = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_nano_opt(3, 4, 5, 123_456_789)
            .unwrap();
        assert_eq!(
            render(&mssql, &column("datetime2(7)", &mssql), &SqlValue::DateTime(ticks)).unwrap(),
            "'2024-01-02T03:04:05.1234567'"
        );
        assert_eq!(
            render(&pg, &column("timestamp", &pg), &SqlValue::DateTime(ticks.with_nanosecond(0).unwrap()))
                .unwrap(),
            "'2024-01-02T03:04:05'"
        );
    }

    #[test]
    fn test_dates_below_target_minimum_are_clamped() {
        let d = MssqlDialect::new();
        let early = NaiveDate::from_ymd_opt(1600, 5, 1).unwrap();
        assert_eq!(
            render(&d, &column("datetime", &d), &SqlValue::DateTime(early.and_hms_opt(12, 0, 0).unwrap()))
                .unwrap(),
            "'1753-01-01T00:00:00.000'"
        );
        assert_eq!(
            render(&d, &column("smalldatetime", &d), &SqlValue::Date(early)).unwrap(),
            "'1900-01-01'"
        );
        assert_eq!(
            render(&d, &column("datetime2(7)", &d), &SqlValue::Date(early)).unwrap(),
            "'1600-05-01'"
        );
    }

    #[test]
    fn test_binary_literals() {
        let mssql = MssqlDialect::new();
        let pg = PostgresDialect::new();
        let value = SqlValue::Bytes(vec![0x01, 0xab]);
        assert_eq!(
            render(&mssql, &column("varbinary(max)", &mssql), &value).unwrap(),
            "0x01AB"
        );
        assert_eq!(
            render(&pg, &column("bytea", &pg), &value).unwrap(),
            "'\\x01ab'::bytea"
        );
    }
}
