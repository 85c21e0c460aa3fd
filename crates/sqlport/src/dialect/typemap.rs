//! Type mapping with (source, target) pair keying.
//!
//! Each dialect pair has a table from normalized source type name to a
//! [`Rule`]. Mapping never fails: a type missing from the table is copied
//! verbatim and flagged as passthrough so it can be reviewed by hand.

use std::collections::HashMap;

use crate::core::schema::Column;

use super::DbKind;

/// Collation appended to MSSQL character columns when case-insensitivity is forced.
const MSSQL_CI_COLLATION: &str = "Latin1_General_CI_AS";

/// Options that change how declarations are built.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapOptions {
    /// Use case-insensitive character types on the target.
    pub force_case_insensitive: bool,
}

/// Result of mapping one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Target declaration (e.g. "nvarchar(50)", "numeric(10,2)").
    pub target_type: String,
    /// The source type had no rule and was copied verbatim.
    pub passthrough: bool,
    /// Whether this mapping loses data or precision.
    pub is_lossy: bool,
    /// Warning message for lossy or passthrough mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            passthrough: false,
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            passthrough: false,
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }

    /// Copy an unknown source type verbatim.
    pub fn passthrough(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            passthrough: true,
            is_lossy: false,
            warning: Some(warning.into()),
        }
    }

    /// Lower-case type name without modifiers ("nvarchar(50)" -> "nvarchar").
    pub fn base_type(&self) -> String {
        base_type_name(&self.target_type)
    }
}

/// How a target declaration is built from a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Fixed declaration, modifiers dropped.
    Fixed(&'static str),
    /// Fixed declaration that loses information.
    Lossy(&'static str, &'static str),
    /// Length-bounded character type. `wide` sources store two bytes per
    /// character, so the declared length is halved. Lengths of -1 or above
    /// `limit` (0 = none) use the `unbounded` declaration.
    Char {
        name: &'static str,
        wide: bool,
        limit: i32,
        unbounded: &'static str,
    },
    /// Length-bounded binary type.
    Binary {
        name: &'static str,
        limit: i32,
        unbounded: &'static str,
    },
    /// Unbounded character type.
    Text(&'static str),
    /// Exact numeric with precision and scale; `unset` when precision is 0.
    Decimal {
        name: &'static str,
        unset: &'static str,
    },
    /// Oracle NUMBER, degraded by precision when the scale is 0.
    Number,
    /// Type carrying fractional-second precision in the scale (e.g. datetime2(7)).
    Fractional(&'static str),
}

type RuleTable = HashMap<&'static str, Rule>;

/// Cross-dialect type mapper backed by rule tables.
pub struct TypeMapper {
    rules: HashMap<(DbKind, DbKind), RuleTable>,
    options: MapOptions,
}

impl TypeMapper {
    /// Create a mapper with the built-in rule tables.
    pub fn new(options: MapOptions) -> Self {
        let mut rules = HashMap::new();
        rules.insert((DbKind::Mssql, DbKind::Mssql), mssql_to_mssql());
        rules.insert((DbKind::Postgres, DbKind::Mssql), postgres_to_mssql());
        rules.insert((DbKind::Oracle, DbKind::Mssql), oracle_to_mssql());
        rules.insert((DbKind::Mssql, DbKind::Postgres), mssql_to_postgres());
        rules.insert((DbKind::Postgres, DbKind::Postgres), postgres_to_postgres());
        rules.insert((DbKind::Oracle, DbKind::Postgres), oracle_to_postgres());
        Self { rules, options }
    }

    /// Look up the rule for a source type.
    pub fn rule(&self, source: DbKind, target: DbKind, data_type: &str) -> Option<Rule> {
        let name = normalize_type_name(data_type);
        self.rules
            .get(&(source, target))
            .and_then(|table| table.get(name.as_str()))
            .copied()
    }

    /// Map a column declaration from `source` to `target`.
    pub fn map_column(&self, column: &Column, source: DbKind, target: DbKind) -> TypeMapping {
        let mapping = match self.rule(source, target, &column.data_type) {
            Some(rule) => self.apply(rule, column, target),
            None if source == target => TypeMapping::lossless(column.data_type.clone()),
            None => TypeMapping::passthrough(
                column.data_type.clone(),
                format!(
                    "no {} -> {} rule for type '{}'; copied verbatim",
                    source, target, column.data_type
                ),
            ),
        };

        if column.is_identity && target == DbKind::Postgres {
            serial_for(mapping)
        } else {
            mapping
        }
    }

    fn apply(&self, rule: Rule, column: &Column, target: DbKind) -> TypeMapping {
        let ci = self.options.force_case_insensitive;
        match rule {
            Rule::Fixed(name) => TypeMapping::lossless(name),
            Rule::Lossy(name, warning) => TypeMapping::lossy(name, warning),
            Rule::Char {
                name,
                wide,
                limit,
                unbounded,
            } => {
                let declared = sized(column.max_length, wide, limit)
                    .map(|len| format!("{}({})", name, len))
                    .unwrap_or_else(|| unbounded.to_string());
                TypeMapping::lossless(case_insensitive(declared, target, ci))
            }
            Rule::Binary {
                name,
                limit,
                unbounded,
            } => TypeMapping::lossless(
                sized(column.max_length, false, limit)
                    .map(|len| format!("{}({})", name, len))
                    .unwrap_or_else(|| unbounded.to_string()),
            ),
            Rule::Text(name) => TypeMapping::lossless(case_insensitive(name.to_string(), target, ci)),
            Rule::Decimal { name, unset } => {
                if column.precision <= 0 {
                    TypeMapping::lossless(unset)
                } else {
                    TypeMapping::lossless(format!(
                        "{}({},{})",
                        name, column.precision, column.scale
                    ))
                }
            }
            Rule::Number => TypeMapping::lossless(number(column.precision, column.scale, target)),
            Rule::Fractional(name) => {
                TypeMapping::lossless(format!("{}({})", name, column.scale.clamp(0, 7)))
            }
        }
    }
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new(MapOptions::default())
    }
}

/// Declared length in target units, or None for the unbounded form.
fn sized(max_length: i32, wide: bool, limit: i32) -> Option<i32> {
    if max_length <= 0 {
        return None;
    }
    let len = if wide { (max_length / 2).max(1) } else { max_length };
    if limit > 0 && len > limit {
        None
    } else {
        Some(len)
    }
}

fn case_insensitive(declared: String, target: DbKind, ci: bool) -> String {
    if !ci {
        return declared;
    }
    match target {
        DbKind::Postgres => "citext".to_string(),
        _ => format!("{} COLLATE {}", declared, MSSQL_CI_COLLATION),
    }
}

/// Oracle NUMBER degradation ladder.
fn number(precision: i32, scale: i32, target: DbKind) -> String {
    let (big, int, small, bit, decimal) = match target {
        DbKind::Postgres => ("bigint", "integer", "smallint", "boolean", "numeric"),
        _ => ("bigint", "int", "smallint", "bit", "decimal"),
    };
    if scale == 0 {
        match precision {
            20 => big.to_string(),
            0 | 10 => int.to_string(),
            5 => small.to_string(),
            1 => bit.to_string(),
            p => format!("{}({})", decimal, p),
        }
    } else if precision == 19 && scale == 4 {
        "money".to_string()
    } else {
        let p = if precision <= 0 { 38 } else { precision };
        format!("{}({},{})", decimal, p, scale)
    }
}

/// PostgreSQL identity columns become the serial type of matching width.
fn serial_for(mapping: TypeMapping) -> TypeMapping {
    match mapping.base_type().as_str() {
        "smallint" => TypeMapping::lossless("smallserial"),
        "integer" | "int" => TypeMapping::lossless("serial"),
        "bigint" => TypeMapping::lossless("bigserial"),
        other => TypeMapping::lossy(
            "bigserial",
            format!("identity column of type {} widened to bigserial", other),
        ),
    }
}

/// Lower-case, drop parenthesized modifiers, collapse whitespace
/// ("TIMESTAMP(6) WITH TIME ZONE" -> "timestamp with time zone").
fn normalize_type_name(data_type: &str) -> String {
    let mut out = String::with_capacity(data_type.len());
    let mut depth = 0;
    for ch in data_type.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if depth > 0 => {}
            _ => out.extend(ch.to_lowercase()),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn base_type_name(declared: &str) -> String {
    declared
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn mssql_to_mssql() -> RuleTable {
    use Rule::*;
    let mut t = HashMap::new();
    for name in [
        "bit",
        "tinyint",
        "smallint",
        "int",
        "bigint",
        "real",
        "float",
        "money",
        "smallmoney",
        "date",
        "datetime",
        "smalldatetime",
        "image",
        "uniqueidentifier",
        "xml",
        "sql_variant",
        "geometry",
        "geography",
        "hierarchyid",
    ] {
        t.insert(name, Fixed(name));
    }
    t.insert("text", Text("text"));
    t.insert("ntext", Text("ntext"));
    t.insert("sysname", Fixed("nvarchar(128)"));
    t.insert("char", Char { name: "char", wide: false, limit: 8000, unbounded: "varchar(max)" });
    t.insert("varchar", Char { name: "varchar", wide: false, limit: 8000, unbounded: "varchar(max)" });
    t.insert("nchar", Char { name: "nchar", wide: true, limit: 4000, unbounded: "nvarchar(max)" });
    t.insert("nvarchar", Char { name: "nvarchar", wide: true, limit: 4000, unbounded: "nvarchar(max)" });
    t.insert("binary", Binary { name: "binary", limit: 8000, unbounded: "varbinary(max)" });
    t.insert("varbinary", Binary { name: "varbinary", limit: 8000, unbounded: "varbinary(max)" });
    t.insert("decimal", Decimal { name: "decimal", unset: "decimal(38,10)" });
    t.insert("numeric", Decimal { name: "numeric", unset: "numeric(38,10)" });
    t.insert("datetime2", Fractional("datetime2"));
    t.insert("time", Fractional("time"));
    t.insert("datetimeoffset", Fractional("datetimeoffset"));
    t.insert("timestamp", Lossy("binary(8)", "rowversion values are copied as binary(8)"));
    t.insert("rowversion", Lossy("binary(8)", "rowversion values are copied as binary(8)"));
    t
}

fn postgres_to_mssql() -> RuleTable {
    use Rule::*;
    let mut t = HashMap::new();
    for name in ["int2", "smallint", "smallserial"] {
        t.insert(name, Fixed("smallint"));
    }
    for name in ["int4", "integer", "int", "serial"] {
        t.insert(name, Fixed("int"));
    }
    for name in ["int8", "bigint", "bigserial", "oid"] {
        t.insert(name, Fixed("bigint"));
    }
    for name in ["float8", "double precision"] {
        t.insert(name, Fixed("float"));
    }
    for name in ["float4", "real"] {
        t.insert(name, Fixed("real"));
    }
    for name in ["numeric", "decimal"] {
        t.insert(name, Decimal { name: "decimal", unset: "decimal(38,10)" });
    }
    t.insert("money", Fixed("money"));
    for name in ["varchar", "character varying"] {
        t.insert(name, Char { name: "nvarchar", wide: false, limit: 4000, unbounded: "nvarchar(max)" });
    }
    for name in ["bpchar", "char", "character"] {
        t.insert(name, Char { name: "nchar", wide: false, limit: 4000, unbounded: "nvarchar(max)" });
    }
    for name in ["text", "citext", "json", "jsonb"] {
        t.insert(name, Text("nvarchar(max)"));
    }
    t.insert("name", Fixed("nvarchar(64)"));
    for name in ["bool", "boolean"] {
        t.insert(name, Fixed("bit"));
    }
    t.insert("bytea", Fixed("image"));
    t.insert("lo", Fixed("varbinary(max)"));
    t.insert("date", Fixed("date"));
    for name in ["time", "time without time zone"] {
        t.insert(name, Fixed("time"));
    }
    for name in ["timetz", "time with time zone"] {
        t.insert(name, Lossy("time", "time zone offset dropped from time with time zone"));
    }
    for name in ["timestamp", "timestamp without time zone"] {
        t.insert(name, Fixed("datetime"));
    }
    for name in ["timestamptz", "timestamp with time zone"] {
        t.insert(name, Fixed("datetimeoffset"));
    }
    t.insert("uuid", Fixed("uniqueidentifier"));
    t.insert("xml", Fixed("xml"));
    for name in ["inet", "cidr", "macaddr", "geometry"] {
        t.insert(name, Fixed("varchar(255)"));
    }
    t.insert("interval", Lossy("varchar(64)", "interval values are copied as text"));
    t
}

fn oracle_to_mssql() -> RuleTable {
    use Rule::*;
    let mut t = HashMap::new();
    t.insert("number", Number);
    for name in ["varchar2", "varchar"] {
        t.insert(name, Char { name: "varchar", wide: false, limit: 8000, unbounded: "varchar(max)" });
    }
    t.insert("nvarchar2", Char { name: "nvarchar", wide: true, limit: 4000, unbounded: "nvarchar(max)" });
    t.insert("char", Char { name: "char", wide: false, limit: 8000, unbounded: "varchar(max)" });
    t.insert("nchar", Char { name: "nchar", wide: true, limit: 4000, unbounded: "nvarchar(max)" });
    t.insert("clob", Text("varchar(max)"));
    t.insert("long", Text("varchar(max)"));
    t.insert("nclob", Text("nvarchar(max)"));
    t.insert("date", Fixed("datetime"));
    t.insert("timestamp", Fixed("datetime"));
    t.insert("timestamp with time zone", Fixed("datetimeoffset"));
    t.insert("timestamp with local time zone", Fixed("datetimeoffset"));
    t.insert("long raw", Fixed("image"));
    t.insert("blob", Fixed("varbinary(max)"));
    t.insert("raw", Binary { name: "varbinary", limit: 8000, unbounded: "varbinary(max)" });
    t.insert("float", Fixed("float"));
    t.insert("binary_double", Fixed("float"));
    t.insert("binary_float", Fixed("real"));
    t
}

fn mssql_to_postgres() -> RuleTable {
    use Rule::*;
    let mut t = HashMap::new();
    t.insert("bit", Fixed("boolean"));
    t.insert("tinyint", Fixed("smallint"));
    t.insert("smallint", Fixed("smallint"));
    t.insert("int", Fixed("integer"));
    t.insert("bigint", Fixed("bigint"));
    t.insert("real", Fixed("real"));
    t.insert("float", Fixed("double precision"));
    t.insert("decimal", Decimal { name: "numeric", unset: "numeric" });
    t.insert("numeric", Decimal { name: "numeric", unset: "numeric" });
    t.insert("money", Fixed("numeric(19,4)"));
    t.insert("smallmoney", Fixed("numeric(10,4)"));
    t.insert("char", Char { name: "char", wide: false, limit: 0, unbounded: "text" });
    t.insert("nchar", Char { name: "char", wide: true, limit: 0, unbounded: "text" });
    t.insert("varchar", Char { name: "varchar", wide: false, limit: 0, unbounded: "text" });
    t.insert("nvarchar", Char { name: "varchar", wide: true, limit: 0, unbounded: "text" });
    t.insert("sysname", Fixed("varchar(128)"));
    t.insert("text", Text("text"));
    t.insert("ntext", Text("text"));
    for name in ["binary", "varbinary", "image", "timestamp", "rowversion"] {
        t.insert(name, Fixed("bytea"));
    }
    t.insert("date", Fixed("date"));
    t.insert("time", Fixed("time"));
    for name in ["datetime", "datetime2", "smalldatetime"] {
        t.insert(name, Fixed("timestamp"));
    }
    t.insert("datetimeoffset", Fixed("timestamptz"));
    t.insert("uniqueidentifier", Fixed("uuid"));
    t.insert("xml", Fixed("xml"));
    for name in ["sql_variant", "geometry", "geography", "hierarchyid"] {
        t.insert(name, Lossy("text", "spatial and variant values are copied as text"));
    }
    t
}

fn postgres_to_postgres() -> RuleTable {
    use Rule::*;
    let mut t = HashMap::new();
    for name in ["int2", "smallint", "smallserial"] {
        t.insert(name, Fixed("smallint"));
    }
    for name in ["int4", "integer", "serial"] {
        t.insert(name, Fixed("integer"));
    }
    for name in ["int8", "bigint", "bigserial"] {
        t.insert(name, Fixed("bigint"));
    }
    for name in ["float4", "real"] {
        t.insert(name, Fixed("real"));
    }
    for name in ["float8", "double precision"] {
        t.insert(name, Fixed("double precision"));
    }
    for name in ["numeric", "decimal"] {
        t.insert(name, Decimal { name: "numeric", unset: "numeric" });
    }
    for name in ["varchar", "character varying"] {
        t.insert(name, Char { name: "varchar", wide: false, limit: 0, unbounded: "text" });
    }
    for name in ["bpchar", "char", "character"] {
        t.insert(name, Char { name: "char", wide: false, limit: 0, unbounded: "text" });
    }
    t.insert("text", Text("text"));
    t.insert("citext", Text("citext"));
    for name in ["bool", "boolean"] {
        t.insert(name, Fixed("boolean"));
    }
    t.insert("lo", Fixed("bytea"));
    for name in ["timestamp", "timestamp without time zone"] {
        t.insert(name, Fixed("timestamp"));
    }
    for name in ["timestamptz", "timestamp with time zone"] {
        t.insert(name, Fixed("timestamptz"));
    }
    for name in ["time", "time without time zone"] {
        t.insert(name, Fixed("time"));
    }
    t
}

fn oracle_to_postgres() -> RuleTable {
    use Rule::*;
    let mut t = HashMap::new();
    t.insert("number", Number);
    for name in ["varchar2", "varchar"] {
        t.insert(name, Char { name: "varchar", wide: false, limit: 0, unbounded: "text" });
    }
    t.insert("nvarchar2", Char { name: "varchar", wide: true, limit: 0, unbounded: "text" });
    t.insert("char", Char { name: "char", wide: false, limit: 0, unbounded: "text" });
    t.insert("nchar", Char { name: "char", wide: true, limit: 0, unbounded: "text" });
    for name in ["clob", "nclob", "long"] {
        t.insert(name, Text("text"));
    }
    t.insert("date", Fixed("timestamp(0)"));
    t.insert("timestamp", Fixed("timestamp"));
    t.insert("timestamp with time zone", Fixed("timestamptz"));
    t.insert("timestamp with local time zone", Fixed("timestamptz"));
    for name in ["long raw", "blob", "raw"] {
        t.insert(name, Fixed("bytea"));
    }
    t.insert("float", Fixed("double precision"));
    t.insert("binary_double", Fixed("double precision"));
    t.insert("binary_float", Fixed("real"));
    t
}
