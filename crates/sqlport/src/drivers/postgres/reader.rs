//! PostgreSQL source driver.
//!
//! Catalog records come from `information_schema` and `pg_catalog`. Rows are
//! streamed with `query_raw`; values without a native client type are cast
//! to text in the select list. Columns of the `lo` type arrive as locators
//! and are read with `lo_get` on a second pooled connection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::records::{
    ColumnRecord, CompiledRecord, DefaultRecord, ForeignKeyRecord, KeyRecord,
};
use crate::config::SourceConfig;
use crate::core::schema::{Column, CompiledKind, KeyKind};
use crate::core::traits::{CatalogSource, LobReader, ReadOptions, RowSource};
use crate::core::value::{LargeObject, LobKind, Row, SqlValue};
use crate::dialect::DbKind;
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{MigrateError, Result};

const COLUMNS_SQL: &str = r#"
    SELECT
        c.table_name::text,
        ROW_NUMBER() OVER (PARTITION BY c.table_name ORDER BY c.ordinal_position)::int4,
        c.column_name::text,
        COALESCE(c.domain_name, c.udt_name)::text,
        COALESCE(c.character_maximum_length, -1)::int4,
        COALESCE(c.numeric_precision, 0)::int4,
        COALESCE(c.numeric_scale, c.datetime_precision, 0)::int4,
        c.is_nullable = 'YES',
        c.is_identity = 'YES' OR COALESCE(c.column_default, '') LIKE 'nextval(%'
    FROM information_schema.columns c
    JOIN information_schema.tables t
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name
    WHERE c.table_schema = $1 AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position
"#;

const KEYS_SQL: &str = r#"
    SELECT
        t.relname::text,
        i.relname::text,
        k.ord::int4,
        a.attname::text,
        CASE
            WHEN x.indisprimary THEN 'P'
            WHEN con.oid IS NOT NULL THEN 'U'
            WHEN x.indisunique THEN 'X'
            ELSE 'I'
        END
    FROM pg_index x
    JOIN pg_class t ON t.oid = x.indrelid
    JOIN pg_class i ON i.oid = x.indexrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    CROSS JOIN LATERAL unnest(x.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    LEFT JOIN pg_constraint con ON con.conindid = x.indexrelid AND con.contype = 'u'
    WHERE n.nspname = $1
      AND t.relkind = 'r'
      AND x.indexprs IS NULL
      AND x.indpred IS NULL
      AND k.ord <= x.indnkeyatts
    ORDER BY t.relname, i.relname, k.ord
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        con.conname::text,
        k.ord::int4,
        pt.relname::text,
        pa.attname::text,
        rt.relname::text,
        ra.attname::text
    FROM pg_constraint con
    JOIN pg_namespace n ON n.oid = con.connamespace
    JOIN pg_class pt ON pt.oid = con.conrelid
    JOIN pg_class rt ON rt.oid = con.confrelid
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(pk, rk, ord)
    JOIN pg_attribute pa ON pa.attrelid = con.conrelid AND pa.attnum = k.pk
    JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.rk
    WHERE con.contype = 'f' AND n.nspname = $1
    ORDER BY con.conname, pt.relname, k.ord
"#;

const DEFAULTS_SQL: &str = r#"
    SELECT
        c.relname::text,
        a.attname::text,
        ('df_' || c.relname || '_' || a.attname)::text,
        pg_get_expr(d.adbin, d.adrelid)
    FROM pg_attrdef d
    JOIN pg_class c ON c.oid = d.adrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_attribute a ON a.attrelid = d.adrelid AND a.attnum = d.adnum
    WHERE n.nspname = $1
      AND c.relkind = 'r'
      AND pg_get_expr(d.adbin, d.adrelid) NOT LIKE 'nextval(%'
    ORDER BY c.relname, a.attnum
"#;

/// Routines that belong to an extension are recreated by the extension.
const NOT_EXTENSION_MEMBER: &str =
    "NOT EXISTS (SELECT 1 FROM pg_depend d WHERE d.objid = p.oid AND d.deptype = 'e')";

fn compiled_sql(kind: CompiledKind) -> String {
    match kind {
        CompiledKind::Function | CompiledKind::Procedure => format!(
            r#"
            SELECT p.proname::text, 1::int4, pg_get_functiondef(p.oid)
            FROM pg_proc p
            JOIN pg_namespace n ON n.oid = p.pronamespace
            WHERE n.nspname = $1 AND p.prokind = '{}' AND {}
            ORDER BY p.proname, p.oid
            "#,
            if kind == CompiledKind::Function { "f" } else { "p" },
            NOT_EXTENSION_MEMBER
        ),
        CompiledKind::View => r#"
            SELECT
                c.relname::text,
                1::int4,
                'CREATE OR REPLACE VIEW ' || quote_ident(c.relname) || ' AS' || E'\n' || pg_get_viewdef(c.oid)
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relkind = 'v'
              AND NOT EXISTS (SELECT 1 FROM pg_depend d WHERE d.objid = c.oid AND d.deptype = 'e')
            ORDER BY c.relname
            "#
        .to_string(),
        CompiledKind::Trigger => r#"
            SELECT t.tgname::text, 1::int4, pg_get_triggerdef(t.oid)
            FROM pg_trigger t
            JOIN pg_class c ON c.oid = t.tgrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND NOT t.tgisinternal
            ORDER BY c.relname, t.tgname
            "#
        .to_string(),
    }
}

/// Build a deadpool pool for the source, with TLS per `ssl_mode`.
fn build_pool(config: &SourceConfig, max_size: usize) -> Result<Pool> {
    let mut pg_config = PgConfig::new();
    pg_config.host(&config.host);
    pg_config.port(config.port());
    pg_config.dbname(&config.database);
    pg_config.user(&config.user);
    pg_config.password(&config.password);

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let ssl_mode = SslMode::parse(&config.ssl_mode)?;
    let manager = match TlsBuilder::new(ssl_mode).build()? {
        Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        None => {
            warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
            Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
        }
    };

    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| MigrateError::pool(e, "creating PostgreSQL source pool"))
}

/// Reads `lo` large objects by OID.
pub struct PgLobReader {
    pool: Pool,
}

#[async_trait]
impl LobReader for PgLobReader {
    async fn read_lob(&self, locator: i64) -> Result<Vec<u8>> {
        let oid = u32::try_from(locator).map_err(|_| {
            MigrateError::Config(format!("large object locator {} is not an OID", locator))
        })?;
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting connection for lo_get"))?;
        let row = client.query_one("SELECT lo_get($1)", &[&oid]).await?;
        Ok(row.try_get::<_, Vec<u8>>(0)?)
    }
}

/// PostgreSQL catalog and row source.
pub struct PostgresSource {
    pool: Pool,
    lobs: Arc<PgLobReader>,
}

impl PostgresSource {
    /// Connect and verify the source. One pool slot is left for large-object
    /// reads so they never wait behind the cursor.
    pub async fn connect(config: &SourceConfig, max_size: usize) -> Result<Self> {
        let pool = build_pool(config, max_size)?;
        let source = Self {
            lobs: Arc::new(PgLobReader { pool: pool.clone() }),
            pool,
        };
        source.test_connection().await?;

        info!(
            "Connected to PostgreSQL source: {}:{}/{}",
            config.host,
            config.port(),
            config.database
        );
        Ok(source)
    }

    async fn query(&self, sql: &str, schema: &str, context: &str) -> Result<Vec<tokio_postgres::Row>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))?;
        let rows = client.query(sql, &[&schema]).await?;
        debug!("{}: {} rows", context, rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl CatalogSource for PostgresSource {
    fn db_kind(&self) -> DbKind {
        DbKind::Postgres
    }

    async fn column_records(&self, schema: &str) -> Result<Vec<ColumnRecord>> {
        self.query(COLUMNS_SQL, schema, "reading PostgreSQL columns")
            .await?
            .iter()
            .map(|row| {
                let ordinal: i32 = row.try_get(1)?;
                Ok(ColumnRecord {
                    table: row.try_get(0)?,
                    ordinal,
                    column: Column {
                        name: row.try_get(2)?,
                        data_type: row.try_get::<_, String>(3)?.to_lowercase(),
                        max_length: row.try_get(4)?,
                        precision: row.try_get(5)?,
                        scale: row.try_get(6)?,
                        is_nullable: row.try_get(7)?,
                        is_identity: row.try_get(8)?,
                        ordinal_pos: ordinal,
                    },
                })
            })
            .collect()
    }

    async fn key_records(&self, schema: &str) -> Result<Vec<KeyRecord>> {
        self.query(KEYS_SQL, schema, "reading PostgreSQL keys")
            .await?
            .iter()
            .map(|row| {
                let kind = match row.try_get::<_, String>(4)?.as_str() {
                    "P" => KeyKind::Primary,
                    "U" => KeyKind::UniqueConstraint,
                    "X" => KeyKind::UniqueIndex,
                    _ => KeyKind::Index,
                };
                Ok(KeyRecord {
                    table: row.try_get(0)?,
                    key_name: row.try_get(1)?,
                    ordinal: row.try_get(2)?,
                    column: row.try_get(3)?,
                    kind,
                })
            })
            .collect()
    }

    async fn foreign_key_records(&self, schema: &str) -> Result<Vec<ForeignKeyRecord>> {
        self.query(FOREIGN_KEYS_SQL, schema, "reading PostgreSQL foreign keys")
            .await?
            .iter()
            .map(|row| {
                Ok(ForeignKeyRecord {
                    name: row.try_get(0)?,
                    ordinal: row.try_get(1)?,
                    parent_table: row.try_get(2)?,
                    parent_column: row.try_get(3)?,
                    ref_table: row.try_get(4)?,
                    ref_column: row.try_get(5)?,
                })
            })
            .collect()
    }

    async fn default_records(&self, schema: &str) -> Result<Vec<DefaultRecord>> {
        self.query(DEFAULTS_SQL, schema, "reading PostgreSQL defaults")
            .await?
            .iter()
            .map(|row| {
                Ok(DefaultRecord {
                    table: row.try_get(0)?,
                    column: row.try_get(1)?,
                    name: row.try_get(2)?,
                    definition: row.try_get(3)?,
                })
            })
            .collect()
    }

    async fn compiled_records(&self, schema: &str, kind: CompiledKind) -> Result<Vec<CompiledRecord>> {
        self.query(&compiled_sql(kind), schema, "reading PostgreSQL compiled objects")
            .await?
            .iter()
            .map(|row| {
                Ok(CompiledRecord {
                    name: row.try_get(0)?,
                    ordinal: row.try_get(1)?,
                    text: row.try_get(2)?,
                })
            })
            .collect()
    }

    async fn test_connection(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL source connection"))?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

/// How a column is selected and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decode {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    Bytes,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    LargeObject,
    Text,
}

fn decode_for(data_type: &str) -> Decode {
    match data_type {
        "bool" | "boolean" => Decode::Bool,
        "int2" | "smallint" => Decode::I16,
        "int4" | "integer" => Decode::I32,
        "int8" | "bigint" => Decode::I64,
        "float4" | "real" => Decode::F32,
        "float8" | "double precision" => Decode::F64,
        "numeric" | "decimal" | "money" => Decode::Decimal,
        "bytea" => Decode::Bytes,
        "uuid" => Decode::Uuid,
        "date" => Decode::Date,
        "time" => Decode::Time,
        "timestamp" => Decode::Timestamp,
        "timestamptz" => Decode::TimestampTz,
        "lo" => Decode::LargeObject,
        _ => Decode::Text,
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_expr(column: &Column) -> String {
    let name = quote(&column.name);
    let data_type = column.data_type.to_lowercase();
    match decode_for(&data_type) {
        Decode::Decimal if data_type == "money" => format!("{}::numeric", name),
        Decode::LargeObject => format!("{}::oid::int8", name),
        Decode::Text if !matches!(data_type.as_str(), "text" | "varchar" | "bpchar") => {
            format!("{}::text", name)
        }
        _ => name,
    }
}

impl RowSource for PostgresSource {
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(opts.channel_capacity.max(1));
        let pool = self.pool.clone();
        let lobs = self.lobs.clone();

        tokio::spawn(async move {
            if let Err(e) = read_table_internal(pool, lobs, &opts, &tx).await {
                let err = match e {
                    MigrateError::Stream { .. } => e,
                    other => MigrateError::stream(&opts.table, other.to_string()),
                };
                let _ = tx.send(Err(err)).await;
            }
        });

        rx
    }
}

async fn read_table_internal(
    pool: Pool,
    lobs: Arc<PgLobReader>,
    opts: &ReadOptions,
    tx: &mpsc::Sender<Result<Row>>,
) -> Result<()> {
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, "getting connection for read_table"))?;

    let decoders: Vec<Decode> = opts
        .columns
        .iter()
        .map(|c| decode_for(&c.data_type.to_lowercase()))
        .collect();
    let sql = format!(
        "SELECT {} FROM {}.{}",
        opts.columns
            .iter()
            .map(select_expr)
            .collect::<Vec<_>>()
            .join(", "),
        quote(&opts.schema),
        quote(&opts.table)
    );
    debug!("{}", sql);

    let no_params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    let rows = client.query_raw(sql.as_str(), no_params).await?;
    tokio::pin!(rows);

    while let Some(row) = rows.try_next().await? {
        let mut values = Row::with_capacity(decoders.len());
        for (idx, decode) in decoders.iter().enumerate() {
            let value = match decode {
                Decode::LargeObject => match row.try_get::<_, Option<i64>>(idx)? {
                    Some(locator) => SqlValue::LargeObject(LargeObject::new(
                        &opts.table,
                        &opts.columns[idx].name,
                        locator,
                        LobKind::Binary,
                        lobs.clone(),
                    )),
                    None => SqlValue::Null,
                },
                other => convert_value(&row, idx, *other)?,
            };
            values.push(value);
        }
        if tx.send(Ok(values)).await.is_err() {
            break;
        }
    }
    Ok(())
}

fn convert_value(row: &tokio_postgres::Row, idx: usize, decode: Decode) -> Result<SqlValue> {
    let value = match decode {
        Decode::Bool => row.try_get::<_, Option<bool>>(idx)?.into(),
        Decode::I16 => row.try_get::<_, Option<i16>>(idx)?.into(),
        Decode::I32 => row.try_get::<_, Option<i32>>(idx)?.into(),
        Decode::I64 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Decode::F32 => row.try_get::<_, Option<f32>>(idx)?.map(SqlValue::F32).into(),
        Decode::F64 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Decode::Decimal => row.try_get::<_, Option<Decimal>>(idx)?.into(),
        Decode::Bytes => row.try_get::<_, Option<Vec<u8>>>(idx)?.into(),
        Decode::Uuid => row.try_get::<_, Option<Uuid>>(idx)?.into(),
        Decode::Date => row.try_get::<_, Option<NaiveDate>>(idx)?.into(),
        Decode::Time => row.try_get::<_, Option<NaiveTime>>(idx)?.into(),
        Decode::Timestamp => row.try_get::<_, Option<NaiveDateTime>>(idx)?.into(),
        Decode::TimestampTz => row.try_get::<_, Option<DateTime<FixedOffset>>>(idx)?.into(),
        Decode::Text | Decode::LargeObject => row.try_get::<_, Option<String>>(idx)?.into(),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str) -> Column {
        Column {
            name: name.into(),
            data_type: data_type.into(),
            max_length: -1,
            precision: 0,
            scale: 0,
            is_nullable: true,
            is_identity: false,
            ordinal_pos: 1,
        }
    }

    #[test]
    fn test_select_expr_casts() {
        assert_eq!(select_expr(&column("price", "money")), "\"price\"::numeric");
        assert_eq!(select_expr(&column("blob", "lo")), "\"blob\"::oid::int8");
        assert_eq!(select_expr(&column("doc", "jsonb")), "\"doc\"::text");
        assert_eq!(select_expr(&column("name", "varchar")), "\"name\"");
        assert_eq!(select_expr(&column("id", "int4")), "\"id\"");
    }

    #[test]
    fn test_decode_for() {
        assert_eq!(decode_for("int8"), Decode::I64);
        assert_eq!(decode_for("timestamptz"), Decode::TimestampTz);
        assert_eq!(decode_for("lo"), Decode::LargeObject);
        assert_eq!(decode_for("interval"), Decode::Text);
    }

    #[test]
    fn test_compiled_queries_per_kind() {
        assert!(compiled_sql(CompiledKind::Function).contains("prokind = 'f'"));
        assert!(compiled_sql(CompiledKind::Procedure).contains("prokind = 'p'"));
        assert!(compiled_sql(CompiledKind::View).contains("pg_get_viewdef"));
        assert!(compiled_sql(CompiledKind::Trigger).contains("NOT t.tgisinternal"));
    }

    #[test]
    fn test_pool_rejects_bad_ssl_mode() {
        let config: SourceConfig = serde_yaml::from_str(
            "type: postgres\nhost: localhost\ndatabase: db\nuser: u\npassword: p\nssl_mode: sometimes\n",
        )
        .unwrap();
        assert!(build_pool(&config, 2).is_err());
    }

    #[test]
    fn test_expression_and_partial_indexes_skipped() {
        assert!(KEYS_SQL.contains("x.indexprs IS NULL"));
        assert!(KEYS_SQL.contains("x.indpred IS NULL"));
    }
}
