//! MSSQL source driver.
//!
//! Catalog records come from the `sys.*` views, each query numbering the
//! rows of one parent with `ROW_NUMBER()` so ordinals start at 1 without
//! gaps. Table rows are read on a pooled connection owned by a spawned task
//! that feeds the bounded channel.

use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::records::{
    ColumnRecord, CompiledRecord, DefaultRecord, ForeignKeyRecord, KeyRecord,
};
use crate::config::SourceConfig;
use crate::core::schema::{Column, CompiledKind, KeyKind};
use crate::core::traits::{CatalogSource, ReadOptions, RowSource};
use crate::core::value::{Row, SqlValue};
use crate::dialect::DbKind;
use crate::error::{MigrateError, Result};

/// Maximum TDS packet size.
const TDS_MAX_PACKET_SIZE: u32 = 32767;

const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Types tiberius cannot decode.
const UNSTREAMABLE: [&str; 4] = ["sql_variant", "geometry", "geography", "hierarchyid"];

const COLUMNS_SQL: &str = r#"
    SELECT
        t.name,
        CAST(ROW_NUMBER() OVER (PARTITION BY c.object_id ORDER BY c.column_id) AS INT),
        c.name,
        CASE
            WHEN ty.is_user_defined = 1 AND ty.is_assembly_type = 0 THEN TYPE_NAME(c.system_type_id)
            ELSE ty.name
        END,
        CAST(c.max_length AS INT),
        CAST(c.precision AS INT),
        CAST(c.scale AS INT),
        c.is_nullable,
        c.is_identity
    FROM sys.tables t
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.columns c ON c.object_id = t.object_id
    JOIN sys.types ty ON ty.user_type_id = c.user_type_id
    WHERE s.name = @P1 AND t.is_ms_shipped = 0
    ORDER BY t.name, c.column_id
"#;

const KEYS_SQL: &str = r#"
    SELECT
        t.name,
        i.name,
        CAST(ROW_NUMBER() OVER (PARTITION BY i.object_id, i.index_id ORDER BY ic.key_ordinal) AS INT),
        c.name,
        CASE
            WHEN i.is_primary_key = 1 THEN 'P'
            WHEN i.is_unique_constraint = 1 THEN 'U'
            WHEN i.is_unique = 1 THEN 'X'
            ELSE 'I'
        END
    FROM sys.indexes i
    JOIN sys.tables t ON t.object_id = i.object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    WHERE s.name = @P1
      AND t.is_ms_shipped = 0
      AND i.type > 0
      AND i.is_hypothetical = 0
      AND i.has_filter = 0
      AND ic.is_included_column = 0
    ORDER BY t.name, i.index_id, ic.key_ordinal
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        fk.name,
        CAST(ROW_NUMBER() OVER (PARTITION BY fk.object_id ORDER BY fkc.constraint_column_id) AS INT),
        pt.name,
        pc.name,
        rt.name,
        rc.name
    FROM sys.foreign_keys fk
    JOIN sys.schemas s ON s.schema_id = fk.schema_id
    JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
    JOIN sys.tables pt ON pt.object_id = fk.parent_object_id
    JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
    JOIN sys.tables rt ON rt.object_id = fk.referenced_object_id
    JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
    WHERE s.name = @P1
    ORDER BY fk.name, fkc.constraint_column_id
"#;

const DEFAULTS_SQL: &str = r#"
    SELECT t.name, c.name, dc.name, dc.definition
    FROM sys.default_constraints dc
    JOIN sys.tables t ON t.object_id = dc.parent_object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.columns c ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id
    WHERE s.name = @P1
    ORDER BY t.name, c.column_id
"#;

/// bb8 connection manager for tiberius clients.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port());
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

fn io_error(e: std::io::Error) -> tiberius::error::Error {
    tiberius::error::Error::Io {
        kind: e.kind(),
        message: e.to_string(),
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(io_error)?;
        tcp.set_nodelay(true).ok();

        // Long cursors can sit idle between reads while large objects resolve
        let socket = socket2::SockRef::from(&tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL catalog and row source.
pub struct MssqlSource {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlSource {
    /// Connect and verify the source.
    pub async fn connect(config: &SourceConfig, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MSSQL connection pool"))?;

        let source = Self { pool };
        source.test_connection().await?;

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host,
            config.port(),
            config.database,
            max_size
        );
        Ok(source)
    }

    async fn query(&self, sql: &str, schema: &str, context: &str) -> Result<Vec<tiberius::Row>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))?;
        let mut query = Query::new(sql);
        query.bind(schema.to_string());
        let rows = query.query(&mut *conn).await?.into_first_result().await?;
        debug!("{}: {} rows", context, rows.len());
        Ok(rows)
    }
}

fn text(row: &tiberius::Row, idx: usize) -> Result<String> {
    Ok(row.try_get::<&str, _>(idx)?.unwrap_or_default().to_string())
}

fn int(row: &tiberius::Row, idx: usize) -> Result<i32> {
    Ok(row.try_get::<i32, _>(idx)?.unwrap_or(0))
}

fn flag(row: &tiberius::Row, idx: usize) -> Result<bool> {
    Ok(row.try_get::<bool, _>(idx)?.unwrap_or(false))
}

/// `sys.objects` type codes of each compiled kind.
fn object_types(kind: CompiledKind) -> &'static str {
    match kind {
        CompiledKind::Function => "'FN', 'IF', 'TF'",
        CompiledKind::Procedure => "'P'",
        CompiledKind::View => "'V'",
        CompiledKind::Trigger => "'TR'",
    }
}

#[async_trait]
impl CatalogSource for MssqlSource {
    fn db_kind(&self) -> DbKind {
        DbKind::Mssql
    }

    async fn column_records(&self, schema: &str) -> Result<Vec<ColumnRecord>> {
        self.query(COLUMNS_SQL, schema, "reading MSSQL columns")
            .await?
            .iter()
            .map(|row| {
                let ordinal = int(row, 1)?;
                Ok(ColumnRecord {
                    table: text(row, 0)?,
                    ordinal,
                    column: Column {
                        name: text(row, 2)?,
                        data_type: text(row, 3)?.to_lowercase(),
                        max_length: int(row, 4)?,
                        precision: int(row, 5)?,
                        scale: int(row, 6)?,
                        is_nullable: flag(row, 7)?,
                        is_identity: flag(row, 8)?,
                        ordinal_pos: ordinal,
                    },
                })
            })
            .collect()
    }

    async fn key_records(&self, schema: &str) -> Result<Vec<KeyRecord>> {
        self.query(KEYS_SQL, schema, "reading MSSQL keys")
            .await?
            .iter()
            .map(|row| {
                let kind = match text(row, 4)?.as_str() {
                    "P" => KeyKind::Primary,
                    "U" => KeyKind::UniqueConstraint,
                    "X" => KeyKind::UniqueIndex,
                    _ => KeyKind::Index,
                };
                Ok(KeyRecord {
                    table: text(row, 0)?,
                    key_name: text(row, 1)?,
                    ordinal: int(row, 2)?,
                    column: text(row, 3)?,
                    kind,
                })
            })
            .collect()
    }

    async fn foreign_key_records(&self, schema: &str) -> Result<Vec<ForeignKeyRecord>> {
        self.query(FOREIGN_KEYS_SQL, schema, "reading MSSQL foreign keys")
            .await?
            .iter()
            .map(|row| {
                Ok(ForeignKeyRecord {
                    name: text(row, 0)?,
                    ordinal: int(row, 1)?,
                    parent_table: text(row, 2)?,
                    parent_column: text(row, 3)?,
                    ref_table: text(row, 4)?,
                    ref_column: text(row, 5)?,
                })
            })
            .collect()
    }

    async fn default_records(&self, schema: &str) -> Result<Vec<DefaultRecord>> {
        self.query(DEFAULTS_SQL, schema, "reading MSSQL defaults")
            .await?
            .iter()
            .map(|row| {
                Ok(DefaultRecord {
                    table: text(row, 0)?,
                    column: text(row, 1)?,
                    name: text(row, 2)?,
                    definition: text(row, 3)?,
                })
            })
            .collect()
    }

    async fn compiled_records(&self, schema: &str, kind: CompiledKind) -> Result<Vec<CompiledRecord>> {
        let sql = format!(
            r#"
            SELECT
                o.name,
                CAST(ROW_NUMBER() OVER (PARTITION BY o.object_id ORDER BY sc.colid) AS INT),
                sc.text
            FROM sys.objects o
            JOIN sys.schemas s ON s.schema_id = o.schema_id
            JOIN sys.syscomments sc ON sc.id = o.object_id
            WHERE s.name = @P1 AND o.is_ms_shipped = 0 AND o.type IN ({})
            ORDER BY o.name, sc.colid
            "#,
            object_types(kind)
        );
        self.query(&sql, schema, "reading MSSQL compiled objects")
            .await?
            .iter()
            .map(|row| {
                Ok(CompiledRecord {
                    name: text(row, 0)?,
                    ordinal: int(row, 1)?,
                    text: text(row, 2)?,
                })
            })
            .collect()
    }

    async fn test_connection(&self) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing MSSQL connection"))?;
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }
}

impl RowSource for MssqlSource {
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(opts.channel_capacity.max(1));
        let pool = self.pool.clone();

        tokio::spawn(async move {
            if let Err(e) = read_table_internal(pool, &opts, &tx).await {
                let err = match e {
                    MigrateError::Stream { .. } => e,
                    other => MigrateError::stream(&opts.table, other.to_string()),
                };
                let _ = tx.send(Err(err)).await;
            }
        });

        rx
    }

    fn can_stream(&self, column: &Column) -> bool {
        !UNSTREAMABLE.contains(&column.data_type.to_lowercase().as_str())
    }
}

fn quote(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Select list entry; xml is delivered as text.
fn select_expr(column: &Column) -> String {
    let name = quote(&column.name);
    match column.data_type.to_lowercase().as_str() {
        "xml" => format!("CAST({} AS NVARCHAR(MAX)) AS {}", name, name),
        _ => name,
    }
}

async fn read_table_internal(
    pool: Pool<TiberiusConnectionManager>,
    opts: &ReadOptions,
    tx: &mpsc::Sender<Result<Row>>,
) -> Result<()> {
    let mut conn = pool
        .get_owned()
        .await
        .map_err(|e| MigrateError::pool(e, "getting connection for read_table"))?;

    let columns = opts
        .columns
        .iter()
        .map(select_expr)
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM {}.{}",
        columns,
        quote(&opts.schema),
        quote(&opts.table)
    );
    debug!("{}", sql);

    let mut rows = conn.simple_query(sql).await?.into_row_stream();
    while let Some(row) = rows.try_next().await? {
        let values = opts
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| convert_value(&row, idx, &column.data_type))
            .collect::<Result<Row>>()?;
        if tx.send(Ok(values)).await.is_err() {
            // Consumer stopped reading
            break;
        }
    }
    Ok(())
}

/// Convert one field by its source type.
fn convert_value(row: &tiberius::Row, idx: usize, data_type: &str) -> Result<SqlValue> {
    let value = match data_type.to_lowercase().as_str() {
        "bit" => row.try_get::<bool, _>(idx)?.into(),
        "tinyint" => row.try_get::<u8, _>(idx)?.map(|v| v as i16).into(),
        "smallint" => row.try_get::<i16, _>(idx)?.into(),
        "int" => row.try_get::<i32, _>(idx)?.into(),
        "bigint" => row.try_get::<i64, _>(idx)?.into(),
        "real" => row.try_get::<f32, _>(idx)?.map(SqlValue::F32).into(),
        "float" => row.try_get::<f64, _>(idx)?.into(),
        "decimal" | "numeric" => row.try_get::<Decimal, _>(idx)?.into(),
        "money" | "smallmoney" => match row.try_get::<f64, _>(idx)? {
            Some(f) => Decimal::try_from(f)
                .map(|d| SqlValue::Decimal(d.round_dp(4)))
                .unwrap_or(SqlValue::F64(f)),
            None => SqlValue::Null,
        },
        "uniqueidentifier" => row.try_get::<Uuid, _>(idx)?.into(),
        "date" => row.try_get::<NaiveDate, _>(idx)?.into(),
        "time" => row.try_get::<NaiveTime, _>(idx)?.into(),
        "datetime" | "datetime2" | "smalldatetime" => row.try_get::<NaiveDateTime, _>(idx)?.into(),
        "datetimeoffset" => row.try_get::<DateTime<FixedOffset>, _>(idx)?.into(),
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => row
            .try_get::<&[u8], _>(idx)?
            .map(|b| SqlValue::Bytes(b.to_vec()))
            .unwrap_or(SqlValue::Null),
        _ => row.try_get::<&str, _>(idx)?.into(),
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
    fn test_select_expr_casts_xml() {
        assert_eq!(select_expr(&column("doc", "xml")), "CAST([doc] AS NVARCHAR(MAX)) AS [doc]");
        assert_eq!(select_expr(&column("odd]name", "int")), "[odd]]name]");
    }

    #[test]
    fn test_object_types() {
        assert_eq!(object_types(CompiledKind::Function), "'FN', 'IF', 'TF'");
        assert_eq!(object_types(CompiledKind::Trigger), "'TR'");
    }

    #[test]
    fn test_catalog_queries_number_rows_per_parent() {
        for sql in [COLUMNS_SQL, KEYS_SQL, FOREIGN_KEYS_SQL] {
            assert!(sql.contains("ROW_NUMBER() OVER (PARTITION BY"));
            assert!(sql.contains("@P1"));
        }
    }

    #[test]
    fn test_columns_resolve_clr_and_alias_types() {
        // CLR types share system_type_id 240, so the join must use user_type_id.
        assert!(COLUMNS_SQL.contains("ty.user_type_id = c.user_type_id"));
        assert!(!COLUMNS_SQL.contains("= c.system_type_id"));
        assert!(COLUMNS_SQL.contains("THEN TYPE_NAME(c.system_type_id)"));
        assert!(COLUMNS_SQL.contains("ty.is_assembly_type = 0"));
    }

    #[test]
    fn test_filtered_indexes_skipped() {
        assert!(KEYS_SQL.contains("i.has_filter = 0"));
    }
}
