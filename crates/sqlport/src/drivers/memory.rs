//! In-memory source driver.
//!
//! Holds catalog records and table rows in plain vectors. Compiled for tests
//! only, where it stands in for a live database behind the catalog reader,
//! streaming pipeline and run controller. Large objects can be given a read
//! delay to simulate slow secondary reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::catalog::records::{
    ColumnRecord, CompiledRecord, DefaultRecord, ForeignKeyRecord, KeyRecord,
};
use crate::core::schema::{Column, CompiledKind};
use crate::core::traits::{CatalogSource, LobReader, ReadOptions, RowSource};
use crate::core::value::{LargeObject, LobKind, Row, SqlValue};
use crate::dialect::DbKind;
use crate::error::{MigrateError, Result};

/// Large-object store shared by every handle the source hands out.
#[derive(Default)]
pub struct MemoryLobStore {
    objects: Mutex<HashMap<i64, (Vec<u8>, Duration)>>,
    reads: AtomicU64,
}

impl MemoryLobStore {
    /// Number of completed reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LobReader for MemoryLobStore {
    async fn read_lob(&self, locator: i64) -> Result<Vec<u8>> {
        let found = self
            .objects
            .lock()
            .map_err(|_| MigrateError::Config("large object store poisoned".into()))?
            .get(&locator)
            .cloned();
        let (bytes, delay) = found.ok_or_else(|| {
            MigrateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("large object {} does not exist", locator),
            ))
        })?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(bytes)
    }
}

/// Source driver backed by in-memory records.
pub struct MemorySource {
    kind: DbKind,
    pub columns: Vec<ColumnRecord>,
    pub keys: Vec<KeyRecord>,
    pub foreign_keys: Vec<ForeignKeyRecord>,
    pub defaults: Vec<DefaultRecord>,
    compiled: HashMap<CompiledKind, Vec<CompiledRecord>>,
    rows: HashMap<String, Vec<Row>>,
    failures: HashMap<String, usize>,
    unstreamable: Vec<String>,
    lobs: Arc<MemoryLobStore>,
}

impl MemorySource {
    pub fn new(kind: DbKind) -> Self {
        Self {
            kind,
            columns: Vec::new(),
            keys: Vec::new(),
            foreign_keys: Vec::new(),
            defaults: Vec::new(),
            compiled: HashMap::new(),
            rows: HashMap::new(),
            failures: HashMap::new(),
            unstreamable: Vec::new(),
            lobs: Arc::new(MemoryLobStore::default()),
        }
    }

    /// Append a text fragment of a compiled object.
    pub fn add_compiled(&mut self, kind: CompiledKind, record: CompiledRecord) {
        self.compiled.entry(kind).or_default().push(record);
    }

    /// Append the columns of a table in ordinal order.
    pub fn add_table(&mut self, table: &str, columns: Vec<Column>) {
        for (i, mut column) in columns.into_iter().enumerate() {
            let ordinal = i as i32 + 1;
            column.ordinal_pos = ordinal;
            self.columns.push(ColumnRecord {
                table: table.to_string(),
                ordinal,
                column,
            });
        }
    }

    /// Rows of a table, each holding a value for every column in ordinal order.
    pub fn set_rows(&mut self, table: &str, rows: Vec<Row>) {
        self.rows.insert(table.to_lowercase(), rows);
    }

    /// Make the cursor of a table fail after delivering `after` rows.
    pub fn fail_after(&mut self, table: &str, after: usize) {
        self.failures.insert(table.to_lowercase(), after);
    }

    /// Treat a source type as one the driver cannot deliver.
    pub fn mark_unstreamable(&mut self, data_type: &str) {
        self.unstreamable.push(data_type.to_lowercase());
    }

    /// Store a large object and return a handle to it.
    pub fn add_lob(
        &mut self,
        table: &str,
        column: &str,
        locator: i64,
        kind: LobKind,
        bytes: Vec<u8>,
        delay: Duration,
    ) -> SqlValue {
        if let Ok(mut objects) = self.lobs.objects.lock() {
            objects.insert(locator, (bytes, delay));
        }
        let reader: Arc<dyn LobReader> = self.lobs.clone();
        SqlValue::LargeObject(LargeObject::new(table, column, locator, kind, reader))
    }

    pub fn lob_store(&self) -> Arc<MemoryLobStore> {
        self.lobs.clone()
    }

    fn column_order(&self, table: &str) -> Vec<String> {
        self.columns
            .iter()
            .filter(|r| r.table.eq_ignore_ascii_case(table))
            .map(|r| r.column.name.to_lowercase())
            .collect()
    }
}

#[async_trait]
impl CatalogSource for MemorySource {
    fn db_kind(&self) -> DbKind {
        self.kind
    }

    async fn column_records(&self, _schema: &str) -> Result<Vec<ColumnRecord>> {
        Ok(self.columns.clone())
    }

    async fn key_records(&self, _schema: &str) -> Result<Vec<KeyRecord>> {
        Ok(self.keys.clone())
    }

    async fn foreign_key_records(&self, _schema: &str) -> Result<Vec<ForeignKeyRecord>> {
        Ok(self.foreign_keys.clone())
    }

    async fn default_records(&self, _schema: &str) -> Result<Vec<DefaultRecord>> {
        Ok(self.defaults.clone())
    }

    async fn compiled_records(
        &self,
        _schema: &str,
        kind: CompiledKind,
    ) -> Result<Vec<CompiledRecord>> {
        Ok(self.compiled.get(&kind).cloned().unwrap_or_default())
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }
}

impl RowSource for MemorySource {
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(opts.channel_capacity.max(1));

        let order = self.column_order(&opts.table);
        let positions: Vec<Option<usize>> = opts
            .columns
            .iter()
            .map(|c| order.iter().position(|n| n.eq_ignore_ascii_case(&c.name)))
            .collect();
        let rows = self
            .rows
            .get(&opts.table.to_lowercase())
            .cloned()
            .unwrap_or_default();
        let fail_after = self.failures.get(&opts.table.to_lowercase()).copied();
        let table = opts.table;

        tokio::spawn(async move {
            for (n, row) in rows.into_iter().enumerate() {
                if fail_after == Some(n) {
                    let _ = tx
                        .send(Err(MigrateError::stream(&table, "cursor failed")))
                        .await;
                    return;
                }
                let projected: Row = positions
                    .iter()
                    .map(|p| p.and_then(|i| row.get(i).cloned()).unwrap_or(SqlValue::Null))
                    .collect();
                if tx.send(Ok(projected)).await.is_err() {
                    // Consumer went away
                    return;
                }
            }
            if fail_after.is_some() {
                let _ = tx
                    .send(Err(MigrateError::stream(&table, "cursor failed")))
                    .await;
            }
        });

        rx
    }

    fn can_stream(&self, column: &Column) -> bool {
        !self.unstreamable.contains(&column.data_type.to_lowercase())
    }
}
