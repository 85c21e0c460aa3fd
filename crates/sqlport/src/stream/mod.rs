//! Row streaming pipeline.
//!
//! For one table: open the source cursor, resolve each row's large-object
//! fields concurrently, and hand completed rows to the emitter in cursor
//! order.
//!
//! ```text
//! Idle -> Opened -> Streaming -> Drained -> Finalized
//! ```
//!
//! `Drained` requires both that the cursor has ended and that no row is
//! still resolving. Row futures live in a [`FuturesOrdered`] bounded by
//! `max_in_flight`; the cursor is not polled while the set is full, so the
//! bounded channel pushes back on the source.

use futures::future::{try_join_all, BoxFuture};
use futures::stream::{FuturesOrdered, StreamExt};
use futures::FutureExt;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::schema::Column;
use crate::core::traits::{ReadOptions, RowSource};
use crate::core::value::{Row, SqlValue};
use crate::emit::TableEmitter;
use crate::error::{MigrateError, Result};
use crate::sink::ScriptSink;

/// Lifecycle of one table stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Opened,
    Streaming,
    Drained,
    Finalized,
}

/// Counters for one streamed table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub rows: u64,
    /// Large-object fields read through the secondary reader.
    pub lob_reads: u64,
    /// Columns replaced by NULL because the driver cannot deliver them.
    pub substituted_columns: Vec<String>,
}

/// Streams tables from a row source into a script sink.
pub struct TableStreamer<'a> {
    source: &'a dyn RowSource,
    schema: String,
    max_in_flight: usize,
    read_ahead: usize,
    cancel: CancellationToken,
}

impl<'a> TableStreamer<'a> {
    pub fn new(
        source: &'a dyn RowSource,
        schema: impl Into<String>,
        max_in_flight: usize,
        read_ahead: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            schema: schema.into(),
            max_in_flight: max_in_flight.max(1),
            read_ahead: read_ahead.max(1),
            cancel,
        }
    }

    /// Stream every row of the emitter's table into the sink.
    pub async fn stream_table<W>(
        &self,
        emitter: &mut TableEmitter<'_>,
        sink: &mut ScriptSink<W>,
    ) -> Result<StreamStats>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let table = emitter.table();
        let mut state = StreamState::Idle;
        let mut stats = StreamStats::default();

        // Columns the driver cannot deliver are left out of the select list
        // and filled with NULL.
        let mut selected: Vec<Column> = Vec::with_capacity(table.columns.len());
        let mut slots: Vec<Option<usize>> = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            if self.source.can_stream(column) {
                slots.push(Some(selected.len()));
                selected.push(column.clone());
            } else {
                warn!(
                    "{}.{}: type {} cannot be streamed; NULL substituted",
                    table.name, column.name, column.data_type
                );
                stats.substituted_columns.push(column.name.clone());
                slots.push(None);
            }
        }

        let mut cursor = self.source.read_table(ReadOptions {
            schema: self.schema.clone(),
            table: table.name.clone(),
            columns: selected,
            channel_capacity: self.read_ahead,
        });
        sink.write(&emitter.begin()).await?;
        transition(&table.name, &mut state, StreamState::Opened);

        let mut in_flight: FuturesOrdered<BoxFuture<'static, Result<Row>>> = FuturesOrdered::new();
        let mut cursor_open = true;

        while cursor_open || !in_flight.is_empty() {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    return Err(MigrateError::Cancelled);
                }

                Some(resolved) = in_flight.next(), if !in_flight.is_empty() => {
                    let row = resolved?;
                    let text = emitter.emit_row(&row)?;
                    sink.write(&text).await?;
                }

                received = cursor.recv(), if cursor_open && in_flight.len() < self.max_in_flight => {
                    match received {
                        Some(row) => {
                            let row = widen(row?, &slots, &table.name)?;
                            stats.lob_reads += row.iter().filter(|v| v.is_deferred()).count() as u64;
                            in_flight.push_back(resolve(row));
                            if state == StreamState::Opened {
                                transition(&table.name, &mut state, StreamState::Streaming);
                            }
                        }
                        None => cursor_open = false,
                    }
                }
            }
        }
        transition(&table.name, &mut state, StreamState::Drained);

        sink.write(&emitter.finish()).await?;
        transition(&table.name, &mut state, StreamState::Finalized);

        stats.rows = emitter.rows_written();
        debug!("{}: {} rows, {} large objects", table.name, stats.rows, stats.lob_reads);
        Ok(stats)
    }
}

fn transition(table: &str, state: &mut StreamState, next: StreamState) {
    trace!("{}: {:?} -> {:?}", table, state, next);
    *state = next;
}

/// Place selected values into table column order, filling skipped columns with NULL.
fn widen(row: Row, slots: &[Option<usize>], table: &str) -> Result<Row> {
    let selected = slots.iter().filter(|s| s.is_some()).count();
    if row.len() != selected {
        return Err(MigrateError::stream(
            table,
            format!("cursor returned {} values, expected {}", row.len(), selected),
        ));
    }
    if selected == slots.len() {
        return Ok(row);
    }
    let mut values = row.into_iter();
    Ok(slots
        .iter()
        .map(|slot| match slot {
            Some(_) => values.next().unwrap_or(SqlValue::Null),
            None => SqlValue::Null,
        })
        .collect())
}

/// Future that materializes every large-object field of a row.
fn resolve(row: Row) -> BoxFuture<'static, Result<Row>> {
    async move {
        if !row.iter().any(SqlValue::is_deferred) {
            return Ok(row);
        }
        try_join_all(row.into_iter().map(|value| async move {
            match value {
                SqlValue::LargeObject(lob) => lob.materialize().await,
                other => Ok(other),
            }
        }))
        .await
    }
    .boxed()
}
