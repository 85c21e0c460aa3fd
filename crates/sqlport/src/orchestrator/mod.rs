//! Run controller - drives one migration script from catalog to closed sink.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, CatalogFilter, CatalogReader};
use crate::config::Config;
use crate::core::traits::SourceReader;
use crate::dialect::{MapOptions, TypeMapper};
use crate::drivers::{connect_source, DialectImpl};
use crate::emit::ScriptEmitter;
use crate::error::{MigrateError, Result};
use crate::plan::{build_plan, Operation, Plan, Strategy};
use crate::sink::ScriptSink;
use crate::stream::TableStreamer;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    dialect: DialectImpl,
    mapper: TypeMapper,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Source engine.
    pub source: String,

    /// Target dialect.
    pub target: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables in the catalog after filtering.
    pub tables_total: usize,

    /// Tables whose data was written.
    pub tables_loaded: usize,

    /// Total INSERT rows written.
    pub rows_written: u64,

    /// Large-object fields read on the secondary connection.
    pub lob_reads: u64,

    /// Columns whose type was copied verbatim for lack of a rule.
    pub passthrough_types: usize,

    /// Columns mapped with a documented loss of range or precision.
    pub lossy_types: usize,

    /// Script bytes written, BOM included.
    pub bytes_written: u64,
}

/// Counters gathered while executing a plan.
#[derive(Debug, Default)]
struct RunTotals {
    tables_loaded: usize,
    rows_written: u64,
    lob_reads: u64,
    passthrough_types: usize,
    lossy_types: usize,
}

impl Orchestrator {
    /// Create a new orchestrator connected to the configured source.
    pub async fn new(config: Config) -> Result<Self> {
        let source = connect_source(&config.source, config.migration.max_source_connections).await?;
        Self::with_source(config, source)
    }

    /// Create an orchestrator over an already-open source.
    pub fn with_source(config: Config, source: Arc<dyn SourceReader>) -> Result<Self> {
        let dialect = DialectImpl::for_kind(config.target.r#type)?;
        let mapper = TypeMapper::new(MapOptions {
            force_case_insensitive: config.migration.force_case_insensitive,
        });
        Ok(Self {
            config,
            source,
            dialect,
            mapper,
        })
    }

    /// Verify the source answers.
    pub async fn health_check(&self) -> Result<()> {
        self.source.test_connection().await?;
        info!(
            "Source {} at {}:{} is reachable",
            self.config.source.r#type,
            self.config.source.host,
            self.config.source.port()
        );
        Ok(())
    }

    /// Read the catalog and list the operations a run would perform.
    pub async fn plan(&self) -> Result<Vec<String>> {
        let catalog = self.read_catalog().await?;
        let plan = self.build(&catalog)?;
        Ok(plan.describe(&catalog))
    }

    /// Run the migration into `sink`.
    ///
    /// The sink is closed on every path; its writer is handed back on success.
    pub async fn run<W>(
        &self,
        mut sink: ScriptSink<W>,
        cancel: CancellationToken,
    ) -> Result<(MigrationResult, W)>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting migration run: {}", run_id);
        info!("Config hash: {}", self.config.hash());
        info!(
            "{} -> {} (schema {})",
            self.source.db_kind(),
            self.config.target.r#type,
            self.config.source.schema()
        );

        let outcome = self.execute(&mut sink, &cancel).await;
        let bytes_written = sink.bytes_written();

        let (tables_total, totals) = match outcome {
            Ok(done) => done,
            Err(e) => {
                if let Err(close_err) = sink.close().await {
                    error!("Closing script output failed: {}", close_err);
                }
                return Err(e);
            }
        };
        let writer = sink.close().await?;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = MigrationResult {
            run_id,
            status: "completed".to_string(),
            source: self.source.db_kind().to_string(),
            target: self.config.target.r#type.to_string(),
            started_at,
            completed_at,
            duration_seconds: duration,
            tables_total,
            tables_loaded: totals.tables_loaded,
            rows_written: totals.rows_written,
            lob_reads: totals.lob_reads,
            passthrough_types: totals.passthrough_types,
            lossy_types: totals.lossy_types,
            bytes_written,
        };

        info!(
            "Migration {}: {} tables, {} rows, {} bytes in {:.1}s",
            result.status,
            result.tables_loaded,
            result.rows_written,
            result.bytes_written,
            result.duration_seconds
        );
        if result.passthrough_types > 0 {
            warn!(
                "{} column types were copied verbatim and need review",
                result.passthrough_types
            );
        }

        Ok((result, writer))
    }

    async fn read_catalog(&self) -> Result<Catalog> {
        info!("Phase 1: Reading catalog");
        let filter = CatalogFilter::from_config(&self.config.migration);
        CatalogReader::new(self.source.as_catalog(), self.config.source.schema(), filter)
            .read()
            .await
    }

    fn build(&self, catalog: &Catalog) -> Result<Plan> {
        let migration = &self.config.migration;
        let strategy = Strategy::from_config(&migration.create_table, migration.reload);
        let prelude = !self
            .dialect
            .as_dialect()
            .prelude(migration.force_case_insensitive)
            .is_empty();
        let plan = build_plan(catalog, &strategy, prelude);
        plan.validate(catalog)?;
        debug!("Plan: {} operations ({:?})", plan.operations.len(), strategy);
        Ok(plan)
    }

    async fn execute<W>(
        &self,
        sink: &mut ScriptSink<W>,
        cancel: &CancellationToken,
    ) -> Result<(usize, RunTotals)>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let catalog = self.read_catalog().await?;
        if cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        info!("Phase 2: Planning");
        let plan = self.build(&catalog)?;

        let dialect = self.dialect.as_dialect();
        let migration = &self.config.migration;
        let emitter = ScriptEmitter::new(
            dialect,
            &self.mapper,
            self.source.db_kind(),
            migration.data_batch_size,
            migration.force_case_insensitive,
        );
        let streamer = TableStreamer::new(
            self.source.as_rows(),
            self.config.source.schema(),
            migration.max_in_flight_rows,
            migration.read_ahead_rows,
            cancel.clone(),
        );

        let mut totals = self.review_mappings(&catalog, &emitter);

        info!("Phase 3: Writing script ({} operations)", plan.operations.len());
        for op in &plan.operations {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            match op {
                Operation::LoadData(i) => {
                    let table = catalog
                        .tables
                        .get(*i)
                        .ok_or_else(|| MigrateError::Plan(format!("unknown table index {}", i)))?;
                    let mut table_emitter = emitter.table_emitter(table, emitter.layout(table));
                    let stats = streamer.stream_table(&mut table_emitter, sink).await?;
                    info!("{}: {} rows", table.name, stats.rows);
                    totals.tables_loaded += 1;
                    totals.rows_written += stats.rows;
                    totals.lob_reads += stats.lob_reads;
                }
                other => sink.write(&emitter.render(other, &catalog)?).await?,
            }
        }

        Ok((catalog.tables.len(), totals))
    }

    /// Log each lossy or passthrough column once and count them.
    fn review_mappings(&self, catalog: &Catalog, emitter: &ScriptEmitter<'_>) -> RunTotals {
        let mut totals = RunTotals::default();
        let mut seen = HashSet::new();
        for table in &catalog.tables {
            for column in emitter.layout(table) {
                let Some(warning) = &column.mapping.warning else {
                    continue;
                };
                if !seen.insert((table.name.to_lowercase(), column.name.to_lowercase())) {
                    continue;
                }
                if column.mapping.passthrough {
                    totals.passthrough_types += 1;
                } else if column.mapping.is_lossy {
                    totals.lossy_types += 1;
                }
                warn!("{}.{}: {}", table.name, column.name, warning);
            }
        }
        totals
    }
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
