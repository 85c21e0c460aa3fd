//! Catalog reader.
//!
//! Pulls flat, ordinal-tagged record sequences from a [`CatalogSource`] and
//! folds them into nested table descriptors with [`group_by_ordinal`]. The
//! reader never sorts: drivers are responsible for delivering each record
//! class in grouping order.

mod group;
pub mod records;

pub use group::{group_by_ordinal, Group};

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::core::schema::{
    ColumnDefault, CompiledKind, CompiledObject, ForeignKey, Key, KeyKind, Table,
};
use crate::core::traits::CatalogSource;
use crate::error::{MigrateError, Result};

use records::{ColumnRecord, CompiledRecord, DefaultRecord, ForeignKeyRecord, KeyRecord};

/// Everything the planner and emitter need from the source.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Tables in catalog order.
    pub tables: Vec<Table>,
    /// Compiled objects in section order.
    pub compiled: Vec<CompiledObject>,
}

impl Catalog {
    /// Index of a table by name (case-insensitive).
    pub fn table_index(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.is_named(name))
    }

    /// Every foreign key, each reported once through its owning table.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.tables.iter().flat_map(|t| t.foreign_keys.iter())
    }
}

/// Table-name filters applied while reading.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    ignore: Vec<String>,
    only: Vec<String>,
}

impl CatalogFilter {
    pub fn new(ignore: Vec<String>, only: Vec<String>) -> Self {
        Self { ignore, only }
    }

    pub fn from_config(migration: &MigrationConfig) -> Self {
        Self::new(migration.ignore_tables.clone(), migration.tables.clone())
    }

    /// Whether the table passes both the ignore-list and the subset.
    pub fn admits(&self, table: &str) -> bool {
        let ignored = self.ignore.iter().any(|n| n.eq_ignore_ascii_case(table));
        let selected = self.only.is_empty() || self.only.iter().any(|n| n.eq_ignore_ascii_case(table));
        !ignored && selected
    }

    /// Whether a target subset is in effect.
    pub fn is_subset(&self) -> bool {
        !self.only.is_empty()
    }

    fn named(&self) -> impl Iterator<Item = &String> {
        self.ignore.iter().chain(self.only.iter())
    }
}

/// Reads and assembles the catalog of one schema.
pub struct CatalogReader<'a> {
    source: &'a dyn CatalogSource,
    schema: String,
    filter: CatalogFilter,
}

impl<'a> CatalogReader<'a> {
    pub fn new(source: &'a dyn CatalogSource, schema: impl Into<String>, filter: CatalogFilter) -> Self {
        Self {
            source,
            schema: schema.into(),
            filter,
        }
    }

    /// Run every catalog pass and assemble the result.
    pub async fn read(&self) -> Result<Catalog> {
        let schema = self.schema.as_str();

        let columns = self
            .source
            .column_records(schema)
            .await
            .map_err(|e| catalog_error("columns", e))?;
        debug!("Read {} column records", columns.len());
        let mut tables = assemble_tables(schema, columns, &self.filter);

        for name in self.filter.named() {
            if !tables.iter().any(|t| t.is_named(name)) {
                warn!("Table '{}' named in configuration was not found in schema {}", name, schema);
            }
        }

        let keys = self
            .source
            .key_records(schema)
            .await
            .map_err(|e| catalog_error("keys", e))?;
        debug!("Read {} key records", keys.len());
        attach_keys(&mut tables, keys);

        let fks = self
            .source
            .foreign_key_records(schema)
            .await
            .map_err(|e| catalog_error("foreign keys", e))?;
        debug!("Read {} foreign key records", fks.len());
        attach_foreign_keys(&mut tables, fks);

        let defaults = self
            .source
            .default_records(schema)
            .await
            .map_err(|e| catalog_error("defaults", e))?;
        debug!("Read {} default records", defaults.len());
        attach_defaults(&mut tables, defaults);

        // A table subset run leaves compiled objects alone.
        let mut compiled = Vec::new();
        if !self.filter.is_subset() {
            for kind in CompiledKind::ALL {
                let records = self
                    .source
                    .compiled_records(schema, kind)
                    .await
                    .map_err(|e| catalog_error(kind.label(), e))?;
                debug!("Read {} {} fragments", records.len(), kind.label());
                compiled.extend(assemble_compiled(kind, records));
            }
        }

        info!(
            "Catalog: {} tables, {} foreign keys, {} compiled objects",
            tables.len(),
            tables.iter().map(|t| t.foreign_keys.len()).sum::<usize>(),
            compiled.len()
        );

        Ok(Catalog { tables, compiled })
    }
}

fn catalog_error(pass: &str, err: MigrateError) -> MigrateError {
    match err {
        MigrateError::Cancelled => err,
        other => MigrateError::Catalog(format!("reading {}: {}", pass, other)),
    }
}

/// Build tables from column records, dropping filtered tables first.
pub fn assemble_tables(schema: &str, records: Vec<ColumnRecord>, filter: &CatalogFilter) -> Vec<Table> {
    let admitted: Vec<_> = records
        .into_iter()
        .filter(|r| filter.admits(&r.table))
        .collect();

    group_by_ordinal(admitted, |r| r.ordinal, |r| r.table.clone())
        .into_iter()
        .map(|group| {
            let mut table = Table::new(schema, group.key);
            table.columns = group.rows.into_iter().map(|r| r.column).collect();
            table
        })
        .collect()
}

/// Attach keys and indexes to their tables.
pub fn attach_keys(tables: &mut [Table], records: Vec<KeyRecord>) {
    let known = table_names(tables);
    let admitted: Vec<_> = records
        .into_iter()
        .filter(|r| known.contains(&r.table.to_lowercase()))
        .collect();

    for group in group_by_ordinal(admitted, |r| r.ordinal, |r| (r.table.clone(), r.key_name.clone())) {
        let kind = group.rows[0].kind;
        let (table_name, key_name) = group.key;
        let key = Key {
            name: key_name,
            columns: group.rows.into_iter().map(|r| r.column).collect(),
            kind,
        };
        if let Some(table) = tables.iter_mut().find(|t| t.is_named(&table_name)) {
            if kind == KeyKind::Primary {
                table.primary_key = Some(key);
            } else {
                table.keys.push(key);
            }
        }
    }
}

/// Attach each foreign key to its owning table and to the table it references.
///
/// A key owned by a table outside the set that references a table inside it
/// is recorded on the referenced side only, so the planner can drop it before
/// that table is dropped. Keys referencing a table outside the set are dropped.
pub fn attach_foreign_keys(tables: &mut [Table], records: Vec<ForeignKeyRecord>) {
    let known = table_names(tables);

    for group in group_by_ordinal(records, |r| r.ordinal, |r| r.name.clone()) {
        let first = &group.rows[0];
        let fk = ForeignKey {
            name: group.key.clone(),
            parent_table: first.parent_table.clone(),
            columns: group.rows.iter().map(|r| r.parent_column.clone()).collect(),
            ref_table: first.ref_table.clone(),
            ref_columns: group.rows.iter().map(|r| r.ref_column.clone()).collect(),
        };

        if !known.contains(&fk.ref_table.to_lowercase()) {
            debug!(
                "Dropping foreign key {} ({} -> {}): outside the migrated table set",
                fk.name, fk.parent_table, fk.ref_table
            );
            continue;
        }
        if !known.contains(&fk.parent_table.to_lowercase()) {
            debug!(
                "Foreign key {} ({} -> {}) is owned by a table outside the migrated set",
                fk.name, fk.parent_table, fk.ref_table
            );
        }

        if let Some(referenced) = tables.iter_mut().find(|t| t.is_named(&fk.ref_table)) {
            referenced.referencing_keys.push(fk.clone());
        }
        if let Some(owner) = tables.iter_mut().find(|t| t.is_named(&fk.parent_table)) {
            owner.foreign_keys.push(fk);
        }
    }
}

/// Attach column defaults to their tables.
pub fn attach_defaults(tables: &mut [Table], records: Vec<DefaultRecord>) {
    for record in records {
        if let Some(table) = tables.iter_mut().find(|t| t.is_named(&record.table)) {
            table.defaults.push(ColumnDefault {
                table: table.name.clone(),
                column: record.column,
                name: record.name,
                definition: record.definition,
            });
        }
    }
}

/// Concatenate ordered text fragments into compiled objects.
pub fn assemble_compiled(kind: CompiledKind, records: Vec<CompiledRecord>) -> Vec<CompiledObject> {
    group_by_ordinal(records, |r| r.ordinal, |r| r.name.clone())
        .into_iter()
        .map(|group| CompiledObject {
            kind,
            name: group.key,
            text: group
                .rows
                .into_iter()
                .map(|r| r.text)
                .collect::<String>()
                .trim()
                .to_string(),
        })
        .collect()
}

fn table_names(tables: &[Table]) -> HashSet<String> {
    tables.iter().map(|t| t.name.to_lowercase()).collect()
}
