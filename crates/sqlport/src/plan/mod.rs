//! Dependency sequencer.
//!
//! Orders table-level operations so that the script can run against a target
//! with enforced referential integrity. Two strategies are supported:
//!
//! - **Full recreate**: drop foreign keys, then drop, create and load each
//!   table; keys, foreign keys, defaults and compiled objects follow.
//! - **In-place refresh**: suspend constraint checks, drop and recreate an
//!   optional subset of tables, reload data, restore the dropped foreign
//!   keys and re-enable checks.
//!
//! [`Plan::validate`] enforces that no foreign key is created before the data
//! of both of its tables has been loaded.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::catalog::Catalog;
use crate::config::{CreateTable, ReloadScope};
use crate::core::schema::{CompiledKind, ForeignKey};
use crate::error::{MigrateError, Result};

/// How the target is brought in line with the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Drop and recreate every table.
    FullRecreate,
    /// Keep existing tables, recreating only the named ones.
    Refresh {
        recreate: Vec<String>,
        reload: ReloadScope,
    },
}

impl Strategy {
    pub fn from_config(create_table: &CreateTable, reload: ReloadScope) -> Self {
        match create_table {
            CreateTable::All(true) => Strategy::FullRecreate,
            CreateTable::All(false) => Strategy::Refresh {
                recreate: Vec::new(),
                reload,
            },
            CreateTable::Only(names) => Strategy::Refresh {
                recreate: names.clone(),
                reload,
            },
        }
    }
}

/// Script section headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Prelude,
    DropForeignKeys,
    DisableConstraints,
    Tables,
    Data,
    Keys,
    ForeignKeys,
    Defaults,
    EnableConstraints,
    Compiled(CompiledKind),
}

impl Section {
    pub fn title(&self) -> &'static str {
        match self {
            Section::Prelude => "prelude",
            Section::DropForeignKeys => "drop foreign keys",
            Section::DisableConstraints => "disable constraints",
            Section::Tables => "tables",
            Section::Data => "data",
            Section::Keys => "indexes",
            Section::ForeignKeys => "foreign keys",
            Section::Defaults => "defaults",
            Section::EnableConstraints => "enable constraints",
            Section::Compiled(kind) => kind.label(),
        }
    }
}

/// One step of the script. Table operations carry an index into
/// [`Catalog::tables`]; compiled objects an index into [`Catalog::compiled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Section(Section),
    Prelude,
    DropForeignKey(ForeignKey),
    DisableConstraints(usize),
    DropTable(usize),
    CreateTable(usize),
    Truncate(usize),
    LoadData(usize),
    CreateKeys(usize),
    CreateForeignKey(ForeignKey),
    CreateDefaults(usize),
    EnableConstraints(usize),
    Compiled(usize),
}

/// Ordered list of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub operations: Vec<Operation>,
}

impl Plan {
    /// Number of tables whose data the plan loads.
    pub fn loaded_tables(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::LoadData(_)))
            .count()
    }

    /// Check ordering rules against the catalog the plan was built from.
    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        let mut loaded_at: HashMap<usize, usize> = HashMap::new();
        let mut dropped_at: HashMap<usize, usize> = HashMap::new();
        let mut fk_dropped_at: HashMap<(String, String), usize> = HashMap::new();

        for (pos, op) in self.operations.iter().enumerate() {
            match op {
                Operation::LoadData(i) => {
                    loaded_at.insert(*i, pos);
                }
                Operation::DropTable(i) => {
                    dropped_at.insert(*i, pos);
                }
                Operation::DropForeignKey(fk) => {
                    fk_dropped_at.insert(fk_key(fk), pos);
                }
                _ => {}
            }
        }

        for (pos, op) in self.operations.iter().enumerate() {
            match op {
                Operation::CreateForeignKey(fk) => {
                    for side in [&fk.parent_table, &fk.ref_table] {
                        let Some(index) = catalog.table_index(side) else {
                            continue;
                        };
                        if let Some(&load) = loaded_at.get(&index) {
                            if load > pos {
                                return Err(MigrateError::Plan(format!(
                                    "foreign key {} is created before the data of {} is loaded",
                                    fk.name, side
                                )));
                            }
                        }
                    }
                }
                Operation::DropTable(i) => {
                    let Some(table) = catalog.tables.get(*i) else {
                        return Err(MigrateError::Plan(format!("unknown table index {}", i)));
                    };
                    for fk in table.foreign_keys.iter().chain(table.referencing_keys.iter()) {
                        match fk_dropped_at.get(&fk_key(fk)) {
                            Some(&drop) if drop < pos => {}
                            _ => {
                                return Err(MigrateError::Plan(format!(
                                    "table {} is dropped while foreign key {} still exists",
                                    table.name, fk.name
                                )));
                            }
                        }
                    }
                }
                Operation::CreateTable(i) => {
                    if let Some(&drop) = dropped_at.get(i) {
                        if drop > pos {
                            return Err(MigrateError::Plan(format!(
                                "table {} is created before it is dropped",
                                catalog.tables[*i].name
                            )));
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Human-readable listing for dry runs.
    pub fn describe(&self, catalog: &Catalog) -> Vec<String> {
        let name = |i: &usize| {
            catalog
                .tables
                .get(*i)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| format!("#{}", i))
        };
        self.operations
            .iter()
            .map(|op| match op {
                Operation::Section(s) => format!("-- {}", s.title()),
                Operation::Prelude => "prelude".to_string(),
                Operation::DropForeignKey(fk) => {
                    format!("drop foreign key {} on {}", fk.name, fk.parent_table)
                }
                Operation::DisableConstraints(i) => format!("disable constraints on {}", name(i)),
                Operation::DropTable(i) => format!("drop table {}", name(i)),
                Operation::CreateTable(i) => format!("create table {}", name(i)),
                Operation::Truncate(i) => format!("truncate {}", name(i)),
                Operation::LoadData(i) => format!("load data {}", name(i)),
                Operation::CreateKeys(i) => format!("create keys on {}", name(i)),
                Operation::CreateForeignKey(fk) => format!(
                    "create foreign key {} ({} -> {})",
                    fk.name, fk.parent_table, fk.ref_table
                ),
                Operation::CreateDefaults(i) => format!("create defaults on {}", name(i)),
                Operation::EnableConstraints(i) => format!("enable constraints on {}", name(i)),
                Operation::Compiled(i) => catalog
                    .compiled
                    .get(*i)
                    .map(|c| format!("{} {}", c.kind.label().trim_end_matches('s'), c.name))
                    .unwrap_or_else(|| format!("compiled #{}", i)),
            })
            .collect()
    }
}

fn fk_key(fk: &ForeignKey) -> (String, String) {
    (fk.parent_table.to_lowercase(), fk.name.to_lowercase())
}

/// Build the operation list for a catalog.
pub fn build_plan(catalog: &Catalog, strategy: &Strategy, prelude: bool) -> Plan {
    let mut ops = Vec::new();
    if prelude {
        ops.push(Operation::Section(Section::Prelude));
        ops.push(Operation::Prelude);
    }
    match strategy {
        Strategy::FullRecreate => full_recreate(catalog, &mut ops),
        Strategy::Refresh { recreate, reload } => refresh(catalog, recreate, *reload, &mut ops),
    }
    Plan { operations: ops }
}

fn full_recreate(catalog: &Catalog, ops: &mut Vec<Operation>) {
    let fks: Vec<ForeignKey> = catalog.foreign_keys().cloned().collect();
    let all = 0..catalog.tables.len();

    // Keys owned by tables left out of the run still block the drops; they
    // are dropped but not recreated.
    let external: Vec<ForeignKey> = catalog
        .tables
        .iter()
        .flat_map(|t| t.referencing_keys.iter())
        .filter(|fk| catalog.table_index(&fk.parent_table).is_none())
        .cloned()
        .collect();
    for fk in &external {
        warn!(
            "Foreign key {} on {} references recreated table {}; it is dropped and not restored",
            fk.name, fk.parent_table, fk.ref_table
        );
    }

    if !fks.is_empty() || !external.is_empty() {
        ops.push(Operation::Section(Section::DropForeignKeys));
        ops.extend(external.into_iter().map(Operation::DropForeignKey));
        ops.extend(fks.iter().cloned().map(Operation::DropForeignKey));
    }

    ops.push(Operation::Section(Section::Tables));
    for i in all.clone() {
        ops.push(Operation::DropTable(i));
        ops.push(Operation::CreateTable(i));
        ops.push(Operation::LoadData(i));
    }

    push_per_table(ops, Section::Keys, all.clone(), |i| {
        catalog.tables[i].all_keys().next().is_some()
    }, Operation::CreateKeys);

    if !fks.is_empty() {
        ops.push(Operation::Section(Section::ForeignKeys));
        ops.extend(fks.into_iter().map(Operation::CreateForeignKey));
    }

    push_per_table(ops, Section::Defaults, all, |i| {
        !catalog.tables[i].defaults.is_empty()
    }, Operation::CreateDefaults);

    for kind in CompiledKind::ALL {
        let objects: Vec<usize> = catalog
            .compiled
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(i, _)| i)
            .collect();
        if !objects.is_empty() {
            ops.push(Operation::Section(Section::Compiled(kind)));
            ops.extend(objects.into_iter().map(Operation::Compiled));
        }
    }
}

fn refresh(catalog: &Catalog, recreate: &[String], reload: ReloadScope, ops: &mut Vec<Operation>) {
    let all = 0..catalog.tables.len();

    let mut subset: Vec<usize> = Vec::new();
    for name in recreate {
        match catalog.table_index(name) {
            Some(i) if !subset.contains(&i) => subset.push(i),
            Some(_) => {}
            None => warn!("Table '{}' listed in create_table is not in the catalog", name),
        }
    }
    subset.sort_unstable();
    let recreated: HashSet<usize> = subset.iter().copied().collect();

    push_per_table(ops, Section::DisableConstraints, all.clone(), |_| true, Operation::DisableConstraints);

    // Every key touching a recreated table, referencing or owned, once each.
    let mut dropped: Vec<ForeignKey> = Vec::new();
    for &i in &subset {
        let table = &catalog.tables[i];
        for fk in table.referencing_keys.iter().chain(table.foreign_keys.iter()) {
            if !dropped.iter().any(|d| fk_key(d) == fk_key(fk)) {
                dropped.push(fk.clone());
            }
        }
    }

    if !subset.is_empty() {
        ops.push(Operation::Section(Section::Tables));
        ops.extend(dropped.iter().cloned().map(Operation::DropForeignKey));
        for &i in &subset {
            ops.push(Operation::DropTable(i));
            ops.push(Operation::CreateTable(i));
        }
    }

    let reloaded: Vec<usize> = match reload {
        ReloadScope::All => all.clone().collect(),
        ReloadScope::Subset => subset.clone(),
    };
    if !reloaded.is_empty() {
        ops.push(Operation::Section(Section::Data));
        for i in reloaded {
            if !recreated.contains(&i) {
                ops.push(Operation::Truncate(i));
            }
            ops.push(Operation::LoadData(i));
        }
    }

    push_per_table(ops, Section::Keys, subset.iter().copied(), |i| {
        catalog.tables[i].all_keys().next().is_some()
    }, Operation::CreateKeys);
    push_per_table(ops, Section::Defaults, subset.iter().copied(), |i| {
        !catalog.tables[i].defaults.is_empty()
    }, Operation::CreateDefaults);

    if !dropped.is_empty() {
        ops.push(Operation::Section(Section::ForeignKeys));
        ops.extend(dropped.into_iter().map(Operation::CreateForeignKey));
    }

    push_per_table(ops, Section::EnableConstraints, all, |_| true, Operation::EnableConstraints);
}

/// Push a section header followed by one operation per selected table,
/// omitting the header when no table qualifies.
fn push_per_table<I, P, F>(ops: &mut Vec<Operation>, section: Section, tables: I, keep: P, op: F)
where
    I: IntoIterator<Item = usize>,
    P: Fn(usize) -> bool,
    F: Fn(usize) -> Operation,
{
    let selected: Vec<usize> = tables.into_iter().filter(|&i| keep(i)).collect();
    if !selected.is_empty() {
        ops.push(Operation::Section(section));
        ops.extend(selected.into_iter().map(op));
    }
}
