//! Walks every database descriptor and applies its rules.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::datasource::{DataSourceRegistry, Lookup};
use crate::descriptor::{DatabaseDescriptor, TableEntryDescriptor};
use crate::identity::Identity;
use crate::query::QueryCatalog;
use crate::session::RewriteSession;
use crate::strategy::{self, RewritePlan, RewriteScenario, SkipReason};

/// What happened to one table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum EntryOutcome {
    Rewritten { scenario: RewriteScenario, rows: usize },
    TableMissing,
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub table: String,
    pub column: String,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

/// What happened to one database descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseOutcome {
    Completed,
    /// No datasource carries the descriptor's name.
    Unmatched,
    /// More than one datasource carries the descriptor's name.
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseReport {
    pub database: String,
    pub outcome: DatabaseOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    pub entries: Vec<EntryReport>,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub databases: Vec<DatabaseReport>,
}

impl RunReport {
    /// Total rows touched across every database.
    pub fn rows_rewritten(&self) -> usize {
        self.entries()
            .filter_map(|e| match e.outcome {
                EntryOutcome::Rewritten { rows, .. } => Some(rows),
                _ => None,
            })
            .sum()
    }

    /// Entries whose statement ran, whether or not it matched rows.
    pub fn entries_rewritten(&self) -> usize {
        self.entries()
            .filter(|e| matches!(e.outcome, EntryOutcome::Rewritten { .. }))
            .count()
    }

    fn entries(&self) -> impl Iterator<Item = &EntryReport> {
        self.databases.iter().flat_map(|d| d.entries.iter())
    }
}

/// Applies an anonymization plan for one identity.
pub struct Executor<'a> {
    identity: &'a Identity,
    registry: &'a DataSourceRegistry,
    databases: &'a [DatabaseDescriptor],
    overrides: QueryCatalog,
}

impl<'a> Executor<'a> {
    pub fn new(
        identity: &'a Identity,
        registry: &'a DataSourceRegistry,
        databases: &'a [DatabaseDescriptor],
    ) -> Self {
        Self {
            identity,
            registry,
            databases,
            overrides: QueryCatalog::default(),
        }
    }

    /// Uses operator query templates on top of the built-in ones.
    pub fn with_overrides(mut self, overrides: QueryCatalog) -> Self {
        self.overrides = overrides;
        self
    }

    /// Runs every descriptor in order.
    ///
    /// Stops at the first fatal error. Statements already committed, in this
    /// or earlier databases, stay committed.
    pub fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();

        for database in self.databases {
            let db_report = match self.registry.find(database) {
                Lookup::Found(source) => {
                    let mut session = RewriteSession::open(&database.name, source, &self.overrides)?;
                    let entries = self.rewrite_database(&mut session, database)?;
                    DatabaseReport {
                        database: database.name.clone(),
                        outcome: DatabaseOutcome::Completed,
                        product: Some(session.metadata().product_name.clone()),
                        entries,
                    }
                }
                Lookup::Missing => {
                    warn!(database = %database.name, "no datasource matches database, skipping");
                    skipped_database(database, DatabaseOutcome::Unmatched)
                }
                Lookup::Ambiguous(count) => {
                    warn!(database = %database.name, count, "several datasources match database, skipping");
                    skipped_database(database, DatabaseOutcome::Ambiguous)
                }
            };
            report.databases.push(db_report);
        }

        info!(
            databases = report.databases.len(),
            entries = report.entries_rewritten(),
            rows = report.rows_rewritten(),
            "pseudonymization finished"
        );

        Ok(report)
    }

    fn rewrite_database(
        &self,
        session: &mut RewriteSession,
        database: &DatabaseDescriptor,
    ) -> Result<Vec<EntryReport>> {
        info!(database = %database.name, entries = database.tables.len(), "rewriting database");

        database
            .tables
            .iter()
            .map(|entry| {
                let outcome = self.rewrite_entry(session, entry)?;
                Ok(EntryReport {
                    table: entry.table_name.clone(),
                    column: entry.column_name.clone(),
                    outcome,
                })
            })
            .collect()
    }

    fn rewrite_entry(
        &self,
        session: &mut RewriteSession,
        entry: &TableEntryDescriptor,
    ) -> Result<EntryOutcome> {
        let scenario = strategy::select(entry, self.identity)?;

        if !session.table_exists(&entry.table_name)? {
            warn!(table = %entry.table_name, "table not found, skipping");
            return Ok(EntryOutcome::TableMissing);
        }

        match scenario.plan(entry, self.identity)? {
            RewritePlan::Execute { key, bindings } => {
                let rows = session.execute(key, &bindings, &entry.table_name)?;
                debug!(
                    table = %entry.table_name,
                    column = %entry.column_name,
                    scenario = scenario.number(),
                    rows,
                    "rewrote entry"
                );
                Ok(EntryOutcome::Rewritten { scenario, rows })
            }
            RewritePlan::Skip(reason) => {
                warn!(table = %entry.table_name, column = %entry.column_name, %reason, "skipping entry");
                Ok(EntryOutcome::Skipped { reason })
            }
        }
    }
}

fn skipped_database(database: &DatabaseDescriptor, outcome: DatabaseOutcome) -> DatabaseReport {
    DatabaseReport {
        database: database.name.clone(),
        outcome,
        product: None,
        entries: Vec::new(),
    }
}
