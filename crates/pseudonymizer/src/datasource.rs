//! Relational datasources the engine rewrites.
//!
//! The engine needs very little from a database: product name and version
//! for template resolution, statement execution and transaction control.
//! Backends implement [`DataSource`] and [`SqlConnection`]; DuckDB ships
//! built in.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::descriptor::DatabaseDescriptor;
use crate::duckdb::DuckDbDataSource;

/// Error type reported by backend drivers.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for backend driver calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Product information reported by a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseMetadata {
    pub product_name: String,
    pub product_version: String,
}

/// A live connection to one database.
pub trait SqlConnection {
    /// Reads product name and version.
    fn metadata(&mut self) -> BackendResult<DatabaseMetadata>;

    /// Executes a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str) -> BackendResult<usize>;

    /// Runs a query for its success only, discarding any rows.
    fn probe(&mut self, sql: &str) -> BackendResult<()>;

    fn begin(&mut self) -> BackendResult<()>;

    fn commit(&mut self) -> BackendResult<()>;

    fn rollback(&mut self) -> BackendResult<()>;
}

/// A named source of connections.
pub trait DataSource {
    fn name(&self) -> &str;

    /// Hands out a connection owned by the caller until dropped.
    fn connect(&self) -> Result<Box<dyn SqlConnection>>;
}

/// Backend kinds that can be configured by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    #[default]
    Duckdb,
}

/// A configured datasource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,
    #[serde(default)]
    pub kind: DataSourceKind,
    /// Database file; in-memory when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Outcome of looking up a datasource by descriptor name.
pub enum Lookup<'a> {
    Found(&'a dyn DataSource),
    Missing,
    Ambiguous(usize),
}

/// The datasources available to a run.
#[derive(Default)]
pub struct DataSourceRegistry {
    sources: Vec<Box<dyn DataSource>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens every configured datasource.
    pub fn from_configs(configs: &[DataSourceConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let source = match config.kind {
                DataSourceKind::Duckdb => match &config.path {
                    Some(path) => DuckDbDataSource::open(&config.name, path)?,
                    None => DuckDbDataSource::in_memory(&config.name)?,
                },
            };
            registry.register(source);
        }
        Ok(registry)
    }

    pub fn register(&mut self, source: impl DataSource + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Finds the single datasource a database descriptor targets.
    pub fn find(&self, database: &DatabaseDescriptor) -> Lookup<'_> {
        let mut matches = self
            .sources
            .iter()
            .filter(|s| database.matches_datasource(s.name()));
        match (matches.next(), matches.count()) {
            (None, _) => Lookup::Missing,
            (Some(source), 0) => Lookup::Found(source.as_ref()),
            (Some(_), rest) => Lookup::Ambiguous(rest + 1),
        }
    }
}
