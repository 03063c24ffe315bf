//! DuckDB backend.
//!
//! A [`DuckDbDataSource`] keeps one root connection open and hands out
//! clones of it, so every session sees the same database instance, including
//! in-memory ones.

use std::path::{Path, PathBuf};

use duckdb::Connection;

use crate::datasource::{BackendResult, DataSource, DatabaseMetadata, SqlConnection};
use crate::{Error, Result};

/// Product name DuckDB connections report.
pub const PRODUCT_NAME: &str = "DuckDB";

/// A DuckDB database reachable under a datasource name.
pub struct DuckDbDataSource {
    name: String,
    path: Option<PathBuf>,
    root: Connection,
}

impl DuckDbDataSource {
    /// Opens (or creates) a file-backed database.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let path = path.as_ref().to_path_buf();
        let root = Connection::open(&path).map_err(|e| Error::Connection {
            datasource: name.clone(),
            source: e.into(),
        })?;
        Ok(Self {
            name,
            path: Some(path),
            root,
        })
    }

    /// Creates a private in-memory database.
    pub fn in_memory(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let root = Connection::open_in_memory().map_err(|e| Error::Connection {
            datasource: name.clone(),
            source: e.into(),
        })?;
        Ok(Self {
            name,
            path: None,
            root,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs setup SQL (schema, fixtures) directly on the root connection.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.root.execute_batch(sql).map_err(|e| Error::Connection {
            datasource: self.name.clone(),
            source: e.into(),
        })
    }

    /// A raw connection to the same database, for inspection.
    pub fn raw_connection(&self) -> Result<Connection> {
        self.root.try_clone().map_err(|e| Error::Connection {
            datasource: self.name.clone(),
            source: e.into(),
        })
    }
}

impl DataSource for DuckDbDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> Result<Box<dyn SqlConnection>> {
        Ok(Box::new(DuckDbConnection {
            conn: self.raw_connection()?,
        }))
    }
}

/// A session connection to a DuckDB database.
pub struct DuckDbConnection {
    conn: Connection,
}

impl SqlConnection for DuckDbConnection {
    fn metadata(&mut self) -> BackendResult<DatabaseMetadata> {
        let version: String = self
            .conn
            .query_row("SELECT version()", [], |row| row.get(0))?;
        Ok(DatabaseMetadata {
            product_name: PRODUCT_NAME.to_string(),
            product_version: version.trim_start_matches('v').to_string(),
        })
    }

    fn execute(&mut self, sql: &str) -> BackendResult<usize> {
        Ok(self.conn.execute(sql, [])?)
    }

    fn probe(&mut self, sql: &str) -> BackendResult<()> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        rows.next()?;
        Ok(())
    }

    fn begin(&mut self) -> BackendResult<()> {
        Ok(self.conn.execute_batch("BEGIN TRANSACTION")?)
    }

    fn commit(&mut self) -> BackendResult<()> {
        Ok(self.conn.execute_batch("COMMIT")?)
    }

    fn rollback(&mut self) -> BackendResult<()> {
        Ok(self.conn.execute_batch("ROLLBACK")?)
    }
}
