//! One connection to one database for the duration of its rewrites.

use tracing::debug;

use crate::datasource::{BackendError, DataSource, DatabaseMetadata, SqlConnection};
use crate::query::{self, Bindings, QueryCatalog, QueryKey, QueryTemplates, token};
use crate::{Error, Result};

/// A connection plus the templates resolved for its product and version.
///
/// Each [`execute`](Self::execute) call runs in its own transaction, so an
/// earlier entry stays committed when a later one fails.
pub struct RewriteSession {
    database: String,
    datasource: String,
    conn: Box<dyn SqlConnection>,
    metadata: DatabaseMetadata,
    templates: QueryTemplates,
}

impl RewriteSession {
    /// Connects to `source` and resolves templates for it.
    pub fn open(database: &str, source: &dyn DataSource, overrides: &QueryCatalog) -> Result<Self> {
        let mut conn = source.connect()?;
        let metadata = conn.metadata().map_err(|source_err| Error::Metadata {
            datasource: source.name().to_string(),
            source: source_err,
        })?;
        let templates = query::resolve(
            &metadata.product_name,
            &metadata.product_version,
            overrides,
        )?;

        debug!(
            database = %database,
            datasource = %source.name(),
            product = %metadata.product_name,
            version = %metadata.product_version,
            "opened rewrite session"
        );

        Ok(Self {
            database: database.to_string(),
            datasource: source.name().to_string(),
            conn,
            metadata,
            templates,
        })
    }

    pub fn metadata(&self) -> &DatabaseMetadata {
        &self.metadata
    }

    pub fn templates(&self) -> &QueryTemplates {
        &self.templates
    }

    /// Whether `table` exists and is readable.
    ///
    /// Any SQL failure of the probe counts as "does not exist". Template
    /// problems still propagate.
    pub fn table_exists(&mut self, table: &str) -> Result<bool> {
        let bindings = Bindings::new().identifier(token::TABLE_NAME, table)?;
        let sql = self.templates.render(QueryKey::TableCheck, &bindings)?;

        match self.conn.probe(&sql) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(database = %self.database, table = %table, error = %e, "table check failed");
                Ok(false)
            }
        }
    }

    /// Renders `key` and runs it in its own transaction.
    ///
    /// Returns the number of affected rows. When the statement or its commit
    /// fails the transaction is rolled back and the error carries the
    /// rendered SQL.
    pub fn execute(&mut self, key: QueryKey, bindings: &Bindings, table: &str) -> Result<usize> {
        let sql = self.templates.render(key, bindings)?;

        self.conn.begin().map_err(|e| self.transaction_error("begin", e))?;

        let outcome = self
            .conn
            .execute(&sql)
            .and_then(|rows| self.conn.commit().map(|()| rows));

        match outcome {
            Ok(rows) => {
                debug!(database = %self.database, table = %table, query = %key, rows, "committed rewrite");
                Ok(rows)
            }
            Err(source) => {
                if let Err(e) = self.conn.rollback() {
                    debug!(database = %self.database, error = %e, "rollback failed");
                }
                Err(Error::RewriteExecution {
                    database: self.database.clone(),
                    table: table.to_string(),
                    sql,
                    source,
                })
            }
        }
    }

    fn transaction_error(&self, action: &'static str, source: BackendError) -> Error {
        Error::Transaction {
            datasource: self.datasource.clone(),
            action,
            source,
        }
    }
}
