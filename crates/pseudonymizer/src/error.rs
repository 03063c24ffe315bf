//! Error types for the pseudonymization engine.

use std::path::PathBuf;
use thiserror::Error;

use crate::datasource::BackendError;
use crate::descriptor::ColumnType;
use crate::query::QueryKey;

/// Pseudonymization engine errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The operator input does not describe a usable identity.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// No query mapping exists for the database product/version.
    #[error("No query templates for database product '{product}' version '{version}'")]
    TemplateResolution { product: String, version: String },

    /// The resolved template set lacks a query the rewrite needs.
    #[error("Query {key} is not defined for database product '{product}'")]
    MissingQuery { key: QueryKey, product: String },

    /// A `{{TOKEN}}` placeholder was left without a binding.
    #[error("Query {key} has no binding for placeholder {{{{{token}}}}}")]
    UnboundPlaceholder { key: QueryKey, token: String },

    /// A table or column name contains characters outside the identifier set.
    #[error("Refusing to inline untrusted identifier '{value}' for {token}")]
    UntrustedIdentifier { token: String, value: String },

    /// The descriptor combination has no rewrite scenario.
    #[error(
        "No rewrite scenario for {table}.{column} ({column_type}, text replace: {text_replace}): {reason}"
    )]
    UnsupportedRule {
        table: String,
        column: String,
        column_type: ColumnType,
        text_replace: bool,
        reason: &'static str,
    },

    /// The descriptor is missing a field its scenario requires.
    #[error("Invalid rule for {table}.{column}: {reason}")]
    InvalidRule {
        table: String,
        column: String,
        reason: String,
    },

    /// An update statement failed; the transaction was rolled back.
    #[error("Rewrite of {database}.{table} failed: {source}\n  query: {sql}")]
    RewriteExecution {
        database: String,
        table: String,
        sql: String,
        #[source]
        source: BackendError,
    },

    /// Opening a connection to a datasource failed.
    #[error("Failed to connect to datasource '{datasource}': {source}")]
    Connection {
        datasource: String,
        #[source]
        source: BackendError,
    },

    /// Reading product name/version from the connection failed.
    #[error("Failed to read metadata of datasource '{datasource}': {source}")]
    Metadata {
        datasource: String,
        #[source]
        source: BackendError,
    },

    /// Transaction control (begin/commit/rollback) failed.
    #[error("Transaction {action} failed on '{datasource}': {source}")]
    Transaction {
        datasource: String,
        action: &'static str,
        #[source]
        source: BackendError,
    },

    /// The operator query file could not be read.
    #[error("Failed to read query file {path}: {source}")]
    QueryFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The query file is not valid TOML of the expected shape.
    #[error("Failed to parse query file {path}: {source}")]
    QueryFileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Error {
    /// Whether this error is a configuration problem rather than a runtime failure.
    ///
    /// Configuration errors abort the whole run regardless of which database
    /// or entry surfaced them.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::TemplateResolution { .. }
                | Self::MissingQuery { .. }
                | Self::UnboundPlaceholder { .. }
                | Self::UntrustedIdentifier { .. }
                | Self::UnsupportedRule { .. }
                | Self::InvalidRule { .. }
                | Self::QueryFile { .. }
                | Self::QueryFileParse { .. }
        )
    }
}

/// Result type for pseudonymization operations.
pub type Result<T> = std::result::Result<T, Error>;
