//! # Pseudonymizer
//!
//! Replaces a user's personally identifiable values (username, email, IP
//! address) with pseudonyms across every configured relational database, so
//! operational records survive while the person behind them cannot be
//! identified.
//!
//! ## Architecture
//!
//! A run takes one [`Identity`] and a list of [`DatabaseDescriptor`]s, each
//! naming a datasource and the table/column rules to apply:
//!
//! - **Identity**: resolves the pseudonym, tenant-qualified forms and a
//!   synthetic IP once per run.
//! - **Query resolution**: picks SQL templates by the connection's product
//!   name and version, layering operator overrides over the built-in set.
//! - **Strategy**: maps each rule to one rewrite scenario through an
//!   exhaustive decision table.
//! - **Executor**: checks each table exists and runs each rewrite in its own
//!   transaction.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pseudonymizer::{
//!     DataSourceRegistry, DatabaseDescriptor, DuckDbDataSource, Executor, Identity,
//!     IdentityRequest, PseudonymSettings, TableEntryDescriptor,
//! };
//!
//! let identity = Identity::resolve(IdentityRequest::new("admin"), &PseudonymSettings::default())?;
//!
//! let mut registry = DataSourceRegistry::new();
//! registry.register(DuckDbDataSource::open("WSO2AM_STATS_DB", "stats.duckdb")?);
//!
//! let databases = vec![DatabaseDescriptor::new(
//!     "WSO2AM_STATS_DB",
//!     vec![TableEntryDescriptor::new("API_REQUEST_SUMMARY", "USER_ID")],
//! )];
//!
//! let report = Executor::new(&identity, &registry, &databases).run()?;
//! println!("{} rows rewritten", report.rows_rewritten());
//! # Ok::<(), pseudonymizer::Error>(())
//! ```
//!
//! ## Trust model
//!
//! Templates inline values rather than binding parameters. Table and column
//! names come from operator configuration and are restricted to a safe
//! identifier set; user-derived values are always quoted literals.

pub mod datasource;
pub mod descriptor;
pub mod duckdb;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod identity;
pub mod query;
pub mod session;
pub mod strategy;

pub use self::datasource::{
    BackendError, BackendResult, DataSource, DataSourceConfig, DataSourceKind,
    DataSourceRegistry, DatabaseMetadata, Lookup, SqlConnection,
};
pub use self::descriptor::{ColumnType, DatabaseDescriptor, TableEntryDescriptor};
pub use self::duckdb::{DuckDbConnection, DuckDbDataSource};
pub use self::error::{Error, Result};
pub use self::executor::{
    DatabaseOutcome, DatabaseReport, EntryOutcome, EntryReport, Executor, RunReport,
};
pub use self::fingerprint::{OctetRange, PseudonymSettings};
pub use self::identity::{Identity, IdentityRequest, SUPER_TENANT_DOMAIN, SUPER_TENANT_ID};
pub use self::query::{Bindings, LiteralEscape, QueryCatalog, QueryKey, QueryTemplates};
pub use self::session::RewriteSession;
pub use self::strategy::{RewritePlan, RewriteScenario, SkipReason, TenantContext};
