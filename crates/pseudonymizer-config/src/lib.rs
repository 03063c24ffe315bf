//! Configuration management for the pseudonymizer
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (PSN_* prefix, `__` between nested keys)
//! 3. pseudonymizer.local.toml (gitignored, local overrides)
//! 4. pseudonymizer.toml (git-tracked, project config)
//! 5. ~/.config/pseudonymizer/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use anyhow::Result;
use pseudonymizer::{DataSourceConfig, DatabaseDescriptor, OctetRange, PseudonymSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main pseudonymizer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PseudonymizerConfig {
    pub pseudonym: PseudonymConfig,
    /// Operator query file layered over the built-in templates.
    pub queries_file: Option<PathBuf>,
    pub datasources: Vec<DataSourceConfig>,
    pub databases: Vec<DatabaseDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PseudonymConfig {
    pub hash_usernames: bool,
    pub ip_octet_min: u8,
    pub ip_octet_max: u8,
}

impl Default for PseudonymConfig {
    fn default() -> Self {
        let range = OctetRange::default();
        Self {
            hash_usernames: false,
            ip_octet_min: range.min,
            ip_octet_max: range.max,
        }
    }
}

impl PseudonymizerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Settings for pseudonym and synthetic IP derivation
    pub fn pseudonym_settings(&self) -> PseudonymSettings {
        PseudonymSettings {
            hash_usernames: self.pseudonym.hash_usernames,
            ip_octets: OctetRange::new(self.pseudonym.ip_octet_min, self.pseudonym.ip_octet_max),
        }
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if let Some(queries_file) = &mut self.queries_file {
            if queries_file.is_relative() {
                *queries_file = base.join(&*queries_file);
            }
        }

        for datasource in &mut self.datasources {
            if let Some(path) = &mut datasource.path {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }

    /// Reject configurations no run could use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.datasources.iter().any(|d| d.name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "datasource name must not be empty".to_string(),
            ));
        }

        for database in &self.databases {
            if database.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "database name must not be empty".to_string(),
                ));
            }
            for entry in &database.tables {
                if entry.table_name.trim().is_empty() || entry.column_name.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "database '{}' has a rule without table or column name",
                        database.name
                    )));
                }
            }
        }

        Ok(())
    }
}
