//! Query templates per database dialect and their rendering.
//!
//! Templates are SQL strings with `{{TOKEN}}` placeholders. Rendering inlines
//! values instead of binding parameters, so only values built through
//! [`Bindings`] can reach a template: identifiers are restricted to a safe
//! character set and literals have their quotes escaped. Table and column
//! names must come from trusted configuration, never from end users.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Built-in dialect mapping.
const BUILTIN_QUERIES: &str = include_str!("queries.toml");

/// Version wildcard used by dialect rows that apply to every version.
pub const DEFAULT_VERSION: &str = "default";

/// Placeholder tokens understood by the built-in templates.
pub mod token {
    pub const TABLE_NAME: &str = "TABLE_NAME";
    pub const USERNAME_COLUMN_NAME: &str = "USERNAME_COLUMN_NAME";
    pub const CURRENT_USERNAME_VALUE: &str = "CURRENT_USERNAME_VALUE";
    pub const PSEUDONYM_USERNAME_VALUE: &str = "PSEUDONYM_USERNAME_VALUE";
    pub const TENANT_DOMAIN_COLUMN_NAME: &str = "TENANT_DOMAIN_COLUMN_NAME";
    pub const TENANT_DOMAIN_VALUE: &str = "TENANT_DOMAIN_VALUE";
    pub const TENANT_ID: &str = "TENANT_ID";
    pub const PRE_REPLACE_TEXT: &str = "PRE_REPLACE_TEXT";
    pub const POST_REPLACE_TEXT: &str = "POST_REPLACE_TEXT";
    pub const PRE_IP_REPLACE_TEXT: &str = "PRE_IP_REPLACE_TEXT";
    pub const POST_IP_REPLACE_TEXT: &str = "POST_IP_REPLACE_TEXT";
    pub const EMAIL_COLUMN_NAME: &str = "EMAIL_COLUMN_NAME";
    pub const CURRENT_EMAIL_VALUE: &str = "CURRENT_EMAIL_VALUE";
    pub const PSEUDONYM_EMAIL_VALUE: &str = "PSEUDONYM_EMAIL_VALUE";
    pub const IP_COLUMN_NAME: &str = "IP_COLUMN_NAME";
    pub const CURRENT_IP_VALUE: &str = "CURRENT_IP_VALUE";
    pub const PSEUDONYM_IP_VALUE: &str = "PSEUDONYM_IP_VALUE";
}

// ============================================================================
// Query keys
// ============================================================================

/// Symbolic name of a query in a dialect's template set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryKey {
    TableCheck,
    UpdateUsername,
    UpdateUsernameWhereTenantDomain,
    ReplaceUsernameInText,
    ReplaceEmailInText,
    ReplaceIpAndUsernameInText,
    UpdateIpAndUsername,
}

impl QueryKey {
    pub const ALL: [QueryKey; 7] = [
        QueryKey::TableCheck,
        QueryKey::UpdateUsername,
        QueryKey::UpdateUsernameWhereTenantDomain,
        QueryKey::ReplaceUsernameInText,
        QueryKey::ReplaceEmailInText,
        QueryKey::ReplaceIpAndUsernameInText,
        QueryKey::UpdateIpAndUsername,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TableCheck => "TABLE_CHECK",
            Self::UpdateUsername => "UPDATE_USERNAME",
            Self::UpdateUsernameWhereTenantDomain => "UPDATE_USERNAME_WHERE_TENANT_DOMAIN",
            Self::ReplaceUsernameInText => "REPLACE_USERNAME_IN_TEXT",
            Self::ReplaceEmailInText => "REPLACE_EMAIL_IN_TEXT",
            Self::ReplaceIpAndUsernameInText => "REPLACE_IP_AND_USERNAME_IN_TEXT",
            Self::UpdateIpAndUsername => "UPDATE_IP_AND_USERNAME",
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown query key: {s}"))
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// How a dialect escapes characters inside a single-quoted string literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiteralEscape {
    /// Quotes are doubled; backslashes are ordinary characters.
    #[default]
    Standard,
    /// Quotes are doubled and backslashes are escape characters (MySQL).
    Backslash,
}

impl LiteralEscape {
    pub fn escape(self, value: &str) -> String {
        let quoted = match self {
            Self::Standard => value.to_string(),
            Self::Backslash => value.replace('\\', "\\\\"),
        };
        quoted.replace('\'', "''")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    Identifier(String),
    Literal(String),
}

/// Values substituted into a template.
///
/// Literals are stored raw and escaped for the target dialect at render time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<&'static str, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a table or column name.
    ///
    /// Only ASCII alphanumerics, `_`, `.` and `$` are accepted.
    pub fn identifier(mut self, token: &'static str, name: &str) -> Result<Self> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'));
        if !valid {
            return Err(Error::UntrustedIdentifier {
                token: token.to_string(),
                value: name.to_string(),
            });
        }
        self.values.insert(token, Binding::Identifier(name.to_string()));
        Ok(self)
    }

    /// Binds a value that is placed inside a single-quoted SQL literal.
    pub fn literal(mut self, token: &'static str, value: &str) -> Self {
        self.values.insert(token, Binding::Literal(value.to_string()));
        self
    }

    /// The raw bound value, before any escaping.
    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(|binding| match binding {
            Binding::Identifier(value) | Binding::Literal(value) => value.as_str(),
        })
    }

    fn rendered(&self, token: &str, escape: LiteralEscape) -> Option<String> {
        self.values.get(token).map(|binding| match binding {
            Binding::Identifier(name) => name.clone(),
            Binding::Literal(value) => escape.escape(value),
        })
    }
}

/// Substitutes every `{{TOKEN}}` in `template`.
pub fn render(
    key: QueryKey,
    template: &str,
    bindings: &Bindings,
    escape: LiteralEscape,
) -> Result<String> {
    let mut sql = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let token = &rest[start + 2..start + 2 + len];
        let value = bindings
            .rendered(token, escape)
            .ok_or_else(|| Error::UnboundPlaceholder {
                key,
                token: token.to_string(),
            })?;
        sql.push_str(&rest[..start]);
        sql.push_str(&value);
        rest = &rest[start + 2 + len + 2..];
    }
    sql.push_str(rest);

    Ok(sql)
}

// ============================================================================
// Catalogs
// ============================================================================

/// Queries for one product/version combination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialectQueries {
    pub product: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Whether string literals treat backslash as an escape character.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backslash_escapes: Option<bool>,
    #[serde(default)]
    pub queries: BTreeMap<String, String>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// A file-shaped collection of dialect queries.
///
/// Used for both the built-in mapping and operator override files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryCatalog {
    /// Queries shared by every dialect this catalog defines or extends.
    #[serde(default)]
    pub common: BTreeMap<String, String>,
    #[serde(default)]
    pub dialects: Vec<DialectQueries>,
}

impl QueryCatalog {
    /// The built-in mapping shipped with the engine.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_QUERIES, Path::new("<built-in queries>"))
    }

    /// Loads an operator override file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::QueryFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|source| Error::QueryFileParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.common.is_empty() && self.dialects.is_empty()
    }

    fn dialect(&self, product: &str, version: &str) -> Option<&DialectQueries> {
        self.dialects.iter().find(|d| {
            normalize_product_name(&d.product).eq_ignore_ascii_case(product)
                && d.version.trim().eq_ignore_ascii_case(version)
        })
    }
}

/// Collapses driver-reported product names to their canonical form.
///
/// DB2 drivers report platform-specific names such as `DB2/LINUXX8664`.
pub fn normalize_product_name(product: &str) -> String {
    let product = product.trim();
    if product.to_ascii_uppercase().contains("DB2") {
        "DB2".to_string()
    } else {
        product.to_string()
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// The resolved template set for one database connection.
#[derive(Debug, Clone)]
pub struct QueryTemplates {
    product: String,
    version: String,
    escape: LiteralEscape,
    queries: BTreeMap<QueryKey, String>,
}

impl QueryTemplates {
    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, key: QueryKey) -> Result<&str> {
        self.queries
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingQuery {
                key,
                product: self.product.clone(),
            })
    }

    pub fn literal_escape(&self) -> LiteralEscape {
        self.escape
    }

    pub fn contains(&self, key: QueryKey) -> bool {
        self.queries.contains_key(&key)
    }

    /// Renders `key` with `bindings`.
    pub fn render(&self, key: QueryKey, bindings: &Bindings) -> Result<String> {
        render(key, self.get(key)?, bindings, self.escape)
    }
}

/// Resolves the template set for a database product and version.
///
/// Later layers win: built-in common, built-in `default` row, built-in exact
/// version row, then the same three layers of `overrides`. Fails when
/// neither catalog has a row for the product.
pub fn resolve(product: &str, version: &str, overrides: &QueryCatalog) -> Result<QueryTemplates> {
    let builtin = QueryCatalog::builtin()?;
    resolve_with(&builtin, product, version, overrides)
}

fn resolve_with(
    builtin: &QueryCatalog,
    product: &str,
    version: &str,
    overrides: &QueryCatalog,
) -> Result<QueryTemplates> {
    let product = normalize_product_name(product);
    let version = version.trim();

    let mut layers: Vec<&BTreeMap<String, String>> = Vec::new();
    let mut matched = false;
    let mut backslash_escapes = false;

    for catalog in [builtin, overrides] {
        let rows = [
            catalog.dialect(&product, DEFAULT_VERSION),
            catalog.dialect(&product, version),
        ];
        if rows.iter().any(Option::is_some) {
            matched = true;
        }
        layers.push(&catalog.common);
        for row in rows.into_iter().flatten() {
            if let Some(flag) = row.backslash_escapes {
                backslash_escapes = flag;
            }
            layers.push(&row.queries);
        }
    }

    if !matched {
        return Err(Error::TemplateResolution {
            product,
            version: version.to_string(),
        });
    }

    let mut queries = BTreeMap::new();
    for layer in layers {
        for (name, sql) in layer {
            match name.parse::<QueryKey>() {
                Ok(key) => {
                    queries.insert(key, sql.clone());
                }
                Err(_) => warn!(query = %name, product = %product, "ignoring unknown query key"),
            }
        }
    }

    debug!(product = %product, version = %version, queries = queries.len(), "resolved query templates");

    Ok(QueryTemplates {
        product,
        version: version.to_string(),
        escape: if backslash_escapes {
            LiteralEscape::Backslash
        } else {
            LiteralEscape::Standard
        },
        queries,
    })
}
