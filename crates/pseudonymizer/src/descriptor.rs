//! The anonymization plan: databases, tables, columns and how to rewrite them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of value a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    /// A username.
    Plain,
    /// An email address.
    Email,
    /// An IP address, optionally paired with a username column.
    Ip,
}

impl ColumnType {
    pub const ALL: [ColumnType; 3] = [ColumnType::Plain, ColumnType::Email, ColumnType::Ip];
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "PLAIN"),
            Self::Email => write!(f, "EMAIL"),
            Self::Ip => write!(f, "IP"),
        }
    }
}

/// One column-level rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntryDescriptor {
    pub table_name: String,
    pub column_name: String,
    #[serde(default = "default_column_type")]
    pub column_type: ColumnType,

    /// The value is embedded in free text rather than being the whole column.
    #[serde(default)]
    pub is_text_replace: bool,

    /// Literal text immediately before the value inside the free text.
    #[serde(default)]
    pub pre_replace_text: String,

    /// Literal text immediately after the value inside the free text.
    #[serde(default)]
    pub post_replace_text: String,

    /// Literal text immediately before the IP address inside the free text.
    #[serde(default)]
    pub ip_pre_replace_text: String,

    /// Literal text immediately after the IP address inside the free text.
    #[serde(default)]
    pub ip_post_replace_text: String,

    /// Whether this table stores super-tenant usernames with `@carbon.super`.
    #[serde(default)]
    pub is_super_tenant_username_has_tenant_domain: bool,

    /// Companion column holding the username paired with an IP column.
    #[serde(default)]
    pub ip_username_column_name: Option<String>,

    /// Column holding the tenant domain; restricts direct username updates
    /// to rows of the acting tenant.
    #[serde(default)]
    pub tenant_domain_column_name: Option<String>,
}

fn default_column_type() -> ColumnType {
    ColumnType::Plain
}

impl TableEntryDescriptor {
    /// Creates a direct-replace username rule.
    pub fn new(table_name: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            column_type: ColumnType::Plain,
            is_text_replace: false,
            pre_replace_text: String::new(),
            post_replace_text: String::new(),
            ip_pre_replace_text: String::new(),
            ip_post_replace_text: String::new(),
            is_super_tenant_username_has_tenant_domain: false,
            ip_username_column_name: None,
            tenant_domain_column_name: None,
        }
    }

    pub fn with_column_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    /// Marks the value as embedded in free text between `pre` and `post`.
    pub fn with_text_replace(mut self, pre: impl Into<String>, post: impl Into<String>) -> Self {
        self.is_text_replace = true;
        self.pre_replace_text = pre.into();
        self.post_replace_text = post.into();
        self
    }

    /// Sets the text delimiting an IP address embedded in free text.
    pub fn with_ip_delimiters(mut self, pre: impl Into<String>, post: impl Into<String>) -> Self {
        self.ip_pre_replace_text = pre.into();
        self.ip_post_replace_text = post.into();
        self
    }

    pub fn with_super_tenant_domain(mut self, has_domain: bool) -> Self {
        self.is_super_tenant_username_has_tenant_domain = has_domain;
        self
    }

    pub fn with_ip_username_column(mut self, column: impl Into<String>) -> Self {
        self.ip_username_column_name = Some(column.into());
        self
    }

    pub fn with_tenant_domain_column(mut self, column: impl Into<String>) -> Self {
        self.tenant_domain_column_name = Some(column.into());
        self
    }
}

/// A named database and the rules applied to it, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    /// Matched case-insensitively against configured datasource names.
    pub name: String,
    #[serde(default)]
    pub tables: Vec<TableEntryDescriptor>,
}

impl DatabaseDescriptor {
    pub fn new(name: impl Into<String>, tables: Vec<TableEntryDescriptor>) -> Self {
        Self {
            name: name.into(),
            tables,
        }
    }

    /// Whether this descriptor targets the datasource called `datasource`.
    pub fn matches_datasource(&self, datasource: &str) -> bool {
        self.name.eq_ignore_ascii_case(datasource)
    }
}
