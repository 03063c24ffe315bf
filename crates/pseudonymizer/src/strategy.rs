//! Rewrite scenario selection.
//!
//! Every table entry maps to exactly one scenario through the column type,
//! the text-replace flag and the tenant context:
//!
//! ```text
//! type   text   tenant context            scenario
//! PLAIN  no     super tenant, bare        1  username -> pseudonym
//! PLAIN  no     super + domain / other    2  user@domain -> pseudonym@domain
//! PLAIN  yes    super tenant + domain     4  user@domain inside text
//! PLAIN  yes    other tenant              5  user@domain inside text
//! PLAIN  yes    super tenant, bare        -  error
//! EMAIL  yes    any                       6  email inside a delimited list
//! EMAIL  no     any                       -  error
//! IP     yes    any                       7  IP and username inside text
//! IP     no     any                       8  IP column and username column
//! ```
//!
//! A PII value left in place is a correctness failure, so the two empty cells
//! are errors rather than no-ops. A missing email or IP, on the other hand,
//! only narrows or skips the rewrite.

use std::fmt;

use serde::Serialize;

use crate::descriptor::{ColumnType, TableEntryDescriptor};
use crate::identity::Identity;
use crate::query::{Bindings, QueryKey, token};
use crate::{Error, Result};

/// How usernames of the acting tenant are stored in a given table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantContext {
    /// Super tenant, table stores `user`.
    SuperTenantBare,
    /// Super tenant, table stores `user@carbon.super`.
    SuperTenantQualified,
    /// Any other tenant; usernames are always qualified.
    OtherTenant,
}

impl TenantContext {
    pub const ALL: [TenantContext; 3] = [
        TenantContext::SuperTenantBare,
        TenantContext::SuperTenantQualified,
        TenantContext::OtherTenant,
    ];

    pub fn of(identity: &Identity, entry: &TableEntryDescriptor) -> Self {
        if !identity.is_super_tenant() {
            Self::OtherTenant
        } else if entry.is_super_tenant_username_has_tenant_domain {
            Self::SuperTenantQualified
        } else {
            Self::SuperTenantBare
        }
    }
}

/// The rewrite applied to one table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteScenario {
    /// Bare username column.
    DirectUsername,
    /// Tenant-qualified username column.
    DirectQualifiedUsername,
    /// Qualified super-tenant username inside free text.
    SuperTenantTextUsername,
    /// Qualified tenant username inside free text.
    TenantTextUsername,
    /// Email address inside a delimited list.
    EmailInText,
    /// IP address and qualified username inside free text.
    IpAndUsernameInText,
    /// IP column plus its companion username column.
    IpAndUsernameColumns,
}

impl RewriteScenario {
    /// Scenario number as used in operator documentation.
    pub fn number(self) -> u8 {
        match self {
            Self::DirectUsername => 1,
            Self::DirectQualifiedUsername => 2,
            Self::SuperTenantTextUsername => 4,
            Self::TenantTextUsername => 5,
            Self::EmailInText => 6,
            Self::IpAndUsernameInText => 7,
            Self::IpAndUsernameColumns => 8,
        }
    }

    /// Builds the query and bindings for `entry`.
    pub fn plan(self, entry: &TableEntryDescriptor, identity: &Identity) -> Result<RewritePlan> {
        let column = entry.column_name.as_str();

        let plan = match self {
            Self::DirectUsername => direct_username(
                entry,
                identity,
                column,
                identity.username(),
                identity.pseudonym(),
            )?,
            Self::DirectQualifiedUsername => direct_username(
                entry,
                identity,
                column,
                identity.username_with_tenant_domain(),
                identity.pseudonym_with_tenant_domain(),
            )?,
            Self::SuperTenantTextUsername | Self::TenantTextUsername => {
                username_in_text(entry, identity, column)?
            }
            Self::EmailInText => {
                let Some(email) = identity.email() else {
                    return Ok(RewritePlan::Skip(SkipReason::MissingEmail));
                };
                RewritePlan::Execute {
                    key: QueryKey::ReplaceEmailInText,
                    bindings: text_bindings(entry, identity)?
                        .identifier(token::EMAIL_COLUMN_NAME, column)?
                        .literal(token::CURRENT_EMAIL_VALUE, email)
                        .literal(token::PSEUDONYM_EMAIL_VALUE, identity.pseudonym()),
                }
            }
            Self::IpAndUsernameInText => match identity.ip() {
                Some(ip) => RewritePlan::Execute {
                    key: QueryKey::ReplaceIpAndUsernameInText,
                    bindings: text_bindings(entry, identity)?
                        .identifier(token::IP_COLUMN_NAME, column)?
                        .literal(token::PRE_IP_REPLACE_TEXT, &entry.ip_pre_replace_text)
                        .literal(token::POST_IP_REPLACE_TEXT, &entry.ip_post_replace_text)
                        .literal(token::CURRENT_IP_VALUE, &ip.to_string())
                        .literal(token::PSEUDONYM_IP_VALUE, &identity.ip_pseudonym().to_string())
                        .literal(
                            token::CURRENT_USERNAME_VALUE,
                            identity.username_with_tenant_domain(),
                        )
                        .literal(
                            token::PSEUDONYM_USERNAME_VALUE,
                            identity.pseudonym_with_tenant_domain(),
                        ),
                },
                None => username_in_text(entry, identity, column)?,
            },
            Self::IpAndUsernameColumns => {
                let username_column = companion_column(entry)?;
                match identity.ip() {
                    Some(ip) => RewritePlan::Execute {
                        key: QueryKey::UpdateIpAndUsername,
                        bindings: base_bindings(entry, identity)?
                            .identifier(token::IP_COLUMN_NAME, column)?
                            .identifier(token::USERNAME_COLUMN_NAME, username_column)?
                            .literal(token::CURRENT_IP_VALUE, &ip.to_string())
                            .literal(
                                token::PSEUDONYM_IP_VALUE,
                                &identity.ip_pseudonym().to_string(),
                            )
                            .literal(
                                token::CURRENT_USERNAME_VALUE,
                                identity.username_with_tenant_domain(),
                            )
                            .literal(
                                token::PSEUDONYM_USERNAME_VALUE,
                                identity.pseudonym_with_tenant_domain(),
                            ),
                    },
                    None => direct_username(
                        entry,
                        identity,
                        username_column,
                        identity.username_with_tenant_domain(),
                        identity.pseudonym_with_tenant_domain(),
                    )?,
                }
            }
        };

        Ok(plan)
    }
}

impl fmt::Display for RewriteScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DirectUsername => "direct username",
            Self::DirectQualifiedUsername => "direct tenant-qualified username",
            Self::SuperTenantTextUsername => "super-tenant username in text",
            Self::TenantTextUsername => "tenant username in text",
            Self::EmailInText => "email in text",
            Self::IpAndUsernameInText => "IP and username in text",
            Self::IpAndUsernameColumns => "IP and username columns",
        };
        write!(f, "scenario {} ({label})", self.number())
    }
}

/// Why an entry was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// An EMAIL rule ran for an identity without an email address.
    MissingEmail,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEmail => write!(f, "no email supplied for this identity"),
        }
    }
}

/// What to do for one table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewritePlan {
    Execute { key: QueryKey, bindings: Bindings },
    Skip(SkipReason),
}

/// Picks the scenario for `entry`.
pub fn select(entry: &TableEntryDescriptor, identity: &Identity) -> Result<RewriteScenario> {
    let context = TenantContext::of(identity, entry);

    let unsupported = |reason: &'static str| Error::UnsupportedRule {
        table: entry.table_name.clone(),
        column: entry.column_name.clone(),
        column_type: entry.column_type,
        text_replace: entry.is_text_replace,
        reason,
    };

    match (entry.column_type, entry.is_text_replace, context) {
        (ColumnType::Plain, false, TenantContext::SuperTenantBare) => {
            Ok(RewriteScenario::DirectUsername)
        }
        (
            ColumnType::Plain,
            false,
            TenantContext::SuperTenantQualified | TenantContext::OtherTenant,
        ) => Ok(RewriteScenario::DirectQualifiedUsername),
        (ColumnType::Plain, true, TenantContext::SuperTenantQualified) => {
            Ok(RewriteScenario::SuperTenantTextUsername)
        }
        (ColumnType::Plain, true, TenantContext::OtherTenant) => {
            Ok(RewriteScenario::TenantTextUsername)
        }
        (ColumnType::Plain, true, TenantContext::SuperTenantBare) => Err(unsupported(
            "text replace of a bare super-tenant username is not supported",
        )),
        (ColumnType::Email, true, _) => Ok(RewriteScenario::EmailInText),
        (ColumnType::Email, false, _) => {
            Err(unsupported("email columns are only rewritten inside text"))
        }
        (ColumnType::Ip, true, _) => {
            ip_delimiters(entry)?;
            Ok(RewriteScenario::IpAndUsernameInText)
        }
        (ColumnType::Ip, false, _) => {
            companion_column(entry)?;
            Ok(RewriteScenario::IpAndUsernameColumns)
        }
    }
}

fn companion_column(entry: &TableEntryDescriptor) -> Result<&str> {
    entry
        .ip_username_column_name
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::InvalidRule {
            table: entry.table_name.clone(),
            column: entry.column_name.clone(),
            reason: "IP column rules need ip_username_column_name".to_string(),
        })
}

/// An IP inside text is only matched between both delimiters, otherwise
/// `10.0.0.5` would also hit `10.0.0.50` and `110.0.0.5`.
fn ip_delimiters(entry: &TableEntryDescriptor) -> Result<()> {
    if entry.ip_pre_replace_text.is_empty() || entry.ip_post_replace_text.is_empty() {
        return Err(Error::InvalidRule {
            table: entry.table_name.clone(),
            column: entry.column_name.clone(),
            reason: "IP text rules need ip_pre_replace_text and ip_post_replace_text".to_string(),
        });
    }
    Ok(())
}

/// Bindings every template may use.
fn base_bindings(entry: &TableEntryDescriptor, identity: &Identity) -> Result<Bindings> {
    let mut bindings = Bindings::new()
        .identifier(token::TABLE_NAME, &entry.table_name)?
        .literal(token::TENANT_DOMAIN_VALUE, identity.tenant_domain());
    if let Some(tenant_id) = identity.tenant_id() {
        bindings = bindings.literal(token::TENANT_ID, &tenant_id.to_string());
    }
    Ok(bindings)
}

fn text_bindings(entry: &TableEntryDescriptor, identity: &Identity) -> Result<Bindings> {
    Ok(base_bindings(entry, identity)?
        .literal(token::PRE_REPLACE_TEXT, &entry.pre_replace_text)
        .literal(token::POST_REPLACE_TEXT, &entry.post_replace_text))
}

fn direct_username(
    entry: &TableEntryDescriptor,
    identity: &Identity,
    column: &str,
    current: &str,
    pseudonym: &str,
) -> Result<RewritePlan> {
    let mut bindings = base_bindings(entry, identity)?
        .identifier(token::USERNAME_COLUMN_NAME, column)?
        .literal(token::CURRENT_USERNAME_VALUE, current)
        .literal(token::PSEUDONYM_USERNAME_VALUE, pseudonym);

    let key = match entry.tenant_domain_column_name.as_deref() {
        Some(tenant_column) => {
            bindings = bindings.identifier(token::TENANT_DOMAIN_COLUMN_NAME, tenant_column)?;
            QueryKey::UpdateUsernameWhereTenantDomain
        }
        None => QueryKey::UpdateUsername,
    };

    Ok(RewritePlan::Execute { key, bindings })
}

fn username_in_text(
    entry: &TableEntryDescriptor,
    identity: &Identity,
    column: &str,
) -> Result<RewritePlan> {
    Ok(RewritePlan::Execute {
        key: QueryKey::ReplaceUsernameInText,
        bindings: text_bindings(entry, identity)?
            .identifier(token::USERNAME_COLUMN_NAME, column)?
            .literal(
                token::CURRENT_USERNAME_VALUE,
                identity.username_with_tenant_domain(),
            )
            .literal(
                token::PSEUDONYM_USERNAME_VALUE,
                identity.pseudonym_with_tenant_domain(),
            ),
    })
}
