//! The identity being pseudonymized and its tenant-qualified forms.
//!
//! A username lives either in the super tenant (`carbon.super`) or in some
//! other tenant domain. Tables store it bare (`user`) or tenant-qualified
//! (`user@tenant.domain`); both forms, and the matching pseudonym forms, are
//! computed once here and shared read-only by every rewrite.

use std::net::Ipv4Addr;

use rand::Rng;
use serde::Serialize;

use crate::fingerprint::{PseudonymSettings, derive_pseudonym, derive_synthetic_ip};
use crate::{Error, Result};

/// Domain of the root tenant.
pub const SUPER_TENANT_DOMAIN: &str = "carbon.super";

/// Tenant id of the root tenant.
pub const SUPER_TENANT_ID: i64 = -1234;

/// Operator input describing whom to pseudonymize.
#[derive(Debug, Clone, Default)]
pub struct IdentityRequest {
    pub username: String,
    pub pseudonym: Option<String>,
    pub tenant_domain: Option<String>,
    pub email: Option<String>,
    pub ip: Option<Ipv4Addr>,
    pub tenant_id: Option<i64>,
}

impl IdentityRequest {
    /// Creates a request for `username` in the super tenant.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_pseudonym(mut self, pseudonym: impl Into<String>) -> Self {
        self.pseudonym = Some(pseudonym.into());
        self
    }

    pub fn with_tenant_domain(mut self, tenant_domain: impl Into<String>) -> Self {
        self.tenant_domain = Some(tenant_domain.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_ip(mut self, ip: Ipv4Addr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

/// The resolved identity for one run.
///
/// `pseudonym` is never empty and `ip_pseudonym` is always generated, even
/// when no `ip` was supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    username: String,
    pseudonym: String,
    tenant_domain: String,
    tenant_id: Option<i64>,
    email: Option<String>,
    ip: Option<Ipv4Addr>,
    ip_pseudonym: Ipv4Addr,
    is_super_tenant: bool,
    username_with_tenant_domain: String,
    pseudonym_with_tenant_domain: String,
}

impl Identity {
    /// Resolves operator input into an identity using the thread-local RNG.
    pub fn resolve(request: IdentityRequest, settings: &PseudonymSettings) -> Result<Self> {
        Self::resolve_with_rng(request, settings, &mut rand::thread_rng())
    }

    /// Resolves operator input, drawing the synthetic IP from `rng`.
    pub fn resolve_with_rng<R: Rng + ?Sized>(
        request: IdentityRequest,
        settings: &PseudonymSettings,
        rng: &mut R,
    ) -> Result<Self> {
        let username = request.username.trim().to_string();
        if username.is_empty() {
            return Err(Error::InvalidIdentity("username must not be empty".into()));
        }

        let tenant_domain = request
            .tenant_domain
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| SUPER_TENANT_DOMAIN.to_string());
        let is_super_tenant = tenant_domain.eq_ignore_ascii_case(SUPER_TENANT_DOMAIN);

        let pseudonym = derive_pseudonym(
            &username,
            request.pseudonym.as_deref(),
            settings.hash_usernames,
        );
        let ip_pseudonym = derive_synthetic_ip(settings.ip_octets, rng);

        let email = request
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        let tenant_id = request
            .tenant_id
            .or(is_super_tenant.then_some(SUPER_TENANT_ID));

        Ok(Self {
            username_with_tenant_domain: qualify(&username, &tenant_domain),
            pseudonym_with_tenant_domain: qualify(&pseudonym, &tenant_domain),
            username,
            pseudonym,
            tenant_domain,
            tenant_id,
            email,
            ip: request.ip,
            ip_pseudonym,
            is_super_tenant,
        })
    }

    /// Replaces the generated IP pseudonym with a fixed one.
    pub fn with_ip_pseudonym(mut self, ip_pseudonym: Ipv4Addr) -> Self {
        self.ip_pseudonym = ip_pseudonym;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn pseudonym(&self) -> &str {
        &self.pseudonym
    }

    pub fn tenant_domain(&self) -> &str {
        &self.tenant_domain
    }

    pub fn tenant_id(&self) -> Option<i64> {
        self.tenant_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    pub fn ip_pseudonym(&self) -> Ipv4Addr {
        self.ip_pseudonym
    }

    pub fn is_super_tenant(&self) -> bool {
        self.is_super_tenant
    }

    /// `username@tenant.domain`.
    pub fn username_with_tenant_domain(&self) -> &str {
        &self.username_with_tenant_domain
    }

    /// `pseudonym@tenant.domain`.
    pub fn pseudonym_with_tenant_domain(&self) -> &str {
        &self.pseudonym_with_tenant_domain
    }
}

fn qualify(name: &str, tenant_domain: &str) -> String {
    format!("{name}@{tenant_domain}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::sha256_hex;

    fn settings() -> PseudonymSettings {
        PseudonymSettings::default()
    }

    #[test]
    fn defaults_to_super_tenant() {
        let identity =
            Identity::resolve(IdentityRequest::new("admin").with_pseudonym("anon1"), &settings())
                .unwrap();

        assert!(identity.is_super_tenant());
        assert_eq!(identity.tenant_domain(), SUPER_TENANT_DOMAIN);
        assert_eq!(identity.tenant_id(), Some(SUPER_TENANT_ID));
        assert_eq!(identity.username_with_tenant_domain(), "admin@carbon.super");
        assert_eq!(identity.pseudonym_with_tenant_domain(), "anon1@carbon.super");
    }

    #[test]
    fn super_tenant_match_ignores_case() {
        let identity = Identity::resolve(
            IdentityRequest::new("admin").with_tenant_domain("Carbon.Super"),
            &settings(),
        )
        .unwrap();
        assert!(identity.is_super_tenant());
    }

    #[test]
    fn other_tenant_is_qualified() {
        let identity = Identity::resolve(
            IdentityRequest::new("alice")
                .with_pseudonym("p1")
                .with_tenant_domain("wso2.com"),
            &settings(),
        )
        .unwrap();

        assert!(!identity.is_super_tenant());
        assert_eq!(identity.tenant_id(), None);
        assert_eq!(identity.username_with_tenant_domain(), "alice@wso2.com");
        assert_eq!(identity.pseudonym_with_tenant_domain(), "p1@wso2.com");
    }

    #[test]
    fn pseudonym_is_hashed_when_enabled() {
        let settings = PseudonymSettings {
            hash_usernames: true,
            ..Default::default()
        };
        let identity = Identity::resolve(IdentityRequest::new("admin"), &settings).unwrap();
        assert_eq!(identity.pseudonym(), sha256_hex("admin"));
    }

    #[test]
    fn ip_pseudonym_is_generated_without_ip() {
        let settings = PseudonymSettings {
            ip_octets: crate::fingerprint::OctetRange::new(3, 3),
            ..Default::default()
        };
        let identity = Identity::resolve(IdentityRequest::new("admin"), &settings).unwrap();

        assert_eq!(identity.ip(), None);
        assert_eq!(identity.ip_pseudonym(), Ipv4Addr::new(3, 3, 3, 3));
    }

    #[test]
    fn blank_email_is_absent() {
        let identity =
            Identity::resolve(IdentityRequest::new("admin").with_email("  "), &settings()).unwrap();
        assert_eq!(identity.email(), None);
    }

    #[test]
    fn empty_username_is_rejected() {
        let err = Identity::resolve(IdentityRequest::new(" "), &settings()).unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity(_)));
    }
}
