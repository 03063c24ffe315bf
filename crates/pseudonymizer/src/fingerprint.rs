//! Replacement identity derivation.
//!
//! Usernames are replaced either by an operator-supplied pseudonym, by the
//! SHA-256 fingerprint of the username, or by a random UUID. IP addresses are
//! replaced by a synthetic IPv4 address drawn from a configured octet range.
//!
//! Only the fingerprint path is deterministic: re-running the tool with
//! hashing disabled produces a different pseudonym every time.

use std::net::Ipv4Addr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Inclusive range every octet of a synthetic IP is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OctetRange {
    pub min: u8,
    pub max: u8,
}

impl OctetRange {
    /// Creates a range, swapping the bounds if they were given in reverse.
    pub fn new(min: u8, max: u8) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }
}

impl Default for OctetRange {
    fn default() -> Self {
        // Avoids network and broadcast octets.
        Self { min: 1, max: 254 }
    }
}

/// Settings that drive pseudonym derivation for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PseudonymSettings {
    /// Derive the username pseudonym from its SHA-256 digest.
    pub hash_usernames: bool,
    /// Octet range for synthetic IP addresses.
    pub ip_octets: OctetRange,
}

/// Returns the lowercase hex SHA-256 digest of `value`.
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Derives the replacement for `username`.
///
/// A non-empty `supplied` pseudonym is used verbatim.
///
/// # Example
///
/// ```
/// use pseudonymizer::fingerprint::derive_pseudonym;
///
/// let first = derive_pseudonym("admin", None, true);
/// let second = derive_pseudonym("admin", None, true);
/// assert_eq!(first, second);
///
/// assert_eq!(derive_pseudonym("admin", Some("anon1"), true), "anon1");
/// ```
pub fn derive_pseudonym(username: &str, supplied: Option<&str>, hash: bool) -> String {
    match supplied.filter(|p| !p.is_empty()) {
        Some(pseudonym) => pseudonym.to_string(),
        None if hash => sha256_hex(username),
        None => Uuid::new_v4().to_string(),
    }
}

/// Generates a synthetic IPv4 address with every octet inside `range`.
///
/// The address is not checked against existing records.
pub fn derive_synthetic_ip<R: Rng + ?Sized>(range: OctetRange, rng: &mut R) -> Ipv4Addr {
    let mut octet = || rng.gen_range(range.min..=range.max);
    Ipv4Addr::new(octet(), octet(), octet(), octet())
}
