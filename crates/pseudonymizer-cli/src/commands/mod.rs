//! CLI command implementations.

pub mod anonymize;
