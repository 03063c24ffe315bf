//! Pseudonymizer CLI.
//!
//! Replaces one user's username, email and IP address with pseudonyms in
//! every database the project configuration describes.
//!
//! # Quick Start
//!
//! ```bash
//! # pseudonymizer.toml in the current directory lists datasources and rules
//! pseudonymizer -U alice -T wso2.com -E alice@wso2.com -I 10.0.0.5
//!
//! # Deterministic pseudonym, JSON report
//! pseudonymizer -U admin --sha256 --json
//! ```

mod commands;
mod style;

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pseudonymizer::SUPER_TENANT_DOMAIN;

/// Pseudonymizer - GDPR right-to-be-forgotten for relational records.
#[derive(Parser)]
#[command(name = "pseudonymizer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Username to pseudonymize.
    #[arg(short = 'U', long)]
    pub username: String,

    /// Pseudonym to use instead of a generated one.
    #[arg(short = 'P', long)]
    pub pseudonym: Option<String>,

    /// Tenant domain the user belongs to.
    #[arg(short = 'T', long = "tenant", default_value = SUPER_TENANT_DOMAIN)]
    pub tenant_domain: String,

    /// Email address to pseudonymize.
    #[arg(short = 'E', long)]
    pub email: Option<String>,

    /// IPv4 address to pseudonymize.
    #[arg(short = 'I', long)]
    pub ip: Option<Ipv4Addr>,

    /// Numeric tenant id, for templates that use {{TENANT_ID}}.
    #[arg(long, allow_negative_numbers = true)]
    pub tenant_id: Option<i64>,

    /// Derive the pseudonym from the SHA-256 digest of the username.
    #[arg(long)]
    pub sha256: bool,

    /// Project directory holding pseudonymizer.toml.
    #[arg(short = 'c', long = "config-dir")]
    pub config_dir: Option<PathBuf>,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Log every statement outcome.
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    style::set_no_color(cli.no_color || cli.json || std::env::var_os("NO_COLOR").is_some());

    commands::anonymize::run(&cli)
}
