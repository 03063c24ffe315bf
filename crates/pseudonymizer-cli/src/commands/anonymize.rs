//! Pseudonymization run: config, identity, executor, report.

use anyhow::{Context, Result};
use pseudonymizer::{
    DataSourceRegistry, Executor, Identity, IdentityRequest, QueryCatalog, RunReport,
};
use pseudonymizer_config::{ConfigLoader, PseudonymizerConfig};
use tracing::{info, warn};

use crate::Cli;
use crate::style::{
    print_hint, print_info_table, print_report_table, print_spacer, print_success, print_warn,
};

pub fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    let mut settings = config.pseudonym_settings();
    settings.hash_usernames |= cli.sha256;

    let identity = Identity::resolve(identity_request(cli), &settings)
        .context("Failed to resolve the identity to pseudonymize")?;

    let overrides = match &config.queries_file {
        Some(path) => QueryCatalog::load(path)
            .with_context(|| format!("Failed to load query overrides from {}", path.display()))?,
        None => QueryCatalog::default(),
    };

    let registry = DataSourceRegistry::from_configs(&config.datasources)
        .context("Failed to open configured datasources")?;

    if config.databases.is_empty() {
        warn!("no databases configured, nothing to pseudonymize");
    }
    info!(
        user = %identity.username_with_tenant_domain(),
        databases = config.databases.len(),
        datasources = registry.len(),
        "starting pseudonymization"
    );

    let report = Executor::new(&identity, &registry, &config.databases)
        .with_overrides(overrides)
        .run()
        .context("Pseudonymization aborted; statements already committed are kept")?;

    if cli.json {
        print_json(&identity, &report)
    } else {
        print_summary(&identity, &report);
        Ok(())
    }
}

fn load_config(cli: &Cli) -> Result<PseudonymizerConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(dir) = &cli.config_dir {
        loader = loader.with_project_dir(dir);
    }
    let project_dir = loader.project_dir().to_path_buf();
    loader
        .load()
        .with_context(|| format!("Failed to load configuration from {}", project_dir.display()))
}

fn identity_request(cli: &Cli) -> IdentityRequest {
    let mut request = IdentityRequest::new(&cli.username).with_tenant_domain(&cli.tenant_domain);
    if let Some(pseudonym) = &cli.pseudonym {
        request = request.with_pseudonym(pseudonym);
    }
    if let Some(email) = &cli.email {
        request = request.with_email(email);
    }
    if let Some(ip) = cli.ip {
        request = request.with_ip(ip);
    }
    if let Some(tenant_id) = cli.tenant_id {
        request = request.with_tenant_id(tenant_id);
    }
    request
}

fn print_json(identity: &Identity, report: &RunReport) -> Result<()> {
    let output = serde_json::json!({
        "username": identity.username_with_tenant_domain(),
        "pseudonym": identity.pseudonym_with_tenant_domain(),
        "rows_rewritten": report.rows_rewritten(),
        "entries_rewritten": report.entries_rewritten(),
        "databases": report.databases,
    });
    let rendered = serde_json::to_string_pretty(&output).context("Failed to serialize report")?;
    println!("{rendered}");
    Ok(())
}

fn print_summary(identity: &Identity, report: &RunReport) {
    let ip_pseudonym = identity.ip_pseudonym().to_string();
    let mut entries = vec![
        ("User", identity.username_with_tenant_domain()),
        ("Pseudonym", identity.pseudonym_with_tenant_domain()),
    ];
    if identity.ip().is_some() {
        entries.push(("IP pseudonym", ip_pseudonym.as_str()));
    }
    print_info_table(&entries);
    print_spacer();

    if report.databases.is_empty() {
        print_warn("No databases configured.");
        print_hint("Add [[databases]] and [[datasources]] to pseudonymizer.toml");
        return;
    }

    print_report_table(report);
    print_spacer();

    let entry_word = if report.entries_rewritten() == 1 { "entry" } else { "entries" };
    print_success(&format!(
        "{} rows rewritten across {} {entry_word}",
        report.rows_rewritten(),
        report.entries_rewritten()
    ));
}
