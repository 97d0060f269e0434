use std::sync::Arc;

use anyhow::Context;
use deedbook_cloud::{DeedbookClient, RealtimeFeed, SessionAuth};
use deedbook_core::deeds::Partition;
use deedbook_core::templates::TemplateCatalog;
use deedbook_core::{DeedTable, DeedTableConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::notices::TerminalNoticeSink;

pub fn init_tracing() {
    let log_format = std::env::var("DEEDBOOK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output stays pipeable.
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Signs in according to the config. Without credentials the session stays
/// anonymous.
pub async fn build_auth(config: &Config) -> anyhow::Result<Arc<SessionAuth>> {
    let auth = Arc::new(SessionAuth::new(&config.api_url, &config.anon_key)?);

    if let Some(token) = &config.access_token {
        auth.restore_session(token)
            .await
            .context("Failed to restore session from DEEDBOOK_ACCESS_TOKEN")?;
    } else if let (Some(email), Some(password)) = (&config.email, &config.password) {
        auth.sign_in_with_password(email, password)
            .await
            .context("Failed to sign in")?;
    } else {
        tracing::info!("No credentials configured, continuing anonymously");
    }
    Ok(auth)
}

/// Built-in templates, overlaid with the configured template file if any.
pub fn load_templates(config: &Config) -> anyhow::Result<TemplateCatalog> {
    let mut catalog = TemplateCatalog::builtin();
    if let Some(path) = &config.templates_path {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read templates from {}", path.display()))?;
        catalog.merge(TemplateCatalog::from_json(&json)?);
        tracing::info!("Loaded templates from {}", path.display());
    }
    Ok(catalog)
}

pub async fn build_table(config: &Config, partition: Partition) -> anyhow::Result<DeedTable> {
    let auth = build_auth(config).await?;
    let store = Arc::new(DeedbookClient::new(&config.api_url, auth.clone())?);
    let feed = Arc::new(RealtimeFeed::new(&config.api_url, auth.clone()));
    let table_config = DeedTableConfig::new(partition)
        .with_debounce(config.debounce)
        .with_templates(load_templates(config)?);

    Ok(DeedTable::new(
        table_config,
        store,
        feed,
        auth,
        Arc::new(TerminalNoticeSink),
    ))
}
