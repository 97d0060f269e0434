use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use deedbook_core::constants::{DEFAULT_DEBOUNCE, LEGACY_PARTITION};

pub struct Config {
    pub api_url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub partition: String,
    pub debounce: Duration,
    pub templates_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let api_url = required("DEEDBOOK_API_URL")?;
        let anon_key = required("DEEDBOOK_ANON_KEY")?;
        let partition = optional("DEEDBOOK_PARTITION").unwrap_or_else(|| LEGACY_PARTITION.into());
        let debounce = match optional("DEEDBOOK_DEBOUNCE_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse()
                    .with_context(|| format!("Invalid DEEDBOOK_DEBOUNCE_MS: {}", ms))?,
            ),
            None => DEFAULT_DEBOUNCE,
        };
        Ok(Self {
            api_url,
            anon_key,
            access_token: optional("DEEDBOOK_ACCESS_TOKEN"),
            email: optional("DEEDBOOK_EMAIL"),
            password: optional("DEEDBOOK_PASSWORD"),
            partition,
            debounce,
            templates_path: optional("DEEDBOOK_TEMPLATES").map(PathBuf::from),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str) -> anyhow::Result<String> {
    match optional(name) {
        Some(value) => Ok(value),
        None => bail!("{} must be set", name),
    }
}
