//! Exporter configuration

use anyhow::{Context, Result};
use exporter_lib::{
    pipeline::{CatalogSettings, PipelineSettings},
    FinopsError,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Role assumed in every member account
    #[serde(default = "default_role_name")]
    pub role_name: String,

    /// Enterprise discount applied to every figure, in [0, 1]
    #[serde(default = "default_discount")]
    pub discount: f64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Mattermost incoming webhook; recommendations are only logged without one
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,

    /// Root of the captured provider export
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Price-list location filter
    #[serde(default = "default_location")]
    pub location: String,

    /// Price-list engine filter for database offers
    #[serde(default = "default_database_engine")]
    pub database_engine: String,
}

fn default_role_name() -> String {
    "finops-tool-member-role".to_string()
}

fn default_discount() -> f64 {
    0.34
}

fn default_api_port() -> u16 {
    8000
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("export")
}

fn default_location() -> String {
    "EU (Frankfurt)".to_string()
}

fn default_database_engine() -> String {
    "PostgreSQL".to_string()
}

impl ExporterConfig {
    /// Load configuration from an optional file and `FINOPS_*` environment variables
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("FINOPS"))
            .build()
            .context("Failed to read configuration")?;

        let config: ExporterConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FinopsError> {
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(FinopsError::Config(format!(
                "discount must be within [0, 1], got {}",
                self.discount
            )));
        }
        if self.role_name.trim().is_empty() {
            return Err(FinopsError::Config("role_name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            role_name: self.role_name.clone(),
            discount: self.discount,
        }
    }

    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            location: self.location.clone(),
            database_engine: self.database_engine.clone(),
        }
    }
}

/// Account ids from a file holding one id per line
pub fn read_account_ids(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read account file {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
