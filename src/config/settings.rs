//! Application settings loaded from config.toml
//!
//! Every field has a default, so a missing file yields a working configuration.
//! `DATABASE_URL` in the environment (or `.env`) overrides the file value.

use crate::errors::{Error, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Settings shared by the whole reporting pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Database connection string
    pub database_url: String,
    /// Most recent year a comparison mode can refer to
    pub latest_year: i32,
    /// Offset applied when turning report dates into instants
    pub utc_offset_minutes: i32,
    /// How long a rendered report stays cached
    pub cache_ttl_secs: u64,
    /// Budget for the exact distinct-ticket count before falling back to an estimate
    pub aggregation_timeout_ms: u64,
    /// Warehouse and test locations hidden from every aggregate view
    pub excluded_locations: Vec<String>,
    /// Promotional product groups left out of cross-sell and product tiering
    pub excluded_product_groups: Vec<String>,
    /// Bag and packaging codes that never count as items
    pub non_merchandise_product_ids: Vec<String>,
    /// Product type marking a line as sellable merchandise
    pub sellable_product_type: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/sales_pulse.sqlite?mode=rwc".to_string(),
            latest_year: 2026,
            utc_offset_minutes: 0,
            cache_ttl_secs: 900,
            aggregation_timeout_ms: 5_000,
            excluded_locations: vec!["მთავარი საწყობი 2".to_string(), "სატესტო".to_string()],
            excluded_product_groups: vec!["POP".to_string()],
            non_merchandise_product_ids: vec![
                "M9157".to_string(),
                "M9121".to_string(),
                "M9850".to_string(),
            ],
            sellable_product_type: "selling item".to_string(),
        }
    }
}

impl AppConfig {
    /// Timezone the report dates are interpreted in.
    ///
    /// Out-of-range offsets fall back to UTC.
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    /// Cache entry lifetime
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Budget for timeout-guarded aggregations
    #[must_use]
    pub const fn aggregation_budget(&self) -> Duration {
        Duration::from_millis(self.aggregation_timeout_ms)
    }
}

/// Parses settings from a TOML string.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if the file exists but cannot be read, or if the TOML is invalid.
/// A missing file is not an error; defaults are used instead.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        tracing::info!("No config file at {:?}, using defaults", path_ref);
        return Ok(AppConfig::default());
    }

    tracing::debug!("Loading configuration from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads ./config.toml and applies the `DATABASE_URL` override.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = Path::new("config.toml");
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        tracing::info!("No config.toml found, using default settings");
        AppConfig::default()
    };
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database_url = url;
    }
    Ok(config)
}
