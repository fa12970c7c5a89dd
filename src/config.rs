use serde::Deserialize;
use url::Url;

/// Default vendor API root.
pub const DEFAULT_LIGHTFUSION_BASE_URL: &str = "https://api.lightfusion.io";
/// Default public bucket holding generated mesh assets.
pub const DEFAULT_LIGHTFUSION_ASSET_BASE_URL: &str =
    "https://storage.googleapis.com/lightfusiondev/leads";
pub const DEFAULT_GENABILITY_BASE_URL: &str = "https://api.genability.com/rest/";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub lightfusion_base_url: String,
    pub lightfusion_asset_base_url: String,
    pub lightfusion_email: Option<String>,
    pub lightfusion_password: Option<String>,
    pub genability_base_url: String,
    pub genability_app_id: Option<String>,
    pub genability_app_key: Option<String>,
    pub media_dir: String,
    pub default_panel_id: i64,
    pub default_inverter_id: i64,
    pub gateway_timeout_secs: u64,
    pub tariff_cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            lightfusion_base_url: http_url_var(
                "LIGHTFUSION_BASE_URL",
                DEFAULT_LIGHTFUSION_BASE_URL,
            )?,
            lightfusion_asset_base_url: http_url_var(
                "LIGHTFUSION_ASSET_BASE_URL",
                DEFAULT_LIGHTFUSION_ASSET_BASE_URL,
            )?,
            lightfusion_email: optional_var("LIGHTFUSION_EMAIL"),
            lightfusion_password: optional_var("LIGHTFUSION_PASSWORD"),
            genability_base_url: http_url_var("GENABILITY_BASE_URL", DEFAULT_GENABILITY_BASE_URL)?,
            genability_app_id: optional_var("GENABILITY_APP_ID")
                .or_else(|| optional_var("GENABILITY_ID")),
            genability_app_key: optional_var("GENABILITY_APP_KEY")
                .or_else(|| optional_var("GENABILITY_KEY")),
            media_dir: optional_var("MEDIA_DIR").unwrap_or_else(|| "./media".to_string()),
            default_panel_id: parsed_var("DEFAULT_PANEL_ID", 156)?,
            default_inverter_id: parsed_var("DEFAULT_INVERTER_ID", 324)?,
            gateway_timeout_secs: parsed_var("GATEWAY_TIMEOUT_SECS", 30)?,
            tariff_cache_ttl_secs: parsed_var("TARIFF_CACHE_TTL_SECS", 3600)?,
        };

        if config.gateway_timeout_secs == 0 {
            anyhow::bail!("GATEWAY_TIMEOUT_SECS must be greater than 0");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("LightFusion Base URL: {}", config.lightfusion_base_url);
        tracing::debug!("LightFusion Asset URL: {}", config.lightfusion_asset_base_url);
        if !config.lightfusion_credentials_present() {
            tracing::warn!(
                "LightFusion credentials not provided. Set LIGHTFUSION_EMAIL and LIGHTFUSION_PASSWORD"
            );
        }
        if !config.tariff_lookup_enabled() {
            tracing::warn!("GENABILITY_APP_ID/GENABILITY_APP_KEY not set, tariff lookup disabled");
        }
        tracing::debug!("Media dir: {}", config.media_dir);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn lightfusion_credentials_present(&self) -> bool {
        self.lightfusion_email.is_some() && self.lightfusion_password.is_some()
    }

    pub fn tariff_lookup_enabled(&self) -> bool {
        self.genability_app_id.is_some() && self.genability_app_key.is_some()
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn http_url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let raw = optional_var(name).unwrap_or_else(|| default.to_string());
    let parsed = Url::parse(&raw).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(raw)
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        None => Ok(default),
    }
}
