use std::time::Duration;

const DEFAULT_GEOCODE_BASE_URL: &str = "https://maps.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub google_maps_api_key: String,
    pub geocode_base_url: String,
    /// State qualifier appended to every geocoding query.
    pub geocode_region: String,
    pub geocode_timeout: Duration,
    /// Upper bound on concurrent resolutions within one aggregation.
    pub geocode_concurrency: usize,
}

/// `DATABASE_URL` (or `DB_URL`), validated. Tools that only touch the
/// database use this instead of the full [`Config`].
pub fn database_url_from_env() -> anyhow::Result<String> {
    dotenvy::dotenv().ok();

    std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("DB_URL"))
        .map_err(|_| anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required"))
        .and_then(validate_database_url)
}

fn validate_database_url(url: String) -> anyhow::Result<String> {
    if url.trim().is_empty() {
        anyhow::bail!("DATABASE_URL cannot be empty");
    }
    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
    }
    Ok(url)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: database_url_from_env()?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            google_maps_api_key: std::env::var("GOOGLE_MAPS_API_KEY")
                .map_err(|_| anyhow::anyhow!("GOOGLE_MAPS_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("GOOGLE_MAPS_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            geocode_base_url: validate_base_url(
                std::env::var("GEOCODE_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_GEOCODE_BASE_URL.to_string()),
            )?,
            geocode_region: std::env::var("GEOCODE_REGION")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "CA".to_string()),
            geocode_timeout: std::env::var("GEOCODE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    anyhow::anyhow!("GEOCODE_TIMEOUT_SECS must be a positive number of seconds")
                })?,
            geocode_concurrency: std::env::var("GEOCODE_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow::anyhow!("GEOCODE_CONCURRENCY must be a positive number"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Geocode Base URL: {}", config.geocode_base_url);
        tracing::debug!(
            "Geocode region: {}, timeout: {:?}, concurrency: {}",
            config.geocode_region,
            config.geocode_timeout,
            config.geocode_concurrency
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn validate_base_url(raw: String) -> anyhow::Result<String> {
    let parsed = url::Url::parse(&raw)
        .map_err(|e| anyhow::anyhow!("GEOCODE_BASE_URL is not a valid URL: {}", e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("GEOCODE_BASE_URL must start with http:// or https://");
    }
    Ok(raw)
}
