use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    /// Optional static key required in the `x-api-key` header of every
    /// /api/v1 request. Unset means the API is open (local deployments).
    pub api_key: Option<String>,
    pub process_interval_secs: u64,
    pub submit_delay_ms: u64,
    pub stale_processing_mins: i64,
    pub health_cooldown_mins: i64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;

        let host: IpAddr = env_or("INDEXFLOW_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid INDEXFLOW_HOST: {e}"))?;

        let port: u16 = env_or("INDEXFLOW_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid INDEXFLOW_PORT: {e}"))?;

        let api_key = std::env::var("INDEXFLOW_API_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let process_interval_secs: u64 = env_or("INDEXFLOW_PROCESS_INTERVAL_SECS", "300")
            .parse()
            .map_err(|e| format!("Invalid INDEXFLOW_PROCESS_INTERVAL_SECS: {e}"))?;

        // The external indexing API is throttled to roughly one request per
        // second; this delay is deliberate, not a tunable for throughput.
        let submit_delay_ms: u64 = env_or("INDEXFLOW_SUBMIT_DELAY_MS", "1000")
            .parse()
            .map_err(|e| format!("Invalid INDEXFLOW_SUBMIT_DELAY_MS: {e}"))?;

        let stale_processing_mins: i64 = env_or("INDEXFLOW_STALE_PROCESSING_MINS", "15")
            .parse()
            .map_err(|e| format!("Invalid INDEXFLOW_STALE_PROCESSING_MINS: {e}"))?;

        let health_cooldown_mins: i64 = env_or("INDEXFLOW_HEALTH_COOLDOWN_MINS", "30")
            .parse()
            .map_err(|e| format!("Invalid INDEXFLOW_HEALTH_COOLDOWN_MINS: {e}"))?;

        let log_level = env_or("INDEXFLOW_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            host,
            port,
            api_key,
            process_interval_secs,
            submit_delay_ms,
            stale_processing_mins,
            health_cooldown_mins,
            log_level,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
