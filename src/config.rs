use std::net::IpAddr;
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;
use crate::queue::QueueConfig;
use crate::queue::backoff::DEFAULT_RETRY_DELAYS_MS;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub remote: RemoteConfig,
    pub batch_size: usize,
    pub retry_delays: Vec<Duration>,
    pub retention_hours: i64,
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub probe_interval: Duration,
    pub auto_sync: bool,
    pub background_sync: bool,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_or("DATABASE_URL", "sqlite://dropin-sync.db?mode=rwc");

        let host: IpAddr = env_or("DROPIN_HOST", "127.0.0.1")
            .parse()
            .map_err(|e| format!("Invalid DROPIN_HOST: {e}"))?;

        let port: u16 = env_or("DROPIN_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid DROPIN_PORT: {e}"))?;

        let remote = RemoteConfig {
            base_url: env_required("DROPIN_REMOTE_URL")?,
            token: std::env::var("DROPIN_REMOTE_TOKEN").ok(),
        };

        let batch_size: usize = env_or("DROPIN_BATCH_SIZE", "10")
            .parse()
            .map_err(|e| format!("Invalid DROPIN_BATCH_SIZE: {e}"))?;
        if batch_size == 0 {
            return Err("Invalid DROPIN_BATCH_SIZE: must be at least 1".to_string());
        }

        let default_delays = DEFAULT_RETRY_DELAYS_MS
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let retry_delays = parse_delays(&env_or("DROPIN_RETRY_DELAYS_MS", &default_delays))?;

        let retention_hours: i64 = env_or("DROPIN_RETENTION_HOURS", "24")
            .parse()
            .map_err(|e| format!("Invalid DROPIN_RETENTION_HOURS: {e}"))?;

        let poll_interval = env_secs("DROPIN_POLL_INTERVAL_SECS", "30")?;
        let stats_interval = env_secs("DROPIN_STATS_INTERVAL_SECS", "10")?;
        let probe_interval = env_secs("DROPIN_PROBE_INTERVAL_SECS", "15")?;

        let auto_sync = env_bool("DROPIN_AUTO_SYNC", true)?;
        let background_sync = env_bool("DROPIN_BACKGROUND_SYNC", true)?;

        let log_level = env_or("DROPIN_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            host,
            port,
            remote,
            batch_size,
            retry_delays,
            retention_hours,
            poll_interval,
            stats_interval,
            probe_interval,
            auto_sync,
            background_sync,
            log_level,
        })
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            batch_size: self.batch_size,
            retry_delays: self.retry_delays.clone(),
            retention_hours: self.retention_hours,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            poll_interval: self.poll_interval,
            stats_interval: self.stats_interval,
            auto_sync: self.auto_sync,
            // The connectivity probe reports the first real reading.
            start_online: false,
        }
    }
}

fn parse_delays(raw: &str) -> Result<Vec<Duration>, String> {
    let delays = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| format!("Invalid DROPIN_RETRY_DELAYS_MS entry '{s}': {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if delays.is_empty() {
        return Err("Invalid DROPIN_RETRY_DELAYS_MS: at least one delay is required".to_string());
    }
    Ok(delays)
}

fn env_secs(key: &str, default: &str) -> Result<Duration, String> {
    let secs: u64 = env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))?;
    if secs == 0 {
        return Err(format!("Invalid {key}: must be at least 1"));
    }
    Ok(Duration::from_secs(secs))
}

fn env_bool(key: &str, default: bool) -> Result<bool, String> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(format!("Invalid {key}: expected a boolean, got '{other}'")),
        },
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
