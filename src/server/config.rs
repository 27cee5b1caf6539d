use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub database_url: String,
    /// Only origin allowed to open dashboard sockets, also used for CORS.
    pub frontend_url: String,
    pub jwt_secret: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_alert_check_interval_seconds")]
    pub alert_check_interval_seconds: u64,

    #[serde(default = "default_ping_rate_limit_seconds")]
    pub ping_rate_limit_seconds: u64,

    #[serde(default = "default_hub_client_buffer")]
    pub hub_client_buffer: usize,

    /// 0 disables alert de-duplication.
    #[serde(default)]
    pub alert_dedup_minutes: u64,
}

/// Longest accepted de-duplication window, one week.
pub const MAX_ALERT_DEDUP_MINUTES: u64 = 7 * 24 * 60;

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    listen_addr: Option<String>,
    database_url: Option<String>,
    frontend_url: Option<String>,
    jwt_secret: Option<String>,
    log_dir: Option<String>,
    alert_check_interval_seconds: Option<u64>,
    ping_rate_limit_seconds: Option<u64>,
    hub_client_buffer: Option<usize>,
    alert_dedup_minutes: Option<u64>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_alert_check_interval_seconds() -> u64 {
    30
}

fn default_ping_rate_limit_seconds() -> u64 {
    5
}

fn default_hub_client_buffer() -> usize {
    crate::server::hub::DEFAULT_CLIENT_BUFFER
}

fn parse_env<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key}: {e}")),
        None => Ok(None),
    }
}

impl PartialServerConfig {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        Ok(Self {
            listen_addr: lookup("LISTEN_ADDR"),
            database_url: lookup("DATABASE_URL"),
            frontend_url: lookup("FRONTEND_URL"),
            jwt_secret: lookup("JWT_SECRET"),
            log_dir: lookup("LOG_DIR"),
            alert_check_interval_seconds: parse_env(&lookup, "ALERT_CHECK_INTERVAL_SECONDS")?,
            ping_rate_limit_seconds: parse_env(&lookup, "PING_RATE_LIMIT_SECONDS")?,
            hub_client_buffer: parse_env(&lookup, "HUB_CLIENT_BUFFER")?,
            alert_dedup_minutes: parse_env(&lookup, "ALERT_DEDUP_MINUTES")?,
        })
    }
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_contents = match config_path {
            Some(path_str) if Path::new(path_str).exists() => Some(
                fs::read_to_string(path_str)
                    .map_err(|e| format!("Failed to read config file at {path_str:?}: {e}"))?,
            ),
            _ => None,
        };

        // 2. Environment
        Self::layered(file_contents.as_deref(), |key| std::env::var(key).ok())
    }

    /// Merges an optional TOML document with values from `env`. Environment
    /// values win.
    pub fn layered(
        toml_contents: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let file_config: PartialServerConfig = match toml_contents {
            Some(contents) => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {e}"))?,
            None => PartialServerConfig::default(),
        };
        let env_config = PartialServerConfig::from_lookup(env)?;

        // 3. Merge: environment overrides file
        let final_config = ServerConfig {
            listen_addr: env_config.listen_addr.or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            database_url: env_config.database_url.or(file_config.database_url)
                .ok_or("DATABASE_URL is required")?,
            frontend_url: env_config.frontend_url.or(file_config.frontend_url)
                .ok_or("FRONTEND_URL is required")?,
            jwt_secret: env_config.jwt_secret.or(file_config.jwt_secret)
                .ok_or("JWT_SECRET is required")?,
            log_dir: env_config.log_dir.or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            alert_check_interval_seconds: env_config.alert_check_interval_seconds
                .or(file_config.alert_check_interval_seconds)
                .unwrap_or_else(default_alert_check_interval_seconds),
            ping_rate_limit_seconds: env_config.ping_rate_limit_seconds
                .or(file_config.ping_rate_limit_seconds)
                .unwrap_or_else(default_ping_rate_limit_seconds),
            hub_client_buffer: env_config.hub_client_buffer.or(file_config.hub_client_buffer)
                .unwrap_or_else(default_hub_client_buffer),
            alert_dedup_minutes: env_config.alert_dedup_minutes.or(file_config.alert_dedup_minutes)
                .unwrap_or(0),
        };

        if final_config.alert_check_interval_seconds == 0 {
            return Err("ALERT_CHECK_INTERVAL_SECONDS must be greater than zero".to_string());
        }
        if final_config.alert_dedup_minutes > MAX_ALERT_DEDUP_MINUTES {
            return Err(format!(
                "ALERT_DEDUP_MINUTES must be at most {MAX_ALERT_DEDUP_MINUTES}"
            ));
        }
        Ok(final_config)
    }
}
