use std::net::SocketAddr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;
use tracing::trace;

use crate::util::{get_default_api_addr, millis, parse_flag};

/// Topic pattern for position reports of every unit
pub const POSITION_TOPIC: &str = "+/gps";

/// Topic pattern for distance reports of every unit
pub const DISTANCE_TOPIC: &str = "+/distance";

pub const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Pause between reconnect attempts after a lost broker connection
pub const MQTT_RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({expected})")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

/// Broker connection settings
#[derive(Clone, serde::Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_true")]
    pub tls: bool,

    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            tls: true,
            client_id: default_client_id(),
        }
    }
}

// credentials stay out of log output
impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LivenessConfig {
    /// A unit silent for longer than this is offline
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Period of the liveness sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl LivenessConfig {
    pub fn timeout(&self) -> TimeDelta {
        millis(self.timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

/// Notification destination and delivery channel credentials
#[derive(Clone, serde::Deserialize)]
pub struct AlertConfig {
    /// Without a destination every dispatch is suppressed
    pub email: Option<String>,

    #[serde(default = "default_from")]
    pub from: String,

    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    pub webhook_url: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            email: None,
            from: default_from(),
            api_key: None,
            api_url: default_api_url(),
            webhook_url: None,
        }
    }
}

impl std::fmt::Debug for AlertConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertConfig")
            .field("email", &self.email)
            .field("from", &self.from)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_url", &self.api_url)
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "get_default_api_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: get_default_api_addr(),
            enable_cors: true,
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    8883
}

fn default_true() -> bool {
    true
}

fn default_client_id() -> String {
    "tanker-watch-hub".to_string()
}

fn default_timeout() -> u64 {
    60_000
}

fn default_sweep_interval() -> u64 {
    5_000
}

fn default_from() -> String {
    "SWAT Alert <onboarding@resend.dev>".to_string()
}

fn default_api_url() -> String {
    "https://api.resend.com".to_string()
}

impl Config {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Config::default();

        if let Some(host) = get("MQTT_HOST") {
            config.mqtt.host = host;
        }
        if let Some(port) = get("MQTT_PORT") {
            config.mqtt.port = parse_number("MQTT_PORT", port)?;
        }
        config.mqtt.username = get("MQTT_USERNAME");
        config.mqtt.password = get("MQTT_PASSWORD");
        if let Some(tls) = get("MQTT_TLS") {
            config.mqtt.tls = parse_flag(&tls).ok_or(ConfigError::InvalidValue {
                key: "MQTT_TLS",
                value: tls,
                expected: "true or false",
            })?;
        }
        if let Some(client_id) = get("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }

        if let Some(timeout) = get("TAMPER_TIMEOUT_MS") {
            config.liveness.timeout_ms = parse_number("TAMPER_TIMEOUT_MS", timeout)?;
        }
        if let Some(interval) = get("SWEEP_INTERVAL_MS") {
            config.liveness.sweep_interval_ms = parse_number("SWEEP_INTERVAL_MS", interval)?;
        }

        config.alerts.email = get("ALERT_EMAIL");
        if let Some(from) = get("ALERT_FROM") {
            config.alerts.from = from;
        }
        config.alerts.api_key = get("RESEND_API_KEY");
        if let Some(api_url) = get("RESEND_API_URL") {
            config.alerts.api_url = api_url;
        }
        config.alerts.webhook_url = get("ALERT_WEBHOOK_URL");

        if let Some(addr) = get("API_ADDR") {
            config.api.bind_addr = addr.parse().map_err(|_| ConfigError::InvalidValue {
                key: "API_ADDR",
                value: addr,
                expected: "socket address",
            })?;
        }

        trace!("loaded config from environment: {config:?}");
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value,
        expected: "number",
    })
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
