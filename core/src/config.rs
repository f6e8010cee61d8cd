//! Terminal configuration.
//!
//! Everything here is fixed at build time (firmware) or read from the
//! environment (simulator) before the session starts.

use std::str::FromStr;
use std::time::Duration;

use url::{form_urlencoded, Url};

use crate::card::UidCase;
use crate::error::ConfigError;

/// Station credentials for the attendance network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl WifiCredentials {
    /// Decode an `application/x-www-form-urlencoded` setup form with `ssid`
    /// and `password` fields. An empty or missing ssid yields `None`.
    pub fn from_form(body: &str) -> Option<Self> {
        let mut ssid = None;
        let mut password = String::new();
        for (key, value) in form_urlencoded::parse(body.trim().as_bytes()) {
            match key.as_ref() {
                "ssid" => ssid = Some(value.into_owned()),
                "password" => password = value.into_owned(),
                _ => {}
            }
        }
        let ssid = ssid.filter(|s| !s.is_empty() && s.len() <= 32)?;
        Some(Self { ssid, password })
    }
}

/// Access point advertised while collecting credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub ssid: String,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            ssid: "TapStation-Setup".to_string(),
            password: None,
            timeout: Duration::from_secs(180),
        }
    }
}

/// Bounded silent reconnection before falling back to the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_millis(500),
        }
    }
}

/// Cadence of the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Minimum time between idle "ready" notifications
    pub idle_interval: Duration,
    /// Pause after a card cycle so a held card is not read twice
    pub cooldown: Duration,
    /// Fixed delay at the end of every iteration
    pub poll_delay: Duration,
    /// How long a single reader poll may wait for a card
    pub reader_timeout: Duration,
    /// Re-emit period of the fatal notification while halted
    pub halt_interval: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(10),
            cooldown: Duration::from_secs(3),
            poll_delay: Duration::from_millis(250),
            reader_timeout: Duration::from_millis(100),
            halt_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Sent as `device_id` with every submission
    pub device_id: String,
    /// Attendance endpoint, e.g. `http://10.0.0.2:5000/api/attendance`
    pub endpoint: String,
    /// Optional service status page probed after connecting
    pub status_url: Option<String>,
    /// Known credentials; `None` means the terminal must be provisioned
    pub wifi: Option<WifiCredentials>,
    /// Ignore stored credentials and open the portal at startup
    pub reset_credentials: bool,
    pub portal: PortalConfig,
    pub reconnect: ReconnectPolicy,
    pub timing: SessionTiming,
    pub uid_case: UidCase,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: "unknown".to_string(),
            endpoint: "http://192.168.1.100:5000/api/attendance".to_string(),
            status_url: None,
            wifi: None,
            reset_credentials: false,
            portal: PortalConfig::default(),
            reconnect: ReconnectPolicy::default(),
            timing: SessionTiming::default(),
            uid_case: UidCase::Lower,
        }
    }
}

impl Config {
    /// Load configuration from `TAPSTATION_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(device_id) = lookup("TAPSTATION_DEVICE_ID") {
            config.device_id = device_id;
        }
        if let Some(endpoint) = lookup("TAPSTATION_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.status_url = lookup("TAPSTATION_STATUS_URL").filter(|url| !url.is_empty());

        if let Some(ssid) = lookup("TAPSTATION_WIFI_SSID").filter(|s| !s.is_empty()) {
            config.wifi = Some(WifiCredentials {
                ssid,
                password: lookup("TAPSTATION_WIFI_PASSWORD").unwrap_or_default(),
            });
        }
        if let Some(reset) = lookup("TAPSTATION_RESET_CREDENTIALS") {
            config.reset_credentials = parse_flag(&reset)
                .ok_or(ConfigError::Invalid("TAPSTATION_RESET_CREDENTIALS", "must be true or false"))?;
        }

        if let Some(ssid) = lookup("TAPSTATION_PORTAL_SSID") {
            config.portal.ssid = ssid;
        }
        config.portal.password = lookup("TAPSTATION_PORTAL_PASSWORD").filter(|p| !p.is_empty());
        if let Some(secs) = lookup("TAPSTATION_PORTAL_TIMEOUT_SECS") {
            config.portal.timeout = Duration::from_secs(parse_number(
                &secs,
                "TAPSTATION_PORTAL_TIMEOUT_SECS",
            )?);
        }

        if let Some(attempts) = lookup("TAPSTATION_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = parse_number(&attempts, "TAPSTATION_RECONNECT_ATTEMPTS")?;
        }
        if let Some(ms) = lookup("TAPSTATION_RECONNECT_INTERVAL_MS") {
            config.reconnect.interval =
                Duration::from_millis(parse_number(&ms, "TAPSTATION_RECONNECT_INTERVAL_MS")?);
        }
        if let Some(secs) = lookup("TAPSTATION_IDLE_INTERVAL_SECS") {
            config.timing.idle_interval =
                Duration::from_secs(parse_number(&secs, "TAPSTATION_IDLE_INTERVAL_SECS")?);
        }
        if let Some(ms) = lookup("TAPSTATION_COOLDOWN_MS") {
            config.timing.cooldown =
                Duration::from_millis(parse_number(&ms, "TAPSTATION_COOLDOWN_MS")?);
        }

        if let Some(case) = lookup("TAPSTATION_UID_CASE") {
            config.uid_case = match case.to_ascii_lowercase().as_str() {
                "lower" => UidCase::Lower,
                "upper" => UidCase::Upper,
                _ => return Err(ConfigError::Invalid("TAPSTATION_UID_CASE", "must be lower or upper")),
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the session relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Missing("device_id"));
        }
        if !is_http_url(&self.endpoint) {
            return Err(ConfigError::Invalid("endpoint", "must be an http:// or https:// URL"));
        }
        if let Some(url) = &self.status_url {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid("status_url", "must be an http:// or https:// URL"));
            }
        }
        if let Some(wifi) = &self.wifi {
            if wifi.ssid.is_empty() || wifi.ssid.len() > 32 {
                return Err(ConfigError::Invalid("wifi.ssid", "must be 1 to 32 bytes"));
            }
        }
        if self.portal.ssid.is_empty() || self.portal.ssid.len() > 32 {
            return Err(ConfigError::Invalid("portal.ssid", "must be 1 to 32 bytes"));
        }
        if let Some(password) = &self.portal.password {
            if password.len() < 8 {
                return Err(ConfigError::Invalid("portal.password", "must be at least 8 characters"));
            }
        }
        if self.portal.timeout.is_zero() {
            return Err(ConfigError::Invalid("portal.timeout", "must be greater than zero"));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Invalid("reconnect.max_attempts", "must be at least 1"));
        }
        if self.timing.idle_interval.is_zero() {
            return Err(ConfigError::Invalid("timing.idle_interval", "must be greater than zero"));
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_number<T: FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(key, "must be a non-negative integer"))
}
