//! Gateway configuration.
//!
//! Loaded from a TOML or JSON file, then overridden from `GATEWAY_*`
//! environment variables, then validated. Every section is optional and
//! falls back to its defaults.
//!
//! ```toml
//! [server]
//! port = 8080
//! mode = "release"
//!
//! [services.user-service]
//! host = "users.internal"
//! port = 3002
//!
//! [rate_limit]
//! requests = 100
//! window = "60s"
//! ```
//!
//! A `[services]` table replaces the default service map as a whole.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use baribhara_middleware::RedisSettings;
use baribhara_telemetry::{LogConfig, LogFormat, MetricsConfig};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayStartupError, StartupResult};

/// Server modes; `release` switches logging to JSON.
pub const MODES: [&str; 3] = ["debug", "release", "test"];

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings.
    pub server: ServerSettings,
    /// Backend services by logical name.
    pub services: BTreeMap<String, ServiceSettings>,
    /// Counter store connection.
    pub redis: RedisSection,
    /// Token verification.
    pub jwt: JwtSettings,
    /// Request budget per client.
    pub rate_limit: RateLimitSettings,
    /// Outbound HTTP client.
    pub upstream: UpstreamSettings,
    /// Cross-origin policy.
    pub cors: CorsSettings,
    /// Prometheus endpoint.
    pub metrics: MetricsSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            services: default_services(),
            redis: RedisSection::default(),
            jwt: JwtSettings::default(),
            rate_limit: RateLimitSettings::default(),
            upstream: UpstreamSettings::default(),
            cors: CorsSettings::default(),
            metrics: MetricsSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> StartupResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayStartupError::config(format!("failed to read {}: {e}", path.display()))
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| GatewayStartupError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| GatewayStartupError::config(format!("invalid JSON: {e}"))),
            _ => Err(GatewayStartupError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Applies `GATEWAY_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides using `lookup` in place of the process environment.
    ///
    /// Values that fail to parse are ignored.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(port) = lookup("GATEWAY_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(mode) = lookup("GATEWAY_MODE") {
            self.server.mode = mode;
        }

        if let Some(host) = lookup("GATEWAY_REDIS_HOST") {
            self.redis.host = host;
        }
        if let Some(port) = lookup("GATEWAY_REDIS_PORT").and_then(|v| v.parse().ok()) {
            self.redis.port = port;
        }
        if let Some(password) = lookup("GATEWAY_REDIS_PASSWORD") {
            self.redis.password = password;
        }
        if let Some(db) = lookup("GATEWAY_REDIS_DB").and_then(|v| v.parse().ok()) {
            self.redis.db = db;
        }

        if let Some(secret) = lookup("GATEWAY_JWT_SECRET") {
            self.jwt.secret = secret;
        }

        if let Some(requests) = parsed("GATEWAY_RATE_LIMIT_REQUESTS") {
            self.rate_limit.requests = requests;
        }
        if let Some(secs) = parsed("GATEWAY_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed("GATEWAY_UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout = Duration::from_secs(secs);
        }

        if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }

        for (name, service) in &mut self.services {
            let prefix = format!("GATEWAY_SERVICE_{}", env_key(name));
            if let Some(host) = lookup(&format!("{prefix}_HOST")) {
                service.host = host;
            }
            if let Some(port) = lookup(&format!("{prefix}_PORT")).and_then(|v| v.parse().ok()) {
                service.port = port;
            }
        }

        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StartupResult<()> {
        if self.server.port == 0 {
            return Err(GatewayStartupError::invalid("server.port must not be 0"));
        }
        if !MODES.contains(&self.server.mode.as_str()) {
            return Err(GatewayStartupError::invalid(format!(
                "server.mode must be one of {MODES:?}, got '{}'",
                self.server.mode
            )));
        }
        if self.jwt.secret.is_empty() {
            return Err(GatewayStartupError::invalid("jwt.secret must not be empty"));
        }
        if self.rate_limit.requests == 0 {
            return Err(GatewayStartupError::invalid("rate_limit.requests must not be 0"));
        }
        if self.rate_limit.window.is_zero() {
            return Err(GatewayStartupError::invalid("rate_limit.window must not be 0"));
        }
        if self.rate_limit.window.subsec_nanos() != 0 {
            return Err(GatewayStartupError::invalid(format!(
                "rate_limit.window must be a whole number of seconds, got {:?}",
                self.rate_limit.window
            )));
        }
        if self.redis.command_timeout.is_zero() {
            return Err(GatewayStartupError::invalid("redis.command_timeout must not be 0"));
        }
        if self.upstream.timeout.is_zero() {
            return Err(GatewayStartupError::invalid("upstream.timeout must not be 0"));
        }
        for (name, service) in &self.services {
            if service.host.is_empty() {
                return Err(GatewayStartupError::invalid(format!(
                    "services.{name}.host must not be empty"
                )));
            }
            if service.port == 0 {
                return Err(GatewayStartupError::invalid(format!(
                    "services.{name}.port must not be 0"
                )));
            }
        }
        if !self.metrics.path.starts_with('/') {
            return Err(GatewayStartupError::invalid(format!(
                "metrics.path must start with '/', got '{}'",
                self.metrics.path
            )));
        }
        Ok(())
    }

    /// Logging setup for this configuration.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::for_mode(&self.server.mode).with_level(&self.logging.level);
        if let Some(format) = self.logging.format {
            config.format = format;
        }
        config
    }

    /// Metrics setup for this configuration.
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.metrics.enabled,
            ..MetricsConfig::default()
        }
    }
}

/// `user-service` → `USER_SERVICE`.
fn env_key(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// `debug`, `release` or `test`.
    pub mode: String,
    /// Time allowed for a client to send request headers.
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,
    /// Time allowed for open connections to drain on shutdown.
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 8080,
            mode: "debug".to_string(),
            read_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// One backend service address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Host name or IP.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServiceSettings {
    /// Creates a service address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// The default service map: every backend on `localhost`, ports 3001-3009.
#[must_use]
pub fn default_services() -> BTreeMap<String, ServiceSettings> {
    [
        ("auth-service", 3001),
        ("user-service", 3002),
        ("property-service", 3003),
        ("tenant-service", 3004),
        ("invoice-service", 3005),
        ("notification-service", 3006),
        ("report-service", 3007),
        ("admin-service", 3008),
        ("caretaker-service", 3009),
    ]
    .into_iter()
    .map(|(name, port)| (name.to_string(), ServiceSettings::new("localhost", port)))
    .collect()
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Password; empty for none.
    pub password: String,
    /// Database index.
    pub db: i64,
    /// Bound on establishing the connection.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Bound on each command round trip.
    #[serde(with = "duration_serde")]
    pub command_timeout: Duration,
}

impl Default for RedisSection {
    fn default() -> Self {
        let defaults = RedisSettings::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            password: defaults.password,
            db: defaults.db,
            connect_timeout: defaults.connect_timeout,
            command_timeout: defaults.command_timeout,
        }
    }
}

impl From<&RedisSection> for RedisSettings {
    fn from(section: &RedisSection) -> Self {
        Self {
            host: section.host.clone(),
            port: section.port,
            password: section.password.clone(),
            db: section.db,
            connect_timeout: section.connect_timeout,
            command_timeout: section.command_timeout,
        }
    }
}

/// Token verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// Shared HMAC secret.
    pub secret: String,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: "your-secret-key".to_string(),
        }
    }
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Shared Redis counters.
    #[default]
    Redis,
    /// In-process counters, for a single instance.
    Memory,
}

/// Rate limit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests allowed per window.
    pub requests: u64,
    /// Window length.
    #[serde(with = "duration_serde")]
    pub window: Duration,
    /// Counter store.
    pub backend: RateLimitBackend,
    /// Peers whose forwarding headers are believed; empty trusts every peer.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests: 100,
            window: Duration::from_secs(60),
            backend: RateLimitBackend::Redis,
            trusted_proxies: Vec::new(),
        }
    }
}

/// Outbound client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Whole-request timeout for one backend call.
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Idle keep-alive connections kept per backend.
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 100,
        }
    }
}

/// CORS settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,
    /// Whether browsers may send credentials.
    pub allow_credentials: bool,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: false,
        }
    }
}

/// Metrics endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Whether the Prometheus endpoint is served.
    pub enabled: bool,
    /// Path of the endpoint.
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

/// Log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive.
    pub level: String,
    /// Output format; derived from `server.mode` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
        }
    }
}

/// Durations as `"500ms"`, `"30s"`, `"2m"` or `"1h"`.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{s}'"))?;

        let secs = |factor: u64| {
            n.checked_mul(factor)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration '{s}' is out of range"))
        };
        match unit.trim() {
            "ms" => Ok(Duration::from_millis(n)),
            "" | "s" => Ok(Duration::from_secs(n)),
            "m" => secs(60),
            "h" => secs(3600),
            other => Err(format!("unknown duration unit '{other}' in '{s}'")),
        }
    }
}
