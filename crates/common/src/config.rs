use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: Vec<String>,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default = "default_connect_timeout_ms")]
    pub upstream_connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub upstream_read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_admin_listen(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryBackend {
    Static,
    Consul,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_backend")]
    pub backend: DiscoveryBackend,
    /// Upper bound on one discovery lookup as seen by the gateway.
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub consul: ConsulConfig,
    /// Endpoints for the static backend, keyed by service name.
    #[serde(default)]
    pub services: BTreeMap<String, Vec<StaticEndpoint>>,
    /// Advertise the gateway itself at startup.
    #[serde(default)]
    pub register: Option<SelfRegistration>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: default_discovery_backend(),
            timeout_ms: default_discovery_timeout_ms(),
            consul: ConsulConfig::default(),
            services: BTreeMap::new(),
            register: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulConfig {
    #[serde(default = "default_consul_address")]
    pub address: String,
    #[serde(default = "default_consul_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: default_consul_address(),
            timeout_ms: default_consul_timeout_ms(),
            health_check_interval_secs: default_health_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticEndpoint {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfRegistration {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub health_check_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub path_prefix: String,
    pub service: String,
    #[serde(default)]
    pub balance: BalanceStrategy,
    /// Presence of a policy means the route requires a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RouteAuthPolicy>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    #[default]
    RoundRobin,
    Weighted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAuthPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub leeway_secs: u64,
    #[serde(default)]
    pub active_tokens: ActiveTokensConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTokensBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTokensConfig {
    #[serde(default = "default_active_tokens_backend")]
    pub backend: ActiveTokensBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_active_token_prefix")]
    pub key_prefix: String,
}

impl Default for ActiveTokensConfig {
    fn default() -> Self {
        Self {
            backend: default_active_tokens_backend(),
            redis_url: None,
            key_prefix: default_active_token_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_retention")]
    pub retention_secs: u64,
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_audit_retention(),
            capacity: default_audit_capacity(),
        }
    }
}

// Default value helpers
fn default_admin_listen() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_true() -> bool {
    true
}
fn default_weight() -> u32 {
    1
}
fn default_connect_timeout_ms() -> u64 {
    2_000
}
fn default_read_timeout_ms() -> u64 {
    30_000
}
fn default_discovery_backend() -> DiscoveryBackend {
    DiscoveryBackend::Static
}
fn default_discovery_timeout_ms() -> u64 {
    3_000
}
fn default_consul_address() -> String {
    "http://127.0.0.1:8500".to_string()
}
fn default_consul_timeout_ms() -> u64 {
    2_000
}
fn default_health_interval() -> u64 {
    10
}
fn default_max_requests() -> usize {
    100
}
fn default_window_secs() -> u64 {
    60
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_algorithm() -> String {
    "HS256".to_string()
}
fn default_active_tokens_backend() -> ActiveTokensBackend {
    ActiveTokensBackend::Memory
}
fn default_active_token_prefix() -> String {
    "auth:active".to_string()
}
fn default_audit_retention() -> u64 {
    24 * 60 * 60
}
fn default_audit_capacity() -> usize {
    10_000
}

const SUPPORTED_ALGORITHMS: &[&str] = &["HS256", "HS384", "HS512"];

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.listen.is_empty() {
            anyhow::bail!("server.listen must have at least one address");
        }

        validate_routes(&self.routes)?;

        if self.auth.secret.is_empty() {
            anyhow::bail!("auth.secret must not be empty");
        }
        if !SUPPORTED_ALGORITHMS.contains(&self.auth.algorithm.as_str()) {
            anyhow::bail!(
                "auth.algorithm '{}' is not supported (expected one of {:?})",
                self.auth.algorithm,
                SUPPORTED_ALGORITHMS
            );
        }
        if self.auth.active_tokens.backend == ActiveTokensBackend::Redis
            && self.auth.active_tokens.redis_url.is_none()
        {
            anyhow::bail!("auth.active_tokens.redis_url is required for the redis backend");
        }

        if self.rate_limit.enabled
            && (self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0)
        {
            anyhow::bail!("rate_limit.max_requests and rate_limit.window_secs must be positive");
        }

        for (name, endpoints) in &self.discovery.services {
            if endpoints.is_empty() {
                anyhow::bail!("static service '{}' has no endpoints", name);
            }
        }

        Ok(())
    }
}

/// Validate an ordered route table.
///
/// Used both at startup and before a hot route-table swap.
pub fn validate_routes(routes: &[RouteConfig]) -> anyhow::Result<()> {
    for route in routes {
        if !route.path_prefix.starts_with('/') {
            anyhow::bail!(
                "route prefix '{}' must start with '/' (service={})",
                route.path_prefix,
                route.service
            );
        }
        if route.service.trim().is_empty() {
            anyhow::bail!("route '{}' has an empty service name", route.path_prefix);
        }
    }
    Ok(())
}
