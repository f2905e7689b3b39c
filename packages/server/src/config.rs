use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC secret for capability token signing and verification.
    pub token_secret: String,
}

/// Which `StorageBackend` implementation to run.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    Local,
    Remote,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    /// Custom endpoint for S3-compatible stores; enables path-style access.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub driver: StorageDriver,
    /// Root directory for the local driver.
    #[serde(default = "default_storage_path")]
    pub root_path: String,
    /// Upper bound on a single object upload, in bytes.
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
    /// Per-call timeout for backend operations, in seconds.
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
    #[serde(default)]
    pub s3: S3Config,
}

fn default_storage_path() -> String {
    "./data/objects".into()
}
fn default_max_object_size() -> u64 {
    512 * 1024 * 1024
}
fn default_op_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct GcConfig {
    /// Delay between marking a resource garbage and delete eligibility.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,
    /// Devices with an unresolved claim challenge older than this are marked.
    #[serde(default = "default_unclaimed_expiry")]
    pub unclaimed_expiry: String,
    /// Master switch for the sweep endpoint.
    #[serde(default)]
    pub remove_garbage: bool,
}

fn default_grace_period() -> String {
    "48h".into()
}
fn default_unclaimed_expiry() -> String {
    "30d".into()
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            unclaimed_expiry: default_unclaimed_expiry(),
            remove_garbage: false,
        }
    }
}

impl GcConfig {
    pub fn grace_period(&self) -> Result<chrono::Duration, ConfigError> {
        common::parse_duration(&self.grace_period)
            .map_err(|e| ConfigError::Message(format!("gc.grace_period: {e}")))
    }

    pub fn unclaimed_expiry(&self) -> Result<chrono::Duration, ConfigError> {
        common::parse_duration(&self.unclaimed_expiry)
            .map_err(|e| ConfigError::Message(format!("gc.unclaimed_expiry: {e}")))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub gc: GcConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("storage.driver", "local")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., FLEETHUB__AUTH__TOKEN_SECRET)
            .add_source(Environment::with_prefix("FLEETHUB").separator("__"))
            .build()?;

        let cfg: Self = s.try_deserialize()?;

        // Fail at startup, not on the first GC run.
        cfg.gc.grace_period()?;
        cfg.gc.unclaimed_expiry()?;

        Ok(cfg)
    }
}
