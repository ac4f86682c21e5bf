//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub licensing: LicensingConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Whether to expose interactive API docs (Swagger UI).
    pub enable_docs: bool,
    /// Global request timeout in seconds applied at the HTTP layer.
    pub request_timeout_seconds: u64,
    /// Allowed CORS origins. Use ["*"] to allow any. Empty vector -> no external origins.
    pub allowed_origins: Vec<String>,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding file-backed transients
    pub directory: PathBuf,
    /// Lifetime of the cached license-agnostic versions-v2 response set
    pub response_ttl_seconds: u64,
    /// Lifetime of cached license lookups
    pub license_ttl_hours: u64,
}

impl CacheConfig {
    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_seconds)
    }

    pub fn license_ttl(&self) -> Duration {
        Duration::from_secs(self.license_ttl_hours * 3600)
    }
}

/// Product and license store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON catalog used to seed the in-process store. Starts empty when unset.
    pub catalog_path: Option<PathBuf>,
}

/// Package signing and renewal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensingConfig {
    /// Public base URL of the store, used to build package download links
    pub site_url: String,
    /// Checkout page used for license renewals
    pub checkout_url: String,
    pub signing_secret: String,
    /// How long a signed package link stays valid
    pub package_ttl_hours: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                enable_docs: true,
                request_timeout_seconds: 30,
                allowed_origins: vec!["*".to_string()],
            },
            cache: CacheConfig {
                directory: PathBuf::from(".versions_api_cache"),
                response_ttl_seconds: 3600,
                license_ttl_hours: 24,
            },
            store: StoreConfig { catalog_path: None },
            licensing: LicensingConfig {
                site_url: "http://localhost:3000".to_string(),
                checkout_url: "http://localhost:3000/checkout/".to_string(),
                signing_secret: "change-me".to_string(),
                package_ttl_hours: 24,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("VERSIONS_API").separator("__"));

        // Override with environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        builder.build()?.try_deserialize()
    }
}
