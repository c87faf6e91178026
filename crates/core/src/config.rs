use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use crate::types::Language;
use crate::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub pool: PoolConfig,
    pub validation: ValidationConfig,
    pub sanitizer: SanitizerConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

/// Remote sandbox provider connection.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<Secret<String>>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on a single sandbox creation.
    pub create_timeout_secs: u64,
    /// Handles unused for longer than this are evicted.
    pub idle_timeout_secs: u64,
    /// How often the idle sweep runs.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum code length in characters.
    pub max_code_length: usize,
    /// Maximum file content size in bytes.
    pub max_file_size_bytes: usize,
    pub max_path_length: usize,
    pub max_packages: usize,
    pub max_package_name_length: usize,
    /// Turn dangerous-code pattern matches into hard failures.
    pub strict: bool,
    /// Absolute path prefixes that may never be touched.
    pub forbidden_path_prefixes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Maximum output length in characters, truncation marker included.
    pub max_output_length: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub timeout_secs: u64,
    /// Language used to resolve a sandbox for language-agnostic file tools.
    pub default_file_language: Language,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Deployment environment; `production` enables file logging.
    pub environment: String,
    pub log_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            enable_cors: true,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:49999".into(),
            api_key: None,
            request_timeout_secs: 90,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            create_timeout_secs: 60,
            idle_timeout_secs: 5 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_code_length: 50_000,
            max_file_size_bytes: 10 * 1024 * 1024, // 10MB
            max_path_length: 255,
            max_packages: 50,
            max_package_name_length: 100,
            strict: false,
            forbidden_path_prefixes: vec![
                "/etc".into(),
                "/root".into(),
                "/usr".into(),
                "/sys".into(),
                "/proc".into(),
                "/dev".into(),
                "/boot".into(),
                "/bin".into(),
                "/sbin".into(),
                "/var".into(),
            ],
        }
    }
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_output_length: 10_000,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            default_file_language: Language::Python,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            environment: "development".into(),
            log_file: "logs/codegate.log".into(),
        }
    }
}

impl PoolConfig {
    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LoggingConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl AppConfig {
    /// Load configuration from `./config` and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config"))
    }

    /// Load configuration layered as: defaults, `<dir>/default`, `<dir>/<env>`,
    /// `<dir>/local`, `CODEGATE__*` variables, then the well-known variables
    /// `SANDBOX_API_KEY`, `LOG_LEVEL` and `CODEGATE_ENV`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env = std::env::var("CODEGATE_ENV").ok();
        let profile = env.clone().unwrap_or_else(|| "development".into());

        let s = Config::builder()
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join(&profile)).required(false))
            .add_source(File::from(dir.join("local")).required(false))
            // Map CODEGATE__POOL__IDLE_TIMEOUT_SECS=60 to pool.idle_timeout_secs
            .add_source(Environment::with_prefix("CODEGATE").separator("__"))
            .set_override_option("provider.api_key", std::env::var("SANDBOX_API_KEY").ok())?
            .set_override_option("logging.level", std::env::var("LOG_LEVEL").ok())?
            .set_override_option("logging.environment", env)?
            .build()?;

        Ok(s.try_deserialize()?)
    }

    /// The provider credential. Missing or blank is a fatal configuration error.
    pub fn api_key(&self) -> Result<&Secret<String>> {
        match &self.provider.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => Ok(key),
            _ => Err(Error::config(
                "SANDBOX_API_KEY is not set; the remote sandbox provider requires a credential",
            )),
        }
    }
}
