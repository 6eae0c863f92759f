//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: ENTITY_CORE_, nested keys split on `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/entity-core/{service_name}/config.toml
//! 4. System directory: /etc/entity-core/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::repository::{PageRequest, RepositoryError, RepositoryResult, DEFAULT_PAGE_SIZE};

const APP_PREFIX: &str = "entity-core";
const ENV_PREFIX: &str = "ENTITY_CORE_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Repository listing defaults
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Unit of work settings
    #[serde(default)]
    pub unit_of_work: UnitOfWorkConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Repository listing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Page size used when a query does not specify one
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Largest page size a query may request; `None` disables the cap
    #[serde(default = "default_max_page_size")]
    pub max_page_size: Option<u64>,
}

impl RepositoryConfig {
    /// Turn optional page input into a validated request
    ///
    /// # Errors
    ///
    /// Returns `InvalidPagination` for values below 1 or a page size above
    /// `max_page_size`.
    pub fn page_request(&self, page: Option<u64>, page_size: Option<u64>) -> RepositoryResult<PageRequest> {
        let page_size = page_size.unwrap_or(self.default_page_size);
        if let Some(max) = self.max_page_size {
            if page_size > max {
                return Err(RepositoryError::invalid_pagination(format!(
                    "Page size {} exceeds the maximum of {}",
                    page_size, max
                )));
            }
        }
        PageRequest::new(page.unwrap_or(1), page_size)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Unit of work configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWorkConfig {
    /// Upper bound for any single backing-store call, in seconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

impl UnitOfWorkConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

impl Default for UnitOfWorkConfig {
    fn default() -> Self {
        Self {
            store_timeout_secs: default_store_timeout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> Option<u64> {
    Some(100)
}

fn default_store_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration, inferring the service name from the binary name
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| APP_PREFIX.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    ///
    /// This is the recommended way to load config in production.
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default_for(service_name)));

        // Lowest priority first so that higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    /// Useful for testing or non-standard deployments.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_PREFIX);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(APP_PREFIX)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Where the config file for a service should live
    ///
    /// Returns: ~/.config/entity-core/{service_name}/config.toml
    pub fn recommended_path(service_name: &str) -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_PREFIX);
        let config_file_path = Path::new(service_name).join("config.toml");
        xdg_dirs
            .get_config_home()
            .map(|home| home.join(config_file_path))
            .ok_or_else(|| crate::error::Error::Internal("No home directory for XDG config".to_string()))
    }

    fn default_for(service_name: &str) -> Self {
        let mut config = Self::default();
        config.service.name = service_name.to_string();
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: APP_PREFIX.to_string(),
                log_level: default_log_level(),
                environment: default_environment(),
            },
            repository: RepositoryConfig::default(),
            unit_of_work: UnitOfWorkConfig::default(),
        }
    }
}
