//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic base ([`ConfigLoader::merge`])
//! 3. Config file (`tern.toml` / `config.toml`, or an explicit [`ConfigLoader::file`])
//! 4. Environment variables (`TERN_*`)
//!
//! The first search path holding a config file wins; later paths are not read.
//! Without explicit search paths the current directory is searched, then
//! `<user config dir>/tern`.
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `TERN_` prefix with `__` as separator:
//!
//! - `TERN_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `TERN_BUS__QUEUE_CAPACITY=256` → `bus.queue_capacity = 256`
//! - `TERN_TERMINAL__INTERACTIVE=true` → `terminal.interactive = true`
//!
//! # Example
//!
//! ```rust,ignore
//! use tern_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new().load()?;
//!
//! let config = ConfigLoader::new()
//!     .file("./deploy/tern.toml")
//!     .without_env()
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::TernConfig;
use super::validation::validate_config;

/// File names searched in every search path, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["tern.toml", "config.toml"];

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TERN_";

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("tern"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a programmatic base configuration.
    ///
    /// File and environment values still override it.
    pub fn merge(mut self, config: TernConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<TernConfig> {
        let figment = self.build_figment()?;
        let config: TernConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            logging_level = %config.logging.level,
            irc_networks = config.irc.len(),
            terminal = config.terminal.is_some(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(TernConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    /// Only extensions enabled via feature flags are accepted.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            _ => {
                let _ = figment;
                Err(ConfigError::UnsupportedFormat(ext.to_string()))
            }
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("tern"));
        }
        paths
    }

    /// Returns the first config file found across the search paths.
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.resolve_search_paths()
            .into_iter()
            .flat_map(|dir| CONFIG_FILE_NAMES.map(|name| dir.join(name)))
            .find(|path| path.is_file())
    }

    #[cfg(feature = "toml-config")]
    fn load_config_files(&self, figment: Figment) -> Figment {
        match self.find_config_file() {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                figment.merge(Toml::file(path))
            }
            None => {
                warn!("No configuration file found, using defaults");
                figment
            }
        }
    }

    #[cfg(not(feature = "toml-config"))]
    fn load_config_files(&self, figment: Figment) -> Figment {
        warn!("No configuration format enabled, using defaults");
        figment
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<TernConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from `path` plus environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<TernConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogFormat, LogLevel};
    use figment::Jail;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config, TernConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_file_is_found_in_search_path() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tern.toml",
                r##"
                [logging]
                level = "debug"
                format = "pretty"

                [terminal]
                interactive = true

                [[irc]]
                sub_ident = "libera"
                address = "irc.libera.chat:6697"
                tls = true
                nick = "tern"
                auto_join = ["#tern"]

                [irc.rate_limit]
                mode = "throttle"
                "##,
            )?;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.logging.format, LogFormat::Pretty);
            let terminal = config.terminal.as_ref().unwrap();
            assert_eq!(terminal.sub_ident, "std");
            assert!(terminal.interactive);

            assert_eq!(config.irc.len(), 1);
            let network = &config.irc[0];
            assert_eq!(network.sub_ident, "libera");
            assert_eq!(network.auto_join, vec!["#tern".to_string()]);
            assert!(network.client.tls);
            assert!(network.client.tls_verify);
            assert_eq!(network.client.ping_frequency_secs, 60);
            assert_eq!(network.client.rate_limit.mode, tern_irc::EnforcementMode::Throttle);
            assert_eq!(network.client.rate_limit.global_max_tokens, 16);
            Ok(())
        });
    }

    #[test]
    fn test_tern_toml_wins_over_config_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[bus]\nqueue_capacity = 8")?;
            jail.create_file("tern.toml", "[bus]\nqueue_capacity = 16")?;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.bus.queue_capacity, 16);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("tern.toml", "[logging]\nlevel = \"warn\"")?;
            jail.set_env("TERN_LOGGING__LEVEL", "trace");
            jail.set_env("TERN_BUS__QUEUE_CAPACITY", "256");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Trace);
            assert_eq!(config.bus.queue_capacity, 256);
            Ok(())
        });
    }

    #[test]
    fn test_merge_is_overridden_by_file() {
        Jail::expect_with(|jail| {
            jail.create_file("tern.toml", "[bus]\nqueue_capacity = 32")?;

            let mut base = TernConfig::default();
            base.bus.queue_capacity = 8;
            base.logging.level = LogLevel::Error;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .merge(base)
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.bus.queue_capacity, 32);
            assert_eq!(config.logging.level, LogLevel::Error);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .file("/nonexistent/tern.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("tern.toml", "[bus]\nqueue_capacity = 0")?;

            let result = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load();

            assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_level_is_a_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file("tern.toml", "[logging]\nlevel = \"loud\"")?;

            let result = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load();

            assert!(matches!(result, Err(ConfigError::ParseError(_))));
            Ok(())
        });
    }
}
