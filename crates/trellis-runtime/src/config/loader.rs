//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config`: enables TOML configuration files (`trellis.toml`)
//! - `yaml-config`: enables YAML configuration files (`trellis.yaml`, `trellis.yml`)
//!
//! Both can be enabled at once, in which case both formats are searched.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides passed to [`ConfigLoader::merge`]
//! 3. Profile-specific config file (`trellis.{profile}.toml`)
//! 4. Main config file (`trellis.toml`)
//! 5. Environment variables (`TRELLIS_*`)
//!
//! # Environment Variable Mapping
//!
//! Variables use the `TRELLIS_` prefix with `__` as the nesting separator:
//!
//! - `TRELLIS_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `TRELLIS_DISPATCH__MODE=sequential` → `dispatch.mode = "sequential"`
//! - `TRELLIS_STORAGE__REDIS__URL=redis://cache:6379` → `storage.redis.url`
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigLoadError, ConfigResult};
use super::schema::TrellisConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "TRELLIS_";
const PROFILE_VAR: &str = "TRELLIS_PROFILE";
const FILE_STEM: &str = "trellis";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting the `dev`/`prod` short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `TRELLIS_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration file format compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    /// Enabled formats, in the order they are searched and merged.
    #[allow(unused_mut)]
    fn enabled() -> Vec<Self> {
        let mut formats = Vec::new();
        #[cfg(feature = "toml-config")]
        formats.push(Self::Toml);
        #[cfg(feature = "yaml-config")]
        formats.push(Self::Yaml);
        formats
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        Self::enabled()
            .into_iter()
            .find(|format| format.extensions().contains(&ext))
    }

    #[allow(unused_variables)]
    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(figment::providers::Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(figment::providers::Yaml::file(path)),
        }
    }
}

/// Builds a [`TrellisConfig`] from defaults, files and the environment.
pub struct ConfigLoader {
    overrides: Vec<TrellisConfig>,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from the built-in defaults and the profile in `TRELLIS_PROFILE`.
    pub fn new() -> Self {
        Self {
            overrides: Vec::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            file: None,
            env: true,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Searches `path` for `trellis.*` files. Replaces the default
    /// directories (cwd, then the user config directory).
    pub fn search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Layers `config` over the defaults, below files and environment.
    pub fn merge(mut self, config: TrellisConfig) -> Self {
        self.overrides.push(config);
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<TrellisConfig> {
        let config: TrellisConfig = self.figment()?.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %self.profile,
            level = %config.logging.level,
            mode = ?config.dispatch.mode,
            storage = ?config.storage.backend,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Assembles every source, lowest priority first.
    pub fn figment(&self) -> ConfigResult<Figment> {
        let mut figment = self.overrides.iter().fold(
            Figment::from(Serialized::defaults(TrellisConfig::default())),
            |figment, layer| figment.merge(Serialized::defaults(layer)),
        );

        let files = match &self.file {
            Some(path) => vec![explicit(path)?],
            None => self.discover(),
        };
        if files.is_empty() {
            warn!("No configuration file found, using defaults");
        }
        for (format, path) in files {
            info!(path = %path.display(), "Loading configuration file");
            figment = format.merge(figment, &path);
        }

        if self.env {
            trace!("Reading {ENV_PREFIX}* environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["PROFILE"]).split("__"));
        }
        Ok(figment)
    }

    /// Finds, per format, the first directory holding a main file. A
    /// profile file next to it is merged first so the main file wins.
    fn discover(&self) -> Vec<(FileFormat, PathBuf)> {
        let dirs = self.search_dirs();
        let mut found = Vec::new();

        for format in FileFormat::enabled() {
            'format: for dir in &dirs {
                for ext in format.extensions() {
                    let profiled = dir.join(format!("{FILE_STEM}.{}.{ext}", self.profile));
                    if profiled.is_file() {
                        debug!(path = %profiled.display(), "Found profile configuration");
                        found.push((format, profiled));
                    }
                    let main = dir.join(format!("{FILE_STEM}.{ext}"));
                    if main.is_file() {
                        found.push((format, main));
                        break 'format;
                    }
                }
            }
        }
        found
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join(FILE_STEM)))
            .collect()
    }
}

fn explicit(path: &Path) -> ConfigResult<(FileFormat, PathBuf)> {
    if !path.exists() {
        return Err(ConfigLoadError::FileNotFound(path.to_path_buf()));
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    FileFormat::from_extension(ext)
        .map(|format| (format, path.to_path_buf()))
        .ok_or_else(|| ConfigLoadError::UnsupportedFormat(ext.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchMode, LogLevel, StorageBackend};

    #[test]
    fn test_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.dispatch.mode, DispatchMode::Concurrent);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.redis.prefix, "fsm");
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TRELLIS_LOGGING__LEVEL", "debug");
            jail.set_env("TRELLIS_DISPATCH__MODE", "sequential");
            jail.set_env("TRELLIS_STORAGE__REDIS__STATE_TTL_SECS", "60");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.dispatch.mode, DispatchMode::Sequential);
            assert_eq!(config.storage.redis.state_ttl_secs, Some(60));
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_is_overridden_by_main_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "trellis.production.toml",
                r#"
                [logging]
                level = "warn"
                [storage]
                backend = "json"
                "#,
            )?;
            jail.create_file("trellis.toml", "[logging]\nlevel = \"error\"\n")?;

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Error);
            assert_eq!(config.storage.backend, StorageBackend::Json);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .file("/nonexistent/trellis.toml")
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound(_)));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
