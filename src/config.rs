//! Model configuration.
//!
//! [`ModelConfig`] carries the connection settings handed to an engine, the table
//! prefix used when deriving table names, and the schema field-cache settings. Load it
//! from `config/config.toml` or `MODELKIT__DATABASE__*` environment variables with
//! `ModelConfig::load()`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "MODELKIT";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database name, also the first part of schema cache keys
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default)]
    pub table_prefix: String,
    /// Persist schema descriptors between model constructions
    #[serde(default = "default_fields_cache")]
    pub fields_cache: bool,
    /// Root directory of the file schema cache
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_password() -> String {
    "root".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_name() -> String {
    "test".to_string()
}

fn default_charset() -> String {
    "utf8".to_string()
}

fn default_fields_cache() -> bool {
    true
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("runtime")
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            password: default_password(),
            host: default_host(),
            port: default_port(),
            name: default_name(),
            charset: default_charset(),
            table_prefix: String::new(),
            fields_cache: default_fields_cache(),
            cache_path: default_cache_path(),
        }
    }
}

impl ModelConfig {
    /// Load the `database` section from `config/config.toml`, falling back to env vars.
    ///
    /// A missing `database` section yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("Failed to load config file, falling back to env: {}", err);
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        match settings.get::<ModelConfig>("database") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Database configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    /// Use `prefix` for derived table names
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Toggle schema descriptor caching
    #[must_use]
    pub fn with_fields_cache(mut self, enabled: bool) -> Self {
        self.fields_cache = enabled;
        self
    }

    /// Directory the file schema cache writes to
    #[must_use]
    pub fn fields_cache_dir(&self) -> PathBuf {
        self.cache_path.join("_fields")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ModelConfig::default();
        assert_eq!(cfg.user, "root");
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 3306);
        assert_eq!(cfg.name, "test");
        assert_eq!(cfg.charset, "utf8");
        assert!(cfg.table_prefix.is_empty());
        assert!(cfg.fields_cache);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let settings = Config::builder()
            .set_override("database.table_prefix", "think_")
            .unwrap()
            .set_override("database.port", 3307)
            .unwrap()
            .build()
            .unwrap();
        let cfg: ModelConfig = settings.get("database").unwrap();
        assert_eq!(cfg.table_prefix, "think_");
        assert_eq!(cfg.port, 3307);
        assert_eq!(cfg.user, "root");
    }

    #[test]
    fn test_builders() {
        let cfg = ModelConfig::default()
            .with_prefix("t_")
            .with_fields_cache(false);
        assert_eq!(cfg.table_prefix, "t_");
        assert!(!cfg.fields_cache);
        assert_eq!(cfg.fields_cache_dir(), PathBuf::from("runtime").join("_fields"));
    }
}
