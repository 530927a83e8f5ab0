use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Prefix of environment overrides, e.g. `NOMAD_SERVICE__SERVER__BIND_ADDRESS`.
pub const ENV_PREFIX: &str = "NOMAD_SERVICE__";

/// Top-level daemon configuration: typed global sections plus a free-form
/// per-module bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_logging_config")]
    pub logging: LoggingConfig,
    /// `module_name` → arbitrary YAML/JSON value, parsed by the module itself.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: default_logging_config(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to. The port comes from the command line.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Base directory for relative log file paths.
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,
    /// Seconds to wait for in-flight requests after a shutdown signal.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            home_dir: default_home_dir(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_home_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// Logging configuration: subsystem (crate or target prefix) → settings.
/// The `default` key covers every target without its own section.
pub type LoggingConfig = HashMap<String, Section>;

// Optional level that also accepts "off".
mod optional_level_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    #[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(level: &Option<Level>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(level.map_or("off", |l| l.as_str()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Level>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Some(Level::TRACE)),
            "debug" => Ok(Some(Level::DEBUG)),
            "info" => Ok(Some(Level::INFO)),
            "warn" | "warning" => Ok(Some(Level::WARN)),
            "error" => Ok(Some(Level::ERROR)),
            "off" | "none" => Ok(None),
            other => Err(serde::de::Error::custom(format!(
                "invalid log level '{other}'"
            ))),
        }
    }

    #[allow(clippy::unnecessary_wraps)]
    pub fn default() -> Option<Level> {
        Some(Level::INFO)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SectionFile {
    pub file: String,
    #[serde(
        default = "optional_level_serde::default",
        with = "optional_level_serde"
    )]
    pub file_level: Option<Level>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    #[serde(
        default = "optional_level_serde::default",
        with = "optional_level_serde"
    )]
    pub console_level: Option<Level>,
    #[serde(flatten)]
    pub section_file: Option<SectionFile>,
    /// Rotated files older than this are removed when `max_backups` is unset.
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

impl Section {
    #[must_use]
    pub fn file(&self) -> Option<&str> {
        self.section_file
            .as_ref()
            .map(|f| f.file.as_str())
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn file_level(&self) -> Option<Level> {
        self.section_file.as_ref().and_then(|f| f.file_level)
    }
}

/// Console at info, JSON file at debug, access log in its own file.
#[must_use]
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_owned(),
        Section {
            console_level: Some(Level::INFO),
            section_file: Some(SectionFile {
                file: "logs/nomad-service.log".to_owned(),
                file_level: Some(Level::DEBUG),
            }),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging.insert(
        "nomad_service::access".to_owned(),
        Section {
            console_level: Some(Level::INFO),
            section_file: Some(SectionFile {
                file: "logs/access.log".to_owned(),
                file_level: Some(Level::INFO),
            }),
            max_age_days: Some(7),
            max_backups: Some(5),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl AppConfig {
    /// Defaults, then the YAML file, then `NOMAD_SERVICE__*` variables.
    ///
    /// # Errors
    /// Returns an error if the merged configuration does not deserialize.
    pub fn load_layered(config_path: &Path) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .with_context(|| format!("Failed to load config from {}", config_path.display()))
    }

    /// Like [`AppConfig::load_layered`] when a path is given, otherwise
    /// defaults plus environment.
    ///
    /// # Errors
    /// Returns an error if the given file does not exist or the configuration
    /// does not deserialize.
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            ensure!(
                path.is_file(),
                "config file does not exist: {}",
                path.display()
            );
            return Self::load_layered(path);
        }

        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load config from environment")
    }

    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self).context("Failed to serialize config to YAML")
    }

    /// `-v` raises the default console level to debug, `-vv` and more to trace.
    pub fn apply_cli_overrides(&mut self, verbose: u8) {
        if let Some(default_section) = self.logging.get_mut("default") {
            default_section.console_level = match verbose {
                0 => default_section.console_level,
                1 => Some(Level::DEBUG),
                _ => Some(Level::TRACE),
            };
        }
    }

    /// Typed view of one module's configuration; defaults when the module
    /// has no entry.
    ///
    /// # Errors
    /// Returns an error if the entry does not match `T`.
    pub fn module_config<T>(&self, module_name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.modules.get(module_name) {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone())
                .with_context(|| format!("Invalid configuration for module '{module_name}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug, Default, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[serde(default)]
        stack: Option<String>,
        #[serde(default)]
        retries: u32,
    }

    #[test]
    fn defaults_are_complete() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert!(config.logging.contains_key("default"));
        assert!(config.modules.is_empty());
    }

    #[test]
    fn yaml_overrides_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("cfg.yaml");
        fs::write(
            &path,
            r#"
server:
  bind_address: "127.0.0.1"
logging:
  default:
    console_level: warn
    file: ""
modules:
  nomad_service:
    stack: blue
    retries: 3
"#,
        )
        .unwrap();

        let config = AppConfig::load_layered(&path).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.shutdown_grace_secs, 30);

        let default_section = &config.logging["default"];
        assert_eq!(default_section.console_level, Some(Level::WARN));
        assert_eq!(default_section.file(), None);

        let sample: Sample = config.module_config("nomad_service").unwrap();
        assert_eq!(sample.stack.as_deref(), Some("blue"));
        assert_eq!(sample.retries, 3);
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = AppConfig::load_or_default(Some(&tmp.path().join("nope.yaml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn unknown_module_uses_defaults() {
        let sample: Sample = AppConfig::default().module_config("other").unwrap();
        assert!(sample.stack.is_none());
    }

    #[test]
    fn bad_module_entry_is_reported() {
        let mut config = AppConfig::default();
        config.modules.insert(
            "nomad_service".to_owned(),
            serde_json::json!({"no_such_field": 1}),
        );
        let err = config.module_config::<Sample>("nomad_service").unwrap_err();
        assert!(err.to_string().contains("nomad_service"));
    }

    #[test]
    fn verbosity_matrix() {
        for (verbose, expected) in [
            (0, Some(Level::INFO)),
            (1, Some(Level::DEBUG)),
            (2, Some(Level::TRACE)),
            (5, Some(Level::TRACE)),
        ] {
            let mut config = AppConfig::default();
            config.apply_cli_overrides(verbose);
            assert_eq!(config.logging["default"].console_level, expected);
        }
    }

    #[test]
    fn off_level_is_serialized() {
        let mut config = AppConfig::default();
        if let Some(section) = config.logging.get_mut("default") {
            section.console_level = None;
        }
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("off"));
    }
}
