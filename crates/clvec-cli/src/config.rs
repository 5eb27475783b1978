//! CLI configuration: TOML file, then environment, then flags.

use std::path::{Path, PathBuf};

use clvec_common::{ClvecError, DispatchConfig, Result};
use serde::{Deserialize, Serialize};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "clvec.toml";

const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// One of `pretty`, `compact`, `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_owned(), format: "pretty".to_owned() }
    }
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ClvecError::config(format!("{}: invalid TOML: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate()?;
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ClvecError::config(format!(
                "unknown log format '{}' (expected one of {})",
                self.logging.format,
                LOG_FORMATS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Layers configuration sources; later calls override earlier ones.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: CliConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self { config: CliConfig::from_file(path)? })
    }

    /// Start from `explicit` if given, else from [`DEFAULT_CONFIG_FILE`] if it
    /// exists, else from defaults. An explicit path must exist.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path).map_err(|e| match e {
                ClvecError::Io(io) => {
                    ClvecError::config(format!("cannot read {}: {io}", path.display()))
                }
                other => other,
            }),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    tracing::debug!(path = %default.display(), "using config file");
                    Self::from_file(&default)
                } else {
                    Ok(Self::new())
                }
            }
        }
    }

    /// Apply `CLVEC_*` environment overrides.
    pub fn with_env(mut self) -> Result<Self> {
        self.config.dispatch.apply_env()?;
        Ok(self)
    }

    pub fn vector_length(mut self, len: Option<usize>) -> Self {
        if let Some(len) = len {
            self.config.dispatch.vector_length = len;
        }
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        if let Some(seed) = seed {
            self.config.dispatch.seed = seed;
        }
        self
    }

    pub fn profiling(mut self, profiling: Option<bool>) -> Self {
        if let Some(profiling) = profiling {
            self.config.dispatch.profiling = profiling;
        }
        self
    }

    pub fn log_level(mut self, level: Option<String>) -> Self {
        if let Some(level) = level {
            self.config.logging.level = level;
        }
        self
    }

    pub fn log_format(mut self, format: Option<String>) -> Self {
        if let Some(format) = format {
            self.config.logging.format = format;
        }
        self
    }

    pub fn build(self) -> Result<CliConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.dispatch.vector_length, 1 << 20);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn flags_override_defaults() {
        let config = ConfigBuilder::new()
            .vector_length(Some(16))
            .seed(Some(3))
            .profiling(Some(false))
            .log_format(Some("json".into()))
            .build()
            .unwrap();
        assert_eq!(config.dispatch.vector_length, 16);
        assert_eq!(config.dispatch.seed, 3);
        assert!(!config.dispatch.profiling);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn none_keeps_previous_value() {
        let config = ConfigBuilder::new().seed(Some(9)).seed(None).build().unwrap();
        assert_eq!(config.dispatch.seed, 9);
    }

    #[test]
    fn rejects_unknown_log_format() {
        let err = ConfigBuilder::new().log_format(Some("xml".into())).build().unwrap_err();
        assert!(err.to_string().contains("unknown log format"));
    }

    #[test]
    fn rejects_zero_length() {
        let err = ConfigBuilder::new().vector_length(Some(0)).build().unwrap_err();
        assert!(matches!(err, ClvecError::Config(_)));
    }
}
