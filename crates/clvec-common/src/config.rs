//! Dispatch configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ClvecError, Result};

/// Default number of elements per vector.
pub const DEFAULT_VECTOR_LENGTH: usize = 1 << 20;

/// Default seed for input generation.
pub const DEFAULT_SEED: u64 = 42;

/// Environment variables consulted by [`DispatchConfig::apply_env`].
pub const ENV_VECTOR_LENGTH: &str = "CLVEC_VECTOR_LENGTH";
pub const ENV_SEED: &str = "CLVEC_SEED";
pub const ENV_PROFILING: &str = "CLVEC_PROFILING";

/// Parameters of one vector-add run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of `f32` elements in each of the three vectors.
    pub vector_length: usize,
    /// Seed for the input generator; equal seeds give equal inputs.
    pub seed: u64,
    /// Request device-side profiling timestamps.
    pub profiling: bool,
    /// Extra options passed to the kernel compiler.
    pub build_options: String,
    /// Register a context notification callback.
    pub notify: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            vector_length: DEFAULT_VECTOR_LENGTH,
            seed: DEFAULT_SEED,
            profiling: true,
            build_options: String::new(),
            notify: true,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.vector_length == 0 {
            return Err(ClvecError::config("vector_length must be > 0"));
        }
        // The kernel receives the length as a 32-bit unsigned count.
        if u32::try_from(self.vector_length).is_err() {
            return Err(ClvecError::config(format!(
                "vector_length too large (max {})",
                u32::MAX
            )));
        }
        Ok(())
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ClvecError::config(format!("invalid TOML: {e}")))
    }

    /// Override fields from `CLVEC_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var(ENV_VECTOR_LENGTH) {
            self.vector_length = v
                .trim()
                .parse()
                .map_err(|_| ClvecError::config(format!("{ENV_VECTOR_LENGTH}={v} is not a count")))?;
        }
        if let Ok(v) = std::env::var(ENV_SEED) {
            self.seed = v
                .trim()
                .parse()
                .map_err(|_| ClvecError::config(format!("{ENV_SEED}={v} is not a u64")))?;
        }
        if let Ok(v) = std::env::var(ENV_PROFILING) {
            self.profiling = parse_flag(&v)
                .ok_or_else(|| ClvecError::config(format!("{ENV_PROFILING}={v} is not a flag")))?;
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
