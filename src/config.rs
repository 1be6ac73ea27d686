//! Configuration loading and types for the authorization core.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section defaults sensibly so an empty file
//! is a valid configuration.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server identity settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Multipart upload behavior.
    #[serde(default)]
    pub multipart: MultipartConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Region assigned to buckets created without a location constraint.
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
        }
    }
}

/// Multipart upload configuration.
///
/// Passed by reference into every abort so the legacy-region flag is read
/// exactly once per call.
#[derive(Debug, Clone, Deserialize)]
pub struct MultipartConfig {
    /// The historical default region whose buckets may tolerate aborting an
    /// unknown upload.
    #[serde(default = "default_region")]
    pub legacy_region: String,

    /// When `false`, aborting an unknown upload in a legacy-region bucket is a
    /// silent success.  When `true`, it is reported as `NoSuchUpload` like in
    /// every other region.
    #[serde(default)]
    pub us_east_behavior: bool,

    /// Highest accepted part number.
    #[serde(default = "default_max_part_number")]
    pub max_part_number: u32,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            legacy_region: default_region(),
            us_east_behavior: false,
            max_part_number: default_max_part_number(),
        }
    }
}

impl MultipartConfig {
    /// Copy of this configuration with the legacy-region flag set.
    pub fn with_us_east_behavior(&self, enabled: bool) -> Self {
        Self {
            us_east_behavior: enabled,
            ..self.clone()
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_part_number() -> u32 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
