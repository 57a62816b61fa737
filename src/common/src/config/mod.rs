use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// File read from the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "promexport.toml";

/// Prefix of environment overrides, e.g. `PROMEXPORT__EXPORT__METRIC_PREFIX`.
pub const ENV_PREFIX: &str = "PROMEXPORT__";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("export.metric_prefix cannot be empty")]
    EmptyMetricPrefix,
    #[error("export.max_label_count must be greater than zero")]
    ZeroLabelCount,
    #[error("export.gc_interval must be greater than zero")]
    ZeroGcInterval,
    #[error("export.max_batch_size must be greater than zero")]
    ZeroBatchSize,
    #[error(
        "export.refresh_jitter ({jitter:?}) must not exceed twice export.refresh_interval ({interval:?})"
    )]
    JitterTooLarge { jitter: Duration, interval: Duration },
}

/// Settings of the series cache and the export path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Prefix of every exported metric type
    pub metric_prefix: String,
    /// Series with more metric labels than this are not exported
    pub max_label_count: usize,
    /// Mean time between re-derivations of a cached series
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Width of the random window centred on `refresh_interval`
    #[serde(with = "humantime_serde")]
    pub refresh_jitter: Duration,
    /// Interval of cache garbage collection
    #[serde(with = "humantime_serde")]
    pub gc_interval: Duration,
    /// Maximum number of series per outbound request
    pub max_batch_size: usize,
    /// Labels attached to every series unless the series sets them itself
    pub external_labels: BTreeMap<String, String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            metric_prefix: "prometheus.googleapis.com".to_string(),
            max_label_count: 100,
            refresh_interval: Duration::from_secs(600),
            refresh_jitter: Duration::from_secs(600),
            gc_interval: Duration::from_secs(60),
            max_batch_size: 200,
            external_labels: BTreeMap::new(),
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metric_prefix.is_empty() {
            return Err(ConfigError::EmptyMetricPrefix);
        }
        if self.max_label_count == 0 {
            return Err(ConfigError::ZeroLabelCount);
        }
        if self.gc_interval.is_zero() {
            return Err(ConfigError::ZeroGcInterval);
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        // The earliest deadline is interval - jitter/2, keep it in the future.
        if self.refresh_jitter > self.refresh_interval * 2 {
            return Err(ConfigError::JitterTooLarge {
                jitter: self.refresh_jitter,
                interval: self.refresh_interval,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Configuration {
    /// Series cache and export settings
    pub export: ExportConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(DEFAULT_CONFIG_FILE))
    }

    /// Load with `path` in place of the default file, which must exist.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        if !path.is_file() {
            return Err(Box::new(figment::Error::from(format!(
                "configuration file {} not found",
                path.display()
            ))));
        }
        Self::figment(Toml::file(path))
    }

    fn figment(file: figment::providers::Data<Toml>) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.export.validate()
    }
}
