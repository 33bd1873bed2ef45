use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Shortest interval the scheduler will honour.
pub const MIN_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub interval_unit: IntervalUnit,
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,
    #[serde(default)]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    #[default]
    Seconds,
    Minutes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn convert(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            interval_unit: IntervalUnit::default(),
            temperature_unit: TemperatureUnit::default(),
            disk_path: default_disk_path(),
            listen: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        Self::from_yaml(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path_display,
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < 1 {
            return Err(ConfigError::Validation(
                "interval must be >= 1".to_string(),
            ));
        }
        if self.disk_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "disk_path must not be empty".to_string(),
            ));
        }
        if let Some(listen) = &self.listen {
            if SocketAddr::from_str(listen).is_err() {
                return Err(ConfigError::Validation(format!(
                    "listen '{listen}' must be a host:port socket address"
                )));
            }
        }
        Ok(())
    }

    /// Sampling interval in whole seconds, never below [`MIN_INTERVAL_SECS`].
    pub fn interval_secs(&self) -> u64 {
        resolve_interval_secs(self.interval, self.interval_unit)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

pub fn resolve_interval_secs(interval: u64, unit: IntervalUnit) -> u64 {
    let secs = match unit {
        IntervalUnit::Minutes => interval.saturating_mul(60),
        IntervalUnit::Seconds => interval,
    };
    secs.max(MIN_INTERVAL_SECS)
}

const fn default_interval() -> u64 {
    5
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_are_resolved_to_seconds() {
        assert_eq!(resolve_interval_secs(2, IntervalUnit::Minutes), 120);
        assert_eq!(resolve_interval_secs(7, IntervalUnit::Seconds), 7);
    }

    #[test]
    fn zero_interval_is_clamped() {
        assert_eq!(resolve_interval_secs(0, IntervalUnit::Seconds), 1);
        assert_eq!(resolve_interval_secs(0, IntervalUnit::Minutes), 1);
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = Config::from_yaml("interval: 3\n").expect("valid config");
        assert_eq!(cfg.interval_secs(), 3);
        assert_eq!(cfg.interval_unit, IntervalUnit::Seconds);
        assert_eq!(cfg.temperature_unit, TemperatureUnit::Celsius);
        assert_eq!(cfg.disk_path, PathBuf::from("/"));
        assert!(cfg.listen.is_none());
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = Config::from_yaml(Config::example_yaml()).expect("example must parse");
        assert_eq!(cfg.interval_secs(), 5);
    }

    #[test]
    fn zero_interval_is_rejected_by_validation() {
        let err = Config::from_yaml("interval: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn bad_listen_is_rejected() {
        let err = Config::from_yaml("listen: not-an-address\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn unknown_unit_fails_to_parse() {
        let err = Config::from_yaml("interval_unit: hours\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn fahrenheit_conversion() {
        assert_eq!(TemperatureUnit::Fahrenheit.convert(100.0), 212.0);
        assert_eq!(TemperatureUnit::Celsius.convert(42.0), 42.0);
        assert_eq!(TemperatureUnit::Fahrenheit.symbol(), "°F");
    }
}
