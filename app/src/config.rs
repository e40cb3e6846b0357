// Application Configuration

use anyhow::Result;
use geoguard_sim::{GeoPoint, SimulatorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when the file carries no API key
pub const API_KEY_ENV: &str = "GEOGUARD_WEATHER_API_KEY";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Site name shown in logs
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// Site latitude (sensors, weather and grid are centred here)
    #[serde(default = "default_latitude")]
    pub latitude: f64,

    /// Site longitude
    #[serde(default = "default_longitude")]
    pub longitude: f64,

    /// Number of simulated sensors
    #[serde(default = "default_sensor_count")]
    pub sensor_count: usize,

    /// Simulation tick interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Assessment interval in seconds
    #[serde(default = "default_assessment_interval")]
    pub assessment_interval_secs: u64,

    /// OpenWeatherMap API key. Without one, weather is synthetic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_api_key: Option<String>,

    /// Upper bound on a live weather request in seconds
    #[serde(default = "default_weather_timeout")]
    pub weather_timeout_secs: u64,

    /// Cells per side of the risk grid
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,

    /// Path to config file (for reference)
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_site_name() -> String { "Site A".to_string() }
fn default_latitude() -> f64 { 11.102222 }
fn default_longitude() -> f64 { 79.156389 }
fn default_sensor_count() -> usize { 10 }
fn default_poll_interval() -> u64 { 1000 }
fn default_assessment_interval() -> u64 { 10 }
fn default_weather_timeout() -> u64 { 5 }
fn default_grid_size() -> usize { 20 }

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site_name: default_site_name(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            sensor_count: default_sensor_count(),
            poll_interval_ms: default_poll_interval(),
            assessment_interval_secs: default_assessment_interval(),
            weather_api_key: None,
            weather_timeout_secs: default_weather_timeout(),
            grid_size: default_grid_size(),
            config_path: PathBuf::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from standard paths
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("/etc/geoguard/config.toml"),
            dirs::config_dir()
                .map(|p| p.join("geoguard/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("./config.toml"),
        ];

        for path in &config_paths {
            if path.is_file() {
                return Self::load_from(path);
            }
        }

        tracing::warn!("No configuration file found, using defaults");
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.config_path = path.to_path_buf();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.weather_api_key.as_deref().map_or(true, str::is_empty) {
            self.weather_api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ConfigError::Latitude(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ConfigError::Longitude(self.longitude));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("poll_interval_ms"));
        }
        if self.assessment_interval_secs == 0 {
            return Err(ConfigError::Zero("assessment_interval_secs"));
        }
        if self.weather_timeout_secs == 0 {
            return Err(ConfigError::Zero("weather_timeout_secs"));
        }
        if self.grid_size == 0 {
            return Err(ConfigError::Zero("grid_size"));
        }
        Ok(())
    }

    pub fn site(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            sensor_count: self.sensor_count,
            site: self.site(),
            ..Default::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn assessment_interval(&self) -> Duration {
        Duration::from_secs(self.assessment_interval_secs)
    }

    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather_timeout_secs)
    }

    /// Generate example configuration
    pub fn example() -> String {
        let config = Self {
            site_name: "Neyveli Pit 2".to_string(),
            ..Default::default()
        };

        let body = toml::to_string_pretty(&config).unwrap_or_default();
        format!(
            "# GeoGuard Configuration File\n\
             #\n\
             # Copy this file to /etc/geoguard/config.toml or ~/.config/geoguard/config.toml\n\
             # Set weather_api_key (or ${}) to use the live forecast feed.\n\n{}",
            API_KEY_ENV, body
        )
    }
}

/// Helper for getting config directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            site_name = "North Bench"
            grid_size = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.site_name, "North Bench");
        assert_eq!(config.grid_size, 12);
        assert_eq!(config.sensor_count, 10);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.weather_api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn example_parses_back() {
        let example = AppConfig::example();
        let config: AppConfig = toml::from_str(&example).unwrap();
        assert_eq!(config.site_name, "Neyveli Pit 2");
        assert_eq!(config.latitude, default_latitude());
    }

    #[test]
    fn rejects_bad_values() {
        let config = AppConfig {
            latitude: 123.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Latitude(_))));

        let config = AppConfig {
            grid_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("grid_size"))));
    }

    #[test]
    fn load_from_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "longitude = 200.0\n").unwrap();
        assert!(AppConfig::load_from(&path).is_err());

        std::fs::write(&path, "site_name = \"East Wall\"\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.site_name, "East Wall");
        assert_eq!(config.config_path, path);
    }

    #[test]
    fn simulator_is_centred_on_site() {
        let config = AppConfig {
            latitude: 10.0,
            longitude: 80.0,
            sensor_count: 4,
            ..Default::default()
        };
        let sim = config.simulator_config();
        assert_eq!(sim.sensor_count, 4);
        assert_eq!(sim.site, GeoPoint::new(10.0, 80.0));
    }
}
