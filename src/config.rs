use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::app_dirs::AppDirs;

/// On-disk settings, all delays in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub initial_light_delay: f64,
    pub inter_light_delay: f64,
    pub extinguish_hold: f64,
    pub announce_gap: f64,
    pub min_go_delay: f64,
    pub max_go_delay: f64,
    pub randomize_go: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_light_delay: 0.5,
            inter_light_delay: 0.8,
            extinguish_hold: 0.5,
            announce_gap: 0.3,
            min_go_delay: 2.0,
            max_go_delay: 5.0,
            randomize_go: true,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a finite number of seconds")]
    NotFinite { field: &'static str },
    #[error("{field} must not be negative (got {value}s)")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} is too large ({value}s, at most {max}s)", max = MAX_DELAY_SECS)]
    OutOfRange { field: &'static str, value: f64 },
    #[error("go delay range is inverted: min {min}s > max {max}s")]
    InvertedGoRange { min: f64, max: f64 },
}

/// Validated round timings handed to the game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub initial_light_delay: Duration,
    pub inter_light_delay: Duration,
    pub extinguish_hold: Duration,
    pub announce_gap: Duration,
    pub min_go_delay: Duration,
    pub max_go_delay: Duration,
    pub randomize_go: bool,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            initial_light_delay: Duration::from_millis(500),
            inter_light_delay: Duration::from_millis(800),
            extinguish_hold: Duration::from_millis(500),
            announce_gap: Duration::from_millis(300),
            min_go_delay: Duration::from_secs(2),
            max_go_delay: Duration::from_secs(5),
            randomize_go: true,
        }
    }
}

/// Upper bound for any single delay
pub const MAX_DELAY_SECS: f64 = 3600.0;

fn secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field });
    }
    if value < 0.0 {
        return Err(ConfigError::Negative { field, value });
    }
    if value > MAX_DELAY_SECS {
        return Err(ConfigError::OutOfRange { field, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::OutOfRange { field, value })
}

impl Config {
    pub fn timings(&self) -> Result<Timings, ConfigError> {
        let min_go_delay = secs("min_go_delay", self.min_go_delay)?;
        let max_go_delay = secs("max_go_delay", self.max_go_delay)?;
        if min_go_delay > max_go_delay {
            return Err(ConfigError::InvertedGoRange {
                min: self.min_go_delay,
                max: self.max_go_delay,
            });
        }

        Ok(Timings {
            initial_light_delay: secs("initial_light_delay", self.initial_light_delay)?,
            inter_light_delay: secs("inter_light_delay", self.inter_light_delay)?,
            extinguish_hold: secs("extinguish_hold", self.extinguish_hold)?,
            announce_gap: secs("announce_gap", self.announce_gap)?,
            min_go_delay,
            max_go_delay,
            randomize_go: self.randomize_go,
        })
    }
}

impl From<Timings> for Config {
    fn from(t: Timings) -> Self {
        Self {
            initial_light_delay: t.initial_light_delay.as_secs_f64(),
            inter_light_delay: t.inter_light_delay.as_secs_f64(),
            extinguish_hold: t.extinguish_hold.as_secs_f64(),
            announce_gap: t.announce_gap.as_secs_f64(),
            min_go_delay: t.min_go_delay.as_secs_f64(),
            max_go_delay: t.max_go_delay.as_secs_f64(),
            randomize_go: t.randomize_go,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("reactnow_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable config");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
