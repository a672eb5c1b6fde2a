//! Kill-switch configuration
//!
//! Loaded from a TOML file with every field defaulted, so an empty or missing
//! file reproduces the stock arcade cabinet wiring: BCM pin 18, pull-up,
//! active-low, 100ms polling and a 3 second hold for power-off.

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_DIR: &str = "arcade-killswitch";
const CONFIG_FILE: &str = "config.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/arcade-killswitch.toml";

/// Highest BCM GPIO number exposed on the 40-pin header
const MAX_BCM_PIN: u8 = 27;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Internal pull resistor applied to the input pin
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PullMode {
    #[default]
    Up,
    Down,
    Off,
}

/// Electrical level that means "button pressed"
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLevel {
    #[default]
    Low,
    High,
}

impl ActiveLevel {
    /// Map an electrical level (`true` = high) to the logical pressed state
    pub fn is_active(self, high: bool) -> bool {
        match self {
            ActiveLevel::Low => !high,
            ActiveLevel::High => high,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct KillSwitchConfig {
    pub button: ButtonConfig,
    pub actions: ActionsConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ButtonConfig {
    /// BCM pin number
    pub pin: u8,
    pub pull: PullMode,
    pub active_level: ActiveLevel,
    pub poll_interval_ms: u64,
    /// Consecutive samples a new level must hold before it is trusted
    pub stability_samples: u32,
    /// Hold time that triggers the power-off action
    pub long_press_secs: f64,
    /// Settle time for the pull resistor before the first sample
    pub startup_delay_ms: u64,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            pin: 18,
            pull: PullMode::Up,
            active_level: ActiveLevel::Low,
            poll_interval_ms: 100,
            stability_samples: 1,
            long_press_secs: 3.0,
            startup_delay_ms: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ActionsConfig {
    /// Emulator executables terminated on every press
    pub process_names: Vec<String>,
    /// Signal name as accepted by `kill -s`, e.g. `SIGTERM`
    pub terminate_signal: String,
    /// Program and arguments that halt the host
    pub shutdown_command: Vec<String>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            process_names: vec![
                "advmame".to_string(),
                "daphne".to_string(),
                "mame".to_string(),
            ],
            terminate_signal: "SIGTERM".to_string(),
            shutdown_command: vec!["shutdown".to_string(), "-h".to_string(), "now".to_string()],
        }
    }
}

impl KillSwitchConfig {
    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one the user config dir and then
    /// `/etc` are tried, falling back to defaults when neither is present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_locations().into_iter().find(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    info!("No config file found, using built-in defaults");
                    Self::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let button = &self.button;
        let actions = &self.actions;

        check(
            "button.pin",
            button.pin <= MAX_BCM_PIN,
            format!("BCM pin {} is outside 0-{}", button.pin, MAX_BCM_PIN),
        )?;
        check(
            "button.poll_interval_ms",
            button.poll_interval_ms >= 1,
            "must be at least 1".to_string(),
        )?;
        check(
            "button.stability_samples",
            button.stability_samples >= 1,
            "must be at least 1".to_string(),
        )?;
        check(
            "button.long_press_secs",
            button.long_press_secs > 0.0
                && Duration::try_from_secs_f64(button.long_press_secs).is_ok(),
            format!("{} is not a usable duration", button.long_press_secs),
        )?;
        check(
            "actions.process_names",
            actions.process_names.iter().all(|n| !n.trim().is_empty()),
            "process names must not be empty".to_string(),
        )?;
        check(
            "actions.shutdown_command",
            actions
                .shutdown_command
                .first()
                .is_some_and(|program| !program.trim().is_empty()),
            "a program to run is required".to_string(),
        )?;
        self.terminate_signal()?;

        Ok(())
    }

    pub fn terminate_signal(&self) -> Result<Signal, ConfigError> {
        Signal::from_str(&self.actions.terminate_signal).map_err(|_| ConfigError::InvalidValue {
            field: "actions.terminate_signal",
            message: format!("unknown signal {:?}", self.actions.terminate_signal),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.button.poll_interval_ms)
    }

    /// Saturates for values `validate` would reject
    pub fn long_press_threshold(&self) -> Duration {
        Duration::try_from_secs_f64(self.button.long_press_secs).unwrap_or(Duration::MAX)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.button.startup_delay_ms)
    }

    pub fn log_summary(&self) {
        info!(
            "Button: BCM {} pull={:?} active={:?} poll={}ms stability={} long_press={:.1}s",
            self.button.pin,
            self.button.pull,
            self.button.active_level,
            self.button.poll_interval_ms,
            self.button.stability_samples,
            self.button.long_press_secs
        );
        info!(
            "Actions: terminate {:?} with {}, shutdown via {:?}",
            self.actions.process_names,
            self.actions.terminate_signal,
            self.actions.shutdown_command
        );
    }
}

fn check(field: &'static str, condition: bool, message: String) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { field, message })
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(mut dir) = dirs::config_dir() {
        dir.push(CONFIG_DIR);
        dir.push(CONFIG_FILE);
        locations.push(dir);
    }
    locations.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    locations
}
