//! Configuration loading and typed config structures for the Velocity
//! controller.
//!
//! The canonical configuration lives in `velocity-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror the
//! YAML structure, and provides a loader that reads and validates the file.
//! Every field has a default, so an empty file yields a runnable single
//! junction setup.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use velocity_types::JunctionId;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level controller configuration.
///
/// Mirrors the structure of `velocity-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VelocityConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Signal and emergency timing.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Static junction table, keyed by junction id.
    #[serde(default = "default_junctions")]
    pub junctions: BTreeMap<JunctionId, JunctionConfig>,

    /// External messaging.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VelocityConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `HOST` overrides `server.host`
    /// - `PORT` overrides `server.port`
    /// - `NATS_URL` overrides `infrastructure.nats_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// or validation are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default_with_junctions());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Default configuration including the built-in junction table.
    ///
    /// `Default::default` leaves `junctions` empty (derive semantics); this
    /// constructor matches what an empty YAML file produces.
    pub fn default_with_junctions() -> Self {
        Self {
            junctions: default_junctions(),
            ..Self::default()
        }
    }

    /// Apply overrides from a key lookup (normally the process environment).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `PORT` is not a valid port.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|e| ConfigError::Invalid {
                reason: format!("PORT must be a valid port number: {e}"),
            })?;
        }
        if let Some(url) = lookup("NATS_URL") {
            self.infrastructure.nats_url = Some(url);
        }
        Ok(())
    }

    /// Check that the configuration describes a runnable controller.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero durations, an empty
    /// junction table, or non-finite coordinates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;

        if self.junctions.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "at least one junction must be configured".to_owned(),
            });
        }

        for (id, junction) in &self.junctions {
            if !junction.lat.is_finite() || !junction.lng.is_finite() {
                return Err(ConfigError::Invalid {
                    reason: format!("junction {id} has non-finite coordinates"),
                });
            }
            if !junction.geofence_radius_m.is_finite() || junction.geofence_radius_m < 0.0 {
                return Err(ConfigError::Invalid {
                    reason: format!("junction {id} has an invalid geofence radius"),
                });
            }
        }

        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of static pages served as a fallback.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

/// Durations driving the signal rotation and emergency window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// How long an emergency preemption holds before cycling resumes.
    #[serde(default = "default_emergency_duration_ms")]
    pub emergency_duration_ms: u64,

    /// GREEN time of each direction in the rotation.
    #[serde(default = "default_signal_green_duration_ms")]
    pub signal_green_duration_ms: u64,

    /// YELLOW clearing time between GREEN and the next direction.
    #[serde(default = "default_signal_yellow_duration_ms")]
    pub signal_yellow_duration_ms: u64,
}

impl TimingConfig {
    /// Emergency window as a [`Duration`].
    pub const fn emergency_duration(&self) -> Duration {
        Duration::from_millis(self.emergency_duration_ms)
    }

    /// GREEN phase as a [`Duration`].
    pub const fn green_duration(&self) -> Duration {
        Duration::from_millis(self.signal_green_duration_ms)
    }

    /// YELLOW phase as a [`Duration`].
    pub const fn yellow_duration(&self) -> Duration {
        Duration::from_millis(self.signal_yellow_duration_ms)
    }

    /// Reject zero durations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first zero duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("emergency_duration_ms", self.emergency_duration_ms),
            ("signal_green_duration_ms", self.signal_green_duration_ms),
            ("signal_yellow_duration_ms", self.signal_yellow_duration_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("timing.{name} must be at least 1"),
                });
            }
        }
        Ok(())
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            emergency_duration_ms: default_emergency_duration_ms(),
            signal_green_duration_ms: default_signal_green_duration_ms(),
            signal_yellow_duration_ms: default_signal_yellow_duration_ms(),
        }
    }
}

/// Static description of one junction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JunctionConfig {
    /// Human-readable name.
    #[serde(default = "default_junction_name")]
    pub name: String,

    /// Initial latitude.
    #[serde(default)]
    pub lat: f64,

    /// Initial longitude.
    #[serde(default)]
    pub lng: f64,

    /// Geofence radius handed to clients that compute proximity.
    #[serde(default = "default_geofence_radius_m")]
    pub geofence_radius_m: f64,
}

/// External messaging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// NATS server URL. When unset the NATS bridge is disabled.
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Prefix of every NATS subject the controller uses.
    #[serde(default = "default_nats_subject_prefix")]
    pub nats_subject_prefix: String,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            nats_subject_prefix: default_nats_subject_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    5000
}

fn default_static_dir() -> String {
    "public".to_owned()
}

const fn default_emergency_duration_ms() -> u64 {
    5000
}

const fn default_signal_green_duration_ms() -> u64 {
    4000
}

const fn default_signal_yellow_duration_ms() -> u64 {
    1000
}

fn default_junction_name() -> String {
    "Unnamed Junction".to_owned()
}

const fn default_geofence_radius_m() -> f64 {
    50.0
}

fn default_junctions() -> BTreeMap<JunctionId, JunctionConfig> {
    let mut m = BTreeMap::new();
    m.insert(
        JunctionId::from("junction1"),
        JunctionConfig {
            name: "Dynamic Junction".to_owned(),
            lat: 40.7580,
            lng: -73.9855,
            geofence_radius_m: 1.0,
        },
    );
    m
}

fn default_nats_subject_prefix() -> String {
    "velocity".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}
