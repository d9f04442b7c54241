//! Bridge and controller configuration.
//!
//! Every field defaults to the constants in [`crate::global_variables`]. A JSON
//! file named by `PLATOON_BRIDGE_CONFIG` may override any subset of them, and
//! `CONTROLLER_HOST` / `CONTROLLER_PORT` override the endpoint last.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::global_variables::*;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub controller: ControllerEndpoint,
    pub injection: InjectionConfig,
    pub tick_delay_ms: u64,
    /// Bound on each send/receive. `None` blocks indefinitely.
    pub io_timeout_ms: Option<u64>,
    /// Stop after this many ticks. `None` runs until signalled.
    pub max_ticks: Option<u64>,
    pub max_frame_size: usize,
    pub vehicle_type: VehicleTypeParams,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerEndpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    pub probability: f64,
    pub max_vehicles: usize,
    pub min_max_speed: f64,
    pub max_max_speed: f64,
    pub vehicle_type_id: String,
}

/// Physical parameters registered for the injected vehicle type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VehicleTypeParams {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub max_speed: f64,
    pub accel: f64,
    pub decel: f64,
}

/// Settings for the reference controller binary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub platoon_gap: f64,
    pub max_frame_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerEndpoint::default(),
            injection: InjectionConfig::default(),
            tick_delay_ms: TICK_DELAY_MS,
            io_timeout_ms: None,
            max_ticks: None,
            max_frame_size: MAX_FRAME_SIZE,
            vehicle_type: VehicleTypeParams::default(),
        }
    }
}

impl Default for ControllerEndpoint {
    fn default() -> Self {
        Self {
            host: CONTROLLER_HOST.to_string(),
            port: CONTROLLER_PORT,
        }
    }
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            probability: VEHICLE_INSERT_PROBABILITY,
            max_vehicles: MAX_VEHICLES,
            min_max_speed: MIN_INJECTED_MAX_SPEED,
            max_max_speed: MAX_INJECTED_MAX_SPEED,
            vehicle_type_id: VEHICLE_TYPE_ID.to_string(),
        }
    }
}

impl Default for VehicleTypeParams {
    fn default() -> Self {
        Self {
            length: VEHICLE_LENGTH,
            width: VEHICLE_WIDTH,
            height: VEHICLE_HEIGHT,
            max_speed: VEHICLE_MAX_SPEED,
            accel: VEHICLE_ACCEL,
            decel: VEHICLE_DECEL,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_host: CONTROLLER_HOST.to_string(),
            listen_port: CONTROLLER_PORT,
            platoon_gap: PLATOON_GAP_METERS,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Load from the file named by `PLATOON_BRIDGE_CONFIG` (if set), apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var(CONTROLLER_HOST_ENV) {
            self.controller.host = host;
        }
        if let Ok(port) = std::env::var(CONTROLLER_PORT_ENV) {
            self.controller.port = port.parse().map_err(|_| {
                ConfigError::Invalid(format!("{CONTROLLER_PORT_ENV} is not a port: {port}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let injection = &self.injection;
        if !(0.0..=1.0).contains(&injection.probability) {
            return Err(ConfigError::Invalid(format!(
                "injection probability {} outside [0, 1]",
                injection.probability
            )));
        }
        if !(injection.min_max_speed > 0.0 && injection.min_max_speed < injection.max_max_speed) {
            return Err(ConfigError::Invalid(format!(
                "injected top speed range [{}, {}) is empty or non-positive",
                injection.min_max_speed, injection.max_max_speed
            )));
        }
        self.vehicle_type.validate()?;
        if self.max_frame_size == 0 {
            return Err(ConfigError::Invalid("max_frame_size must be positive".into()));
        }
        Ok(())
    }

    pub fn controller_addr(&self) -> String {
        format!("{}:{}", self.controller.host, self.controller.port)
    }

    pub fn tick_delay(&self) -> Duration {
        Duration::from_millis(self.tick_delay_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }
}

impl VehicleTypeParams {
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("length", self.length),
            ("width", self.width),
            ("height", self.height),
            ("max_speed", self.max_speed),
            ("accel", self.accel),
            ("decel", self.decel),
        ];
        match fields.iter().find(|(_, value)| !(*value > 0.0)) {
            Some((name, value)) => Err(ConfigError::Invalid(format!(
                "vehicle_type.{name} must be positive, got {value}"
            ))),
            None => Ok(()),
        }
    }
}

impl ControllerConfig {
    /// Defaults with the listening endpoint taken from `CONTROLLER_HOST` /
    /// `CONTROLLER_PORT` when set.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(host) = std::env::var(CONTROLLER_HOST_ENV) {
            config.listen_host = host;
        }
        if let Ok(port) = std::env::var(CONTROLLER_PORT_ENV) {
            config.listen_port = port.parse().map_err(|_| {
                ConfigError::Invalid(format!("{CONTROLLER_PORT_ENV} is not a port: {port}"))
            })?;
        }
        if !(config.platoon_gap > 0.0) {
            return Err(ConfigError::Invalid("platoon_gap must be positive".into()));
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}
