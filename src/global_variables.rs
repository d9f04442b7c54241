// Controller endpoint
pub const CONTROLLER_HOST: &str = "localhost";
pub const CONTROLLER_PORT: u16 = 5555;

// Config file / environment keys
pub const CONFIG_PATH_ENV: &str = "PLATOON_BRIDGE_CONFIG";
pub const CONTROLLER_HOST_ENV: &str = "CONTROLLER_HOST";
pub const CONTROLLER_PORT_ENV: &str = "CONTROLLER_PORT";

// Injection
pub const VEHICLE_INSERT_PROBABILITY: f64 = 0.5;
pub const MAX_VEHICLES: usize = 50;
pub const MIN_INJECTED_MAX_SPEED: f64 = 10.0;
pub const MAX_INJECTED_MAX_SPEED: f64 = 15.0;
pub const VEHICLE_TYPE_ID: &str = "car";

// Tick pacing
pub const TICK_DELAY_MS: u64 = 50;
pub const STATUS_LOG_INTERVAL: u64 = 10;

// Framing
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// Vehicle type "car"
pub const VEHICLE_LENGTH: f64 = 5.0;
pub const VEHICLE_WIDTH: f64 = 2.0;
pub const VEHICLE_HEIGHT: f64 = 1.5;
pub const VEHICLE_MAX_SPEED: f64 = 50.0;
pub const VEHICLE_ACCEL: f64 = 2.5;
pub const VEHICLE_DECEL: f64 = 4.5;

// Platoon styling
pub const LEADER_WIDTH: f64 = 2.2;
pub const MEMBER_WIDTH: f64 = 2.0;
pub const DEFAULT_WIDTH: f64 = 1.8;
pub const LEADER_COLOR_SCALE: f64 = 1.3;

// Reference controller
pub const PLATOON_GAP_METERS: f64 = 25.0;
