//! Capability interface the bridge needs from a running simulation.

use crate::config::VehicleTypeParams;
use crate::error::AdapterError;

/// An RGBA color, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    pub const WHITE: Rgba = Rgba(255, 255, 255, 255);

    /// Scale the three color channels by `factor`, clamping at 255. Alpha is
    /// left untouched.
    pub fn scaled(self, factor: f64) -> Rgba {
        let scale = |c: u8| (f64::from(c) * factor).clamp(0.0, 255.0) as u8;
        Rgba(scale(self.0), scale(self.1), scale(self.2), self.3)
    }
}

/// Per-vehicle state read from the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Kinematics {
    pub lane: String,
    pub position: f64,
    pub speed: f64,
    pub edge: String,
}

/// Parameters for creating a vehicle on a route.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSpawn {
    pub id: String,
    pub route_id: String,
    pub type_id: String,
    pub depart_lane: usize,
    pub depart_pos: f64,
    pub depart_speed: f64,
}

/// The operations the tick driver, snapshot builder and command interpreter
/// perform against the simulation.
///
/// `kinematics` reports a vanished vehicle as [`AdapterError::NotFound`].
/// A lost simulation connection is reported as [`AdapterError::Connection`].
pub trait SimulationAdapter {
    fn live_vehicle_ids(&self) -> Result<Vec<String>, AdapterError>;

    fn kinematics(&self, vehicle_id: &str) -> Result<Kinematics, AdapterError>;

    fn set_speed(&mut self, vehicle_id: &str, speed: f64) -> Result<(), AdapterError>;

    fn set_max_speed(&mut self, vehicle_id: &str, max_speed: f64) -> Result<(), AdapterError>;

    fn set_color(&mut self, vehicle_id: &str, color: Rgba) -> Result<(), AdapterError>;

    fn set_width(&mut self, vehicle_id: &str, width: f64) -> Result<(), AdapterError>;

    fn route_ids(&self) -> Result<Vec<String>, AdapterError>;

    fn register_vehicle_type(
        &mut self,
        type_id: &str,
        params: &VehicleTypeParams,
    ) -> Result<(), AdapterError>;

    fn create_vehicle(&mut self, spawn: &VehicleSpawn) -> Result<(), AdapterError>;

    /// Advance the simulation by one discrete time step.
    fn step(&mut self) -> Result<(), AdapterError>;

    /// Vehicles that completed their route during the last step.
    fn arrived_vehicle_ids(&self) -> Result<Vec<String>, AdapterError>;

    fn close(&mut self) -> Result<(), AdapterError>;
}
