//! In-process simulation implementing [`SimulationAdapter`].
//!
//! Vehicles drive a four-arm junction at their commanded or top speed and
//! leave the simulation at the end of their route. Every mutator call is
//! recorded so callers can inspect exactly what was applied.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use crate::config::VehicleTypeParams;
use crate::error::AdapterError;
use crate::simulation_engine::adapter::{Kinematics, Rgba, SimulationAdapter, VehicleSpawn};
use crate::simulation_engine::lanes::{create_lanes, create_routes, Lane, Route};
use crate::simulation_engine::vehicles::Vehicle;

/// Vehicle type that exists without registration.
pub const DEFAULT_VEHICLE_TYPE: &str = "DEFAULT_VEHTYPE";

const DEFAULT_STEP_LENGTH: f64 = 1.0;
const DEFAULT_VEHICLE_COLOR: Rgba = Rgba(255, 255, 0, 255);

/// A mutator call as received by the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Speed { vehicle_id: String, speed: f64 },
    MaxSpeed { vehicle_id: String, max_speed: f64 },
    Color { vehicle_id: String, color: Rgba },
    Width { vehicle_id: String, width: f64 },
}

impl Mutation {
    pub fn vehicle_id(&self) -> &str {
        match self {
            Mutation::Speed { vehicle_id, .. }
            | Mutation::MaxSpeed { vehicle_id, .. }
            | Mutation::Color { vehicle_id, .. }
            | Mutation::Width { vehicle_id, .. } => vehicle_id,
        }
    }
}

#[derive(Debug)]
pub struct SandboxSimulation {
    step_length: f64,
    time: f64,
    routes: BTreeMap<String, Vec<Lane>>,
    vehicle_types: HashMap<String, VehicleTypeParams>,
    vehicles: BTreeMap<String, Vehicle>,
    arrived: Vec<String>,
    mutations: Vec<Mutation>,
    rejecting: HashSet<String>,
    closed: bool,
}

impl Default for SandboxSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxSimulation {
    /// Sandbox with the full junction route set.
    pub fn new() -> Self {
        Self::with_routes(create_routes(&create_lanes()))
    }

    pub fn with_routes(routes: Vec<Route>) -> Self {
        let mut vehicle_types = HashMap::new();
        vehicle_types.insert(DEFAULT_VEHICLE_TYPE.to_string(), VehicleTypeParams::default());
        Self {
            step_length: DEFAULT_STEP_LENGTH,
            time: 0.0,
            routes: routes.into_iter().map(|r| (r.id, r.lanes)).collect(),
            vehicle_types,
            vehicles: BTreeMap::new(),
            arrived: Vec::new(),
            mutations: Vec::new(),
            rejecting: HashSet::new(),
            closed: false,
        }
    }

    pub fn with_step_length(mut self, seconds: f64) -> Self {
        self.step_length = seconds;
        self
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn vehicle(&self, vehicle_id: &str) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn clear_mutations(&mut self) {
        self.mutations.clear();
    }

    /// Remove a vehicle as if it left the network without arriving.
    pub fn remove_vehicle(&mut self, vehicle_id: &str) -> bool {
        self.vehicles.remove(vehicle_id).is_some()
    }

    /// Make every subsequent mutator call for `vehicle_id` fail.
    pub fn reject_mutations_for(&mut self, vehicle_id: &str) {
        self.rejecting.insert(vehicle_id.to_string());
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.closed {
            Err(AdapterError::Connection("simulation closed".into()))
        } else {
            Ok(())
        }
    }

    fn vehicle_mut(
        &mut self,
        operation: &'static str,
        vehicle_id: &str,
    ) -> Result<&mut Vehicle, AdapterError> {
        self.ensure_open()?;
        if self.rejecting.contains(vehicle_id) {
            return Err(AdapterError::command_failed(
                operation,
                vehicle_id,
                "rejected by simulation",
            ));
        }
        self.vehicles
            .get_mut(vehicle_id)
            .ok_or_else(|| AdapterError::vehicle_not_found(vehicle_id))
    }
}

impl SimulationAdapter for SandboxSimulation {
    fn live_vehicle_ids(&self) -> Result<Vec<String>, AdapterError> {
        self.ensure_open()?;
        Ok(self.vehicles.keys().cloned().collect())
    }

    fn kinematics(&self, vehicle_id: &str) -> Result<Kinematics, AdapterError> {
        self.ensure_open()?;
        let vehicle = self
            .vehicles
            .get(vehicle_id)
            .ok_or_else(|| AdapterError::vehicle_not_found(vehicle_id))?;
        let lane = self
            .routes
            .get(&vehicle.route_id)
            .and_then(|lanes| lanes.get(vehicle.lane_index))
            .ok_or_else(|| AdapterError::vehicle_not_found(vehicle_id))?;
        Ok(Kinematics {
            lane: lane.id.clone(),
            position: vehicle.position,
            speed: vehicle.speed,
            edge: lane.edge.clone(),
        })
    }

    fn set_speed(&mut self, vehicle_id: &str, speed: f64) -> Result<(), AdapterError> {
        self.vehicle_mut("set_speed", vehicle_id)?.commanded_speed = Some(speed);
        self.mutations.push(Mutation::Speed {
            vehicle_id: vehicle_id.to_string(),
            speed,
        });
        Ok(())
    }

    fn set_max_speed(&mut self, vehicle_id: &str, max_speed: f64) -> Result<(), AdapterError> {
        self.vehicle_mut("set_max_speed", vehicle_id)?.max_speed = max_speed;
        self.mutations.push(Mutation::MaxSpeed {
            vehicle_id: vehicle_id.to_string(),
            max_speed,
        });
        Ok(())
    }

    fn set_color(&mut self, vehicle_id: &str, color: Rgba) -> Result<(), AdapterError> {
        self.vehicle_mut("set_color", vehicle_id)?.color = color;
        self.mutations.push(Mutation::Color {
            vehicle_id: vehicle_id.to_string(),
            color,
        });
        Ok(())
    }

    fn set_width(&mut self, vehicle_id: &str, width: f64) -> Result<(), AdapterError> {
        self.vehicle_mut("set_width", vehicle_id)?.width = width;
        self.mutations.push(Mutation::Width {
            vehicle_id: vehicle_id.to_string(),
            width,
        });
        Ok(())
    }

    fn route_ids(&self) -> Result<Vec<String>, AdapterError> {
        self.ensure_open()?;
        Ok(self.routes.keys().cloned().collect())
    }

    fn register_vehicle_type(
        &mut self,
        type_id: &str,
        params: &VehicleTypeParams,
    ) -> Result<(), AdapterError> {
        self.ensure_open()?;
        if !(params.width > 0.0 && params.length > 0.0 && params.max_speed > 0.0) {
            return Err(AdapterError::command_failed(
                "register_vehicle_type",
                type_id,
                "dimensions and top speed must be positive",
            ));
        }
        self.vehicle_types.insert(type_id.to_string(), params.clone());
        Ok(())
    }

    fn create_vehicle(&mut self, spawn: &VehicleSpawn) -> Result<(), AdapterError> {
        self.ensure_open()?;
        let fail = |message: &str| AdapterError::command_failed("create_vehicle", &spawn.id, message);

        if self.vehicles.contains_key(&spawn.id) {
            return Err(fail("duplicate vehicle id"));
        }
        let lanes = self
            .routes
            .get(&spawn.route_id)
            .ok_or_else(|| fail(&format!("unknown route '{}'", spawn.route_id)))?;
        let params = self
            .vehicle_types
            .get(&spawn.type_id)
            .ok_or_else(|| fail(&format!("unknown vehicle type '{}'", spawn.type_id)))?;
        // Every sandbox edge has exactly one lane.
        if spawn.depart_lane != 0 {
            return Err(fail(&format!("invalid depart lane {}", spawn.depart_lane)));
        }
        let first_lane_length = lanes.first().map_or(0.0, |lane| lane.length_meters);
        if !(0.0..first_lane_length).contains(&spawn.depart_pos) {
            return Err(fail(&format!("invalid depart position {}", spawn.depart_pos)));
        }

        let vehicle = Vehicle {
            id: spawn.id.clone(),
            type_id: spawn.type_id.clone(),
            route_id: spawn.route_id.clone(),
            lane_index: 0,
            position: spawn.depart_pos,
            speed: spawn.depart_speed,
            max_speed: params.max_speed,
            commanded_speed: None,
            accel: params.accel,
            decel: params.decel,
            length: params.length,
            width: params.width,
            color: DEFAULT_VEHICLE_COLOR,
        };
        self.vehicles.insert(spawn.id.clone(), vehicle);
        Ok(())
    }

    fn step(&mut self) -> Result<(), AdapterError> {
        self.ensure_open()?;
        self.arrived.clear();

        let dt = self.step_length;
        for vehicle in self.vehicles.values_mut() {
            let lanes = self
                .routes
                .get(&vehicle.route_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if vehicle.advance(lanes, dt) {
                self.arrived.push(vehicle.id.clone());
            }
        }
        for vehicle_id in &self.arrived {
            self.vehicles.remove(vehicle_id);
        }
        self.time += dt;
        debug!(
            "sandbox step t={:.1}: {} live, {} arrived",
            self.time,
            self.vehicles.len(),
            self.arrived.len()
        );
        Ok(())
    }

    fn arrived_vehicle_ids(&self) -> Result<Vec<String>, AdapterError> {
        self.ensure_open()?;
        Ok(self.arrived.clone())
    }

    fn close(&mut self) -> Result<(), AdapterError> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}
