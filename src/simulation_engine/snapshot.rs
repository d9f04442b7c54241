use log::{debug, warn};

use crate::communication::messages::{VehicleSnapshot, VehicleState};
use crate::error::AdapterError;
use crate::simulation_engine::adapter::SimulationAdapter;

/// Collect the kinematic state of every live vehicle.
///
/// Vehicles that disappear between enumeration and the per-vehicle read are
/// left out. Only a failure to enumerate, or a lost connection, is an error.
pub fn build_snapshot<A: SimulationAdapter + ?Sized>(
    adapter: &A,
) -> Result<VehicleSnapshot, AdapterError> {
    let vehicle_ids = adapter.live_vehicle_ids()?;
    let mut snapshot = VehicleSnapshot::with_capacity(vehicle_ids.len());

    for vehicle_id in vehicle_ids {
        match adapter.kinematics(&vehicle_id) {
            Ok(state) => {
                snapshot.insert(
                    vehicle_id,
                    VehicleState {
                        lane: state.lane,
                        position: state.position,
                        speed: state.speed,
                        edge: state.edge,
                    },
                );
            }
            Err(AdapterError::NotFound { .. }) => {
                debug!("vehicle {vehicle_id} left before it could be read");
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => warn!("skipping vehicle {vehicle_id} in snapshot: {err}"),
        }
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VehicleTypeParams;
    use crate::simulation_engine::adapter::{Kinematics, Rgba, VehicleSpawn};
    use crate::simulation_engine::sandbox::{SandboxSimulation, DEFAULT_VEHICLE_TYPE};

    /// Lists one vehicle more than it can read, as when a vehicle leaves
    /// between enumeration and access.
    struct VanishingVehicle {
        inner: SandboxSimulation,
        ghost: String,
    }

    impl SimulationAdapter for VanishingVehicle {
        fn live_vehicle_ids(&self) -> Result<Vec<String>, AdapterError> {
            let mut ids = self.inner.live_vehicle_ids()?;
            ids.push(self.ghost.clone());
            Ok(ids)
        }
        fn kinematics(&self, vehicle_id: &str) -> Result<Kinematics, AdapterError> {
            self.inner.kinematics(vehicle_id)
        }
        fn set_speed(&mut self, id: &str, speed: f64) -> Result<(), AdapterError> {
            self.inner.set_speed(id, speed)
        }
        fn set_max_speed(&mut self, id: &str, max_speed: f64) -> Result<(), AdapterError> {
            self.inner.set_max_speed(id, max_speed)
        }
        fn set_color(&mut self, id: &str, color: Rgba) -> Result<(), AdapterError> {
            self.inner.set_color(id, color)
        }
        fn set_width(&mut self, id: &str, width: f64) -> Result<(), AdapterError> {
            self.inner.set_width(id, width)
        }
        fn route_ids(&self) -> Result<Vec<String>, AdapterError> {
            self.inner.route_ids()
        }
        fn register_vehicle_type(
            &mut self,
            type_id: &str,
            params: &VehicleTypeParams,
        ) -> Result<(), AdapterError> {
            self.inner.register_vehicle_type(type_id, params)
        }
        fn create_vehicle(&mut self, spawn: &VehicleSpawn) -> Result<(), AdapterError> {
            self.inner.create_vehicle(spawn)
        }
        fn step(&mut self) -> Result<(), AdapterError> {
            self.inner.step()
        }
        fn arrived_vehicle_ids(&self) -> Result<Vec<String>, AdapterError> {
            self.inner.arrived_vehicle_ids()
        }
        fn close(&mut self) -> Result<(), AdapterError> {
            self.inner.close()
        }
    }

    fn sandbox_with(ids: &[&str]) -> SandboxSimulation {
        let mut sim = SandboxSimulation::new();
        for id in ids {
            sim.create_vehicle(&VehicleSpawn {
                id: id.to_string(),
                route_id: "route_right_left".into(),
                type_id: DEFAULT_VEHICLE_TYPE.into(),
                depart_lane: 0,
                depart_pos: 3.0,
                depart_speed: 1.5,
            })
            .unwrap();
        }
        sim
    }

    #[test]
    fn snapshot_has_one_entry_per_live_vehicle() {
        let sim = sandbox_with(&["v1", "v2"]);
        let snapshot = build_snapshot(&sim).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot["v1"],
            VehicleState {
                lane: "right_incoming_0".into(),
                position: 3.0,
                speed: 1.5,
                edge: "right_incoming".into(),
            }
        );
    }

    #[test]
    fn vanished_vehicle_is_omitted() {
        let adapter = VanishingVehicle {
            inner: sandbox_with(&["v1"]),
            ghost: "v_gone".into(),
        };
        let snapshot = build_snapshot(&adapter).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("v1"));
        assert!(!snapshot.contains_key("v_gone"));
    }

    #[test]
    fn lost_connection_fails_the_build() {
        let mut sim = sandbox_with(&["v1"]);
        sim.close().unwrap();
        assert!(build_snapshot(&sim).is_err());
    }
}
