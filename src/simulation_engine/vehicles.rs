use crate::simulation_engine::adapter::Rgba;
use crate::simulation_engine::lanes::Lane;

/// A vehicle driving along a route inside the sandbox simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: String,
    pub type_id: String,
    pub route_id: String,
    /// Index into the route's lanes.
    pub lane_index: usize,
    /// Meters along the current lane.
    pub position: f64,
    pub speed: f64,
    pub max_speed: f64,
    /// Speed imposed by a controller, if any.
    pub commanded_speed: Option<f64>,
    pub accel: f64,
    pub decel: f64,
    pub length: f64,
    pub width: f64,
    pub color: Rgba,
}

impl Vehicle {
    pub fn target_speed(&self) -> f64 {
        self.commanded_speed
            .unwrap_or(self.max_speed)
            .clamp(0.0, self.max_speed)
    }

    /// Moves the vehicle `dt` seconds along `lanes`, accelerating or braking
    /// towards its target speed. Returns `true` once it has left the last lane.
    pub fn advance(&mut self, lanes: &[Lane], dt: f64) -> bool {
        let target = self.target_speed();
        self.speed = if self.speed < target {
            (self.speed + self.accel * dt).min(target)
        } else {
            (self.speed - self.decel * dt).max(target)
        };
        self.position += self.speed * dt;

        while let Some(lane) = lanes.get(self.lane_index) {
            if self.position < lane.length_meters {
                return false;
            }
            self.position -= lane.length_meters;
            self.lane_index += 1;
        }
        true
    }
}
