use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Kinematic state of one live vehicle, as sent to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub lane: String,
    /// Meters along the lane.
    #[serde(rename = "pos")]
    pub position: f64,
    pub speed: f64,
    pub edge: String,
}

/// Telemetry for one tick, keyed by vehicle id.
pub type VehicleSnapshot = HashMap<String, VehicleState>;

/// The controller's reply to a snapshot. Each section is independent and
/// may be absent; an absent section is different from an empty one.
///
/// Maps are ordered so platoons are always applied in platoon-id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speeds: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platoons: Option<BTreeMap<String, PlatoonCommand>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatoonCommand {
    pub leader: String,
    /// Missing and `null` both decode as no members.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub vehicles: Vec<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl PlatoonCommand {
    /// Members other than the leader, in wire order, without duplicates.
    pub fn followers(&self) -> impl Iterator<Item = &str> {
        let mut seen = HashSet::with_capacity(self.vehicles.len());
        self.vehicles
            .iter()
            .map(String::as_str)
            .filter(move |vid| *vid != self.leader && seen.insert(*vid))
    }
}

/// Display-only counters reported by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub time_step: i64,
    pub vehicle_count: usize,
    pub platoon_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersection_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations_count: Option<usize>,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Step {}: {} vehicles, {} platoons",
            self.time_step, self.vehicle_count, self.platoon_count
        )?;
        if let Some(count) = self.intersection_count {
            write!(f, ", {count} intersections")?;
        }
        if let Some(count) = self.reservations_count {
            write!(f, ", {count} reservations")?;
        }
        Ok(())
    }
}
