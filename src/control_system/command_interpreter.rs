//! Applies a controller's [`CommandBatch`] to the simulation.
//!
//! Sections are applied in the order speeds, platoons, stats. Platoons are
//! processed in platoon-id order, so when a vehicle is listed in two platoons
//! the lexicographically greater platoon id decides its styling.

use std::collections::HashSet;
use std::fmt;

use crate::communication::messages::{CommandBatch, PlatoonCommand, StatsReport};
use crate::control_system::platoon_colors::PlatoonColorManager;
use crate::error::AdapterError;
use crate::global_variables::{DEFAULT_WIDTH, LEADER_COLOR_SCALE, LEADER_WIDTH, MEMBER_WIDTH};
use crate::simulation_engine::adapter::{Rgba, SimulationAdapter};

/// A mutator call that failed for a live vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    pub vehicle_id: String,
    pub error: AdapterError,
}

/// What applying one batch did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandReport {
    pub speeds_applied: usize,
    /// Speed targets that were not live when the batch arrived.
    pub speeds_skipped: Vec<String>,
    pub platoons_styled: usize,
    pub vehicles_styled: usize,
    pub vehicles_reset: usize,
    pub platoons_pruned: Vec<String>,
    pub stats: Option<StatsReport>,
    pub failures: Vec<CommandFailure>,
}

impl CommandReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CommandReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "speeds {} applied / {} skipped, platoons {} styled / {} pruned, vehicles {} styled / {} reset, {} failures",
            self.speeds_applied,
            self.speeds_skipped.len(),
            self.platoons_styled,
            self.platoons_pruned.len(),
            self.vehicles_styled,
            self.vehicles_reset,
            self.failures.len()
        )
    }
}

/// Apply `batch` against the vehicles currently live in `adapter`.
///
/// Per-vehicle failures are collected in the report and never stop the batch.
/// Only a lost simulation connection is returned as an error.
pub fn apply_commands<A: SimulationAdapter + ?Sized>(
    batch: &CommandBatch,
    adapter: &mut A,
    colors: &mut PlatoonColorManager,
) -> Result<CommandReport, AdapterError> {
    let live_ids = adapter.live_vehicle_ids()?;
    let live: HashSet<&str> = live_ids.iter().map(String::as_str).collect();
    let mut report = CommandReport::default();

    if let Some(speeds) = &batch.speeds {
        for (vehicle_id, &speed) in speeds {
            if !live.contains(vehicle_id.as_str()) {
                report.speeds_skipped.push(vehicle_id.clone());
                continue;
            }
            if record(adapter.set_speed(vehicle_id, speed), vehicle_id, &mut report)? {
                report.speeds_applied += 1;
            }
        }
    }

    if let Some(platoons) = &batch.platoons {
        for platoon_id in platoons.keys() {
            colors.color_for(platoon_id);
        }

        let mut styled: HashSet<&str> = HashSet::new();
        for (platoon_id, platoon) in platoons {
            let color = colors.color_for(platoon_id);
            style_platoon(platoon, color, &live, adapter, &mut styled, &mut report)?;
            report.platoons_styled += 1;
        }
        report.vehicles_styled = styled.len();

        for vehicle_id in &live_ids {
            if styled.contains(vehicle_id.as_str()) {
                continue;
            }
            style_vehicle(adapter, vehicle_id, Rgba::WHITE, DEFAULT_WIDTH, &mut report)?;
            report.vehicles_reset += 1;
        }

        report.platoons_pruned = colors.prune(platoons.keys().map(String::as_str));
    }

    report.stats = batch.stats.clone();
    Ok(report)
}

fn style_platoon<'a, A: SimulationAdapter + ?Sized>(
    platoon: &'a PlatoonCommand,
    color: Rgba,
    live: &HashSet<&str>,
    adapter: &mut A,
    styled: &mut HashSet<&'a str>,
    report: &mut CommandReport,
) -> Result<(), AdapterError> {
    let leader = platoon.leader.as_str();
    if live.contains(leader) {
        let leader_color = color.scaled(LEADER_COLOR_SCALE);
        style_vehicle(adapter, leader, leader_color, LEADER_WIDTH, report)?;
        styled.insert(leader);
    }

    for member in platoon.followers() {
        if live.contains(member) {
            style_vehicle(adapter, member, color, MEMBER_WIDTH, report)?;
            styled.insert(member);
        }
    }
    Ok(())
}

fn style_vehicle<A: SimulationAdapter + ?Sized>(
    adapter: &mut A,
    vehicle_id: &str,
    color: Rgba,
    width: f64,
    report: &mut CommandReport,
) -> Result<(), AdapterError> {
    record(adapter.set_color(vehicle_id, color), vehicle_id, report)?;
    record(adapter.set_width(vehicle_id, width), vehicle_id, report)?;
    Ok(())
}

/// Fold one mutator result into the report. Returns whether it succeeded;
/// fatal errors are passed through.
fn record(
    result: Result<(), AdapterError>,
    vehicle_id: &str,
    report: &mut CommandReport,
) -> Result<bool, AdapterError> {
    match result {
        Ok(()) => Ok(true),
        Err(error) if error.is_fatal() => Err(error),
        Err(error) => {
            report.failures.push(CommandFailure {
                vehicle_id: vehicle_id.to_string(),
                error,
            });
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::adapter::VehicleSpawn;
    use crate::simulation_engine::sandbox::{Mutation, SandboxSimulation, DEFAULT_VEHICLE_TYPE};
    use std::collections::BTreeMap;

    fn sandbox_with(ids: &[&str]) -> SandboxSimulation {
        let mut sim = SandboxSimulation::new();
        for id in ids {
            sim.create_vehicle(&VehicleSpawn {
                id: id.to_string(),
                route_id: "route_left_up".into(),
                type_id: DEFAULT_VEHICLE_TYPE.into(),
                depart_lane: 0,
                depart_pos: 0.0,
                depart_speed: 0.0,
            })
            .unwrap();
        }
        sim
    }

    fn platoons(entries: &[(&str, &str, &[&str])]) -> CommandBatch {
        let platoons: BTreeMap<String, PlatoonCommand> = entries
            .iter()
            .map(|(id, leader, vehicles)| {
                (
                    id.to_string(),
                    PlatoonCommand {
                        leader: leader.to_string(),
                        vehicles: vehicles.iter().map(|v| v.to_string()).collect(),
                    },
                )
            })
            .collect();
        CommandBatch {
            platoons: Some(platoons),
            ..CommandBatch::default()
        }
    }

    fn style_of(sim: &SandboxSimulation, id: &str) -> (Rgba, f64) {
        let vehicle = sim.vehicle(id).unwrap();
        (vehicle.color, vehicle.width)
    }

    #[test]
    fn leader_and_member_styling() {
        let mut sim = sandbox_with(&["v1", "v2", "v3"]);
        let mut colors = PlatoonColorManager::new();

        let batch = platoons(&[("P1", "v1", &["v1", "v2"])]);
        let report = apply_commands(&batch, &mut sim, &mut colors).unwrap();

        assert_eq!(colors.get("P1"), Some(Rgba(255, 0, 0, 255)));
        assert_eq!(style_of(&sim, "v1"), (Rgba(255, 0, 0, 255), 2.2));
        assert_eq!(style_of(&sim, "v2"), (Rgba(255, 0, 0, 255), 2.0));
        assert_eq!(style_of(&sim, "v3"), (Rgba::WHITE, 1.8));
        assert_eq!(report.vehicles_styled, 2);
        assert_eq!(report.vehicles_reset, 1);

        let report = apply_commands(&platoons(&[]), &mut sim, &mut colors).unwrap();
        assert_eq!(report.platoons_pruned, vec!["P1".to_string()]);
        assert!(colors.is_empty());
        assert_eq!(style_of(&sim, "v1"), (Rgba::WHITE, 1.8));
        assert_eq!(style_of(&sim, "v2"), (Rgba::WHITE, 1.8));
    }

    #[test]
    fn leader_color_is_scaled_and_clamped() {
        let mut sim = sandbox_with(&["a", "b"]);
        let mut colors = PlatoonColorManager::new();
        // Seven assignments put the next platoon on (0, 128, 0).
        for i in 0..7 {
            colors.color_for(&format!("old{i}"));
        }
        let batch = platoons(&[("P", "a", &["b"])]);
        apply_commands(&batch, &mut sim, &mut colors).unwrap();
        assert_eq!(style_of(&sim, "a").0, Rgba(0, 166, 0, 255));
        assert_eq!(style_of(&sim, "b").0, Rgba(0, 128, 0, 255));
    }

    #[test]
    fn speed_for_departed_vehicle_is_skipped_quietly() {
        let mut sim = sandbox_with(&["v1", "v2"]);
        let mut colors = PlatoonColorManager::new();
        let mut batch = platoons(&[("P1", "v1", &["v2"])]);
        batch.speeds = Some(BTreeMap::from([("v9".to_string(), 12.5)]));

        let report = apply_commands(&batch, &mut sim, &mut colors).unwrap();

        assert_eq!(report.speeds_skipped, vec!["v9".to_string()]);
        assert_eq!(report.speeds_applied, 0);
        assert!(report.is_clean());
        assert!(sim.mutations().iter().all(|m| m.vehicle_id() != "v9"));
        assert_eq!(report.platoons_styled, 1);
    }

    #[test]
    fn speeds_reach_live_vehicles() {
        let mut sim = sandbox_with(&["v1"]);
        let mut colors = PlatoonColorManager::new();
        let batch = CommandBatch {
            speeds: Some(BTreeMap::from([("v1".to_string(), 8.0)])),
            ..CommandBatch::default()
        };
        let report = apply_commands(&batch, &mut sim, &mut colors).unwrap();
        assert_eq!(report.speeds_applied, 1);
        assert_eq!(sim.vehicle("v1").unwrap().commanded_speed, Some(8.0));
        assert_eq!(
            sim.mutations(),
            &[Mutation::Speed {
                vehicle_id: "v1".into(),
                speed: 8.0
            }]
        );
    }

    #[test]
    fn failed_mutation_does_not_stop_the_batch() {
        let mut sim = sandbox_with(&["v1", "v2", "v3"]);
        sim.reject_mutations_for("v1");
        let mut colors = PlatoonColorManager::new();
        let mut batch = platoons(&[("P1", "v1", &["v2"])]);
        batch.speeds = Some(BTreeMap::from([
            ("v1".to_string(), 5.0),
            ("v2".to_string(), 6.0),
        ]));

        let report = apply_commands(&batch, &mut sim, &mut colors).unwrap();

        assert_eq!(report.speeds_applied, 1);
        assert!(report.failures.iter().all(|f| f.vehicle_id == "v1"));
        // one speed, one color and one width call were rejected
        assert_eq!(report.failures.len(), 3);
        assert_eq!(style_of(&sim, "v2"), (Rgba(255, 0, 0, 255), 2.0));
        assert_eq!(style_of(&sim, "v3"), (Rgba::WHITE, 1.8));
    }

    #[test]
    fn missing_sections_change_nothing() {
        let mut sim = sandbox_with(&["v1"]);
        let mut colors = PlatoonColorManager::new();
        colors.color_for("P1");

        let report = apply_commands(&CommandBatch::default(), &mut sim, &mut colors).unwrap();

        assert_eq!(report, CommandReport::default());
        assert!(sim.mutations().is_empty());
        assert_eq!(colors.len(), 1);
    }

    #[test]
    fn reapplying_the_same_platoons_is_idempotent() {
        let mut sim = sandbox_with(&["v1", "v2", "v3", "v4"]);
        let mut colors = PlatoonColorManager::new();
        let batch = platoons(&[("P1", "v1", &["v2"]), ("P2", "v3", &["v3"])]);

        apply_commands(&batch, &mut sim, &mut colors).unwrap();
        let first: Vec<_> = ["v1", "v2", "v3", "v4"]
            .iter()
            .map(|id| style_of(&sim, id))
            .collect();
        apply_commands(&batch, &mut sim, &mut colors).unwrap();
        let second: Vec<_> = ["v1", "v2", "v3", "v4"]
            .iter()
            .map(|id| style_of(&sim, id))
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn tracked_platoons_always_match_the_latest_batch() {
        let mut sim = sandbox_with(&["v1", "v2", "v3"]);
        let mut colors = PlatoonColorManager::new();
        let sequence: [&[(&str, &str, &[&str])]; 4] = [
            &[("A", "v1", &["v2"]), ("B", "v3", &[])],
            &[("B", "v3", &[]), ("C", "v1", &[])],
            &[],
            &[("A", "v2", &["v1"])],
        ];

        for entries in sequence {
            let batch = platoons(entries);
            apply_commands(&batch, &mut sim, &mut colors).unwrap();
            let expected: Vec<&str> = entries.iter().map(|(id, _, _)| *id).collect();
            assert_eq!(colors.tracked_ids().into_iter().collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn platoon_keeps_its_color_while_others_change() {
        let mut sim = sandbox_with(&["v1", "v2", "v3", "v4"]);
        let mut colors = PlatoonColorManager::new();

        apply_commands(&platoons(&[("B", "v1", &[])]), &mut sim, &mut colors).unwrap();
        let b_color = colors.get("B");
        apply_commands(
            &platoons(&[("A", "v2", &[]), ("B", "v1", &[])]),
            &mut sim,
            &mut colors,
        )
        .unwrap();
        apply_commands(
            &platoons(&[("B", "v1", &[]), ("C", "v3", &["v4"])]),
            &mut sim,
            &mut colors,
        )
        .unwrap();

        assert_eq!(colors.get("B"), b_color);
    }

    #[test]
    fn dropped_member_reverts_on_next_batch() {
        let mut sim = sandbox_with(&["v1", "v2"]);
        let mut colors = PlatoonColorManager::new();

        apply_commands(&platoons(&[("P1", "v1", &["v2"])]), &mut sim, &mut colors).unwrap();
        apply_commands(&platoons(&[("P1", "v1", &[])]), &mut sim, &mut colors).unwrap();

        assert_eq!(style_of(&sim, "v1"), (Rgba(255, 0, 0, 255), 2.2));
        assert_eq!(style_of(&sim, "v2"), (Rgba::WHITE, 1.8));
    }

    #[test]
    fn shared_vehicle_takes_the_later_platoon_id() {
        let mut sim = sandbox_with(&["v1", "v2", "shared"]);
        let mut colors = PlatoonColorManager::new();
        let batch = platoons(&[("P_b", "v2", &["shared"]), ("P_a", "v1", &["shared"])]);

        apply_commands(&batch, &mut sim, &mut colors).unwrap();

        // P_a is assigned first (red), P_b second (green) and styled last.
        assert_eq!(colors.get("P_a"), Some(Rgba(255, 0, 0, 255)));
        assert_eq!(style_of(&sim, "shared").0, Rgba(0, 255, 0, 255));
    }

    #[test]
    fn members_are_styled_when_leader_has_left() {
        let mut sim = sandbox_with(&["v2"]);
        let mut colors = PlatoonColorManager::new();

        let report =
            apply_commands(&platoons(&[("P1", "gone", &["gone", "v2"])]), &mut sim, &mut colors)
                .unwrap();

        assert_eq!(style_of(&sim, "v2"), (Rgba(255, 0, 0, 255), 2.0));
        assert_eq!(report.vehicles_styled, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn stats_are_passed_through_untouched() {
        let mut sim = sandbox_with(&["v1"]);
        let mut colors = PlatoonColorManager::new();
        let stats = StatsReport {
            time_step: 3,
            vehicle_count: 1,
            platoon_count: 0,
            intersection_count: None,
            reservations_count: None,
        };
        let batch = CommandBatch {
            stats: Some(stats.clone()),
            ..CommandBatch::default()
        };

        let report = apply_commands(&batch, &mut sim, &mut colors).unwrap();

        assert_eq!(report.stats, Some(stats));
        assert!(sim.mutations().is_empty());
    }

    #[test]
    fn lost_connection_is_returned() {
        let mut sim = sandbox_with(&["v1"]);
        sim.close().unwrap();
        let mut colors = PlatoonColorManager::new();
        let result = apply_commands(&platoons(&[]), &mut sim, &mut colors);
        assert!(matches!(result, Err(AdapterError::Connection(_))));
    }
}
