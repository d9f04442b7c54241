//! Reference controller: groups vehicles into platoons from each snapshot and
//! answers with speed and platoon commands.

use std::collections::BTreeMap;

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::communication::messages::{
    CommandBatch, PlatoonCommand, StatsReport, VehicleSnapshot, VehicleState,
};
use crate::communication::transport::BridgeTransport;
use crate::config::ControllerConfig;
use crate::error::TransportError;

/// Forms platoons from vehicles that share a lane and follow each other
/// within `max_gap` meters. The front vehicle of a group leads it and the
/// others are told to match its speed.
#[derive(Debug)]
pub struct PlatoonPlanner {
    max_gap: f64,
    time_step: i64,
}

impl PlatoonPlanner {
    pub fn new(max_gap: f64) -> Self {
        Self {
            max_gap,
            time_step: 0,
        }
    }

    pub fn plan(&mut self, snapshot: &VehicleSnapshot) -> CommandBatch {
        self.time_step += 1;

        let mut by_lane: BTreeMap<&str, Vec<(&str, &VehicleState)>> = BTreeMap::new();
        for (vehicle_id, state) in snapshot {
            by_lane
                .entry(state.lane.as_str())
                .or_default()
                .push((vehicle_id.as_str(), state));
        }

        let mut speeds = BTreeMap::new();
        let mut platoons = BTreeMap::new();
        for vehicles in by_lane.values_mut() {
            // front of the lane first
            vehicles.sort_by(|a, b| b.1.position.total_cmp(&a.1.position).then(a.0.cmp(b.0)));

            for group in self.split_by_gap(vehicles) {
                let [(leader_id, leader), followers @ ..] = group else {
                    continue;
                };
                if followers.is_empty() {
                    continue;
                }
                for (follower_id, _) in followers {
                    speeds.insert(follower_id.to_string(), leader.speed);
                }
                platoons.insert(
                    format!("p_{}_{}", leader.edge, leader_id),
                    PlatoonCommand {
                        leader: leader_id.to_string(),
                        vehicles: group.iter().map(|(id, _)| id.to_string()).collect(),
                    },
                );
            }
        }

        let stats = StatsReport {
            time_step: self.time_step,
            vehicle_count: snapshot.len(),
            platoon_count: platoons.len(),
            intersection_count: None,
            reservations_count: None,
        };
        debug!("planned {} platoons for {} vehicles", platoons.len(), snapshot.len());

        CommandBatch {
            speeds: Some(speeds),
            platoons: Some(platoons),
            stats: Some(stats),
        }
    }

    /// Split a front-to-back ordered lane into runs whose consecutive gaps
    /// are within `max_gap`.
    fn split_by_gap<'a, 'b>(
        &self,
        vehicles: &'b [(&'a str, &'a VehicleState)],
    ) -> Vec<&'b [(&'a str, &'a VehicleState)]> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=vehicles.len() {
            let split = match (vehicles.get(i - 1), vehicles.get(i)) {
                (Some((_, ahead)), Some((_, behind))) => {
                    ahead.position - behind.position > self.max_gap
                }
                _ => true,
            };
            if split {
                groups.push(&vehicles[start..i]);
                start = i;
            }
        }
        groups
    }
}

/// Bind the controller's listening socket.
pub async fn bind(config: &ControllerConfig) -> Result<TcpListener, TransportError> {
    let addr = config.listen_addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })
}

/// Accept the single bridge connection and serve it until it closes.
pub async fn accept_and_serve(
    listener: TcpListener,
    config: &ControllerConfig,
) -> Result<u64, TransportError> {
    info!(
        "traffic controller waiting for bridge on {}...",
        listener.local_addr()?
    );
    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true)?;
    info!("connection established with bridge at {peer}");

    let transport = BridgeTransport::new(stream).with_max_frame_size(config.max_frame_size);
    control_session(transport, PlatoonPlanner::new(config.platoon_gap)).await
}

/// Answer every snapshot with a planned batch. Returns the number of
/// exchanges once the bridge closes the stream.
pub async fn control_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut transport: BridgeTransport<S>,
    mut planner: PlatoonPlanner,
) -> Result<u64, TransportError> {
    let mut exchanges = 0;
    while let Some(snapshot) = transport.receive::<VehicleSnapshot>().await? {
        let batch = planner.plan(&snapshot);
        transport.send(&batch).await?;
        exchanges += 1;
    }
    info!("bridge closed the connection after {exchanges} exchanges");
    Ok(exchanges)
}
