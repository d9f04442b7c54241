/// Where a lane sits relative to the junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneType {
    /// Approach lane, driving towards the junction.
    Incoming,
    /// Connector inside the junction.
    Internal,
    /// Departure lane, driving away from the junction.
    Leaving,
}

/// A single lane of an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
    /// Lane id, `<edge>_<index>`.
    pub id: String,
    /// Edge (road) the lane belongs to.
    pub edge: String,
    pub lane_type: LaneType,
    /// Length of the lane in meters.
    pub length_meters: f64,
}

impl Lane {
    pub fn new(edge: &str, index: usize, lane_type: LaneType, length_meters: f64) -> Self {
        Self {
            id: format!("{edge}_{index}"),
            edge: edge.to_string(),
            lane_type,
            length_meters,
        }
    }
}

/// A named sequence of lanes a vehicle drives from start to end.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub lanes: Vec<Lane>,
}

/// Arms of the four-way junction.
pub const ARMS: [&str; 4] = ["left", "right", "up", "down"];

const ARM_LENGTH: f64 = 100.0;
const CONNECTOR_LENGTH: f64 = 15.0;

/// One incoming and one leaving single-lane edge per arm.
pub fn create_lanes() -> Vec<Lane> {
    ARMS.iter()
        .flat_map(|arm| {
            [
                Lane::new(&format!("{arm}_incoming"), 0, LaneType::Incoming, ARM_LENGTH),
                Lane::new(&format!("{arm}_leaving"), 0, LaneType::Leaving, ARM_LENGTH),
            ]
        })
        .collect()
}

/// A route from every arm to every other arm, passing through a junction
/// connector lane. Route ids are `route_<from>_<to>`.
pub fn create_routes(lanes: &[Lane]) -> Vec<Route> {
    let find = |edge: &str| lanes.iter().find(|lane| lane.edge == edge).cloned();

    let mut routes = Vec::new();
    let mut connector = 0;
    for from in ARMS {
        for to in ARMS {
            if from == to {
                continue;
            }
            let (Some(incoming), Some(leaving)) = (
                find(&format!("{from}_incoming")),
                find(&format!("{to}_leaving")),
            ) else {
                continue;
            };
            let internal = Lane::new(":center", connector, LaneType::Internal, CONNECTOR_LENGTH);
            connector += 1;
            routes.push(Route {
                id: format!("route_{from}_{to}"),
                lanes: vec![incoming, internal, leaving],
            });
        }
    }
    routes
}
