pub mod platoon_planner;

pub use platoon_planner::{accept_and_serve, bind, control_session, PlatoonPlanner};
