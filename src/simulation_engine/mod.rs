// simulation_engine/mod.rs
pub mod adapter;
pub mod lanes;
pub mod sandbox;
pub mod snapshot;
pub mod vehicles;
