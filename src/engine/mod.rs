// engine/mod.rs
pub mod tick_driver;
