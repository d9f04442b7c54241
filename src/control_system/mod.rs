// control_system/mod.rs
pub mod command_interpreter;
pub mod platoon_colors;
