//! Port traits decoupling the simulation core from its surroundings.

pub mod config_port;
pub mod data_port;
pub mod observer_port;
