//! Error types shared by every subsystem of the gateway.

pub mod types;
