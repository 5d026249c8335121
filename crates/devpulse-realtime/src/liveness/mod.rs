//! Heartbeat scheduling and dead-connection termination.

pub mod monitor;

pub use monitor::LivenessMonitor;
