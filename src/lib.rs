//! HeartRate-Sense monitor
//!
//! Discovers a `HeartRate-Sense` BLE peripheral, connects to it, subscribes to
//! its heart-rate characteristic and keeps the latest decoded reading.

pub mod domain;
pub mod infrastructure;
