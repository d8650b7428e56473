//! # PACSAT Telemetry Library
//!
//! Sample sensors, keep Whole Orbit Data (WOD) and beacon live telemetry.
//!
//! This library provides the scheduler that samples a sensor source on one
//! period and appends the latest record to a rolling binary WOD file on
//! another, forwarding each sample to an AGW TNC as it goes.

pub mod agw;
pub mod config;
pub mod error;
pub mod link;
pub mod scheduler;
pub mod telemetry;
pub mod wod;
