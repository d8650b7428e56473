//! # Telemetry Module
//!
//! Telemetry samples and where they come from.
//!
//! This module handles:
//! - The fixed-layout telemetry record and its binary encoding
//! - The sensor source trait the scheduler samples through

pub mod record;
pub mod source;

pub use record::{TelemetryRecord, RECORD_SIZE};
pub use source::{SensorSource, StaticSensorSource};
