//! # AGW Protocol Module
//!
//! Implementation of the AGW packet engine protocol used to talk to the TNC.
//!
//! This module handles:
//! - Unproto ('M') frame encoding for telemetry and time beacons
//! - Header and frame decoding for received traffic
//! - Callsign field packing (10 bytes, NUL padded)

pub mod protocol;
pub mod encoder;
pub mod decoder;
