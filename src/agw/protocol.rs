//! # AGW Protocol Constants and Types
//!
//! Core definitions for the AGW packet engine TCP protocol spoken by the TNC.

use crate::error::{Result, TelemError};

/// Fixed header in front of every AGW frame
/// Layout: port(1) + reserved(3) + kind(1) + reserved(1) + pid(1) + reserved(1)
///       + call_from(10) + call_to(10) + data_len(4, LE) + user(4)
pub const AGW_HEADER_SIZE: usize = 36;

/// Width of a callsign field in the header (NUL padded)
pub const AGW_CALLSIGN_FIELD_SIZE: usize = 10;

/// Longest callsign that still leaves room for the NUL terminator
pub const AGW_CALLSIGN_MAX_LEN: usize = AGW_CALLSIGN_FIELD_SIZE - 1;

/// Largest data section accepted in either direction
pub const AGW_MAX_DATA_SIZE: usize = 2048;

/// Header field offsets
pub const AGW_OFFSET_PORT: usize = 0;
pub const AGW_OFFSET_KIND: usize = 4;
pub const AGW_OFFSET_PID: usize = 6;
pub const AGW_OFFSET_CALL_FROM: usize = 8;
pub const AGW_OFFSET_CALL_TO: usize = 18;
pub const AGW_OFFSET_DATA_LEN: usize = 28;

/// Unproto information frame (UI frame sent on air)
pub const AGW_KIND_UNPROTO: u8 = b'M';

/// Monitored UI frame received from the air
pub const AGW_KIND_MONITOR_UI: u8 = b'U';

/// Toggle reception of monitored frames
pub const AGW_KIND_MONITOR_TOGGLE: u8 = b'm';

/// AX.25 PID: no layer 3 protocol
pub const PID_NO_PROTOCOL: u8 = 0xF0;

/// One AGW frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgwFrame {
    /// TNC radio port
    pub radio_port: u8,

    /// Data kind byte (e.g. `b'M'`)
    pub data_kind: u8,

    /// AX.25 protocol id
    pub pid: u8,

    pub call_from: String,
    pub call_to: String,

    pub data: Vec<u8>,
}

impl AgwFrame {
    /// Create a new AGW frame
    ///
    /// # Errors
    ///
    /// Returns error if a callsign is longer than 9 bytes or not ASCII, or
    /// the data exceeds [`AGW_MAX_DATA_SIZE`]
    pub fn new(
        radio_port: u8,
        data_kind: u8,
        pid: u8,
        call_from: &str,
        call_to: &str,
        data: Vec<u8>,
    ) -> Result<Self> {
        validate_callsign(call_from)?;
        validate_callsign(call_to)?;

        if data.len() > AGW_MAX_DATA_SIZE {
            return Err(TelemError::Agw(format!(
                "Data size {} exceeds maximum {}",
                data.len(),
                AGW_MAX_DATA_SIZE
            )));
        }

        Ok(Self {
            radio_port,
            data_kind,
            pid,
            call_from: call_from.to_string(),
            call_to: call_to.to_string(),
            data,
        })
    }

    /// Create an unproto ('M') frame, the kind used for telemetry
    pub fn unproto(radio_port: u8, pid: u8, call_from: &str, call_to: &str, data: Vec<u8>) -> Result<Self> {
        Self::new(radio_port, AGW_KIND_UNPROTO, pid, call_from, call_to, data)
    }

    /// Encoded length (header + data)
    pub fn wire_len(&self) -> usize {
        AGW_HEADER_SIZE + self.data.len()
    }
}

fn validate_callsign(call: &str) -> Result<()> {
    if call.len() > AGW_CALLSIGN_MAX_LEN || !call.is_ascii() {
        return Err(TelemError::Agw(format!(
            "Callsign '{}' must be at most {} ASCII characters",
            call, AGW_CALLSIGN_MAX_LEN
        )));
    }
    Ok(())
}
