//! # AGW Frame Decoder
//!
//! Decodes frames received from the TNC.

use bytes::Buf;

use super::protocol::*;
use crate::error::{Result, TelemError};

/// Header fields of an AGW frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgwHeader {
    pub radio_port: u8,
    pub data_kind: u8,
    pub pid: u8,
    pub call_from: String,
    pub call_to: String,
    pub data_len: usize,
}

/// Decode the fixed 36-byte header
///
/// # Errors
///
/// Returns error if:
/// - Fewer than 36 bytes are given
/// - A callsign field is not ASCII
/// - The announced data length exceeds [`AGW_MAX_DATA_SIZE`]
pub fn decode_header(bytes: &[u8]) -> Result<AgwHeader> {
    if bytes.len() < AGW_HEADER_SIZE {
        return Err(TelemError::Agw(format!(
            "Header too short: expected {} bytes, got {}",
            AGW_HEADER_SIZE,
            bytes.len()
        )));
    }

    let call_from = decode_callsign(&bytes[AGW_OFFSET_CALL_FROM..AGW_OFFSET_CALL_FROM + AGW_CALLSIGN_FIELD_SIZE])?;
    let call_to = decode_callsign(&bytes[AGW_OFFSET_CALL_TO..AGW_OFFSET_CALL_TO + AGW_CALLSIGN_FIELD_SIZE])?;

    let mut len_field = &bytes[AGW_OFFSET_DATA_LEN..AGW_OFFSET_DATA_LEN + 4];
    let data_len = len_field.get_u32_le() as usize;
    if data_len > AGW_MAX_DATA_SIZE {
        return Err(TelemError::Agw(format!(
            "Data length {} exceeds maximum {}",
            data_len, AGW_MAX_DATA_SIZE
        )));
    }

    Ok(AgwHeader {
        radio_port: bytes[AGW_OFFSET_PORT],
        data_kind: bytes[AGW_OFFSET_KIND],
        pid: bytes[AGW_OFFSET_PID],
        call_from,
        call_to,
        data_len,
    })
}

/// Decode a complete frame (header and data)
///
/// # Errors
///
/// Returns error if the header is invalid or the data section is shorter
/// than the header announces
pub fn decode_frame(bytes: &[u8]) -> Result<AgwFrame> {
    let header = decode_header(bytes)?;
    let end = AGW_HEADER_SIZE + header.data_len;

    if bytes.len() < end {
        return Err(TelemError::Agw(format!(
            "Frame too short: expected {} bytes, got {}",
            end,
            bytes.len()
        )));
    }

    Ok(header.into_frame(bytes[AGW_HEADER_SIZE..end].to_vec()))
}

impl AgwHeader {
    /// Attach the data section read after this header
    pub fn into_frame(self, data: Vec<u8>) -> AgwFrame {
        AgwFrame {
            radio_port: self.radio_port,
            data_kind: self.data_kind,
            pid: self.pid,
            call_from: self.call_from,
            call_to: self.call_to,
            data,
        }
    }
}

fn decode_callsign(field: &[u8]) -> Result<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let call = &field[..end];

    if !call.is_ascii() {
        return Err(TelemError::Agw("Callsign field is not ASCII".to_string()));
    }

    Ok(String::from_utf8_lossy(call).into_owned())
}
