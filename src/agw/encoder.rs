//! # AGW Frame Encoder
//!
//! Encodes frames and telemetry payloads for the TNC.

use bytes::BufMut;

use super::protocol::*;

/// Encode a complete AGW frame (header followed by data)
///
/// # Examples
///
/// ```
/// use pacsat_telem::agw::encoder::encode_frame;
/// use pacsat_telem::agw::protocol::{AgwFrame, PID_NO_PROTOCOL};
///
/// let frame = AgwFrame::unproto(0, PID_NO_PROTOCOL, "AMSAT-11", "TIME-1", vec![1, 2, 3, 4])?;
/// assert_eq!(encode_frame(&frame).len(), 40);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn encode_frame(frame: &AgwFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.wire_len());

    out.put_u8(frame.radio_port);
    out.put_bytes(0, 3);
    out.put_u8(frame.data_kind);
    out.put_u8(0);
    out.put_u8(frame.pid);
    out.put_u8(0);
    put_callsign(&mut out, &frame.call_from);
    put_callsign(&mut out, &frame.call_to);
    out.put_u32_le(frame.data.len() as u32);
    out.put_u32_le(0);
    out.extend_from_slice(&frame.data);

    out
}

/// Encode the request asking the TNC to forward monitored frames
pub fn encode_monitor_toggle(radio_port: u8) -> Vec<u8> {
    let frame = AgwFrame {
        radio_port,
        data_kind: AGW_KIND_MONITOR_TOGGLE,
        pid: 0,
        call_from: String::new(),
        call_to: String::new(),
        data: Vec::new(),
    };
    encode_frame(&frame)
}

/// Payload of a time beacon: low 32 bits of Unix time, little-endian
pub fn encode_time_payload(now: i64) -> [u8; 4] {
    (now as u32).to_le_bytes()
}

/// Write a callsign into its NUL padded 10-byte field, truncating if needed
fn put_callsign(out: &mut Vec<u8>, call: &str) {
    let bytes = call.as_bytes();
    let len = bytes.len().min(AGW_CALLSIGN_MAX_LEN);
    out.extend_from_slice(&bytes[..len]);
    out.put_bytes(0, AGW_CALLSIGN_FIELD_SIZE - len);
}
