//! # Telemetry Record Encoding
//!
//! Fixed-layout, versioned binary encoding of one telemetry sample.
//!
//! ```text
//! Offset  Size  Field
//!      0     1  format version (1)
//!      1     1  validity flags
//!      2     2  reserved (0)
//!      4     4  timestamp, u32 seconds since epoch
//!      8     4  sequence number, u32
//!     12     4  SHTC3 temperature, f32
//!     16     4  SHTC3 humidity, f32
//!     20     4  LPS22 pressure, f32
//!     24     4  LPS22 temperature, f32
//!     28     4  board temperature, f32
//!     32     8  4 x u16 raw ADC channels
//! ```
//!
//! All multi-byte fields are little-endian. WOD files are plain back-to-back
//! sequences of these 40-byte blocks.

use bytes::{Buf, BufMut};
use serde::Serialize;

use crate::error::{Result, TelemError};

/// Current record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Encoded size of one record in bytes
pub const RECORD_SIZE: usize = 40;

/// Number of raw ADC channels carried in a record
pub const ADC_CHANNELS: usize = 4;

/// ADC channel indices
pub const ADC_METHANE_CHAN: usize = 0;
pub const ADC_AIR_QUALITY_CHAN: usize = 1;
pub const ADC_O2_CHAN: usize = 2;
pub const ADC_BUS_V_CHAN: usize = 3;

const FLAG_TEMP_HUMIDITY_VALID: u8 = 0x01;
const FLAG_PRESSURE_VALID: u8 = 0x02;
const FLAG_BOARD_TEMP_VALID: u8 = 0x04;
const FLAG_ADC_VALID: u8 = 0x08;
const FLAGS_KNOWN: u8 =
    FLAG_TEMP_HUMIDITY_VALID | FLAG_PRESSURE_VALID | FLAG_BOARD_TEMP_VALID | FLAG_ADC_VALID;

/// One telemetry sample
///
/// Field meaning is owned by the sensor source; the logger only moves the
/// encoded bytes around.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TelemetryRecord {
    /// Seconds since the Unix epoch
    pub timestamp: u32,

    /// Number of samples taken before this one
    pub sequence: u32,

    pub shtc3_temp: f32,
    pub shtc3_humidity: f32,
    pub temp_humidity_valid: bool,

    pub lps22_pressure: f32,
    pub lps22_temp: f32,
    pub pressure_valid: bool,

    pub board_temp: f32,
    pub board_temp_valid: bool,

    /// Raw counts, see the `ADC_*_CHAN` indices
    pub adc: [u16; ADC_CHANNELS],
    pub adc_valid: bool,
}

impl TelemetryRecord {
    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.temp_humidity_valid {
            flags |= FLAG_TEMP_HUMIDITY_VALID;
        }
        if self.pressure_valid {
            flags |= FLAG_PRESSURE_VALID;
        }
        if self.board_temp_valid {
            flags |= FLAG_BOARD_TEMP_VALID;
        }
        if self.adc_valid {
            flags |= FLAG_ADC_VALID;
        }
        flags
    }

    /// Encode into the fixed 40-byte layout
    ///
    /// # Examples
    ///
    /// ```
    /// use pacsat_telem::telemetry::record::{TelemetryRecord, RECORD_SIZE};
    ///
    /// let bytes = TelemetryRecord::default().encode();
    /// assert_eq!(bytes.len(), RECORD_SIZE);
    /// ```
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        let mut buf = &mut out[..];

        buf.put_u8(RECORD_FORMAT_VERSION);
        buf.put_u8(self.flags());
        buf.put_u16_le(0);
        buf.put_u32_le(self.timestamp);
        buf.put_u32_le(self.sequence);
        buf.put_f32_le(self.shtc3_temp);
        buf.put_f32_le(self.shtc3_humidity);
        buf.put_f32_le(self.lps22_pressure);
        buf.put_f32_le(self.lps22_temp);
        buf.put_f32_le(self.board_temp);
        for &count in &self.adc {
            buf.put_u16_le(count);
        }

        out
    }

    /// Decode one record
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `bytes` is not exactly [`RECORD_SIZE`] long
    /// - The format version is unknown
    /// - Reserved bits or bytes are set
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_SIZE {
            return Err(TelemError::Record(format!(
                "Expected {} bytes, got {}",
                RECORD_SIZE,
                bytes.len()
            )));
        }

        let mut buf = bytes;

        let version = buf.get_u8();
        if version != RECORD_FORMAT_VERSION {
            return Err(TelemError::Record(format!("Unknown format version {}", version)));
        }

        let flags = buf.get_u8();
        if flags & !FLAGS_KNOWN != 0 {
            return Err(TelemError::Record(format!("Unknown validity flags 0x{:02X}", flags)));
        }

        let reserved = buf.get_u16_le();
        if reserved != 0 {
            return Err(TelemError::Record(format!("Reserved field is 0x{:04X}", reserved)));
        }

        let timestamp = buf.get_u32_le();
        let sequence = buf.get_u32_le();
        let shtc3_temp = buf.get_f32_le();
        let shtc3_humidity = buf.get_f32_le();
        let lps22_pressure = buf.get_f32_le();
        let lps22_temp = buf.get_f32_le();
        let board_temp = buf.get_f32_le();
        let mut adc = [0u16; ADC_CHANNELS];
        for count in adc.iter_mut() {
            *count = buf.get_u16_le();
        }

        Ok(Self {
            timestamp,
            sequence,
            shtc3_temp,
            shtc3_humidity,
            temp_humidity_valid: flags & FLAG_TEMP_HUMIDITY_VALID != 0,
            lps22_pressure,
            lps22_temp,
            pressure_valid: flags & FLAG_PRESSURE_VALID != 0,
            board_temp,
            board_temp_valid: flags & FLAG_BOARD_TEMP_VALID != 0,
            adc,
            adc_valid: flags & FLAG_ADC_VALID != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TelemetryRecord {
        TelemetryRecord {
            timestamp: 0x6789_ABCD,
            sequence: 7,
            shtc3_temp: 11.0,
            shtc3_humidity: 55.0,
            temp_humidity_valid: true,
            lps22_pressure: 66.0,
            lps22_temp: 22.0,
            pressure_valid: true,
            board_temp: 0.0,
            board_temp_valid: false,
            adc: [1, 2, 3, 0xFFFF],
            adc_valid: true,
        }
    }

    #[test]
    fn test_encoded_size() {
        assert_eq!(sample_record().encode().len(), RECORD_SIZE);
        assert_eq!(RECORD_SIZE, 40);
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample_record().encode();

        assert_eq!(bytes[0], RECORD_FORMAT_VERSION);
        assert_eq!(bytes[1], FLAG_TEMP_HUMIDITY_VALID | FLAG_PRESSURE_VALID | FLAG_ADC_VALID);
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(&bytes[4..8], &[0xCD, 0xAB, 0x89, 0x67]); // timestamp LE
        assert_eq!(&bytes[8..12], &[7, 0, 0, 0]);
    }

    #[test]
    fn test_float_and_adc_layout() {
        let bytes = sample_record().encode();

        assert_eq!(&bytes[12..16], &11.0f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &55.0f32.to_le_bytes());
        assert_eq!(&bytes[20..24], &66.0f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &22.0f32.to_le_bytes());
        assert_eq!(&bytes[32..34], &[1, 0]);
        assert_eq!(&bytes[38..40], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_decode_restores_record() {
        let record = sample_record();
        assert_eq!(TelemetryRecord::decode(&record.encode()).unwrap(), record);
    }

    #[test]
    fn test_default_record_is_zeroed_except_version() {
        let bytes = TelemetryRecord::default().encode();
        assert_eq!(bytes[0], RECORD_FORMAT_VERSION);
        assert!(bytes[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_wrong_length() {
        let bytes = sample_record().encode();
        assert!(TelemetryRecord::decode(&bytes[..RECORD_SIZE - 1]).is_err());

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(TelemetryRecord::decode(&long).is_err());
    }

    #[test]
    fn test_decode_unknown_version() {
        let mut bytes = sample_record().encode();
        bytes[0] = 2;
        match TelemetryRecord::decode(&bytes) {
            Err(TelemError::Record(msg)) => assert!(msg.contains("version")),
            other => panic!("Expected Record error, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_flags() {
        let mut bytes = sample_record().encode();
        bytes[1] |= 0x80;
        assert!(TelemetryRecord::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_reserved_set() {
        let mut bytes = sample_record().encode();
        bytes[3] = 1;
        assert!(TelemetryRecord::decode(&bytes).is_err());
    }
}
