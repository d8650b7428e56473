//! WOD file reader
//!
//! Reads a working or completed WOD file back into records.

use std::fs;
use std::path::Path;

use crate::error::{Result, TelemError};
use crate::telemetry::record::{TelemetryRecord, RECORD_SIZE};

/// Iterator over the records of a WOD file
///
/// Yields one error and stops if the file ends in a partial record.
#[derive(Debug)]
pub struct WodReader {
    data: Vec<u8>,
    offset: usize,
}

impl WodReader {
    /// Read a whole WOD file into memory
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_bytes(fs::read(path)?))
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }

    /// Number of complete records in the file
    pub fn record_count(&self) -> usize {
        self.data.len() / RECORD_SIZE
    }
}

impl Iterator for WodReader {
    type Item = Result<TelemetryRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.len() - self.offset;
        if remaining == 0 {
            return None;
        }

        if remaining < RECORD_SIZE {
            let at = self.offset;
            self.offset = self.data.len();
            return Some(Err(TelemError::Record(format!(
                "Truncated record at byte {}: {} of {} bytes",
                at, remaining, RECORD_SIZE
            ))));
        }

        let chunk = &self.data[self.offset..self.offset + RECORD_SIZE];
        self.offset += RECORD_SIZE;
        Some(TelemetryRecord::decode(chunk))
    }
}
