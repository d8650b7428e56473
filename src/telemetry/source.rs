//! Sensor source abstraction

use super::record::TelemetryRecord;

/// Producer of one telemetry record per sampling tick
///
/// Implementations talk to the actual sensors. They do not fail: a sensor
/// that cannot be read reports its field as invalid instead.
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send {
    /// Read all sensors and stamp the result with `now` (Unix seconds)
    fn sample(&mut self, now: u32) -> TelemetryRecord;
}

/// Sensor source returning fixed readings
///
/// Stands in for the board sensors on hosts without them: temperature and
/// humidity from the SHTC3, pressure and temperature from the LPS22. The
/// board temperature and ADC channels are reported invalid.
#[derive(Debug, Default)]
pub struct StaticSensorSource {
    samples_taken: u32,
}

impl StaticSensorSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorSource for StaticSensorSource {
    fn sample(&mut self, now: u32) -> TelemetryRecord {
        let record = TelemetryRecord {
            timestamp: now,
            sequence: self.samples_taken,
            shtc3_temp: 11.0,
            shtc3_humidity: 55.0,
            temp_humidity_valid: true,
            lps22_pressure: 66.0,
            lps22_temp: 22.0,
            pressure_valid: true,
            ..TelemetryRecord::default()
        };
        self.samples_taken = self.samples_taken.wrapping_add(1);
        record
    }
}
