//! # Scheduler Module
//!
//! The sampling and persistence control loop.
//!
//! Each tick the scheduler checks two independent timers:
//!
//! 1. **Sampling** - read the sensors, keep the record, forward it to the
//!    radio link as live telemetry
//! 2. **Persistence** - append the record currently held (possibly stale) to
//!    the WOD file, then roll the file if it is over budget
//!
//! Sampling always runs before persistence within one tick. Link failures
//! are only counted; failed WOD appends are charged to the [`ErrorBudget`],
//! and exceeding it stops the loop.

pub mod budget;
pub mod clock;
pub mod timer;

pub use budget::ErrorBudget;
pub use clock::{Clock, ManualClock, SystemClock};
pub use timer::PeriodicTimer;

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::agw::protocol::AgwFrame;
use crate::config::Config;
use crate::error::Result;
use crate::link::{FrameAddressing, TransportSink};
use crate::telemetry::{SensorSource, TelemetryRecord};
use crate::wod::WodStore;

/// Running counters, logged when the loop stops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub samples_taken: u64,
    pub frames_sent: u64,
    pub transport_failures: u64,
    pub appends_attempted: u64,
    pub appends_ok: u64,
    pub file_io_errors: u64,
    pub files_rolled: u64,
}

/// What a persistence action did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The whole record was written
    Appended {
        file_size: u64,
        rolled_to: Option<PathBuf>,
    },
    /// Open failure, write error or short write
    Failed,
}

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sampled: bool,
    pub beacon_sent: bool,
    pub persisted: Option<PersistOutcome>,
}

/// Why [`Scheduler::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested
    Shutdown,
    /// Too many WOD file I/O errors
    ErrorBudgetExhausted,
}

/// Telemetry scheduler
///
/// Owns the held record, both timers and the WOD store; the sensor source
/// and transport sink are injected.
pub struct Scheduler<S, T> {
    source: S,
    sink: T,
    store: WodStore,
    addressing: FrameAddressing,
    sample_timer: PeriodicTimer,
    persist_timer: PeriodicTimer,
    beacon_timer: PeriodicTimer,
    budget: ErrorBudget,
    record: TelemetryRecord,
    stats: SchedulerStats,
}

impl<S: SensorSource, T: TransportSink> Scheduler<S, T> {
    /// Create a scheduler whose persistence period starts at `start`
    ///
    /// Sampling fires on the first tick. The periodic time beacon, if
    /// enabled, starts counting at `start` (the start-up beacon is sent
    /// separately with [`Scheduler::send_time`]).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pacsat_telem::config::Config;
    /// use pacsat_telem::link::NullLink;
    /// use pacsat_telem::scheduler::{Clock, Scheduler, SystemClock};
    /// use pacsat_telem::telemetry::StaticSensorSource;
    ///
    /// # async fn demo() -> pacsat_telem::error::Result<()> {
    /// let config = Config::default();
    /// let clock = SystemClock;
    /// let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), NullLink::new(), clock.now());
    /// scheduler.tick(clock.now()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: &Config, source: S, sink: T, start: i64) -> Self {
        Self {
            source,
            sink,
            store: WodStore::from_config(&config.wod),
            addressing: FrameAddressing::from_config(&config.link),
            sample_timer: PeriodicTimer::new(config.scheduler.sample_period_s),
            persist_timer: PeriodicTimer::starting_at(config.scheduler.persist_period_s, start),
            beacon_timer: PeriodicTimer::starting_at(config.scheduler.time_beacon_period_s, start),
            budget: ErrorBudget::new(config.wod.max_file_io_errors),
            record: TelemetryRecord::default(),
            stats: SchedulerStats::default(),
        }
    }

    /// Replace the WOD store built from the configuration
    pub fn with_store(mut self, store: WodStore) -> Self {
        self.store = store;
        self
    }

    /// Run one scheduling step at `now` (Unix seconds)
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TelemError::ErrorBudgetExhausted`] when the
    /// WOD error budget is gone. Nothing is sampled or appended on a tick
    /// that starts with an exhausted budget.
    pub async fn tick(&mut self, now: i64) -> Result<TickReport> {
        self.budget.check()?;

        let mut report = TickReport::default();

        if self.sample_timer.poll(now) {
            self.sample(now).await;
            report.sampled = true;
        }

        if self.beacon_timer.poll(now) {
            report.beacon_sent = self.send_time(now).await;
        }

        if self.persist_timer.poll(now) {
            report.persisted = Some(self.persist());
            self.budget.check()?;
        }

        Ok(report)
    }

    /// Tick until shutdown is requested or the error budget runs out
    ///
    /// # Arguments
    ///
    /// * `clock` - Time source read once per tick
    /// * `shutdown` - Loop stops once this holds `true` (or its sender is gone)
    /// * `idle` - Sleep between ticks
    pub async fn run<C: Clock>(
        &mut self,
        clock: &C,
        mut shutdown: watch::Receiver<bool>,
        idle: Duration,
    ) -> StopReason {
        info!(
            "Scheduler running: sample every {}s, WOD every {}s to {}",
            self.sample_timer.period_s(),
            self.persist_timer.period_s(),
            self.store.path().display()
        );

        loop {
            if *shutdown.borrow() {
                return StopReason::Shutdown;
            }

            // tick only fails once the error budget is exhausted
            if let Err(e) = self.tick(clock.now()).await {
                error!("ERROR: {}. Exiting", e);
                return StopReason::ErrorBudgetExhausted;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return StopReason::Shutdown;
                    }
                }
                _ = tokio::time::sleep(idle) => {}
            }
        }
    }

    /// Send a time beacon, returning whether the link accepted it
    pub async fn send_time(&mut self, now: i64) -> bool {
        let frame = self.addressing.time_frame(now);
        self.forward(frame).await
    }

    async fn sample(&mut self, now: i64) {
        let timestamp = now.clamp(0, u32::MAX as i64) as u32;
        self.record = self.source.sample(timestamp);
        self.stats.samples_taken += 1;

        debug!("Sending sensor telemetry: {}", self.record.timestamp);
        let frame = self.addressing.telemetry_frame(&self.record);
        self.forward(frame).await;
    }

    async fn forward(&mut self, frame: Result<AgwFrame>) -> bool {
        let sent = match frame {
            Ok(frame) => self.sink.send(&frame).await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                self.stats.frames_sent += 1;
                true
            }
            Err(e) => {
                self.stats.transport_failures += 1;
                debug!("Failed to send frame: {}", e);
                false
            }
        }
    }

    fn persist(&mut self) -> PersistOutcome {
        let bytes = self.record.encode();
        self.stats.appends_attempted += 1;

        let outcome = match self.store.append(&bytes) {
            Ok(outcome) if outcome.is_complete(bytes.len()) => outcome,
            Ok(outcome) => {
                debug!(
                    "ERROR, short write to {}: {} of {} bytes",
                    self.store.path().display(),
                    outcome.bytes_written,
                    bytes.len()
                );
                return self.append_failed();
            }
            Err(e) => {
                debug!("ERROR, could not save data to {}: {}", self.store.path().display(), e);
                return self.append_failed();
            }
        };

        self.stats.appends_ok += 1;
        debug!(
            "Wrote WOD file: {} at {}",
            self.store.path().display(),
            self.record.timestamp
        );

        let rolled_to = match self.store.roll_if_oversized() {
            Ok(rolled) => rolled,
            Err(e) => {
                warn!("Could not roll WOD file {}: {}", self.store.path().display(), e);
                None
            }
        };
        if rolled_to.is_some() {
            self.stats.files_rolled += 1;
        }

        PersistOutcome::Appended {
            file_size: outcome.file_size,
            rolled_to,
        }
    }

    fn append_failed(&mut self) -> PersistOutcome {
        self.budget.record_failure();
        self.stats.file_io_errors += 1;
        PersistOutcome::Failed
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn budget(&self) -> &ErrorBudget {
        &self.budget
    }

    /// Most recently sampled record
    pub fn record(&self) -> &TelemetryRecord {
        &self.record
    }

    pub fn store(&self) -> &WodStore {
        &self.store
    }

    pub fn sink(&self) -> &T {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mocks::RecordingSink;
    use crate::telemetry::source::MockSensorSource;
    use crate::telemetry::{StaticSensorSource, RECORD_SIZE};
    use crate::wod::file::mocks::MockWodOpener;
    use crate::wod::WodReader;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, sample: u64, persist: u64, max_kb: f64) -> Config {
        let mut config = Config::default();
        config.scheduler.sample_period_s = sample;
        config.scheduler.persist_period_s = persist;
        config.wod.data_dir = dir.path().to_string_lossy().into_owned();
        config.wod.max_file_size_kb = max_kb;
        config
    }

    fn stamping_source(expected_samples: usize) -> MockSensorSource {
        let mut source = MockSensorSource::new();
        source
            .expect_sample()
            .times(expected_samples)
            .returning(|now| TelemetryRecord {
                timestamp: now,
                ..TelemetryRecord::default()
            });
        source
    }

    async fn run_ticks<S: SensorSource, T: TransportSink>(
        scheduler: &mut Scheduler<S, T>,
        ticks: std::ops::RangeInclusive<i64>,
    ) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for now in ticks {
            reports.push(scheduler.tick(now).await.unwrap());
        }
        reports
    }

    #[tokio::test]
    async fn test_ten_minutes_of_reference_cadence() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 10, 60, 10.0);
        let sink = RecordingSink::new();
        let mut scheduler = Scheduler::new(&config, stamping_source(60), sink.clone(), 0);

        let reports = run_ticks(&mut scheduler, 1..=600).await;

        assert_eq!(reports.iter().filter(|r| r.sampled).count(), 60);
        assert_eq!(reports.iter().filter(|r| r.persisted.is_some()).count(), 10);
        assert_eq!(fs::metadata(scheduler.store().path()).unwrap().len(), 400);
        assert_eq!(scheduler.stats().files_rolled, 0);
        assert_eq!(sink.sent().len(), 60);
        assert!(sink.sent().iter().all(|f| f.call_to == "TLMP1" && f.data.len() == RECORD_SIZE));
    }

    #[tokio::test]
    async fn test_append_count_independent_of_sampling() {
        for sample_period in [0, 1, 7, 60, 1000] {
            let dir = TempDir::new().unwrap();
            let config = config_in(&dir, sample_period, 30, 10.0);
            let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0);

            run_ticks(&mut scheduler, 1..=300).await;

            assert_eq!(scheduler.stats().appends_attempted, 10, "sample period {}", sample_period);
        }
    }

    #[tokio::test]
    async fn test_sampling_precedes_persistence_in_tick() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 1, 5, 10.0);
        let mut scheduler = Scheduler::new(&config, stamping_source(5), RecordingSink::new(), 0);

        let reports = run_ticks(&mut scheduler, 1..=5).await;
        assert!(reports[4].sampled && reports[4].persisted.is_some());

        let records: Vec<_> = WodReader::open(scheduler.store().path())
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 5);
    }

    #[tokio::test]
    async fn test_persistence_writes_stale_record() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 100, 10, 10.0);
        let mut scheduler = Scheduler::new(&config, stamping_source(1), RecordingSink::new(), 0);

        run_ticks(&mut scheduler, 1..=30).await;

        let timestamps: Vec<u32> = WodReader::open(scheduler.store().path())
            .unwrap()
            .map(|r| r.unwrap().timestamp)
            .collect();
        assert_eq!(timestamps, vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_disabled_sampling_persists_default_record() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 0, 10, 10.0);
        let mut scheduler = Scheduler::new(&config, stamping_source(0), RecordingSink::new(), 0);

        run_ticks(&mut scheduler, 1..=20).await;

        let records: Vec<_> = WodReader::open(scheduler.store().path()).unwrap().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap(), &TelemetryRecord::default());
    }

    #[tokio::test]
    async fn test_disabled_persistence_never_appends() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 10, 0, 10.0);
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0);

        run_ticks(&mut scheduler, 1..=600).await;

        assert_eq!(scheduler.stats().appends_attempted, 0);
        assert!(!scheduler.store().path().exists());
    }

    #[tokio::test]
    async fn test_rolls_after_first_append_with_tiny_budget() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 10, 60, 0.001);
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0);

        let reports = run_ticks(&mut scheduler, 1..=60).await;

        match &reports[59].persisted {
            Some(PersistOutcome::Appended { file_size, rolled_to: Some(rolled) }) => {
                assert_eq!(*file_size, RECORD_SIZE as u64);
                assert_eq!(fs::metadata(rolled).unwrap().len(), RECORD_SIZE as u64);
            }
            other => panic!("Expected an appended and rolled file, got: {:?}", other),
        }
        assert!(!scheduler.store().path().exists());
        assert_eq!(scheduler.stats().files_rolled, 1);
    }

    #[tokio::test]
    async fn test_error_budget_stops_before_extra_append() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, 1, 1, 10.0);
        config.wod.data_dir = dir.path().join("missing").to_string_lossy().into_owned();
        config.wod.max_file_io_errors = 3;
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0);

        for now in 1..=3 {
            let report = scheduler.tick(now).await.unwrap();
            assert_eq!(report.persisted, Some(PersistOutcome::Failed));
        }

        // Fourth failure crosses the budget
        assert!(scheduler.tick(4).await.is_err());
        assert_eq!(scheduler.stats().appends_attempted, 4);

        // No fifth attempt
        assert!(scheduler.tick(5).await.is_err());
        assert_eq!(scheduler.stats().appends_attempted, 4);
        assert_eq!(scheduler.budget().errors(), 4);
    }

    #[tokio::test]
    async fn test_error_count_is_not_reset_by_success() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let mut config = config_in(&dir, 1, 1, 10.0);
        config.wod.data_dir = data_dir.to_string_lossy().into_owned();
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0);

        scheduler.tick(1).await.unwrap();
        scheduler.tick(2).await.unwrap();
        fs::create_dir(&data_dir).unwrap();
        scheduler.tick(3).await.unwrap();

        assert_eq!(scheduler.stats().appends_ok, 1);
        assert_eq!(scheduler.budget().errors(), 2);
    }

    #[tokio::test]
    async fn test_short_write_is_charged_and_file_reopened() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 10, 60, 10.0);
        let opener = MockWodOpener::new();
        let store = WodStore::from_config(&config.wod).with_opener(opener.clone());
        let mut scheduler =
            Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0).with_store(store);

        opener.limit_next_write(RECORD_SIZE / 2);
        let report = scheduler.tick(60).await.unwrap();
        assert_eq!(report.persisted, Some(PersistOutcome::Failed));
        assert_eq!(scheduler.budget().errors(), 1);
        assert_eq!(scheduler.stats().file_io_errors, 1);
        assert_eq!(opener.open_count(), 1);

        let report = scheduler.tick(120).await.unwrap();
        assert_eq!(
            report.persisted,
            Some(PersistOutcome::Appended {
                file_size: (RECORD_SIZE + RECORD_SIZE / 2) as u64,
                rolled_to: None,
            })
        );
        assert_eq!(opener.open_count(), 2);
        assert_eq!(scheduler.budget().errors(), 1);
        assert_eq!(scheduler.stats().appends_ok, 1);
    }

    #[tokio::test]
    async fn test_failed_roll_is_not_charged() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 10, 60, 0.001);
        // A plain file where the queue directory should be
        fs::write(config.wod.completed_path(), b"").unwrap();
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0);

        let report = scheduler.tick(60).await.unwrap();
        assert_eq!(
            report.persisted,
            Some(PersistOutcome::Appended {
                file_size: RECORD_SIZE as u64,
                rolled_to: None,
            })
        );
        assert!(scheduler.store().path().exists());
        assert_eq!(scheduler.stats().files_rolled, 0);
        assert_eq!(scheduler.budget().errors(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_touch_budget() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 10, 60, 10.0);
        let sink = RecordingSink::new();
        sink.set_failing(true);
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), sink, 0);

        run_ticks(&mut scheduler, 1..=600).await;

        assert_eq!(scheduler.stats().transport_failures, 60);
        assert_eq!(scheduler.stats().frames_sent, 0);
        assert_eq!(scheduler.stats().appends_ok, 10);
        assert_eq!(scheduler.budget().errors(), 0);
    }

    #[tokio::test]
    async fn test_time_beacon() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, 0, 0, 10.0);
        config.scheduler.time_beacon_period_s = 30;
        let sink = RecordingSink::new();
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), sink.clone(), 0);

        assert!(scheduler.send_time(0).await);
        run_ticks(&mut scheduler, 1..=90).await;

        let frames = sink.sent();
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.call_to == "TIME-1"));
        assert_eq!(frames[3].data, 90u32.to_le_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, 10, 60, 10.0);
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0);
        let clock = ManualClock::new(1);

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let reason = scheduler.run(&clock, rx, Duration::from_millis(1)).await;
        assert_eq!(reason, StopReason::Shutdown);
    }

    #[tokio::test]
    async fn test_run_stops_on_error_budget() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, 1, 1, 10.0);
        config.wod.data_dir = dir.path().join("missing").to_string_lossy().into_owned();
        config.wod.max_file_io_errors = 0;
        let mut scheduler = Scheduler::new(&config, StaticSensorSource::new(), RecordingSink::new(), 0);
        let clock = ManualClock::new(5);

        let (_tx, rx) = watch::channel(false);
        let reason = scheduler.run(&clock, rx, Duration::from_millis(1)).await;

        assert_eq!(reason, StopReason::ErrorBudgetExhausted);
        assert_eq!(scheduler.stats().appends_attempted, 1);
    }
}
