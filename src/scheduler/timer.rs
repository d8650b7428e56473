//! Elapsed-seconds periodic timer

/// Fires once a period has elapsed since it last fired
///
/// A period of zero disables the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicTimer {
    period_s: u64,
    last_fired: Option<i64>,
}

impl PeriodicTimer {
    /// Timer that fires on its first poll
    pub fn new(period_s: u64) -> Self {
        Self {
            period_s,
            last_fired: None,
        }
    }

    /// Timer whose first period starts at `start`
    pub fn starting_at(period_s: u64, start: i64) -> Self {
        Self {
            period_s,
            last_fired: Some(start),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.period_s > 0
    }

    pub fn period_s(&self) -> u64 {
        self.period_s
    }

    pub fn last_fired(&self) -> Option<i64> {
        self.last_fired
    }

    /// Check the timer at `now` (Unix seconds), re-arming it if it fires
    pub fn poll(&mut self, now: i64) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let due = match self.last_fired {
            None => true,
            Some(last) if now < last => {
                // Clock stepped backwards; restart the period from here
                self.last_fired = Some(now);
                false
            }
            Some(last) => (now - last) as u64 >= self.period_s,
        };

        if due {
            self.last_fired = Some(now);
        }
        due
    }
}
