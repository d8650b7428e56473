//! WOD file I/O error budget

use crate::error::{Result, TelemError};

/// Count of failed WOD appends since start
///
/// The count only grows. Going over `max` means storage is broken and the
/// process has to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    errors: u32,
    max: u32,
}

impl ErrorBudget {
    pub fn new(max: u32) -> Self {
        Self { errors: 0, max }
    }

    /// Record one failure, returning the new count
    pub fn record_failure(&mut self) -> u32 {
        self.errors = self.errors.saturating_add(1);
        self.errors
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.errors > self.max
    }

    /// # Errors
    ///
    /// Returns [`TelemError::ErrorBudgetExhausted`] once the count exceeds `max`
    pub fn check(&self) -> Result<()> {
        if self.is_exhausted() {
            return Err(TelemError::ErrorBudgetExhausted {
                errors: self.errors,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_only_past_max() {
        let mut budget = ErrorBudget::new(5);
        for _ in 0..5 {
            budget.record_failure();
            assert!(budget.check().is_ok());
        }
        assert_eq!(budget.record_failure(), 6);
        assert!(budget.is_exhausted());
        assert!(matches!(
            budget.check(),
            Err(TelemError::ErrorBudgetExhausted { errors: 6, max: 5 })
        ));
    }

    #[test]
    fn test_zero_max_fails_on_first_error() {
        let mut budget = ErrorBudget::new(0);
        assert!(budget.check().is_ok());
        budget.record_failure();
        assert!(budget.check().is_err());
    }
}
