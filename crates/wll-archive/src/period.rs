//! Archive period boundary tracking

use crate::{ArchiveError, ArchiveResult};
use tracing::warn;
use wll_core::Timestamp;

/// Detects when record timestamps cross into the next archive period
#[derive(Debug, Clone)]
pub struct ArchivePeriod {
    interval: i64,
    current_end: Option<Timestamp>,
}

impl ArchivePeriod {
    /// Create a tracker for an archive interval in seconds
    pub fn new(interval: i64) -> ArchiveResult<Self> {
        if interval <= 0 {
            return Err(ArchiveError::InvalidInterval(format!(
                "archive interval must be positive, got {interval}"
            )));
        }
        Ok(Self {
            interval,
            current_end: None,
        })
    }

    /// Observe a record timestamp
    ///
    /// Returns `Some(end)` when the timestamp lies past the end of the
    /// period in progress, i.e. that period is complete. A timestamp on a
    /// boundary belongs to the period it ends. Timestamps whose period end
    /// cannot be represented are ignored.
    pub fn observe(&mut self, timestamp: Timestamp) -> Option<Timestamp> {
        let Some(next_end) = self.interval_end(timestamp) else {
            warn!("Ignoring record timestamp {} outside any archive period", timestamp);
            return None;
        };

        match self.current_end {
            None => {
                self.current_end = Some(next_end);
                None
            }
            Some(end) if timestamp <= end => None,
            Some(end) => {
                self.current_end = Some(next_end);
                Some(end)
            }
        }
    }

    /// Forget the period in progress, e.g. after a restart
    pub fn reset(&mut self) {
        self.current_end = None;
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    pub fn current_end(&self) -> Option<Timestamp> {
        self.current_end
    }

    /// First boundary at or after `timestamp`
    fn interval_end(&self, timestamp: Timestamp) -> Option<Timestamp> {
        let periods = timestamp.div_euclid(self.interval);
        let periods = if timestamp.rem_euclid(self.interval) == 0 {
            periods
        } else {
            periods.checked_add(1)?
        };
        periods.checked_mul(self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_interval() {
        assert!(ArchivePeriod::new(0).is_err());
        assert!(ArchivePeriod::new(-300).is_err());
    }

    #[test]
    fn test_period_boundary() {
        let mut period = ArchivePeriod::new(300).unwrap();

        assert_eq!(period.observe(100), None);
        assert_eq!(period.current_end(), Some(300));
        assert_eq!(period.observe(300), None);

        // crosses into 300..600
        assert_eq!(period.observe(301), Some(300));
        assert_eq!(period.current_end(), Some(600));

        // a gap of several periods reports only the one in progress
        assert_eq!(period.observe(1250), Some(600));
        assert_eq!(period.current_end(), Some(1500));
    }

    #[test]
    fn test_interval_end() {
        let period = ArchivePeriod::new(300).unwrap();

        assert_eq!(period.interval_end(0), Some(0));
        assert_eq!(period.interval_end(100), Some(300));
        assert_eq!(period.interval_end(300), Some(300));
        assert_eq!(period.interval_end(301), Some(600));
        assert_eq!(period.interval_end(-100), Some(0));
        assert_eq!(period.interval_end(i64::MAX - 5), None);
    }

    #[test]
    fn test_first_timestamp_on_boundary() {
        let mut period = ArchivePeriod::new(300).unwrap();

        assert_eq!(period.observe(300), None);
        assert_eq!(period.current_end(), Some(300));
        assert_eq!(period.observe(450), Some(300));
        assert_eq!(period.current_end(), Some(600));
        assert_eq!(period.observe(600), None);
        assert_eq!(period.observe(601), Some(600));
    }

    #[test]
    fn test_unrepresentable_timestamp_is_ignored() {
        let mut period = ArchivePeriod::new(300).unwrap();

        assert_eq!(period.observe(i64::MAX - 5), None);
        assert_eq!(period.current_end(), None);

        assert_eq!(period.observe(100), None);
        assert_eq!(period.observe(i64::MAX), None);
        assert_eq!(period.current_end(), Some(300));
        assert_eq!(period.observe(301), Some(300));
    }

    #[test]
    fn test_reset() {
        let mut period = ArchivePeriod::new(60).unwrap();
        period.observe(10);
        period.reset();
        assert_eq!(period.current_end(), None);
        assert_eq!(period.observe(200), None);
    }
}
