//! Upload progress tracking
//!
//! One tracker per file: it reports the percentage floored to a 5% step each
//! time a new step is reached, so repeated callbacks within a step are silent.

const STEP_PERCENT: u8 = 5;

#[derive(Debug, Default)]
pub struct TransferProgress {
    last_reported: Option<u8>,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage to report for `sent` of `total` bytes, if it reached a new step
    pub fn update(&mut self, sent: u64, total: u64) -> Option<u8> {
        let percent = if total == 0 {
            100
        } else {
            (sent.min(total).saturating_mul(100) / total) as u8
        };
        let step = percent - percent % STEP_PERCENT;

        match self.last_reported {
            Some(last) if step <= last => None,
            _ => {
                self.last_reported = Some(step);
                Some(step)
            }
        }
    }

    /// Reports 100% if the transfer ended without reaching it
    pub fn complete(&mut self) -> Option<u8> {
        self.update(1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_each_five_percent_once() {
        let mut tracker = TransferProgress::new();
        let total = 1000;

        let reported: Vec<u8> = (0..=total)
            .step_by(10)
            .filter_map(|sent| tracker.update(sent, total))
            .collect();

        let expected: Vec<u8> = (0..=100).step_by(5).collect();
        assert_eq!(reported, expected);
    }

    #[test]
    fn test_large_jumps_report_floor_step() {
        let mut tracker = TransferProgress::new();
        assert_eq!(tracker.update(0, 100), Some(0));
        assert_eq!(tracker.update(37, 100), Some(35));
        assert_eq!(tracker.update(39, 100), None);
        assert_eq!(tracker.update(100, 100), Some(100));
        assert_eq!(tracker.complete(), None);
    }

    #[test]
    fn test_empty_file_reports_complete() {
        let mut tracker = TransferProgress::new();
        assert_eq!(tracker.update(0, 0), Some(100));
        assert_eq!(tracker.update(0, 0), None);
    }

    #[test]
    fn test_fresh_tracker_per_file_starts_at_zero() {
        let mut first = TransferProgress::new();
        first.update(100, 100);

        let mut second = TransferProgress::new();
        assert_eq!(second.update(0, 50), Some(0));
    }
}
