//! Event-time progress tracking.

/// Derives a monotonically non-decreasing event time from observed timestamps.
///
/// The tracker assumes near-ascending arrival: the watermark is the largest timestamp observed so
/// far and never regresses. Out-of-order records simply do not move it; whether they still count
/// is decided by whoever consumes the watermark (see [`LatePolicy`]).
///
/// [`LatePolicy`]: ../aggregator/enum.LatePolicy.html
///
/// # Examples
/// ```
/// use rollup::watermark::WatermarkTracker;
///
/// let mut tracker = WatermarkTracker::new();
/// assert!(tracker.observe(600));
/// assert!(!tracker.observe(300));
/// assert_eq!(tracker.current(), Some(600));
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WatermarkTracker {
    current: Option<u64>,
}

impl WatermarkTracker {
    /// A tracker that has not observed any time yet.
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Observes the event time of an arriving record.
    ///
    /// Returns `true` if the watermark advanced.
    #[inline]
    pub fn observe(&mut self, time: u64) -> bool {
        match self.current {
            Some(current) if current >= time => false,
            _ => {
                self.current = Some(time);
                true
            }
        }
    }

    /// The current watermark, if any time has been observed.
    #[inline]
    pub fn current(&self) -> Option<u64> {
        self.current
    }

    /// Tests whether a record at `time` trails the watermark.
    pub fn is_behind(&self, time: u64) -> bool {
        self.current.map_or(false, |current| time < current)
    }
}

#[cfg(test)]
mod tests {
    use super::WatermarkTracker;

    #[test]
    fn never_regresses() {
        let mut tracker = WatermarkTracker::new();
        assert_eq!(tracker.current(), None);
        for &(time, advanced) in &[(10, true), (5, false), (10, false), (11, true), (0, false)] {
            assert_eq!(tracker.observe(time), advanced, "observing {}", time);
        }
        assert_eq!(tracker.current(), Some(11));
        assert!(tracker.is_behind(10));
        assert!(!tracker.is_behind(11));
    }

    #[test]
    fn first_observation_advances_from_zero() {
        let mut tracker = WatermarkTracker::new();
        assert!(tracker.observe(0));
        assert_eq!(tracker.current(), Some(0));
    }
}
