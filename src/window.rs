//! Tumbling event-time windows.
//!
//! Times are whole seconds since the epoch. A window of length `L` covers the half-open interval
//! `[start, start + L)` with `start` a multiple of `L`, so every timestamp belongs to exactly one
//! window of a given length.

/// One hour, in seconds.
pub const HOUR: u64 = 3_600;
/// One day, in seconds.
pub const DAY: u64 = 24 * HOUR;
/// One week, in seconds.
pub const WEEK: u64 = 7 * DAY;
/// Thirty days, in seconds.
pub const MONTH: u64 = 30 * DAY;

/// A half-open, epoch-aligned time interval `[start, end)`.
#[derive(Abomonation, Clone, Copy, Debug, Hash, Ord, PartialOrd, Eq, PartialEq)]
pub struct Window {
    /// First second covered by the window.
    pub start: u64,
    /// First second after the window.
    pub end: u64,
}

impl Window {
    /// The window of length `length` containing `time`.
    ///
    /// Panics if `length` is zero.
    #[inline]
    pub fn of(time: u64, length: u64) -> Self {
        assert!(length > 0, "window length must be positive");
        let start = (time / length) * length;
        Window { start, end: start.saturating_add(length) }
    }

    /// The length of the window in seconds.
    pub fn length(&self) -> u64 {
        self.end - self.start
    }

    /// The largest timestamp inside the window.
    ///
    /// Results for the window travel through the dataflow at this time, so that a following
    /// tumbling window of the same or a coarser length places them into the containing window.
    #[inline]
    pub fn max_timestamp(&self) -> u64 {
        self.end - 1
    }

    /// Tests whether `time` falls inside the window.
    pub fn contains(&self, time: u64) -> bool {
        self.start <= time && time < self.end
    }

    /// Tests whether a watermark at `watermark` has closed the window.
    #[inline]
    pub fn is_closed_by(&self, watermark: u64) -> bool {
        self.end <= watermark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_to_epoch() {
        let window = Window::of(HOUR + 10 * 60, HOUR);
        assert_eq!(window, Window { start: HOUR, end: 2 * HOUR });
        assert_eq!(window.max_timestamp(), 2 * HOUR - 1);
        assert_eq!(window.length(), HOUR);
    }

    #[test]
    fn boundaries_are_half_open() {
        let window = Window::of(0, HOUR);
        assert!(window.contains(0));
        assert!(window.contains(HOUR - 1));
        assert!(!window.contains(HOUR));
        assert_eq!(Window::of(HOUR, HOUR).start, HOUR);
    }

    #[test]
    fn coarser_window_contains_finer() {
        let day = Window::of(3 * DAY + 5, DAY);
        let week = Window::of(day.max_timestamp(), WEEK);
        assert!(week.contains(day.start));
        assert!(week.contains(day.max_timestamp()));
    }

    #[test]
    fn closes_once_watermark_reaches_end() {
        let window = Window::of(10, HOUR);
        assert!(!window.is_closed_by(HOUR - 1));
        assert!(window.is_closed_by(HOUR));
    }
}
