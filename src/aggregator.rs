//! Keyed tumbling-window aggregation.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::str::FromStr;

use fnv::FnvHashMap as HashMap;
use tracing::{trace, warn};

use crate::combine::Combiner;
use crate::watermark::WatermarkTracker;
use crate::window::Window;

/// What to do with a record whose window has already closed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LatePolicy {
    /// Count the record and drop it, logging at `trace` level.
    Drop,
    /// Drop the record and log a warning for it.
    Warn,
}

impl Default for LatePolicy {
    fn default() -> Self {
        LatePolicy::Drop
    }
}

impl FromStr for LatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<LatePolicy, Self::Err> {
        match s {
            "drop" => Ok(LatePolicy::Drop),
            "warn" => Ok(LatePolicy::Warn),
            other => Err(format!("unknown late policy: {}", other)),
        }
    }
}

/// The outcome of offering a record to an aggregator.
#[must_use]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    /// The record was folded into its window.
    Accepted,
    /// The record's window had closed; it was dropped.
    Late,
}

/// The closed accumulator of one key in one window.
#[derive(Abomonation, Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq)]
pub struct Emission<K, A> {
    /// The partition key.
    pub key: K,
    /// The window the value summarizes.
    pub window: Window,
    /// The accumulated value.
    pub value: A,
}

/// Maintains one accumulator per `(key, window)` pair for windows of a fixed length.
///
/// Accumulators are created lazily with the combiner's identity on the first record of a pair and
/// are handed out exactly once, by [`on_watermark`], when the watermark reaches the window's end.
/// Records for windows that have already been handed out are rejected as late.
///
/// [`on_watermark`]: #method.on_watermark
///
/// # Examples
/// ```
/// use rollup::aggregator::{Admission, KeyedTumblingAggregator};
/// use rollup::combine::Counter;
/// use rollup::window::HOUR;
///
/// let mut counts = KeyedTumblingAggregator::new(HOUR, Counter);
/// assert_eq!(counts.accept("a", 600, ()), Admission::Accepted);
/// assert_eq!(counts.accept("a", 2_400, ()), Admission::Accepted);
///
/// let closed = counts.on_watermark(HOUR);
/// assert_eq!(closed.len(), 1);
/// assert_eq!((closed[0].window.end, closed[0].value), (HOUR, 2));
///
/// // The window is gone; a straggler for it is late.
/// assert_eq!(counts.accept("a", 3_000, ()), Admission::Late);
/// ```
pub struct KeyedTumblingAggregator<K, C: Combiner> {
    length: u64,
    combiner: C,
    policy: LatePolicy,
    watermark: WatermarkTracker,
    // window end -> key -> accumulator
    open: BTreeMap<u64, HashMap<K, C::Acc>>,
    late: u64,
}

impl<K, C> KeyedTumblingAggregator<K, C>
where
    K: Ord + Hash + Eq,
    C: Combiner,
{
    /// An aggregator over windows of `length` seconds, dropping late records.
    pub fn new(length: u64, combiner: C) -> Self {
        Self::with_policy(length, combiner, LatePolicy::default())
    }

    /// An aggregator over windows of `length` seconds with an explicit late-record policy.
    pub fn with_policy(length: u64, combiner: C, policy: LatePolicy) -> Self {
        assert!(length > 0, "window length must be positive");
        Self {
            length,
            combiner,
            policy,
            watermark: WatermarkTracker::new(),
            open: BTreeMap::new(),
            late: 0,
        }
    }

    /// The window length in seconds.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// The window a record at `time` belongs to.
    #[inline]
    pub fn window_of(&self, time: u64) -> Window {
        Window::of(time, self.length)
    }

    /// Folds a single observation at event time `time` into its `(key, window)` accumulator.
    pub fn accept(&mut self, key: K, time: u64, input: C::Input) -> Admission {
        let window = self.window_of(time);
        if self.is_closed(&window) {
            return self.reject_late(time);
        }
        let combiner = &self.combiner;
        let acc = self.open
            .entry(window.end)
            .or_insert_with(Default::default)
            .entry(key)
            .or_insert_with(|| combiner.identity());
        combiner.observe(acc, input);
        Admission::Accepted
    }

    /// Folds a pre-aggregated partial at event time `time` into its `(key, window)` accumulator.
    ///
    /// This is the entry point for cascading: the partial is typically the closed value of a finer
    /// window, offered at that window's maximal timestamp.
    pub fn accept_partial(&mut self, key: K, time: u64, partial: C::Acc) -> Admission {
        let window = self.window_of(time);
        if self.is_closed(&window) {
            return self.reject_late(time);
        }
        let combiner = &self.combiner;
        let acc = self.open
            .entry(window.end)
            .or_insert_with(Default::default)
            .entry(key)
            .or_insert_with(|| combiner.identity());
        combiner.merge(acc, partial);
        Admission::Accepted
    }

    /// Advances the watermark and closes every window with `end <= watermark`.
    ///
    /// Returns the closed accumulators ordered by window end, then key. A watermark behind the
    /// current one is ignored.
    pub fn on_watermark(&mut self, watermark: u64) -> Vec<Emission<K, C::Acc>> {
        self.watermark.observe(watermark);
        let watermark = match self.watermark.current() {
            Some(watermark) => watermark,
            None => return Vec::new(),
        };
        let closed = match watermark.checked_add(1) {
            Some(bound) => {
                let open = self.open.split_off(&bound);
                ::std::mem::replace(&mut self.open, open)
            }
            None => ::std::mem::replace(&mut self.open, BTreeMap::new()),
        };

        let mut emissions = Vec::new();
        for (end, accumulators) in closed {
            let window = Window { start: end - self.length, end };
            let mut keyed: Vec<_> = accumulators.into_iter().collect();
            keyed.sort_by(|x, y| x.0.cmp(&y.0));
            emissions.extend(keyed.into_iter().map(|(key, value)| Emission { key, window, value }));
        }
        emissions
    }

    /// The current watermark, if any.
    pub fn watermark(&self) -> Option<u64> {
        self.watermark.current()
    }

    /// Number of windows holding at least one accumulator.
    pub fn open_windows(&self) -> usize {
        self.open.len()
    }

    /// Number of live `(key, window)` accumulators.
    pub fn open_accumulators(&self) -> usize {
        self.open.values().map(|keys| keys.len()).sum()
    }

    /// Number of records rejected as late so far.
    pub fn late_records(&self) -> u64 {
        self.late
    }

    fn is_closed(&self, window: &Window) -> bool {
        self.watermark.current().map_or(false, |watermark| window.is_closed_by(watermark))
    }

    /// Records a record at `time` as late without offering it to any window.
    ///
    /// Hosts use this for records that arrive after their window can no longer be produced.
    pub fn reject_late(&mut self, time: u64) -> Admission {
        let window = self.window_of(time);
        self.late += 1;
        match self.policy {
            LatePolicy::Drop => trace!(time, window_end = window.end, "dropping late record"),
            LatePolicy::Warn => warn!(time, window_end = window.end, watermark = ?self.watermark.current(), "dropping late record"),
        }
        Admission::Late
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::{Counter, TopN};
    use crate::window::{DAY, HOUR};

    #[test]
    fn same_window_shares_accumulator() {
        let mut agg = KeyedTumblingAggregator::new(HOUR, Counter);
        for &time in &[10 * 60, 40 * 60, 65 * 60] {
            assert_eq!(agg.accept(0u32, time, ()), Admission::Accepted);
        }
        assert_eq!(agg.open_windows(), 2);
        assert_eq!(agg.open_accumulators(), 2);

        let closed = agg.on_watermark(2 * HOUR);
        let summary: Vec<_> = closed.iter().map(|e| (e.key, e.window.end, e.value)).collect();
        assert_eq!(summary, vec![(0, HOUR, 2), (0, 2 * HOUR, 1)]);
        assert_eq!(agg.open_windows(), 0);
    }

    #[test]
    fn emits_each_pair_once() {
        let mut agg = KeyedTumblingAggregator::new(HOUR, Counter);
        for _ in 0..5 {
            let _ = agg.accept("k", 100, ());
        }
        assert_eq!(agg.on_watermark(HOUR).len(), 1);
        assert!(agg.on_watermark(HOUR).is_empty());
        assert!(agg.on_watermark(10 * HOUR).is_empty());
    }

    #[test]
    fn window_stays_open_until_end() {
        let mut agg = KeyedTumblingAggregator::new(HOUR, Counter);
        let _ = agg.accept("k", 100, ());
        assert!(agg.on_watermark(HOUR - 1).is_empty());
        assert_eq!(agg.accept("k", HOUR - 1, ()), Admission::Accepted);
        let closed = agg.on_watermark(HOUR);
        assert_eq!(closed[0].value, 2);
    }

    #[test]
    fn late_records_do_not_touch_emitted_windows() {
        let mut agg = KeyedTumblingAggregator::with_policy(HOUR, Counter, LatePolicy::Warn);
        let _ = agg.accept("k", 100, ());
        let closed = agg.on_watermark(HOUR + 5);
        assert_eq!(closed[0].value, 1);

        assert_eq!(agg.accept("k", 200, ()), Admission::Late);
        assert_eq!(agg.accept_partial("k", 300, 10), Admission::Late);
        assert_eq!(agg.late_records(), 2);
        assert_eq!(agg.open_accumulators(), 0);
    }

    #[test]
    fn watermark_does_not_regress() {
        let mut agg = KeyedTumblingAggregator::new(HOUR, Counter);
        let _ = agg.on_watermark(2 * HOUR);
        let _ = agg.on_watermark(HOUR);
        assert_eq!(agg.watermark(), Some(2 * HOUR));
        assert_eq!(agg.accept("k", HOUR + 1, ()), Admission::Late);
    }

    #[test]
    fn partials_merge_into_coarser_window() {
        let mut agg = KeyedTumblingAggregator::new(DAY, Counter);
        let _ = agg.accept_partial(3u32, HOUR - 1, 4);
        let _ = agg.accept_partial(3u32, 2 * HOUR - 1, 6);
        let _ = agg.accept(3u32, 5 * HOUR, ());
        let closed = agg.on_watermark(DAY);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].value, 11);
        assert_eq!(closed[0].window, Window { start: 0, end: DAY });
    }

    #[test]
    fn closes_everything_at_maximal_watermark() {
        let mut agg = KeyedTumblingAggregator::new(HOUR, TopN::new(2));
        let _ = agg.accept((), 10, ("a", 1));
        let _ = agg.accept((), 5 * HOUR, ("b", 1));
        assert_eq!(agg.on_watermark(u64::max_value()).len(), 2);
    }

    #[test]
    fn emissions_are_ordered_by_window_then_key() {
        let mut agg = KeyedTumblingAggregator::new(HOUR, Counter);
        let _ = agg.accept(2u32, HOUR + 1, ());
        let _ = agg.accept(1u32, HOUR + 1, ());
        let _ = agg.accept(9u32, 1, ());
        let order: Vec<_> = agg.on_watermark(2 * HOUR).into_iter().map(|e| (e.window.end, e.key)).collect();
        assert_eq!(order, vec![(HOUR, 9), (2 * HOUR, 1), (2 * HOUR, 2)]);
    }

    #[test]
    fn parses_late_policy() {
        assert_eq!("drop".parse::<LatePolicy>(), Ok(LatePolicy::Drop));
        assert_eq!("warn".parse::<LatePolicy>(), Ok(LatePolicy::Warn));
        assert!("retry".parse::<LatePolicy>().is_err());
    }
}
