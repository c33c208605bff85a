//! Global collection of per-key window results.

use std::collections::BTreeMap;

use tracing::warn;

use crate::aggregator::Admission;
use crate::combine::Combiner;
use crate::watermark::WatermarkTracker;
use crate::window::Window;

/// Gathers everything emitted for a window into a single structure.
///
/// Per-key emissions (or partial collections of them) are buffered per window until the watermark
/// passes the window's end, at which point exactly one accumulator per window is released.
pub struct GlobalCollector<C: Combiner> {
    combiner: C,
    watermark: WatermarkTracker,
    // window end -> (window, accumulator)
    pending: BTreeMap<u64, (Window, C::Acc)>,
}

impl<C: Combiner> GlobalCollector<C> {
    /// A collector finishing windows with `combiner`.
    pub fn new(combiner: C) -> Self {
        GlobalCollector {
            combiner,
            watermark: WatermarkTracker::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Adds a single per-key result to `window`.
    pub fn observe(&mut self, window: Window, input: C::Input) -> Admission {
        if self.is_closed(&window) {
            return Self::reject(window);
        }
        let combiner = &self.combiner;
        let slot = self.pending
            .entry(window.end)
            .or_insert_with(|| (window, combiner.identity()));
        combiner.observe(&mut slot.1, input);
        Admission::Accepted
    }

    /// Adds a partial collection to `window`.
    pub fn merge(&mut self, window: Window, partial: C::Acc) -> Admission {
        if self.is_closed(&window) {
            return Self::reject(window);
        }
        let combiner = &self.combiner;
        let slot = self.pending
            .entry(window.end)
            .or_insert_with(|| (window, combiner.identity()));
        combiner.merge(&mut slot.1, partial);
        Admission::Accepted
    }

    /// Advances the watermark and releases the accumulators of closed windows, unfinished.
    ///
    /// Used where the collected value is itself a partial to be merged elsewhere.
    pub fn close_partials(&mut self, watermark: u64) -> Vec<(Window, C::Acc)> {
        self.watermark.observe(watermark);
        let watermark = match self.watermark.current() {
            Some(watermark) => watermark,
            None => return Vec::new(),
        };
        let closed = match watermark.checked_add(1) {
            Some(bound) => {
                let open = self.pending.split_off(&bound);
                ::std::mem::replace(&mut self.pending, open)
            }
            None => ::std::mem::replace(&mut self.pending, BTreeMap::new()),
        };
        closed.into_iter().map(|(_end, collected)| collected).collect()
    }

    /// Advances the watermark and finishes every closed window, ordered by window end.
    pub fn on_watermark(&mut self, watermark: u64) -> Vec<(Window, C::Output)> {
        let closed = self.close_partials(watermark);
        let combiner = &self.combiner;
        closed.into_iter().map(|(window, acc)| (window, combiner.finish(acc))).collect()
    }

    /// Number of windows awaiting closure.
    pub fn pending_windows(&self) -> usize {
        self.pending.len()
    }

    fn is_closed(&self, window: &Window) -> bool {
        self.watermark.current().map_or(false, |watermark| window.is_closed_by(watermark))
    }

    fn reject(window: Window) -> Admission {
        warn!(window_end = window.end, "dropping result for an already collected window");
        Admission::Late
    }
}
