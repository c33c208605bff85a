//! Windowed aggregation operators for timely dataflow.
//!
//! The operators host the state machines of this crate inside timely operators. Dataflow time is
//! the watermark: a window `[start, end)` closes once the input frontier has passed `end - 1`,
//! and everything it produces is sent at `end - 1`. A stage downstream with the same or a coarser
//! (multiple) window length therefore sees each closed window inside exactly one of its own.

use std::collections::BTreeMap;
use std::hash::Hash;

use timely::{Data, ExchangeData};
use timely::dataflow::{Stream, Scope};
use timely::dataflow::channels::pact::{Exchange, Pipeline};
use timely::dataflow::operators::{Capability, CapabilityRef, Map, Operator};
use timely::progress::frontier::MutableAntichain;
use tracing::debug;

use crate::aggregator::{Admission, Emission, KeyedTumblingAggregator, LatePolicy};
use crate::calculate_hash;
use crate::cascade::Cascade;
use crate::collector::GlobalCollector;
use crate::combine::Combiner;
use crate::window::Window;

/// Capabilities held on behalf of open windows, one per window end.
struct WindowCapabilities {
    held: BTreeMap<u64, Capability<u64>>,
}

impl WindowCapabilities {
    fn new() -> Self {
        WindowCapabilities { held: BTreeMap::new() }
    }

    /// Retains a capability at `window`'s maximal timestamp, unless one is held already.
    fn hold(&mut self, time: &CapabilityRef<u64>, window: &Window) {
        self.held
            .entry(window.end)
            .or_insert_with(|| time.delayed(&window.max_timestamp()));
    }

    /// The latest window end the frontier has passed, if any held window closed.
    fn closed_through(&self, frontier: &MutableAntichain<u64>) -> Option<u64> {
        self.held
            .keys()
            .take_while(|end| !frontier.less_equal(&(*end - 1)))
            .last()
            .cloned()
    }

    /// Removes and returns the capabilities of all windows ending at or before `end`.
    fn release(&mut self, end: u64) -> BTreeMap<u64, Capability<u64>> {
        let open = match end.checked_add(1) {
            Some(bound) => self.held.split_off(&bound),
            None => BTreeMap::new(),
        };
        ::std::mem::replace(&mut self.held, open)
    }
}

/// Tests whether a record sent at `time` can still contribute to `window`.
#[inline]
fn arrived_in_time(time: &CapabilityRef<u64>, window: &Window) -> bool {
    *time.time() <= window.max_timestamp()
}

/// Runs a keyed tumbling aggregator over `(key, event time, value)` records.
fn aggregate_windows<G, K, V, C, F>(
    stream: &Stream<G, (K, u64, V)>,
    name: &str,
    length: u64,
    combiner: C,
    policy: LatePolicy,
    fold: F,
) -> Stream<G, Emission<K, C::Acc>>
where
    G: Scope<Timestamp = u64>,
    K: ExchangeData + Ord + Hash,
    V: ExchangeData,
    C: Combiner,
    C::Acc: ExchangeData,
    F: Fn(&mut KeyedTumblingAggregator<K, C>, K, u64, V) -> Admission + 'static,
{
    let label = name.to_owned();
    let exchange = Exchange::new(|record: &(K, u64, V)| calculate_hash(&record.0));
    stream.unary_frontier(exchange, name, move |_capability, _info| {
        let mut aggregator = KeyedTumblingAggregator::with_policy(length, combiner, policy);
        let mut capabilities = WindowCapabilities::new();
        let mut buffer = Vec::new();

        move |input, output| {
            input.for_each(|time, data| {
                data.swap(&mut buffer);
                for (key, event_time, value) in buffer.drain(..) {
                    let window = aggregator.window_of(event_time);
                    if !arrived_in_time(&time, &window) {
                        let _ = aggregator.reject_late(event_time);
                        continue;
                    }
                    if fold(&mut aggregator, key, event_time, value) == Admission::Accepted {
                        capabilities.hold(&time, &window);
                    }
                }
            });

            if let Some(end) = capabilities.closed_through(input.frontier()) {
                let mut emissions = aggregator.on_watermark(end);
                for (end, capability) in capabilities.release(end) {
                    let count = emissions.iter().take_while(|e| e.window.end == end).count();
                    debug!(operator = %label, window_end = end, keys = count, "closing window");
                    output.session(&capability).give_iterator(emissions.drain(..count));
                }
            }
        }
    })
}

/// Windowed aggregation of raw records.
pub trait WindowedStream<G: Scope<Timestamp = u64>, D: Data> {
    /// Aggregates records per key into tumbling windows of `length` seconds.
    ///
    /// `logic` extracts the key, the event time and the single observation from each record.
    /// Records are exchanged by key, so each `(key, window)` accumulator lives on one worker.
    /// Every closed accumulator is emitted once, at the window's maximal timestamp.
    ///
    /// # Examples
    /// ```
    /// extern crate timely;
    /// extern crate rollup;
    ///
    /// use timely::dataflow::operators::{Capture, ToStream};
    /// use timely::dataflow::operators::capture::Extract;
    /// use rollup::aggregator::LatePolicy;
    /// use rollup::combine::Counter;
    /// use rollup::operator::WindowedStream;
    ///
    /// let captured = timely::example(|scope| {
    ///     vec![10u64, 20, 70].to_stream(scope)
    ///         .tumbling_aggregate("Count", 60, Counter, LatePolicy::Drop, |time| ((), time, ()))
    ///         .capture()
    /// });
    /// let counts: Vec<_> = captured.extract().into_iter()
    ///     .flat_map(|(_time, emissions)| emissions)
    ///     .map(|emission| (emission.window.end, emission.value))
    ///     .collect();
    /// assert_eq!(counts, vec![(60, 2), (120, 1)]);
    /// ```
    fn tumbling_aggregate<K, C, L>(&self, name: &str, length: u64, combiner: C, policy: LatePolicy, logic: L) -> Stream<G, Emission<K, C::Acc>>
    where
        K: ExchangeData + Ord + Hash,
        C: Combiner,
        C::Input: ExchangeData,
        C::Acc: ExchangeData,
        L: Fn(D) -> (K, u64, C::Input) + 'static;
}

impl<G: Scope<Timestamp = u64>, D: Data> WindowedStream<G, D> for Stream<G, D> {
    fn tumbling_aggregate<K, C, L>(&self, name: &str, length: u64, combiner: C, policy: LatePolicy, logic: L) -> Stream<G, Emission<K, C::Acc>>
    where
        K: ExchangeData + Ord + Hash,
        C: Combiner,
        C::Input: ExchangeData,
        C::Acc: ExchangeData,
        L: Fn(D) -> (K, u64, C::Input) + 'static,
    {
        let keyed = self.map(logic);
        aggregate_windows(&keyed, name, length, combiner, policy, |aggregator, key, time, input| {
            aggregator.accept(key, time, input)
        })
    }
}

/// Operators on the closed output of a keyed window aggregation.
pub trait EmissionStream<G: Scope<Timestamp = u64>, K: ExchangeData, A: ExchangeData> {
    /// Rolls closed windows up into tumbling windows of `length` seconds, keeping their key.
    ///
    /// The finer windows must tile the coarser ones: `length` has to be a multiple of the
    /// upstream window length. Partials are merged, raw records are never revisited.
    fn rollup<C>(&self, name: &str, length: u64, combiner: C, policy: LatePolicy) -> Stream<G, Emission<K, A>>
    where
        C: Combiner<Acc = A>;

    /// Collects all per-key emissions of each window into a single result.
    ///
    /// Collection happens in two stages: every worker first folds its own emissions into one
    /// partial per window, then the partials of a window are exchanged to a single worker, merged
    /// and finished. Exactly one `(window, result)` pair leaves per window that saw any emission.
    fn collect_windows<C, F>(&self, name: &str, combiner: C, logic: F) -> Stream<G, (Window, C::Output)>
    where
        C: Combiner,
        C::Acc: ExchangeData,
        C::Output: Data,
        F: Fn(Emission<K, A>) -> C::Input + 'static;
}

impl<G, K, A> EmissionStream<G, K, A> for Stream<G, Emission<K, A>>
where
    G: Scope<Timestamp = u64>,
    K: ExchangeData + Ord + Hash,
    A: ExchangeData,
{
    fn rollup<C>(&self, name: &str, length: u64, combiner: C, policy: LatePolicy) -> Stream<G, Emission<K, A>>
    where
        C: Combiner<Acc = A>,
    {
        let partials = self.map(|emission| (emission.key, emission.window.max_timestamp(), emission.value));
        aggregate_windows(&partials, name, length, combiner, policy, |aggregator, key, time, partial| {
            aggregator.accept_partial(key, time, partial)
        })
    }

    fn collect_windows<C, F>(&self, name: &str, combiner: C, logic: F) -> Stream<G, (Window, C::Output)>
    where
        C: Combiner,
        C::Acc: ExchangeData,
        C::Output: Data,
        F: Fn(Emission<K, A>) -> C::Input + 'static,
    {
        let local = combiner.clone();
        let partials = self.unary_frontier(Pipeline, &format!("{} Pre-collect", name), move |_capability, _info| {
            let mut collector = GlobalCollector::new(local);
            let mut capabilities = WindowCapabilities::new();
            let mut buffer = Vec::new();

            move |input, output| {
                input.for_each(|time, data| {
                    data.swap(&mut buffer);
                    for emission in buffer.drain(..) {
                        let window = emission.window;
                        if collector.observe(window, logic(emission)) == Admission::Accepted {
                            capabilities.hold(&time, &window);
                        }
                    }
                });

                if let Some(end) = capabilities.closed_through(input.frontier()) {
                    let mut partials = collector.close_partials(end);
                    for (end, capability) in capabilities.release(end) {
                        let count = partials.iter().take_while(|p| p.0.end == end).count();
                        output.session(&capability).give_iterator(partials.drain(..count));
                    }
                }
            }
        });

        let label = name.to_owned();
        let exchange = Exchange::new(|partial: &(Window, C::Acc)| calculate_hash(&partial.0.end));
        partials.unary_frontier(exchange, &format!("{} Collect", name), move |_capability, _info| {
            let mut collector = GlobalCollector::new(combiner);
            let mut capabilities = WindowCapabilities::new();
            let mut buffer = Vec::new();

            move |input, output| {
                input.for_each(|time, data| {
                    data.swap(&mut buffer);
                    for (window, partial) in buffer.drain(..) {
                        if collector.merge(window, partial) == Admission::Accepted {
                            capabilities.hold(&time, &window);
                        }
                    }
                });

                if let Some(end) = capabilities.closed_through(input.frontier()) {
                    let mut results = collector.on_watermark(end);
                    for (end, capability) in capabilities.release(end) {
                        let count = results.iter().take_while(|r| r.0.end == end).count();
                        debug!(operator = %label, window_end = end, "collected window");
                        output.session(&capability).give_iterator(results.drain(..count));
                    }
                }
            }
        })
    }
}

/// Builds the coarser levels of `ladder` on top of `finest`, the closed output of its finest level.
///
/// Returns one stream per level, finest first; `finest` itself is the first entry. Each coarser
/// level is rolled up from the level [`Cascade::source`] names.
///
/// [`Cascade::source`]: ../cascade/struct.Cascade.html#method.source
pub fn cascade<G, K, C>(finest: &Stream<G, Emission<K, C::Acc>>, ladder: &Cascade, name: &str, combiner: C, policy: LatePolicy) -> Vec<Stream<G, Emission<K, C::Acc>>>
where
    G: Scope<Timestamp = u64>,
    K: ExchangeData + Ord + Hash,
    C: Combiner,
    C::Acc: ExchangeData,
{
    let mut levels = vec![finest.clone()];
    for level in 1..ladder.len() {
        let length = ladder.lengths()[level];
        let source = ladder.source(level).unwrap_or(level - 1);
        let stream = levels[source].rollup(&format!("{} Rollup {}s", name, length), length, combiner.clone(), policy);
        levels.push(stream);
    }
    levels
}
