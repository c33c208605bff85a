#![deny(missing_docs)]
//! Rollup computes event-time tumbling-window aggregates on timely dataflow.
//!
//! The crate is organized leaf-first:
//!
//! * [`window`] assigns timestamps to epoch-aligned tumbling windows,
//! * [`watermark`] tracks monotonic event-time progress,
//! * [`combine`] defines the associative combine functions,
//! * [`aggregator`] keeps one accumulator per `(key, window)` and closes windows on watermarks,
//! * [`collector`] gathers the per-key results of a window into one result,
//! * [`cascade`] validates ladders of window lengths for rollups,
//! * [`operator`] hosts all of the above inside timely operators.
//!
//! [`window`]: window/index.html
//! [`watermark`]: watermark/index.html
//! [`combine`]: combine/index.html
//! [`aggregator`]: aggregator/index.html
//! [`collector`]: collector/index.html
//! [`cascade`]: cascade/index.html
//! [`operator`]: operator/index.html

extern crate fnv;
extern crate timely;
extern crate abomonation;
#[macro_use] extern crate abomonation_derive;

pub mod window;
pub mod watermark;
pub mod combine;
pub mod aggregator;
pub mod collector;
pub mod cascade;
pub mod operator;

use std::hash::{Hash, Hasher};

pub use aggregator::{Admission, Emission, KeyedTumblingAggregator, LatePolicy};
pub use cascade::{Cascade, CascadeError};
pub use operator::{cascade, EmissionStream, WindowedStream};
pub use window::Window;

/// Hashes `t` with FNV; used to route keyed records to workers.
pub fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut h: ::fnv::FnvHasher = Default::default();
    t.hash(&mut h);
    h.finish()
}
