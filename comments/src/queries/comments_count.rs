//! Comment counts per two-hour bucket of the day.

use std::convert::TryFrom;

use chrono::{DateTime, FixedOffset, Timelike};
use timely::dataflow::{Scope, Stream};
use timely::dataflow::operators::{Filter, Map};

use rollup::combine::{Counter, Sparse};
use rollup::window::{DAY, HOUR};
use rollup::{cascade, Cascade, CascadeError, Emission, EmissionStream, WindowedStream};

use crate::event::CommentInfo;
use crate::models::CommentHourlyCount;
use crate::queries::{window_label, QueryParams, ROLLUP_LADDER};

/// The two-hour bucket of the day, `0..=11`, that `time` falls into at `offset`.
pub fn hour_bucket(time: u64, offset: FixedOffset) -> u32 {
    let hour = i64::try_from(time)
        .ok()
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
        .map(|utc| utc.with_timezone(&offset).hour())
        // Beyond the calendar's range; wall-clock arithmetic in UTC.
        .unwrap_or(((time % DAY) / HOUR) as u32);
    hour / 2
}

/// Counts comments per bucket in tumbling windows of `length` seconds.
pub fn run<G: Scope<Timestamp = u64>>(input: &Stream<G, CommentInfo>, length: u64, params: &QueryParams) -> Stream<G, CommentHourlyCount> {
    let counts = count_buckets(input, length, params);
    collect(&counts, length)
}

/// Counts comments per bucket over a day, a week and thirty days.
///
/// Only the daily counts are computed from comments; the longer windows are rolled up from them.
/// Returns the result streams with their window lengths, finest first.
pub fn run_all<G: Scope<Timestamp = u64>>(input: &Stream<G, CommentInfo>, params: &QueryParams) -> Result<Vec<(u64, Stream<G, CommentHourlyCount>)>, CascadeError> {
    let ladder = Cascade::new(&ROLLUP_LADDER)?;
    let daily = count_buckets(input, ladder.finest(), params);
    let levels = cascade(&daily, &ladder, "CommentsCount", Counter, params.late_policy);
    Ok(ladder.lengths()
        .iter()
        .zip(levels)
        .map(|(&length, counts)| (length, collect(&counts, length)))
        .collect())
}

fn count_buckets<G: Scope<Timestamp = u64>>(input: &Stream<G, CommentInfo>, length: u64, params: &QueryParams) -> Stream<G, Emission<u32, u64>> {
    let offset = params.utc_offset;
    input
        .filter(|comment| comment.is_comment())
        .tumbling_aggregate(
            &format!("CommentsCount {}", window_label(length)),
            length,
            Counter,
            params.late_policy,
            move |comment| (hour_bucket(comment.time(), offset), comment.time(), ()),
        )
}

fn collect<G: Scope<Timestamp = u64>>(counts: &Stream<G, Emission<u32, u64>>, length: u64) -> Stream<G, CommentHourlyCount> {
    counts
        .collect_windows(&format!("CommentsCount {} Buckets", window_label(length)), Sparse::new(), |emission| (emission.key, emission.value))
        .map(|(window, counts)| CommentHourlyCount { timestamp: window.end, counts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_cover_two_hours() {
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(hour_bucket(10 * 60, utc), 0);
        assert_eq!(hour_bucket(2 * HOUR - 1, utc), 0);
        assert_eq!(hour_bucket(2 * HOUR, utc), 1);
        assert_eq!(hour_bucket(DAY - 1, utc), 11);
        assert_eq!(hour_bucket(DAY + 5 * HOUR, utc), 2);
    }

    #[test]
    fn buckets_follow_the_offset() {
        let cest = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(hour_bucket(0, cest), 1);
        let west = FixedOffset::west_opt(3600).unwrap();
        assert_eq!(hour_bucket(0, west), 11);
    }

    #[test]
    fn out_of_range_times_still_bucket() {
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(hour_bucket(u64::max_value() - (u64::max_value() % DAY), utc), 0);
    }
}
