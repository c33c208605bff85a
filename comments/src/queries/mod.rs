//! The comment queries, each available over a single window length or over the rollup ladder.

use chrono::{FixedOffset, Offset, Utc};

use rollup::LatePolicy;
use rollup::window::{DAY, HOUR, MONTH, WEEK};

pub mod comments_count;
pub mod top_articles;

/// Window lengths of `run_all`, finest first: a day, a week and thirty days.
pub const ROLLUP_LADDER: [u64; 3] = [DAY, WEEK, MONTH];

/// Parameters shared by all queries.
#[derive(Clone, Copy, Debug)]
pub struct QueryParams {
    /// Offset in which hours of the day are evaluated.
    pub utc_offset: FixedOffset,
    /// Number of articles in a ranking.
    pub top_n: usize,
    pub late_policy: LatePolicy,
}

impl Default for QueryParams {
    fn default() -> Self {
        QueryParams {
            utc_offset: Utc.fix(),
            top_n: 3,
            late_policy: LatePolicy::Drop,
        }
    }
}

/// A short name for a window length, as used in topic names: `1h`, `24h`, `7d`, `30d`.
pub fn window_label(length: u64) -> String {
    if length % HOUR == 0 && length <= DAY {
        format!("{}h", length / HOUR)
    } else if length % DAY == 0 {
        format!("{}d", length / DAY)
    } else {
        format!("{}s", length)
    }
}
