//! The most commented articles.

use timely::dataflow::{Scope, Stream};
use timely::dataflow::operators::{Filter, Map};

use rollup::combine::{Counter, TopN};
use rollup::{cascade, Cascade, CascadeError, Emission, EmissionStream, WindowedStream};

use crate::event::CommentInfo;
use crate::models::{ArticleScore, Top3Article};
use crate::queries::{window_label, QueryParams, ROLLUP_LADDER};

/// Ranks articles by the number of events referencing them in tumbling windows of `length` seconds.
pub fn run<G: Scope<Timestamp = u64>>(input: &Stream<G, CommentInfo>, length: u64, params: &QueryParams) -> Stream<G, Top3Article> {
    let counts = count_articles(input, length, params);
    rank(&counts, length, params.top_n)
}

/// Ranks articles over a day, a week and thirty days.
///
/// Per-article counts are rolled up from the daily counts; each level is ranked separately, so an
/// article outside a daily ranking can still lead the monthly one.
pub fn run_all<G: Scope<Timestamp = u64>>(input: &Stream<G, CommentInfo>, params: &QueryParams) -> Result<Vec<(u64, Stream<G, Top3Article>)>, CascadeError> {
    let ladder = Cascade::new(&ROLLUP_LADDER)?;
    let daily = count_articles(input, ladder.finest(), params);
    let levels = cascade(&daily, &ladder, "TopArticles", Counter, params.late_policy);
    Ok(ladder.lengths()
        .iter()
        .zip(levels)
        .map(|(&length, counts)| (length, rank(&counts, length, params.top_n)))
        .collect())
}

fn count_articles<G: Scope<Timestamp = u64>>(input: &Stream<G, CommentInfo>, length: u64, params: &QueryParams) -> Stream<G, Emission<String, u64>> {
    input
        .filter(|comment| !comment.article_id.is_empty())
        .tumbling_aggregate(
            &format!("TopArticles {}", window_label(length)),
            length,
            Counter,
            params.late_policy,
            |comment| {
                let time = comment.time();
                (comment.article_id, time, ())
            },
        )
}

fn rank<G: Scope<Timestamp = u64>>(counts: &Stream<G, Emission<String, u64>>, length: u64, n: usize) -> Stream<G, Top3Article> {
    counts
        .collect_windows(&format!("TopArticles {} Ranking", window_label(length)), TopN::new(n), |emission| (emission.key, emission.value))
        .map(|(window, ranked)| Top3Article {
            timestamp: window.end,
            articles: ranked
                .into_iter()
                .map(|(article_id, comments)| ArticleScore { article_id, comments })
                .collect(),
        })
}
