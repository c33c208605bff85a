//! Result records, one per closed window.

/// Comment counts per two-hour bucket of the day, for one window.
///
/// Buckets without comments are absent. Serialized with `counts` as a JSON object keyed by
/// bucket.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Serialize, Deserialize, Debug, Abomonation, Hash)]
pub struct CommentHourlyCount {
    /// The end of the window the counts summarize.
    pub timestamp: u64,
    #[serde(with = "bucket_map")]
    pub counts: Vec<(u32, u64)>,
}

impl CommentHourlyCount {
    /// The count for `bucket`, zero if it saw no comments.
    pub fn count(&self, bucket: u32) -> u64 {
        self.counts
            .iter()
            .find(|(b, _)| *b == bucket)
            .map_or(0, |(_, count)| *count)
    }
}

/// An article and the number of comments it received.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Serialize, Deserialize, Debug, Abomonation, Hash)]
pub struct ArticleScore {
    #[serde(rename = "articleID")]
    pub article_id: String,
    pub comments: u64,
}

/// The most commented articles of one window, best first.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Serialize, Deserialize, Debug, Abomonation, Hash)]
pub struct Top3Article {
    /// The end of the window the ranking summarizes.
    pub timestamp: u64,
    pub articles: Vec<ArticleScore>,
}

impl Top3Article {
    /// The ranked article ids.
    pub fn article_ids(&self) -> Vec<&str> {
        self.articles.iter().map(|a| a.article_id.as_str()).collect()
    }
}

mod bucket_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(counts: &[(u32, u64)], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(counts.iter().map(|(bucket, count)| (bucket, count)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(u32, u64)>, D::Error> {
        let counts = BTreeMap::<u32, u64>::deserialize(deserializer)?;
        Ok(counts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_serialize_as_object() {
        let record = CommentHourlyCount { timestamp: 3600, counts: vec![(0, 2), (11, 1)] };
        let json = ::serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"timestamp":3600,"counts":{"0":2,"11":1}}"#);
        let back: CommentHourlyCount = ::serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.count(11), 1);
        assert_eq!(back.count(5), 0);
    }

    #[test]
    fn rankings_keep_their_order() {
        let record = Top3Article {
            timestamp: 7200,
            articles: vec![
                ArticleScore { article_id: "B".to_string(), comments: 9 },
                ArticleScore { article_id: "A".to_string(), comments: 2 },
            ],
        };
        let json = ::serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"timestamp":7200,"articles":[{"articleID":"B","comments":9},{"articleID":"A","comments":2}]}"#);
        assert_eq!(record.article_ids(), vec!["B", "A"]);
    }
}
