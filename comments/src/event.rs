//! Comment events and their decoding from JSON records.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use tracing::debug;

/// Distinguishes comments from top-level posts.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Serialize, Deserialize, Debug, Abomonation, Hash)]
pub enum CommentType {
    /// A comment on an article.
    #[serde(rename = "comment", alias = "COMMENT")]
    Comment,
    /// A top-level post, such as the article itself.
    #[serde(rename = "post", alias = "POST", alias = "article", alias = "ARTICLE")]
    Post,
}

/// A timestamped comment or post, as delivered by the source.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Serialize, Deserialize, Debug, Abomonation, Hash)]
pub struct CommentInfo {
    #[serde(rename = "commentID", alias = "id", deserialize_with = "text_or_number")]
    pub id: String,
    /// Creation time in seconds since the epoch; the event time.
    #[serde(rename = "createDate", alias = "createTimestamp")]
    pub create_date: u64,
    #[serde(rename = "commentType", alias = "type")]
    pub comment_type: CommentType,
    #[serde(rename = "articleID", deserialize_with = "text_or_number")]
    pub article_id: String,
    #[serde(rename = "userID", default)]
    pub user_id: u64,
    #[serde(rename = "userDisplayName", default)]
    pub user_display_name: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(rename = "inReplyTo", default)]
    pub in_reply_to: u64,
    #[serde(default)]
    pub recommendations: u64,
    #[serde(rename = "bodyLength", default)]
    pub body_length: u32,
}

impl CommentInfo {
    /// The event time of the record.
    #[inline]
    pub fn time(&self) -> u64 {
        self.create_date
    }

    /// Tests whether the record is a comment.
    pub fn is_comment(&self) -> bool {
        self.comment_type == CommentType::Comment
    }
}

/// Decodes one JSON record.
///
/// Malformed records decode to `None`; they never reach the queries.
pub fn deserialize(record: &str) -> Option<CommentInfo> {
    match ::serde_json::from_str(record) {
        Ok(comment) => Some(comment),
        Err(error) => {
            debug!(%error, "discarding malformed record");
            None
        }
    }
}

// Identifiers show up both as strings and as numbers.
fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct TextOrNumber;

    impl<'de> Visitor<'de> for TextOrNumber {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or an unsigned integer")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_owned())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
            if value < 0 {
                return Err(E::invalid_value(de::Unexpected::Signed(value), &self));
            }
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(TextOrNumber)
}
