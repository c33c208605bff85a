//! A synthetic, in-order comment stream with zipf-distributed article popularity.

use rand::{Rng, SeedableRng};
use rand::rngs::SmallRng;
use thiserror::Error;
use zipf::ZipfDistribution;

use crate::config::GeneratorConfig;
use crate::event::{CommentInfo, CommentType};

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum GeneratorError {
    #[error("cannot draw articles from a pool of {articles} with exponent {exponent}")]
    Popularity { articles: usize, exponent: String },
}

/// Produces `events` comments with ascending timestamps `spacing` seconds apart.
pub struct CommentGenerator {
    rng: SmallRng,
    popularity: ZipfDistribution,
    reply_ratio: f64,
    spacing: u64,
    next_time: u64,
    next_id: u64,
    remaining: u64,
}

impl CommentGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, GeneratorError> {
        let popularity = ZipfDistribution::new(config.articles, config.zipf_exponent).map_err(|()| GeneratorError::Popularity {
            articles: config.articles,
            exponent: config.zipf_exponent.to_string(),
        })?;
        Ok(CommentGenerator {
            rng: SmallRng::seed_from_u64(config.seed),
            popularity,
            reply_ratio: config.reply_ratio,
            spacing: config.spacing,
            next_time: config.start,
            next_id: 1,
            remaining: config.events,
        })
    }
}

impl Iterator for CommentGenerator {
    type Item = CommentInfo;

    fn next(&mut self) -> Option<CommentInfo> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let id = self.next_id;
        self.next_id += 1;
        let time = self.next_time;
        self.next_time = self.next_time.saturating_add(self.spacing);

        let article = self.rng.sample(&self.popularity);
        let reply = id > 1 && self.rng.gen_bool(self.reply_ratio);
        Some(CommentInfo {
            id: id.to_string(),
            create_date: time,
            comment_type: CommentType::Comment,
            article_id: format!("article-{}", article),
            user_id: self.rng.gen_range(1..=10_000),
            user_display_name: String::new(),
            depth: if reply { 2 } else { 1 },
            in_reply_to: if reply { self.rng.gen_range(1..id) } else { 0 },
            recommendations: self.rng.gen_range(0..50),
            body_length: self.rng.gen_range(20..2_000),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(events: u64) -> GeneratorConfig {
        GeneratorConfig {
            events,
            seed: 7,
            start: 1_000,
            spacing: 30,
            articles: 20,
            zipf_exponent: 1.2,
            reply_ratio: 0.5,
        }
    }

    #[test]
    fn produces_ascending_comments() {
        let comments: Vec<_> = CommentGenerator::new(&config(100)).unwrap().collect();
        assert_eq!(comments.len(), 100);
        assert_eq!(comments[0].time(), 1_000);
        assert!(comments.windows(2).all(|pair| pair[1].time() == pair[0].time() + 30));
        assert!(comments.iter().all(|c| c.is_comment() && c.article_id.starts_with("article-")));
        for comment in &comments {
            let id: u64 = comment.id.parse().unwrap();
            assert!(comment.in_reply_to < id);
        }
    }

    #[test]
    fn is_reproducible() {
        let first: Vec<_> = CommentGenerator::new(&config(50)).unwrap().collect();
        let second: Vec<_> = CommentGenerator::new(&config(50)).unwrap().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_empty_pools() {
        let mut empty = config(1);
        empty.articles = 0;
        assert!(CommentGenerator::new(&empty).is_err());
    }
}
