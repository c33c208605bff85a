use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use chrono::FixedOffset;
use thiserror::Error;

use rollup::LatePolicy;

use crate::queries::QueryParams;

/// Errors raised while assembling a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}:{line}: expected `key=value`")]
    Syntax { path: String, line: usize },
    #[error("invalid value {value:?} for `{key}`: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// This is a simple key/value options store.
///
/// Values come from a properties file and may be overridden one by one, typically from the
/// command line. Keys are the long option names, e.g. `kafka-input-topic`.
#[derive(Clone, Debug, Default)]
pub struct Config {
    args: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Config { args: HashMap::new() }
    }

    /// Reads a properties file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_properties(&text, &path.display().to_string())
    }

    /// Parses properties text.
    ///
    /// Its parsing strategy is as follows:
    ///   Blank lines and lines starting with `#` or `!` are skipped.
    ///   Every other line is split at its first `=` or `:` into a key and a value, both trimmed.
    ///
    pub fn from_properties(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            match line.find(|c| c == '=' || c == ':') {
                Some(split) if split > 0 => {
                    config.insert(line[..split].trim(), line[split + 1..].trim().to_string());
                }
                _ => return Err(ConfigError::Syntax { path: origin.to_string(), line: number + 1 }),
            }
        }
        Ok(config)
    }

    /// Inserts the given value for the given key.
    ///
    /// If the key already exists, its value is overwritten.
    pub fn insert(&mut self, key: &str, value: String) {
        self.args.insert(String::from(key), value);
    }

    /// Returns the value for the given key, if available.
    pub fn get(&self, key: &str) -> Option<String> {
        self.args.get(key).cloned()
    }

    /// Returns the value for the given key automatically parsed if possible.
    pub fn get_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.args.get(key).and_then(|x| x.parse::<T>().ok())
    }

    /// Returns the value for the given key or a default value if the key does not exist.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.args.get(key).map_or(String::from(default), |x| x.clone())
    }

    /// Returns the value for the given key automatically parsed, or a default value if the key does not exist.
    pub fn get_as_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get_as(key).unwrap_or(default)
    }

    /// Like `get_as_or`, but a present value that does not parse is an error.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.args.get(key) {
            None => Ok(default),
            Some(value) => value.parse::<T>().map_err(|reason| invalid(key, value, reason)),
        }
    }
}

fn invalid<R: Display>(key: &str, value: &str, reason: R) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// The queries a job can run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Query {
    /// Comment counts per bucket, hourly.
    CommentsCount,
    /// Comment counts per bucket, daily, weekly and monthly.
    CommentsCountAll,
    /// Article rankings, hourly.
    TopArticles,
    /// Article rankings, daily, weekly and monthly.
    TopArticlesAll,
}

impl FromStr for Query {
    type Err = String;

    fn from_str(s: &str) -> Result<Query, Self::Err> {
        match s {
            "comments-count" => Ok(Query::CommentsCount),
            "comments-count-all" => Ok(Query::CommentsCountAll),
            "top-articles" => Ok(Query::TopArticles),
            "top-articles-all" => Ok(Query::TopArticlesAll),
            other => Err(format!("unknown query: {}", other)),
        }
    }
}

pub const DEFAULT_QUERIES: &str = "comments-count,comments-count-all,top-articles,top-articles-all";

/// Everything a job needs to know.
///
/// Broker and consumer group are carried for the record; events are read from the input topic,
/// which names a file of JSON lines or `-` for standard input.
#[derive(Clone, Debug)]
pub struct JobConfig {
    pub broker: String,
    pub group_id: String,
    pub input_topic: String,
    /// Output topic template; `%s` is replaced by the result stream's name. `-` writes every
    /// stream to standard output.
    pub output_topic: String,
    pub queries: Vec<Query>,
    pub params: QueryParams,
}

impl JobConfig {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let broker = config.get_or("kafka-server", "localhost:9092");
        let group_id = config.get_or("kafka-group-id", "comment-stats");
        let input_topic = config.get_or("kafka-input-topic", "-");
        let output_topic = config.get_or("kafka-output-topic", "-");
        if output_topic != "-" && !output_topic.contains("%s") {
            return Err(invalid("kafka-output-topic", &output_topic, "expected `-` or a template containing `%s`"));
        }

        let selected = config.get_or("queries", DEFAULT_QUERIES);
        let mut queries = Vec::new();
        for name in selected.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let query = name.parse::<Query>().map_err(|reason| invalid("queries", &selected, reason))?;
            if !queries.contains(&query) {
                queries.push(query);
            }
        }
        if queries.is_empty() {
            return Err(invalid("queries", &selected, "no query selected"));
        }

        let top_n = config.parse_or("top-n", 3usize)?;
        if top_n == 0 {
            return Err(invalid("top-n", "0", "rankings need at least one entry"));
        }
        let offset_seconds = config.parse_or("utc-offset", 0i32)?;
        let utc_offset = FixedOffset::east_opt(offset_seconds)
            .ok_or_else(|| invalid("utc-offset", &offset_seconds.to_string(), "offset must be less than a day"))?;
        let late_policy = config.parse_or("late-policy", LatePolicy::Drop)?;

        Ok(JobConfig {
            broker,
            group_id,
            input_topic,
            output_topic,
            queries,
            params: QueryParams { utc_offset, top_n, late_policy },
        })
    }
}

/// Settings of the synthetic comment stream.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub events: u64,
    pub seed: u64,
    /// Event time of the first comment.
    pub start: u64,
    /// Seconds between consecutive comments.
    pub spacing: u64,
    pub articles: usize,
    pub zipf_exponent: f64,
    /// Share of comments that reply to an earlier one.
    pub reply_ratio: f64,
}

impl GeneratorConfig {
    /// The generator settings, or `None` unless `generate` asks for events.
    pub fn new(config: &Config) -> Result<Option<Self>, ConfigError> {
        let events = config.parse_or("generate", 0u64)?;
        if events == 0 {
            return Ok(None);
        }
        let articles = config.parse_or("generate-articles", 1_000usize)?;
        if articles == 0 {
            return Err(invalid("generate-articles", "0", "the article pool must not be empty"));
        }
        let zipf_exponent = config.parse_or("generate-zipf", 1.0f64)?;
        if !(zipf_exponent > 0.0) {
            return Err(invalid("generate-zipf", &zipf_exponent.to_string(), "the exponent must be positive"));
        }
        let reply_ratio = config.parse_or("generate-reply-ratio", 0.3f64)?;
        if !(0.0..=1.0).contains(&reply_ratio) {
            return Err(invalid("generate-reply-ratio", &reply_ratio.to_string(), "expected a share between 0 and 1"));
        }
        Ok(Some(GeneratorConfig {
            events,
            seed: config.parse_or("generate-seed", 0u64)?,
            start: config.parse_or("generate-start", 0u64)?,
            spacing: config.parse_or("generate-spacing", 60u64)?,
            articles,
            zipf_exponent,
            reply_ratio,
        }))
    }
}
