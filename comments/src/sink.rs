//! Topic-addressed sinks writing one JSON record per line.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, trace};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot open topic {topic} at {path}")]
    Open {
        topic: String,
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot encode record")]
    Encode(#[from] ::serde_json::Error),
    #[error("cannot write record")]
    Write(#[from] io::Error),
    #[error("a writer panicked while holding topic {0}")]
    Poisoned(String),
}

type Writer = Arc<Mutex<Box<dyn Write + Send>>>;

/// The topics of one process, opened on first use and shared by all workers.
///
/// The template names a file per topic, with `%s` standing for the topic name. The template `-`
/// sends every topic to standard output.
#[derive(Clone)]
pub struct Sinks {
    template: String,
    open: Arc<Mutex<HashMap<String, Writer>>>,
}

impl Sinks {
    pub fn new(template: &str) -> Self {
        Sinks {
            template: template.to_string(),
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Where `topic` is written; `None` for standard output.
    pub fn path(&self, topic: &str) -> Option<String> {
        if self.template == "-" {
            None
        } else {
            Some(self.template.replace("%s", topic))
        }
    }

    /// The sink of `topic`, opening (and truncating) its file if this process has not yet.
    pub fn topic(&self, topic: &str) -> Result<Topic, SinkError> {
        let mut open = self.open.lock().map_err(|_| SinkError::Poisoned(topic.to_string()))?;
        if let Some(writer) = open.get(topic) {
            return Ok(Topic { name: topic.to_string(), writer: writer.clone() });
        }
        let writer: Box<dyn Write + Send> = match self.path(topic) {
            None => Box::new(io::stdout()),
            Some(path) => {
                let file = File::create(&path).map_err(|source| SinkError::Open {
                    topic: topic.to_string(),
                    path: path.clone(),
                    source,
                })?;
                debug!(topic, %path, "opened topic");
                Box::new(LineWriter::new(file))
            }
        };
        let writer = Arc::new(Mutex::new(writer));
        open.insert(topic.to_string(), writer.clone());
        Ok(Topic { name: topic.to_string(), writer })
    }

    /// Flushes every open topic.
    pub fn flush(&self) -> Result<(), SinkError> {
        let open = self.open.lock().map_err(|_| SinkError::Poisoned("*".to_string()))?;
        for (name, writer) in open.iter() {
            writer.lock().map_err(|_| SinkError::Poisoned(name.clone()))?.flush()?;
        }
        Ok(())
    }
}

/// A single topic; records are published and forgotten.
#[derive(Clone)]
pub struct Topic {
    name: String,
    writer: Writer,
}

impl Topic {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publishes `record`. Failures are logged and the record is dropped.
    pub fn publish<R: Serialize>(&self, record: &R) {
        match self.try_publish(record) {
            Ok(()) => trace!(topic = %self.name, "published record"),
            Err(error) => error!(topic = %self.name, %error, "failed to publish record"),
        }
    }

    fn try_publish<R: Serialize>(&self, record: &R) -> Result<(), SinkError> {
        let line = ::serde_json::to_string(record)?;
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned(self.name.clone()))?;
        writeln!(writer, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use crate::models::CommentHourlyCount;

    #[test]
    fn topics_share_one_file() {
        let dir = ::tempfile::tempdir().unwrap();
        let template = dir.path().join("%s.jsonl");
        let sinks = Sinks::new(template.to_str().unwrap());

        let first = sinks.topic("commentsCount1h").unwrap();
        let second = sinks.clone().topic("commentsCount1h").unwrap();
        first.publish(&CommentHourlyCount { timestamp: 3600, counts: vec![(0, 2)] });
        second.publish(&CommentHourlyCount { timestamp: 7200, counts: vec![(0, 1)] });
        sinks.flush().unwrap();

        let written = fs::read_to_string(dir.path().join("commentsCount1h.jsonl")).unwrap();
        assert_eq!(written, "{\"timestamp\":3600,\"counts\":{\"0\":2}}\n{\"timestamp\":7200,\"counts\":{\"0\":1}}\n");
    }

    #[test]
    fn unopenable_topics_are_errors() {
        let dir = ::tempfile::tempdir().unwrap();
        let template = dir.path().join("missing").join("%s.jsonl");
        let sinks = Sinks::new(template.to_str().unwrap());
        match sinks.topic("topArticles1h") {
            Err(SinkError::Open { topic, .. }) => assert_eq!(topic, "topArticles1h"),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("opened a topic in a missing directory"),
        }
    }

    #[test]
    fn standard_output_has_no_path() {
        assert_eq!(Sinks::new("-").path("x"), None);
        assert_eq!(Sinks::new("out-%s").path("x"), Some("out-x".to_string()));
    }
}
