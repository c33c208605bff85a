//! Explicit construction and lifecycle of the comment statistics dataflow.

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use serde::Serialize;
use timely::Data;
use timely::communication::Allocate;
use timely::dataflow::{InputHandle, ProbeHandle, Scope, Stream};
use timely::dataflow::operators::{Inspect, Probe};
use timely::worker::Worker;
use tracing::{debug, info};

use rollup::watermark::WatermarkTracker;
use rollup::window::HOUR;

use crate::config::{JobConfig, Query};
use crate::event::{self, CommentInfo};
use crate::queries::{comments_count, top_articles, window_label};
use crate::sink::Sinks;

/// Counters of what a job was fed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FeedStats {
    /// Events sent into the dataflow.
    pub accepted: u64,
    /// Records that did not decode; they never enter the dataflow.
    pub malformed: u64,
    /// Events older than the watermark at their arrival. They are still sent; the windows decide
    /// whether they are late.
    pub behind: u64,
}

/// A running job: the dataflow of the configured queries plus the handles driving it.
///
/// Every worker starts the job. Events are fed through [`accept`] on whichever workers read the
/// source; [`stop`] must be called on all of them.
///
/// [`accept`]: #method.accept
/// [`stop`]: #method.stop
pub struct Job {
    input: InputHandle<u64, CommentInfo>,
    probe: ProbeHandle<u64>,
    watermark: WatermarkTracker,
    stats: FeedStats,
}

impl Job {
    /// Builds the dataflow of `config.queries` in `worker`, publishing results to `sinks`.
    pub fn start<A: Allocate>(worker: &mut Worker<A>, config: &JobConfig, sinks: &Sinks) -> Result<Job> {
        let mut input = InputHandle::new();
        let mut probe = ProbeHandle::new();
        let params = config.params;

        worker.dataflow::<u64, _, _>(|scope| -> Result<()> {
            let comments = input.to_stream(scope);
            for query in &config.queries {
                match *query {
                    Query::CommentsCount => {
                        let counts = comments_count::run(&comments, HOUR, &params);
                        publish(&counts, sinks, "commentsCount", HOUR, &mut probe)?;
                    }
                    Query::CommentsCountAll => {
                        for (length, counts) in comments_count::run_all(&comments, &params)? {
                            publish(&counts, sinks, "commentsCount", length, &mut probe)?;
                        }
                    }
                    Query::TopArticles => {
                        let rankings = top_articles::run(&comments, HOUR, &params);
                        publish(&rankings, sinks, "topArticles", HOUR, &mut probe)?;
                    }
                    Query::TopArticlesAll => {
                        for (length, rankings) in top_articles::run_all(&comments, &params)? {
                            publish(&rankings, sinks, "topArticles", length, &mut probe)?;
                        }
                    }
                }
            }
            Ok(())
        })?;

        if worker.index() == 0 {
            info!(
                broker = %config.broker,
                group_id = %config.group_id,
                input = %config.input_topic,
                queries = ?config.queries,
                "started job"
            );
        }

        Ok(Job {
            input,
            probe,
            watermark: WatermarkTracker::new(),
            stats: FeedStats::default(),
        })
    }

    /// Sends `comment` into the dataflow.
    ///
    /// An event that moves the watermark first advances the dataflow to its time, which closes
    /// every window ending at or before it. The worker is then stepped until the dataflow has
    /// caught up, so no more than the open windows are ever buffered.
    pub fn accept<A: Allocate>(&mut self, worker: &mut Worker<A>, comment: CommentInfo) {
        let time = comment.time();
        if self.watermark.is_behind(time) {
            self.stats.behind += 1;
        }
        if self.watermark.observe(time) {
            self.input.advance_to(time);
        }
        self.input.send(comment);
        self.stats.accepted += 1;
        while self.probe.less_than(self.input.time()) {
            worker.step();
        }
    }

    /// Decodes JSON records, one per line, and accepts those that decode.
    pub fn feed<A: Allocate, R: BufRead>(&mut self, worker: &mut Worker<A>, reader: R) -> io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match event::deserialize(&line) {
                Some(comment) => self.accept(worker, comment),
                None => self.stats.malformed += 1,
            }
        }
        Ok(())
    }

    /// What has been fed so far.
    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// Closes the input and runs the dataflow to completion.
    ///
    /// With the input closed every open window closes, so the trailing partial windows are
    /// published too.
    pub fn stop<A: Allocate>(self, worker: &mut Worker<A>) -> FeedStats {
        let Job { input, stats, .. } = self;
        input.close();
        while worker.step() { }
        debug!(worker = worker.index(), accepted = stats.accepted, malformed = stats.malformed, behind = stats.behind, "stopped job");
        stats
    }
}

fn publish<G, R>(results: &Stream<G, R>, sinks: &Sinks, stream: &str, length: u64, probe: &mut ProbeHandle<u64>) -> Result<()>
where
    G: Scope<Timestamp = u64>,
    R: Data + Serialize,
{
    let name = format!("{}{}", stream, window_label(length));
    let topic = sinks.topic(&name).with_context(|| format!("cannot publish {}", name))?;
    results
        .inspect(move |record| topic.publish(record))
        .probe_with(probe);
    Ok(())
}
