extern crate anyhow;
extern crate clap;
extern crate comments;
extern crate timely;
extern crate tracing;
extern crate tracing_subscriber;

use std::fs::File;
use std::io::{self, BufReader};

use anyhow::{anyhow, Context, Result};
use clap::{App, Arg, ArgMatches};
use timely::communication::Allocate;
use timely::worker::Worker;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comments::config::{Config, GeneratorConfig, JobConfig};
use comments::generator::CommentGenerator;
use comments::job::Job;
use comments::sink::Sinks;

// Command-line options and the configuration keys they override.
const OVERRIDES: &[(&str, &str)] = &[
    ("broker", "kafka-server"),
    ("group-id", "kafka-group-id"),
    ("input", "kafka-input-topic"),
    ("output", "kafka-output-topic"),
    ("queries", "queries"),
    ("top-n", "top-n"),
    ("utc-offset", "utc-offset"),
    ("late-policy", "late-policy"),
    ("generate", "generate"),
    ("seed", "generate-seed"),
    ("spacing", "generate-spacing"),
    ("articles", "generate-articles"),
];

fn app() -> App<'static, 'static> {
    App::new("comment-stats")
        .about("Windowed comment statistics over a stream of JSON comment records")
        .arg(Arg::with_name("config").long("config").takes_value(true).help("properties file with job settings"))
        .arg(Arg::with_name("broker").long("broker").takes_value(true))
        .arg(Arg::with_name("group-id").long("group-id").takes_value(true))
        .arg(Arg::with_name("input").long("input").takes_value(true).help("file of JSON lines, or - for standard input"))
        .arg(Arg::with_name("output").long("output").takes_value(true).help("output topic template containing %s, or - for standard output"))
        .arg(Arg::with_name("queries").long("queries").takes_value(true).help("comma-separated list of comments-count, comments-count-all, top-articles, top-articles-all"))
        .arg(Arg::with_name("top-n").long("top-n").takes_value(true))
        .arg(Arg::with_name("utc-offset").long("utc-offset").takes_value(true).help("seconds east of UTC in which hours of the day are bucketed"))
        .arg(Arg::with_name("late-policy").long("late-policy").takes_value(true).possible_values(&["drop", "warn"]))
        .arg(Arg::with_name("generate").long("generate").takes_value(true).help("feed this many synthetic comments instead of reading input"))
        .arg(Arg::with_name("seed").long("seed").takes_value(true))
        .arg(Arg::with_name("spacing").long("spacing").takes_value(true))
        .arg(Arg::with_name("articles").long("articles").takes_value(true))
        .arg(Arg::with_name("timely").multiple(true))
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::new(),
    };
    for &(option, key) in OVERRIDES {
        if let Some(value) = matches.value_of(option) {
            config.insert(key, value.to_string());
        }
    }
    Ok(config)
}

fn run_worker<A: Allocate>(worker: &mut Worker<A>, config: &JobConfig, generator: &Option<GeneratorConfig>, sinks: &Sinks) -> Result<()> {
    let mut job = Job::start(worker, config, sinks)?;

    // Worker 0 reads the source; the others only process exchanged data.
    if worker.index() == 0 {
        match generator {
            Some(generator) => {
                for comment in CommentGenerator::new(generator)? {
                    job.accept(worker, comment);
                }
            }
            None if config.input_topic == "-" => {
                let stdin = io::stdin();
                job.feed(worker, stdin.lock()).context("cannot read standard input")?;
            }
            None => {
                let file = File::open(&config.input_topic).with_context(|| format!("cannot open input {}", config.input_topic))?;
                job.feed(worker, BufReader::new(file)).with_context(|| format!("cannot read input {}", config.input_topic))?;
            }
        }
    }

    let stats = job.stop(worker);
    if worker.index() == 0 {
        info!(accepted = stats.accepted, malformed = stats.malformed, behind = stats.behind, "input exhausted");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "comments=info,rollup=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let matches = app().get_matches();
    let config = load_config(&matches)?;
    let job_config = JobConfig::new(&config)?;
    let generator = GeneratorConfig::new(&config)?;
    let sinks = Sinks::new(&job_config.output_topic);
    let flushed = sinks.clone();

    let timely_args = matches.values_of("timely").map_or(Vec::new(), |vs| vs.map(String::from).collect());

    let guards = timely::execute_from_args(timely_args.into_iter(), move |worker| {
        run_worker(worker, &job_config, &generator, &sinks)
    }).map_err(|error| anyhow!("timely execution failed: {}", error))?;

    for result in guards.join() {
        result.map_err(|error| anyhow!("worker failed: {}", error))??;
    }
    flushed.flush()?;
    Ok(())
}
