use anyhow::bail;
use clap::Parser;
use core::{num::NonZeroUsize, time::Duration};
use fanout::RunConfig;
use std::collections::HashSet;

/// Runtime configuration for the `fanout` binary.
///
/// Every run "downloads" a list of sites concurrently, each one sleeping for a
/// simulated latency, and collects the results under a deadline. All values
/// are parsed from CLI arguments or environment variables (a `.env` file is
/// loaded first), so the same scenario can be replayed with different
/// concurrency, buffering and failure settings.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fanout",
    version,
    about = "Download sites concurrently and collect the results under a deadline"
)]
pub struct CliArgs {
    /// Sites to download. Duplicates are downloaded once per occurrence.
    #[arg(value_name = "SITE", default_values = ["Google.com", "Amazon.com", "Github.com"])]
    pub sites: Vec<String>,

    /// Simulated latency of a single download, in milliseconds.
    ///
    /// Environment variable: `LATENCY_MS`
    #[arg(long, env = "LATENCY_MS", default_value_t = 2000)]
    pub latency_ms: u64,

    /// Upper bound of the random latency added to each download, in
    /// milliseconds. Each download draws uniformly from `0..=JITTER_MS`.
    ///
    /// Environment variable: `JITTER_MS`
    #[arg(long, env = "JITTER_MS", default_value_t = 0)]
    pub jitter_ms: u64,

    /// Deadline for the whole run, in milliseconds.
    ///
    /// Downloads still outstanding when it passes are reported as timed out
    /// and cancelled.
    ///
    /// Environment variable: `TIMEOUT_MS`
    #[arg(long, env = "TIMEOUT_MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Maximum number of downloads in flight.
    ///
    /// When set, a pool of this many workers pulls downloads from a shared
    /// queue. When unset, every download starts at once.
    ///
    /// Environment variable: `CONCURRENCY`
    #[arg(long, env = "CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Capacity of the result channel between downloads and the collector.
    ///
    /// `0` hands every result directly to the collector; larger values let up
    /// to that many finished downloads queue without waiting.
    ///
    /// Environment variable: `CHANNEL_CAPACITY`
    #[arg(long, env = "CHANNEL_CAPACITY", default_value_t = 0)]
    pub channel_capacity: usize,

    /// Time given to abandoned downloads to wind down before they are
    /// aborted, in milliseconds.
    ///
    /// Environment variable: `SHUTDOWN_GRACE_MS`
    #[arg(long, env = "SHUTDOWN_GRACE_MS", default_value_t = 3000)]
    pub shutdown_grace_ms: u64,

    /// Make the download of SITE fail once its latency elapses. Repeatable.
    #[arg(long = "fail", value_name = "SITE")]
    pub fail: Vec<String>,

    /// Make the download of SITE never complete. Repeatable.
    #[arg(long = "hang", value_name = "SITE")]
    pub hang: Vec<String>,

    /// Print one JSON object per result instead of plain text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sites: Vec<String>,
    pub latency: Duration,
    pub jitter: Duration,
    pub fail: HashSet<String>,
    pub hang: HashSet<String>,
    pub run: RunConfig,
    pub format: OutputFormat,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let concurrency = match args.concurrency {
            None => None,
            Some(n) => match NonZeroUsize::new(n) {
                Some(limit) => Some(limit),
                None => bail!("CONCURRENCY must be greater than 0"),
            },
        };

        let known: HashSet<&str> = args.sites.iter().map(String::as_str).collect();
        for site in args.fail.iter().chain(&args.hang) {
            if !known.contains(site.as_str()) {
                bail!("{site} is not one of the sites to download");
            }
        }

        let fail: HashSet<String> = args.fail.into_iter().collect();
        let hang: HashSet<String> = args.hang.into_iter().collect();
        if let Some(site) = fail.intersection(&hang).next() {
            bail!("{site} cannot both fail and hang");
        }

        let mut run = RunConfig::new(Duration::from_millis(args.timeout_ms))
            .with_channel_capacity(args.channel_capacity)
            .with_shutdown_grace(Duration::from_millis(args.shutdown_grace_ms));
        if let Some(limit) = concurrency {
            run = run.with_concurrency(limit);
        }

        Ok(Self {
            sites: args.sites,
            latency: Duration::from_millis(args.latency_ms),
            jitter: Duration::from_millis(args.jitter_ms),
            fail,
            hang,
            run,
            format: if args.json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
        })
    }
}
