//! Progress and result output.
//!
//! Lines are written the moment things happen: a start line when a download
//! begins, one line per result as the collector pulls it, and a closing line
//! once the run is over. Text mode prints human-readable lines; JSON mode
//! prints one object per line.

use crate::cli::{config::OutputFormat, downloader::Download};
use fanout::{RunReport, TaskResult};
use serde::Serialize;
use std::io::{Stdout, Write};

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum EventLine<'a> {
    Started {
        site: &'a str,
    },
    Done {
        index: usize,
        site: &'a str,
        latency_ms: u64,
    },
    Failed {
        index: usize,
        site: &'a str,
        error: String,
    },
}

impl<'a> From<&'a TaskResult<Download>> for EventLine<'a> {
    fn from(result: &'a TaskResult<Download>) -> Self {
        match result.outcome() {
            Ok(download) => Self::Done {
                index: result.index(),
                site: result.key(),
                latency_ms: download.latency_ms,
            },
            Err(e) => Self::Failed {
                index: result.index(),
                site: result.key(),
                error: e.to_string(),
            },
        }
    }
}

/// Trailing JSON line describing the run as a whole.
#[derive(Debug, Serialize)]
struct SummaryLine<'a> {
    finished: bool,
    collected: usize,
    elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    retry: Vec<&'a str>,
}

pub fn started_line(site: &str, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(format!("Starting download from: {site}")),
        OutputFormat::Json => Ok(serde_json::to_string(&EventLine::Started { site })?),
    }
}

pub fn result_line(
    result: &TaskResult<Download>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(match result.outcome() {
            Ok(download) => format!("{} is done!", download.site),
            Err(e) => format!("{} failed: {e}", result.key()),
        }),
        OutputFormat::Json => Ok(serde_json::to_string(&EventLine::from(result))?),
    }
}

/// Closing line of a run, if the format has one for this outcome.
pub fn summary_line(
    report: &RunReport<Download>,
    format: OutputFormat,
) -> anyhow::Result<Option<String>> {
    match format {
        OutputFormat::Text => Ok(report
            .is_success()
            .then(|| "All downloads finished!".to_string())),
        OutputFormat::Json => {
            let summary = SummaryLine {
                finished: report.is_success(),
                collected: report.results().len(),
                elapsed_ms: report.elapsed().as_millis(),
                error: report.error().map(ToString::to_string),
                retry: report
                    .error()
                    .map(fanout::Error::retry_keys)
                    .unwrap_or_default(),
            };
            Ok(Some(serde_json::to_string(&summary)?))
        }
    }
}

/// Prints the start line for `site` on stdout.
///
/// Called from inside download tasks, so a failed write is logged rather than
/// failing the download.
pub fn announce(site: &str, format: OutputFormat) {
    let written = started_line(site, format).and_then(|line| {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    });

    if let Err(_e) = written {
        #[cfg(feature = "tracing")]
        tracing::warn!("Failed to announce {site}: {_e}");
    }
}

/// Streams result lines to a writer as the collector pulls them.
///
/// The first write error is kept and returned by [`Printer::finish`]; later
/// lines are skipped.
pub struct Printer<W = Stdout> {
    format: OutputFormat,
    out: W,
    error: Option<anyhow::Error>,
}

impl Printer<Stdout> {
    pub fn new(format: OutputFormat) -> Self {
        Self::with_writer(format, std::io::stdout())
    }
}

impl<W: Write> Printer<W> {
    pub fn with_writer(format: OutputFormat, out: W) -> Self {
        Self {
            format,
            out,
            error: None,
        }
    }

    pub fn result(&mut self, result: &TaskResult<Download>) {
        if self.error.is_some() {
            return;
        }
        let format = self.format;
        if let Err(e) = result_line(result, format).and_then(|line| self.write(&line)) {
            self.error = Some(e);
        }
    }

    /// Writes the closing line and hands back the writer.
    ///
    /// # Errors
    ///
    /// Returns the first error met while printing.
    pub fn finish(mut self, report: &RunReport<Download>) -> anyhow::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        if let Some(line) = summary_line(report, self.format)? {
            self.write(&line)?;
        }
        Ok(self.out)
    }

    fn write(&mut self, line: &str) -> anyhow::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }
}
