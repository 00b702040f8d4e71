#![doc = include_str!("../README.md")]

mod cli;

use clap::Parser;
use cli::config::{AppConfig, CliArgs};
use cli::downloader::{Download, Downloader};
use cli::output;
use cli::telemetry::{self, init_telemetry, shutdown_telemetry};
use fanout::{CancellationToken, Error, RunReport, Runner, Task, TaskContext};
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(shutdown_signal(cancel.clone()));

    let format = config.format;
    let tasks = config
        .sites
        .iter()
        .map(|site| {
            Task::new(site.as_str(), move |ctx: TaskContext<Downloader>| async move {
                output::announce(ctx.key(), format);
                ctx.shared()
                    .download(ctx.key(), ctx.cancellation_token())
                    .await
            })
        })
        .collect();

    let runner = Runner::with_context(config.run.clone(), Downloader::from(&config));
    let mut printer = output::Printer::new(format);
    let report = runner
        .run_with(tasks, &cancel, |result| printer.result(result))
        .await;
    signals.abort();

    record_metrics(&report);
    let printed = printer.finish(&report);
    shutdown_telemetry(providers);
    printed?;

    report.into_result()?;
    Ok(())
}

fn log_startup_info(_config: &AppConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting downloads with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting {} download(s) with a {:?} deadline",
            _config.sites.len(),
            _config.run.timeout
        );
    }
}

fn record_metrics(report: &RunReport<Download>) {
    let failures = report.results().iter().filter(|r| !r.is_success()).count();
    let dispatched = report.results().len() as u64 + outstanding(report);

    telemetry::increment_runs();
    telemetry::increment_tasks_dispatched(dispatched);
    telemetry::increment_task_failures(failures as u64);
    if matches!(report.error(), Some(Error::Timeout { .. })) {
        telemetry::increment_timeouts();
    }
    telemetry::record_run_duration(report.elapsed().as_secs_f64() * 1000.0);
}

fn outstanding(report: &RunReport<Download>) -> u64 {
    match report.error() {
        Some(Error::Timeout { outstanding, .. } | Error::Cancelled { outstanding }) => {
            outstanding.len() as u64
        }
        _ => 0,
    }
}

/// Cancels the run on Ctrl+C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {:?}", _e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {:?}", _e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, cancelling outstanding downloads...");

    cancel.cancel();
}
