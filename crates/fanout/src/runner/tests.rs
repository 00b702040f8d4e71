use super::*;
use crate::{Error, TaskContext, TaskError, TaskResult};
use core::{
    num::NonZeroUsize,
    sync::atomic::{AtomicUsize, Ordering},
};
use std::collections::HashMap;
use tokio::time::sleep;

const SITES: [&str; 3] = ["Google.com", "Amazon.com", "Github.com"];

fn download(site: &str, latency: Duration) -> Task<String> {
    let site = site.to_string();
    Task::new(site.clone(), move |_| async move {
        sleep(latency).await;
        Ok::<_, &str>(format!("{site} is done!"))
    })
}

fn never(key: &str) -> Task<String> {
    Task::new(key, |_| std::future::pending::<Result<String, &str>>())
}

fn fails(key: &str, latency: Duration) -> Task<String> {
    Task::new(key, move |_| async move {
        sleep(latency).await;
        Err::<String, _>("connection refused")
    })
}

fn key_counts<T>(results: &[TaskResult<T>]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for r in results {
        *counts.entry(r.key().to_string()).or_default() += 1;
    }
    counts
}

#[tokio::test(start_paused = true)]
async fn downloads_finish_concurrently() {
    let tasks = SITES
        .iter()
        .map(|site| download(site, Duration::from_secs(2)))
        .collect();

    let report = run(tasks, Duration::from_secs(5)).await;

    assert!(report.is_success(), "{:?}", report.error());
    assert_eq!(report.results().len(), 3);
    for site in SITES {
        let result = report.get(site).expect("missing result");
        assert_eq!(result.value(), Some(&format!("{site} is done!")));
    }
    // Three 2s downloads overlap: the run takes ~2s, not 6s.
    assert!(report.elapsed() >= Duration::from_secs(2));
    assert!(report.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn empty_run_succeeds_immediately() {
    let report = run(Vec::<Task<()>>::new(), Duration::from_secs(1)).await;
    assert!(report.is_success());
    assert!(report.results().is_empty());
    assert_eq!(report.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn every_task_yields_one_result_regardless_of_latency() {
    for n in [1_usize, 2, 7, 32] {
        let tasks = (0..n)
            .map(|i| {
                // Later submissions finish first.
                let latency = Duration::from_millis(((n - i) * 10) as u64);
                Task::new(format!("task-{i}"), move |_| async move {
                    sleep(latency).await;
                    Ok::<_, &str>(i * 2)
                })
            })
            .collect();

        let report = run(tasks, Duration::from_secs(10)).await;
        let results = report.into_result().expect("run failed");
        assert_eq!(results.len(), n);
        for r in &results {
            assert_eq!(r.key(), format!("task-{}", r.index()));
            assert_eq!(r.value(), Some(&(r.index() * 2)));
        }
        if n > 1 {
            // Arrival order, not submission order.
            assert_eq!(results[0].index(), n - 1);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_keys_are_not_lost() {
    let keys = ["a", "b", "a", "c", "a"];
    let tasks = keys
        .iter()
        .map(|k| download(k, Duration::from_millis(5)))
        .collect();

    let report = run(tasks, Duration::from_secs(1)).await;
    assert!(report.is_success());

    let mut expected = HashMap::new();
    for k in keys {
        *expected.entry(k.to_string()).or_insert(0) += 1;
    }
    assert_eq!(key_counts(report.results()), expected);
}

#[tokio::test(start_paused = true)]
async fn stuck_task_times_out() {
    let tasks = vec![
        never("Slow.com"),
        download("Fast.com", Duration::from_millis(10)),
    ];

    let report = run(tasks, Duration::from_secs(1)).await;

    match report.error() {
        Some(Error::Timeout {
            elapsed,
            outstanding,
        }) => {
            assert_eq!(outstanding, &["Slow.com"]);
            assert!(*elapsed >= Duration::from_secs(1));
            assert!(*elapsed < Duration::from_millis(1100));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    // The task that finished in time is still available.
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].key(), "Fast.com");
}

#[tokio::test(start_paused = true)]
async fn one_failure_is_reported_without_losing_siblings() {
    let tasks = vec![
        fails("Broken.com", Duration::from_millis(5)),
        download("Github.com", Duration::from_millis(50)),
    ];

    let report = run(tasks, Duration::from_secs(1)).await;

    let Some(Error::PartialFailure { total, failures }) = report.error() else {
        panic!("expected partial failure, got {:?}", report.error());
    };
    assert_eq!(*total, 2);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].key, "Broken.com");
    assert_eq!(failures[0].error.to_string(), "connection refused");

    let ok = report.get("Github.com").expect("sibling result missing");
    assert_eq!(ok.value().map(String::as_str), Some("Github.com is done!"));
    assert_eq!(report.values().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_task_becomes_failure() {
    let tasks = vec![
        Task::new("boom", |_| async {
            if true {
                panic!("task blew up");
            }
            Ok::<String, &str>(String::new())
        }),
        download("fine", Duration::from_millis(1)),
    ];

    let report = run(tasks, Duration::from_secs(1)).await;
    let Some(Error::PartialFailure { failures, .. }) = report.error() else {
        panic!("expected partial failure, got {:?}", report.error());
    };
    assert!(matches!(
        &failures[0].error,
        TaskError::Panicked(m) if m == "task blew up"
    ));
    assert_eq!(report.results().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_bounds_in_flight_tasks() {
    let runner = Runner::with_context(
        RunConfig::new(Duration::from_secs(10))
            .with_concurrency(NonZeroUsize::new(2).unwrap()),
        (AtomicUsize::new(0), AtomicUsize::new(0)),
    );

    let tasks = (0..4)
        .map(|i| {
            Task::new(format!("t{i}"), |ctx: TaskContext<(AtomicUsize, AtomicUsize)>| async move {
                let (running, peak) = ctx.shared();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_secs(1)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
        })
        .collect();

    let report = runner.run(tasks).await;

    assert!(report.is_success());
    assert_eq!(runner.context().1.load(Ordering::SeqCst), 2);
    // Four 1s tasks through two workers take two rounds.
    assert!(report.elapsed() >= Duration::from_secs(2));
    assert!(report.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn pool_larger_than_task_count() {
    let runner = Runner::new(
        RunConfig::new(Duration::from_secs(5))
            .with_concurrency(NonZeroUsize::new(64).unwrap()),
    );
    let tasks = SITES
        .iter()
        .map(|site| download(site, Duration::from_secs(2)))
        .collect();

    let report = runner.run(tasks).await;
    assert!(report.is_success());
    assert!(report.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn buffered_channel_collects_everything() {
    for capacity in [1, 3, 100] {
        let config =
            RunConfig::new(Duration::from_secs(1)).with_channel_capacity(capacity);
        let runner = Runner::new(config);
        let tasks = (0..10)
            .map(|i| download(&format!("s{i}"), Duration::from_millis(10)))
            .collect();

        let report = runner.run(tasks).await;
        assert!(report.is_success(), "capacity {capacity}: {:?}", report.error());
        assert_eq!(report.results().len(), 10);
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_in_flight_work() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let runner = Runner::with_shared(
        RunConfig::new(Duration::from_secs(60)),
        Arc::clone(&ticks),
    );

    let tasks = vec![
        Task::new("ticker", |ctx: TaskContext<AtomicUsize>| async move {
            while !ctx.is_cancelled() {
                ctx.shared().fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(100)).await;
            }
            Ok::<(), &str>(())
        }),
        Task::new("quick", |_| async { Ok::<(), &str>(()) }),
    ];

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let report = runner.run_with_cancel(tasks, &cancel).await;

    let Some(Error::Cancelled { outstanding }) = report.error() else {
        panic!("expected cancellation, got {:?}", report.error());
    };
    assert_eq!(outstanding, &["ticker"]);
    assert!(report.elapsed() < Duration::from_millis(1100));
    assert_eq!(report.results().len(), 1);

    // The ticker was signalled and produces no further work.
    sleep(Duration::from_millis(50)).await;
    let settled = ticks.load(Ordering::SeqCst);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), settled);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_reports_everything_outstanding() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let tasks = SITES
        .iter()
        .map(|site| download(site, Duration::from_secs(1)))
        .collect();
    let report = Runner::new(RunConfig::default())
        .run_with_cancel(tasks, &cancel)
        .await;

    let Some(Error::Cancelled { outstanding }) = report.error() else {
        panic!("expected cancellation, got {:?}", report.error());
    };
    assert_eq!(outstanding, &SITES);
    assert!(report.results().is_empty());
}

#[tokio::test(start_paused = true)]
async fn task_body_observes_cancellation_on_timeout() {
    let runner = Runner::with_context(
        RunConfig::new(Duration::from_secs(1))
            .with_shutdown_grace(Duration::from_secs(5)),
        AtomicUsize::new(0),
    );

    let tasks = vec![Task::new("watcher", |ctx: TaskContext<AtomicUsize>| async move {
        tokio::select! {
            () = ctx.cancelled() => {
                ctx.shared().fetch_add(1, Ordering::SeqCst);
                Err("stopped")
            }
            () = sleep(Duration::from_secs(60)) => Ok(()),
        }
    })];

    let report = runner.run(tasks).await;
    let Some(Error::Timeout { outstanding, .. }) = report.error() else {
        panic!("expected timeout, got {:?}", report.error());
    };
    assert_eq!(outstanding, &["watcher"]);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(runner.context().load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn huge_timeout_means_no_deadline() {
    let report = run(vec![download("a", Duration::from_millis(1))], Duration::MAX).await;
    assert!(report.is_success(), "{:?}", report.error());

    let runner = Runner::new(RunConfig::default().with_timeout(Duration::MAX));
    let report = runner.run(vec![download("b", Duration::from_secs(3600))]).await;
    assert!(report.is_success(), "{:?}", report.error());
}

#[tokio::test(start_paused = true)]
async fn results_reach_the_callback_as_they_arrive() {
    let runner = Runner::new(RunConfig::new(Duration::from_secs(5)));
    let tasks = [("Slow.com", 3), ("Fast.com", 1), ("Mid.com", 2)]
        .into_iter()
        .map(|(site, secs)| download(site, Duration::from_secs(secs)))
        .collect();

    let started = tokio::time::Instant::now();
    let mut arrivals = Vec::new();
    let report = runner
        .run_with(tasks, &CancellationToken::new(), |r| {
            arrivals.push((r.key().to_string(), started.elapsed().as_secs()));
        })
        .await;

    assert!(report.is_success());
    assert_eq!(
        arrivals,
        [
            ("Fast.com".to_string(), 1),
            ("Mid.com".to_string(), 2),
            ("Slow.com".to_string(), 3),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn pool_timeout_lists_queued_tasks_and_stops_pulling() {
    let runner = Runner::with_context(
        RunConfig::new(Duration::from_millis(1500))
            .with_concurrency(NonZeroUsize::new(2).unwrap()),
        AtomicUsize::new(0),
    );

    // t0 occupies one worker forever; the other works through t1, t2, ...
    let tasks = (0..5)
        .map(|i| {
            Task::new(format!("t{i}"), move |ctx: TaskContext<AtomicUsize>| async move {
                ctx.shared().fetch_add(1, Ordering::SeqCst);
                if i == 0 {
                    std::future::pending::<()>().await;
                }
                sleep(Duration::from_secs(1)).await;
                Ok::<_, &str>(i)
            })
        })
        .collect();

    let report = runner.run(tasks).await;

    let Some(Error::Timeout { outstanding, .. }) = report.error() else {
        panic!("expected timeout, got {:?}", report.error());
    };
    assert_eq!(outstanding, &["t0", "t2", "t3", "t4"]);
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].key(), "t1");
    assert_eq!(runner.context().load(Ordering::SeqCst), 3);

    // t2 finishes after the deadline; its worker must not pick up t3.
    sleep(Duration::from_secs(10)).await;
    assert_eq!(runner.context().load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn pool_cancellation_reaches_running_task_only() {
    let runner = Runner::with_context(
        RunConfig::new(Duration::from_secs(60)).with_concurrency(NonZeroUsize::MIN),
        (AtomicUsize::new(0), AtomicUsize::new(0)),
    );

    let tasks = SITES
        .iter()
        .map(|site| {
            Task::new(*site, |ctx: TaskContext<(AtomicUsize, AtomicUsize)>| async move {
                let (started, observed) = ctx.shared();
                started.fetch_add(1, Ordering::SeqCst);
                tokio::select! {
                    () = ctx.cancelled() => {
                        observed.fetch_add(1, Ordering::SeqCst);
                        Err("stopped")
                    }
                    () = sleep(Duration::from_secs(10)) => Ok(()),
                }
            })
        })
        .collect();

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let report = runner.run_with_cancel(tasks, &cancel).await;

    let Some(Error::Cancelled { outstanding }) = report.error() else {
        panic!("expected cancellation, got {:?}", report.error());
    };
    assert_eq!(outstanding, &SITES);

    sleep(Duration::from_secs(30)).await;
    let (started, observed) = runner.context();
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn rendezvous_timeout_does_not_block_caller() {
    // Capacity 0: a finished producer waits for a pull that never comes once
    // the collector gives up.
    let runner =
        Runner::new(RunConfig::new(Duration::from_secs(1)).with_channel_capacity(0));
    let tasks = vec![never("stuck"), download("late", Duration::from_secs(2))];

    let report = runner.run(tasks).await;
    assert!(matches!(
        report.error(),
        Some(Error::Timeout { outstanding, .. }) if outstanding.len() == 2
    ));
    assert!(report.elapsed() < Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn retry_resubmits_only_failed_keys() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let runner = Runner::with_shared(
        RunConfig::new(Duration::from_secs(1)),
        Arc::clone(&attempts),
    );

    // Flaky succeeds from the second attempt on.
    let make = |key: &str| -> Task<String, AtomicUsize> {
        let key = key.to_string();
        Task::new(key.clone(), move |ctx: TaskContext<AtomicUsize>| async move {
            if key == "flaky" && ctx.shared().fetch_add(1, Ordering::SeqCst) == 0 {
                return Err("first attempt fails");
            }
            Ok(format!("{key} is done!"))
        })
    };

    let first = runner.run(vec![make("steady"), make("flaky")]).await;
    let retry: Vec<_> = first
        .error()
        .expect("first run should fail")
        .retry_keys()
        .into_iter()
        .map(make)
        .collect();
    assert_eq!(retry.len(), 1);

    let second = runner.run(retry).await;
    assert!(second.is_success());
    assert_eq!(
        second.values().cloned().collect::<Vec<_>>(),
        ["flaky is done!"]
    );
}
