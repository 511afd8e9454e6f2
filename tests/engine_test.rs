use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast, broadcast::error::RecvError, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crawlvisor::{
    AfterCrawl, BeforeCrawl, Config, CrawlError, CrawlFn, Engine, EngineError, Event, EventKind,
    SignalState, Subscribe, Task,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(workers: usize) -> Config {
    Config {
        workers,
        join_timeout: Duration::from_millis(100),
        grace: Duration::from_secs(5),
        monitor_interval: Duration::ZERO,
        ..Config::default()
    }
}

#[derive(Default)]
struct Recorder {
    completed: AtomicUsize,
    failed: AtomicUsize,
    order: Mutex<Vec<String>>,
    errors: Mutex<Vec<CrawlError>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl Recorder {
    fn record(&self, task: &Task<String>) {
        self.order.lock().push(task.key().to_string());
        *self.calls.lock().entry(task.key().to_string()).or_default() += 1;
    }

    fn total(&self) -> usize {
        self.completed.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AfterCrawl<String, ()> for Recorder {
    async fn after_crawl(
        &self,
        task: &Task<String>,
        _priority: i64,
        _response: (),
        _elapsed: Duration,
    ) -> Result<(), CrawlError> {
        self.record(task);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn crawl_error(
        &self,
        task: &Task<String>,
        _priority: i64,
        error: CrawlError,
        _elapsed: Duration,
    ) -> Result<(), CrawlError> {
        self.record(task);
        self.errors.lock().push(error);
        self.failed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn ok_crawl() -> Arc<impl crawlvisor::Crawl<String, ()>> {
    CrawlFn::arc(|_t: Arc<Task<String>>, _ctx: CancellationToken| async move {
        Ok::<(), CrawlError>(())
    })
}

async fn wait_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    wait_for_where(rx, kind, |_| true).await
}

async fn wait_for_where(
    rx: &mut broadcast::Receiver<Event>,
    kind: EventKind,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == kind && pred(&ev) => return ev,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("bus closed before {kind:?}"),
            }
        }
    })
    .await
    .expect("event in time")
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_graceful_shutdown_crawls_everything_queued() {
    init_tracing();
    let rec = Arc::new(Recorder::default());
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(4))
        .crawl(CrawlFn::arc(
            |_t: Arc<Task<String>>, _ctx: CancellationToken| async move {
                time::sleep(Duration::from_millis(1)).await;
                Ok::<(), CrawlError>(())
            },
        ))
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");
    assert_eq!(engine.state(), SignalState::Running);

    for i in 0..200 {
        let url = format!("https://example.com/{i}");
        assert_eq!(engine.submit(url.clone(), url), Ok(true));
    }
    time::timeout(Duration::from_secs(10), engine.wait_and_shutdown())
        .await
        .expect("graceful shutdown in time");

    assert_eq!(rec.completed.load(Ordering::SeqCst), 200);
    assert!(rec.calls.lock().values().all(|n| *n == 1));
    assert!(!engine.has_pending_work());
    assert_eq!(engine.state(), SignalState::Stopped);
    assert_eq!(
        engine.submit("https://late.example/", "late".into()),
        Err(EngineError::Closed)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_rejects_submissions_but_keeps_crawling() {
    let rec = Arc::new(Recorder::default());
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(2))
        .crawl(ok_crawl())
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");

    engine.submit("a", "a".into()).expect("submit");
    engine.close();
    assert!(engine.is_closed());
    assert_eq!(engine.submit("b", "b".into()), Err(EngineError::Closed));

    eventually(|| rec.completed.load(Ordering::SeqCst) == 1).await;
    engine.wait_and_shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_forced_shutdown_discards_queued_tasks() {
    init_tracing();
    let rec = Arc::new(Recorder::default());
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(2))
        .crawl(CrawlFn::arc(
            |_t: Arc<Task<String>>, ctx: CancellationToken| async move {
                tokio::select! {
                    _ = ctx.cancelled() => Err::<(), CrawlError>(CrawlError::Canceled),
                    _ = time::sleep(Duration::from_millis(20)) => Ok::<(), CrawlError>(()),
                }
            },
        ))
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");

    for i in 0..1000 {
        engine
            .submit(format!("https://example.com/{i}"), i.to_string())
            .expect("submit");
    }

    let started = Instant::now();
    time::timeout(Duration::from_secs(5), engine.cancel_and_shutdown())
        .await
        .expect("forced shutdown in time");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!engine.has_pending_work());
    assert!(engine.pending().is_empty());
    assert!(rec.total() < 1000, "crawled {} of 1000", rec.total());
    assert_eq!(engine.state(), SignalState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_forced_shutdown_aborts_stuck_workers_after_grace() {
    let rec = Arc::new(Recorder::default());
    let cfg = Config {
        grace: Duration::from_millis(300),
        join_timeout: Duration::from_millis(50),
        ..config(1)
    };
    let engine = Engine::<String>::builder::<()>()
        .with_config(cfg)
        .crawl(CrawlFn::arc(
            |_t: Arc<Task<String>>, _ctx: CancellationToken| async move {
                time::sleep(Duration::from_secs(30)).await;
                Ok::<(), CrawlError>(())
            },
        ))
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");
    let mut events = engine.subscribe();

    engine.submit("stuck", "stuck".into()).expect("submit");
    eventually(|| engine.workers().iter().any(|w| w.working)).await;

    time::timeout(Duration::from_secs(5), engine.cancel_and_shutdown())
        .await
        .expect("abort after grace");

    let ev = wait_for(&mut events, EventKind::GraceExceeded).await;
    assert_eq!(ev.reason.as_deref(), Some("workers=[0]"));
    assert_eq!(rec.total(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_survives_failing_crawls() {
    let rec = Arc::new(Recorder::default());
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(1))
        .crawl(CrawlFn::arc(
            |t: Arc<Task<String>>, _ctx: CancellationToken| async move {
                Err::<(), CrawlError>(CrawlError::fail(format!("refused {}", t.key())))
            },
        ))
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");

    for i in 0..1000 {
        engine
            .submit(format!("https://down.example/{i}"), String::new())
            .expect("submit");
    }
    time::timeout(Duration::from_secs(10), engine.wait_and_shutdown())
        .await
        .expect("shutdown");

    assert_eq!(rec.failed.load(Ordering::SeqCst), 1000);
    assert_eq!(rec.completed.load(Ordering::SeqCst), 0);
    let calls = rec.calls.lock();
    assert_eq!(calls.len(), 1000);
    assert!(calls.values().all(|n| *n == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_crawl_is_reported_to_error_hook() {
    let rec = Arc::new(Recorder::default());
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(2))
        .crawl(CrawlFn::arc(
            |t: Arc<Task<String>>, _ctx: CancellationToken| async move {
                if t.key().starts_with("boom") {
                    panic!("parser exploded");
                }
                Ok::<(), CrawlError>(())
            },
        ))
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");

    for key in ["ok-1", "boom-1", "ok-2", "boom-2"] {
        engine.submit(key, key.to_string()).expect("submit");
    }
    engine.wait_and_shutdown().await;

    assert_eq!(rec.completed.load(Ordering::SeqCst), 2);
    assert_eq!(rec.failed.load(Ordering::SeqCst), 2);
    for err in rec.errors.lock().iter() {
        assert_eq!(
            err,
            &CrawlError::Panicked {
                info: "parser exploded".to_string()
            }
        );
    }
}

struct Veto;

#[async_trait]
impl BeforeCrawl<String> for Veto {
    async fn before_crawl(&self, task: &Task<String>, _priority: i64) -> Result<bool, CrawlError> {
        let key = task.key();
        if key.ends_with(".png") {
            return Ok(false);
        }
        if key.contains("explode") {
            panic!("before hook exploded");
        }
        if key.contains("error") {
            return Err(CrawlError::fail("robots.txt unavailable"));
        }
        Ok(true)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_before_hook_veto_and_failures() {
    let rec = Arc::new(Recorder::default());
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(2))
        .before(Arc::new(Veto))
        .crawl(ok_crawl())
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");
    let mut events = engine.subscribe();

    for key in ["logo.png", "index.html", "explode.html", "error.html"] {
        engine.submit(key, key.to_string()).expect("submit");
    }
    engine.wait_and_shutdown().await;

    assert_eq!(rec.completed.load(Ordering::SeqCst), 3);
    let mut crawled = rec.order.lock().clone();
    crawled.sort();
    assert_eq!(crawled, vec!["error.html", "explode.html", "index.html"]);

    let skipped = wait_for(&mut events, EventKind::TaskSkipped).await;
    assert_eq!(skipped.task.as_deref(), Some("logo.png"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_and_resume_are_idempotent() {
    let rec = Arc::new(Recorder::default());
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(2))
        .crawl(ok_crawl())
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");

    engine.pause().expect("pause");
    engine.pause().expect("second pause is a no-op");
    assert_eq!(engine.state(), SignalState::Paused);

    for i in 0..10 {
        engine.submit(format!("k{i}"), String::new()).expect("submit");
    }
    time::sleep(Duration::from_millis(150)).await;
    assert_eq!(rec.total(), 0);

    engine.resume().expect("resume");
    engine.resume().expect("second resume is a no-op");
    assert_eq!(engine.state(), SignalState::Running);

    time::timeout(Duration::from_secs(5), engine.wait_and_shutdown())
        .await
        .expect("shutdown");
    assert_eq!(rec.completed.load(Ordering::SeqCst), 10);

    assert_eq!(
        engine.pause(),
        Err(EngineError::InvalidTransition {
            op: "pause",
            state: SignalState::Stopped
        })
    );
    assert!(engine.resume().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dequeue_order_follows_priority_then_age() {
    let rec = Arc::new(Recorder::default());
    let gate = Arc::new(Notify::new());
    let started = Arc::new(Notify::new());

    let crawl = {
        let gate = Arc::clone(&gate);
        let started = Arc::clone(&started);
        CrawlFn::arc(move |t: Arc<Task<String>>, _ctx: CancellationToken| {
            let gate = Arc::clone(&gate);
            let started = Arc::clone(&started);
            async move {
                if t.key() == "gate" {
                    started.notify_one();
                    gate.notified().await;
                }
                Ok::<(), CrawlError>(())
            }
        })
    };
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(1))
        .crawl(crawl)
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");

    engine.submit("gate", String::new()).expect("submit");
    started.notified().await;

    engine.submit("a", String::new()).expect("submit");
    engine.submit_with_priority("b", String::new(), 5).expect("submit");
    engine.submit("c", String::new()).expect("submit");
    engine.submit("a", String::new()).expect("resubmit");

    assert_eq!(
        engine.pending(),
        vec![("b".to_string(), 5), ("a".to_string(), 2), ("c".to_string(), 1)]
    );

    gate.notify_one();
    engine.wait_and_shutdown().await;
    assert_eq!(*rec.order.lock(), vec!["gate", "b", "a", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_reaches_error_hook() {
    let rec = Arc::new(Recorder::default());
    let limit = Duration::from_millis(50);
    let engine = Engine::<String>::builder::<()>()
        .with_config(Config {
            timeout: limit,
            ..config(1)
        })
        .crawl(CrawlFn::arc(
            |_t: Arc<Task<String>>, ctx: CancellationToken| async move {
                ctx.cancelled().await;
                Err::<(), CrawlError>(CrawlError::Canceled)
            },
        ))
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");
    let mut events = engine.subscribe();

    engine.submit("https://slow.example/", String::new()).expect("submit");
    let hit = wait_for(&mut events, EventKind::TimeoutHit).await;
    assert_eq!(hit.timeout_ms, Some(50));

    engine.wait_and_shutdown().await;
    assert_eq!(
        *rec.errors.lock(),
        vec![CrawlError::Timeout { timeout: limit }]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_external_source_mode() {
    let rec = Arc::new(Recorder::default());
    let (tx, rx) = mpsc::channel::<String>(16);
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(2))
        .crawl(ok_crawl())
        .after(Arc::clone(&rec))
        .with_source(
            tokio::sync::Mutex::new(rx),
            |m: String| -> Result<Option<Task<String>>, CrawlError> {
                if m.is_empty() {
                    return Ok(None);
                }
                if m.starts_with("bad") {
                    return Err(CrawlError::Conversion { error: m });
                }
                Ok(Some(Task::new(m.clone(), m)))
            },
        )
        .build()
        .expect("engine");
    let mut events = engine.subscribe();

    assert_eq!(
        engine.submit("https://direct.example/", String::new()),
        Err(EngineError::ExternalQueue)
    );

    for msg in ["https://a.example/", "", "bad-message", "https://b.example/", "https://c.example/"] {
        tx.send(msg.to_string()).await.expect("send");
    }

    let failed = wait_for(&mut events, EventKind::ConversionFailed).await;
    assert!(failed.reason.is_some());
    eventually(|| rec.completed.load(Ordering::SeqCst) == 3).await;

    time::timeout(Duration::from_secs(5), engine.wait_and_shutdown())
        .await
        .expect("workers blocked on the source exit on closure");
    assert_eq!(rec.failed.load(Ordering::SeqCst), 0);
    drop(tx);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_initial_tasks_and_wait_for_completion() {
    let rec = Arc::new(Recorder::default());
    let seeds = (0..50).map(|i| (format!("https://seed.example/{i}"), i.to_string()));
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(3))
        .with_tasks(seeds)
        .crawl(ok_crawl())
        .after(Arc::clone(&rec))
        .build()
        .expect("engine");

    time::timeout(Duration::from_secs(5), engine.wait_for_completion())
        .await
        .expect("queue drained");
    assert!(!engine.has_pending_work());
    assert!(!engine.is_closed());

    engine.submit("https://late.example/", String::new()).expect("still open");
    engine.wait_and_shutdown().await;
    assert_eq!(rec.completed.load(Ordering::SeqCst), 51);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_configuration_errors() {
    let res = Engine::<String>::builder::<()>()
        .workers(0)
        .crawl(ok_crawl())
        .after(Arc::new(Recorder::default()))
        .build();
    assert_eq!(res.err(), Some(EngineError::InvalidWorkerCount(0)));

    let (_tx, rx) = mpsc::channel::<String>(1);
    let res = Engine::<String>::builder::<()>()
        .crawl(ok_crawl())
        .after(Arc::new(Recorder::default()))
        .with_tasks([("seed", String::new())])
        .with_source(
            tokio::sync::Mutex::new(rx),
            |m: String| -> Result<Option<Task<String>>, CrawlError> { Ok(Some(Task::new(m.clone(), m))) },
        )
        .build();
    let err = res.err().expect("conflict");
    assert!(err.is_config());
    assert_eq!(err.as_label(), "config_conflicting_queue");
}

#[derive(Default)]
struct Seen {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Seen {
    async fn on_event(&self, ev: &Event) {
        self.kinds.lock().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "seen"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribers_receive_lifecycle_events() {
    let seen = Arc::new(Seen::default());
    let engine = Engine::<String>::builder::<()>()
        .with_config(config(2))
        .with_subscribers(vec![Arc::clone(&seen) as Arc<dyn Subscribe>])
        .crawl(ok_crawl())
        .after(Arc::new(Recorder::default()))
        .build()
        .expect("engine");

    for key in ["a", "b", "c"] {
        engine.submit(key, String::new()).expect("submit");
    }
    engine.wait_and_shutdown().await;

    let kinds = seen.kinds.lock();
    let completed = kinds
        .iter()
        .filter(|k| **k == EventKind::TaskCompleted)
        .count();
    assert_eq!(completed, 3);
    assert!(kinds.contains(&EventKind::DrainRequested));
    assert_eq!(kinds.last(), Some(&EventKind::AllStopped));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_liveness_monitor_reports_stalled_worker() {
    init_tracing();
    let gate = Arc::new(Notify::new());
    let crawl = {
        let gate = Arc::clone(&gate);
        CrawlFn::arc(move |_t: Arc<Task<String>>, _ctx: CancellationToken| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok::<(), CrawlError>(())
            }
        })
    };
    let engine = Engine::<String>::builder::<()>()
        .with_config(Config {
            stall_threshold: Duration::from_millis(30),
            monitor_interval: Duration::from_millis(20),
            ..config(2)
        })
        .crawl(crawl)
        .after(Arc::new(Recorder::default()))
        .build()
        .expect("engine");
    let mut events = engine.subscribe();

    engine.submit("https://hung.example/", String::new()).expect("submit");
    let stalled = wait_for_where(&mut events, EventKind::WorkerStalled, |ev| ev.task.is_some()).await;
    assert_eq!(stalled.task.as_deref(), Some("https://hung.example/"));
    assert_eq!(stalled.reason.as_deref(), Some("in_crawl"));

    let workers = engine.stalled_workers();
    assert_eq!(workers.len(), 2);
    let busy: Vec<_> = workers.iter().filter(|w| w.working).collect();
    assert_eq!(busy.len(), 1);
    assert_eq!(busy[0].current.as_deref(), Some("https://hung.example/"));
    assert_eq!(engine.workers().len(), engine.num_workers());

    gate.notify_one();
    engine.wait_and_shutdown().await;
    assert!(engine.workers().iter().all(|w| !w.working));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_liveness_monitor_reports_idle_worker() {
    let engine = Engine::<String>::builder::<()>()
        .with_config(Config {
            stall_threshold: Duration::from_millis(30),
            monitor_interval: Duration::from_millis(10),
            ..config(1)
        })
        .crawl(ok_crawl())
        .after(Arc::new(Recorder::default()))
        .build()
        .expect("engine");
    let mut events = engine.subscribe();

    let stalled = wait_for(&mut events, EventKind::WorkerStalled).await;
    assert_eq!(stalled.worker, Some(0));
    assert_eq!(stalled.task, None);
    assert_eq!(stalled.reason.as_deref(), Some("idle"));

    let workers = engine.stalled_workers();
    assert_eq!(workers.len(), 1);
    assert!(!workers[0].working);
    assert!(workers[0].idle_for > Duration::from_millis(30));
    engine.wait_and_shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_forced_shutdown_during_graceful_is_bounded_by_grace() {
    let rec = Arc::new(Recorder::default());
    let cfg = Config {
        grace: Duration::from_millis(300),
        join_timeout: Duration::from_millis(50),
        ..config(1)
    };
    let engine = Arc::new(
        Engine::<String>::builder::<()>()
            .with_config(cfg)
            .crawl(CrawlFn::arc(
                |_t: Arc<Task<String>>, _ctx: CancellationToken| async move {
                    time::sleep(Duration::from_secs(30)).await;
                    Ok::<(), CrawlError>(())
                },
            ))
            .after(Arc::clone(&rec))
            .build()
            .expect("engine"),
    );
    let mut events = engine.subscribe();

    engine.submit("stuck", String::new()).expect("submit");
    eventually(|| engine.workers().iter().any(|w| w.working)).await;

    let graceful = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.wait_and_shutdown().await }
    });
    wait_for(&mut events, EventKind::DrainRequested).await;
    time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    time::timeout(Duration::from_secs(3), engine.cancel_and_shutdown())
        .await
        .expect("forced shutdown bounded by grace");
    assert!(started.elapsed() < Duration::from_secs(2));

    time::timeout(Duration::from_secs(1), graceful)
        .await
        .expect("graceful call returns too")
        .expect("graceful task");
    let ev = wait_for(&mut events, EventKind::GraceExceeded).await;
    assert_eq!(ev.reason.as_deref(), Some("workers=[0]"));
    assert_eq!(engine.state(), SignalState::Stopped);
    assert_eq!(rec.total(), 0);
}
