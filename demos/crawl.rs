//! # Example: crawl
//!
//! Crawls a small in-memory "web" with four workers.
//!
//! Shows how to:
//! - Write the execute hook as a closure with [`CrawlFn`].
//! - Veto tasks in a [`BeforeCrawl`] hook and feed discovered links back with
//!   [`Engine::submit_with_priority`].
//! - Watch the engine through a [`Subscribe`] implementation.
//! - Pause, resume and shut down gracefully.
//!
//! ## Flow
//! ```text
//! seeds ──► Engine ──► Worker ──► SkipAssets::before_crawl
//!                         │           └─► fetch (simulated latency, timeout 300ms)
//!                         └─► Links::after_crawl ──► discovered links ──► main ──► submit
//!
//! Bus ──► Console subscriber (TaskFailed, TimeoutHit, Paused, Resumed, AllStopped)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=crawlvisor=debug cargo run --example crawl
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crawlvisor::{
    AfterCrawl, BeforeCrawl, Config, CrawlError, CrawlFn, Engine, Event, EventKind, Subscribe,
    Task,
};

/// Page body returned by the simulated fetch.
struct Page {
    links: Vec<&'static str>,
}

fn site() -> HashMap<&'static str, (u64, Vec<&'static str>)> {
    HashMap::from([
        ("https://shop.example/", (30, vec!["https://shop.example/catalog", "https://shop.example/about", "https://shop.example/logo.png"])),
        ("https://shop.example/catalog", (60, vec!["https://shop.example/item/1", "https://shop.example/item/2", "https://shop.example/item/3"])),
        ("https://shop.example/about", (20, vec!["https://shop.example/"])),
        ("https://shop.example/item/1", (40, vec!["https://shop.example/catalog"])),
        ("https://shop.example/item/2", (500, vec![])),
        ("https://shop.example/item/3", (40, vec!["https://shop.example/item/1"])),
    ])
}

struct SkipAssets;

#[async_trait]
impl BeforeCrawl<u32> for SkipAssets {
    async fn before_crawl(&self, task: &Task<u32>, _priority: i64) -> Result<bool, CrawlError> {
        Ok(!task.key().ends_with(".png"))
    }
}

/// Reports every result and forwards discovered links (with their depth) to `main`.
struct Links {
    found: mpsc::UnboundedSender<(String, u32)>,
}

#[async_trait]
impl AfterCrawl<u32, Page> for Links {
    async fn after_crawl(
        &self,
        task: &Task<u32>,
        priority: i64,
        page: Page,
        elapsed: Duration,
    ) -> Result<(), CrawlError> {
        let depth = *task.payload();
        println!(
            "[crawl] {} depth={depth} priority={priority} links={} took={elapsed:?}",
            task.key(),
            page.links.len()
        );
        for link in page.links {
            let _ = self.found.send((link.to_string(), depth + 1));
        }
        Ok(())
    }

    async fn crawl_error(
        &self,
        task: &Task<u32>,
        _priority: i64,
        error: CrawlError,
        _elapsed: Duration,
    ) -> Result<(), CrawlError> {
        println!("[crawl] {} failed: {error}", task.key());
        Ok(())
    }
}

struct Console;

#[async_trait]
impl Subscribe for Console {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::TaskFailed => println!(
                "[sub] failed:  task={} reason={}",
                ev.task.as_deref().unwrap_or("<unknown>"),
                ev.reason.as_deref().unwrap_or("<none>")
            ),
            EventKind::TimeoutHit => println!(
                "[sub] timeout: task={} after={}ms",
                ev.task.as_deref().unwrap_or("<unknown>"),
                ev.timeout_ms.unwrap_or(0)
            ),
            EventKind::Paused => println!("[sub] engine paused"),
            EventKind::Resumed => println!("[sub] engine resumed"),
            EventKind::AllStopped => println!("[sub] all workers stopped"),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "crawlvisor=info".into()))
        .init();

    let pages = Arc::new(site());
    let fetch = CrawlFn::arc(move |task: Arc<Task<u32>>, ctx: CancellationToken| {
        let pages = Arc::clone(&pages);
        async move {
            let Some((latency, links)) = pages.get(task.key()).cloned() else {
                return Err(CrawlError::fail("404 not found"));
            };
            tokio::select! {
                _ = ctx.cancelled() => Err(CrawlError::Canceled),
                _ = tokio::time::sleep(Duration::from_millis(latency)) => Ok::<_, CrawlError>(Page { links }),
            }
        }
    });

    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    let cfg = Config {
        workers: 4,
        timeout: Duration::from_millis(300),
        ..Config::default()
    };

    let engine = Engine::<u32>::builder::<Page>()
        .with_config(cfg)
        .with_tasks([("https://shop.example/", 0)])
        .with_subscribers(vec![Arc::new(Console) as Arc<dyn Subscribe>])
        .before(Arc::new(SkipAssets))
        .crawl(fetch)
        .after(Arc::new(Links { found: found_tx }))
        .build()?;

    engine.pause()?;
    println!("[main] paused, pending={:?}", engine.pending());
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.resume()?;

    // Shallow pages first: priority shrinks with depth.
    loop {
        match tokio::time::timeout(Duration::from_millis(700), found_rx.recv()).await {
            Ok(Some((link, depth))) if depth <= 3 => {
                engine.submit_with_priority(link, depth, i64::from(4 - depth))?;
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }

    println!("[main] no new links; shutting down");
    engine.wait_and_shutdown().await;
    Ok(())
}
