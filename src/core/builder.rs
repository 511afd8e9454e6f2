use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    core::{Config, CrawlQueue, Engine},
    error::EngineError,
    subscribers::Subscribe,
    tasks::{
        AfterCrawl, AfterRef, BeforeCrawl, BeforeRef, Crawl, CrawlRef, DEFAULT_PRIORITY, Hooks,
        MessageConverter, MessageSource,
    },
};

/// Builder for an [`Engine`].
///
/// Mandatory: a crawl hook ([`crawl`](Self::crawl)) and an after/error hook
/// ([`after`](Self::after)). Everything else is optional.
pub struct EngineBuilder<P, R> {
    cfg: Config,
    before: Option<BeforeRef<P>>,
    crawl: Option<CrawlRef<P, R>>,
    after: Option<AfterRef<P, R>>,
    source: Option<CrawlQueue<P>>,
    seeds: Vec<(String, P, i64)>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<P, R> Default for EngineBuilder<P, R>
where
    P: Send + Sync + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, R> EngineBuilder<P, R>
where
    P: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Creates a builder with [`Config::default`].
    pub fn new() -> Self {
        Self {
            cfg: Config::default(),
            before: None,
            crawl: None,
            after: None,
            source: None,
            seeds: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the number of workers (must be at least 1).
    pub fn workers(mut self, n: usize) -> Self {
        self.cfg.workers = n;
        self
    }

    /// Sets the optional before-crawl veto hook.
    pub fn before<B: BeforeCrawl<P>>(mut self, hook: Arc<B>) -> Self {
        self.before = Some(hook);
        self
    }

    /// Sets the crawl (execute) hook.
    pub fn crawl<C: Crawl<P, R>>(mut self, hook: Arc<C>) -> Self {
        self.crawl = Some(hook);
        self
    }

    /// Sets the after/error hook.
    pub fn after<A: AfterCrawl<P, R>>(mut self, hook: Arc<A>) -> Self {
        self.after = Some(hook);
        self
    }

    /// Pulls tasks from `source` instead of the internal queue.
    ///
    /// Submissions are then rejected with [`EngineError::ExternalQueue`].
    pub fn with_source<S, C>(mut self, source: S, converter: C) -> Self
    where
        S: MessageSource,
        C: MessageConverter<S::Message, P>,
    {
        self.source = Some(CrawlQueue::external(source, converter));
        self
    }

    /// Seeds the internal queue with `(key, payload)` pairs at default priority.
    pub fn with_tasks<I, K>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
    {
        self.seeds.extend(
            tasks
                .into_iter()
                .map(|(key, payload)| (key.into(), payload, DEFAULT_PRIORITY)),
        );
        self
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Validates the configuration, spawns the workers and returns a running engine.
    ///
    /// # Errors
    /// - [`EngineError::InvalidWorkerCount`] for zero workers.
    /// - [`EngineError::MissingHook`] without a crawl or after hook.
    /// - [`EngineError::ConflictingQueue`] when seeds are combined with an external source.
    /// - [`EngineError::NoRuntime`] outside a tokio runtime.
    pub fn build(self) -> Result<Engine<P>, EngineError> {
        if self.cfg.workers == 0 {
            return Err(EngineError::InvalidWorkerCount(0));
        }
        let crawl = self.crawl.ok_or(EngineError::MissingHook("crawl"))?;
        let after = self.after.ok_or(EngineError::MissingHook("after"))?;

        let queue = match self.source {
            Some(_) if !self.seeds.is_empty() => {
                return Err(EngineError::ConflictingQueue(
                    "initial tasks require the internal queue",
                ));
            }
            Some(external) => external,
            None => {
                let queue = CrawlQueue::internal();
                for (key, payload, delta) in self.seeds {
                    queue.submit(key, payload, delta)?;
                }
                queue
            }
        };

        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let hooks = Hooks {
            before: self.before,
            crawl,
            after,
        };
        Engine::start(self.cfg, hooks, queue, self.subscribers, &runtime)
    }
}
