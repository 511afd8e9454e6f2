//! # Tasks and the capabilities that act on them.
//!
//! - [`Task`] the unit of crawl work (key, priority, creation instant, payload)
//! - [`BeforeCrawl`], [`Crawl`], [`AfterCrawl`] hook traits invoked by workers
//! - [`CrawlFn`] closure-backed [`Crawl`] implementation
//! - [`MessageSource`], [`MessageConverter`] external task source

mod crawl_fn;
mod hooks;
mod source;
mod task;

pub use crawl_fn::CrawlFn;
pub(crate) use hooks::Hooks;
pub use hooks::{AfterCrawl, AfterRef, BeforeCrawl, BeforeRef, Crawl, CrawlRef};
pub use source::{MessageConverter, MessageSource};
pub use task::{DEFAULT_PRIORITY, Task};
