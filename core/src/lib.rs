pub mod client;
pub mod dispatcher;
pub mod error;
pub mod frontier;
pub mod hash;
pub mod page;
pub mod parse;
pub mod policy;
pub mod robots_db;
pub mod sinks;
pub mod url;
pub mod visited;
pub mod worker;

pub use client::FetchClient;
pub use dispatcher::Dispatcher;
pub use error::{CrawlError, Result};
pub use frontier::Frontier;
pub use page::{Head, PageState, ParserKind};
pub use policy::{CrawlPolicy, DomainPolicy, OpenPolicy};
pub use robots_db::RobotsDb;
pub use sinks::{DocumentMeta, DocumentRecord, DocumentStoreSink, ExtractorSink, FileStoreSink};
pub use url::Url;
pub use visited::VisitedSet;
pub use worker::CrawlerContext;
