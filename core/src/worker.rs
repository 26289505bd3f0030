use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::client::{decode_text, is_text_content, FetchClient};
use crate::error::CrawlError;
use crate::frontier::Frontier;
use crate::page::{ParserKind, PageState};
use crate::parse::{parse_robots_txt, SitemapDoc, SitemapUrlEntry};
use crate::policy::CrawlPolicy;
use crate::robots_db::{select_agent_block, RobotsDb};
use crate::sinks::{DocumentRecord, ExtractorSink};
use crate::url::Url;
use crate::visited::VisitedSet;

/// Shared state for a whole crawl: one of these is handed to every
/// per-domain worker task, which is why every field is either internally
/// synchronized or behind an `Arc`.
pub struct CrawlerContext {
    pub visited: VisitedSet,
    pub robots: RobotsDb,
    frontiers: RwLock<HashMap<String, Arc<Frontier<PageState>>>>,
    pub client: FetchClient,
    pub policy: Arc<dyn CrawlPolicy>,
    pub sink: Arc<dyn ExtractorSink>,
    /// 0 disables duplicate checking; 1 checks exact content hashes; >1
    /// checks simhash distance against that value.
    pub duplicate_sensibility: u32,
    pub timeout: Duration,
    event_tx: mpsc::UnboundedSender<String>,
}

impl CrawlerContext {
    pub fn new(
        client: FetchClient,
        policy: Arc<dyn CrawlPolicy>,
        sink: Arc<dyn ExtractorSink>,
        duplicate_sensibility: u32,
        timeout: Duration,
        event_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        CrawlerContext {
            visited: VisitedSet::new(),
            robots: RobotsDb::new(),
            frontiers: RwLock::new(HashMap::new()),
            client,
            policy,
            sink,
            duplicate_sensibility,
            timeout,
            event_tx,
        }
    }

    fn violates_duplicate_policy(&self, page: &PageState) -> bool {
        match self.duplicate_sensibility {
            0 => false,
            1 => self.visited.contains_duplicate(page),
            n => self.visited.contains_near_duplicate(page, n, 64),
        }
    }

    fn frontier_for(&self, origin: &str) -> (Arc<Frontier<PageState>>, bool) {
        if let Some(f) = self.frontiers.read().get(origin) {
            return (f.clone(), false);
        }
        let mut write = self.frontiers.write();
        if let Some(f) = write.get(origin) {
            return (f.clone(), false);
        }
        let f = Arc::new(Frontier::new());
        write.insert(origin.to_string(), f.clone());
        (f, true)
    }

    fn pop_frontier(&self, origin: &str) -> Option<PageState> {
        self.frontiers.read().get(origin).and_then(|f| f.pop())
    }

    /// Queues `page` for a visit if the policy approves, issuing a HEAD
    /// request first when `headers_before_visit` asks for one. Notifies the
    /// dispatcher over `event_tx` the first time a domain is seen.
    pub async fn load_queue(&self, mut page: PageState, sitemap_entry: Option<&SitemapUrlEntry>) {
        let if_modified = self.policy.download_if_modified_since(page.url()).await;
        page.set_if_modified_since(if_modified);

        if self.policy.headers_before_visit(&page).await {
            let without_ssl_allowed = self.policy.can_download_without_ssl(&page).await;
            let mut result = self
                .client
                .head(page.url(), page.kind(), page.referrer(), if_modified, false)
                .await;
            if without_ssl_allowed {
                if let Err(CrawlError::TlsVerifyFailure) = result {
                    result = self
                        .client
                        .head(page.url(), page.kind(), page.referrer(), if_modified, true)
                        .await;
                }
            }
            match result {
                Ok((url, head, last_modified)) => {
                    if url != *page.url() {
                        page = PageState::new(url, page.kind(), page.referrer().cloned());
                        page.set_if_modified_since(if_modified);
                    }
                    page.set_head(head, last_modified);
                }
                Err(_) => return,
            }
        }

        if !self.policy.should_visit(&page, sitemap_entry).await {
            return;
        }

        let origin = page.url().origin();
        let (frontier, is_new) = self.frontier_for(&origin);
        let weight = match sitemap_entry {
            Some(entry) => self.policy.map_queue_weight(&page, entry),
            None => self.policy.queue_weight(&page),
        };
        frontier.push(page, weight);
        if is_new {
            let _ = self.event_tx.send(origin);
        }
    }

    /// Fetches `/robots.txt` for `origin`, records its rules, and returns
    /// the politeness delay it declared (if any) plus every sitemap URL it
    /// listed. Any failure is logged and treated as "no rules, no delay".
    pub async fn search_robots(&self, origin: &Url, as_agent: Option<&str>) -> (Option<f64>, Vec<Url>) {
        let robots_url = match Url::parse("/robots.txt", Some(origin)) {
            Ok(u) => u,
            Err(_) => return (None, Vec::new()),
        };
        info!(url = %robots_url, routine = "search_robots", "acquiring robots.txt");

        let robots_page = PageState::new(robots_url.clone(), ParserKind::Robots, None);
        let without_ssl_allowed = self.policy.can_download_without_ssl(&robots_page).await;
        let mut fetched = self
            .client
            .get_text(&robots_url, ParserKind::Robots, None, None, false)
            .await;
        if let Err(CrawlError::TlsVerifyFailure) = fetched {
            warn!(url = %robots_url, routine = "search_robots", "SSL certificate verify failed");
            if without_ssl_allowed {
                info!(url = %robots_url, routine = "search_robots", "forcing download without ssl");
                fetched = self
                    .client
                    .get_text(&robots_url, ParserKind::Robots, None, None, true)
                    .await;
            }
        }
        let text = match fetched {
            Ok((_, _, _, text)) => text,
            Err(e) => {
                warn!(url = %robots_url, routine = "search_robots", error = %e, "robots.txt not found");
                return (None, Vec::new());
            }
        };

        let parsed = parse_robots_txt(&text);
        let origin_str = origin.origin();

        let mut page = PageState::new(robots_url.clone(), ParserKind::Robots, None);
        if page.set_text(text).is_ok() {
            self.visited.insert(page);
        }

        if let Some(block) = select_agent_block(&parsed.blocks, as_agent.unwrap_or("*")) {
            self.robots.add(&origin_str, block);
            info!(url = %robots_url, routine = "search_robots", "robots.txt processed");
        }

        let sitemaps = parsed
            .sitemaps
            .iter()
            .filter_map(|s| Url::parse(s, Some(origin)).ok())
            .collect();
        (self.robots.crawl_delay(&origin_str), sitemaps)
    }

    /// Downloads every sitemap reachable from `seed_sitemaps` (following
    /// sitemap-index nesting) and queues every `<url>` entry it finds.
    pub async fn update_queue_from_sitemap(&self, seed_sitemaps: Vec<Url>, politeness_delay: f64) {
        if seed_sitemaps.is_empty() {
            warn!(routine = "update_queue_from_sitemap", "missing sitemap");
            return;
        }
        let mut pending: VecDeque<Url> = seed_sitemaps.into_iter().collect();
        let mut found = 0usize;

        while let Some(sitemap_url) = pending.pop_front() {
            let politeness = tokio::time::sleep(Duration::from_secs_f64(politeness_delay.max(0.0)));

            let probe = PageState::new(sitemap_url.clone(), ParserKind::Sitemap, None);
            let without_ssl_allowed = self.policy.can_download_without_ssl(&probe).await;
            let mut fetched = self
                .client
                .get_text(&sitemap_url, ParserKind::Sitemap, None, None, false)
                .await;
            if let Err(CrawlError::TlsVerifyFailure) = fetched {
                warn!(url = %sitemap_url, routine = "update_queue_from_sitemap", "SSL certificate verify failed");
                if without_ssl_allowed {
                    info!(url = %sitemap_url, routine = "update_queue_from_sitemap", "forcing download without ssl");
                    fetched = self
                        .client
                        .get_text(&sitemap_url, ParserKind::Sitemap, None, None, true)
                        .await;
                }
            }
            let text = match fetched {
                Ok((_, _, _, text)) => text,
                Err(e) => {
                    warn!(url = %sitemap_url, routine = "update_queue_from_sitemap", error = %e, "sitemap download failed");
                    continue;
                }
            };
            info!(url = %sitemap_url, routine = "update_queue_from_sitemap", "sitemap downloaded");

            let mut page = PageState::new(sitemap_url.clone(), ParserKind::Sitemap, None);
            if let Err(e) = page.set_text(text) {
                warn!(url = %sitemap_url, routine = "update_queue_from_sitemap", error = %e, "can't parse this sitemap");
                continue;
            }
            let doc = page.sitemap().expect("just parsed as sitemap").clone();
            self.visited.insert(page);

            match doc {
                SitemapDoc::Index { entries, .. } => {
                    info!(url = %sitemap_url, routine = "update_queue_from_sitemap", "sitemap index, following children");
                    for entry in entries {
                        pending.push_back(entry.loc);
                    }
                }
                SitemapDoc::UrlSet { entries } => {
                    for entry in entries {
                        if self.visited.contains_url(&entry.loc) {
                            continue;
                        }
                        if self.policy.respect_robots() && !self.robots.is_permitted(&entry.loc) {
                            continue;
                        }
                        let target = PageState::new(entry.loc.clone(), ParserKind::Web, None);
                        self.load_queue(target, Some(&entry)).await;
                        found += 1;
                    }
                    info!(url = %sitemap_url, routine = "update_queue_from_sitemap", "sitemap processed");
                }
            }
            politeness.await;
        }
        info!(routine = "update_queue_from_sitemap", count = found, "queue upgraded from sitemaps");
    }

    /// Drains an origin's frontier, downloading each page, checking it
    /// against the duplicate policy, handing it to the sink, and queuing
    /// its canonical URL and outbound links.
    pub async fn priority_crawl(&self, origin: &Url, delay: f64) {
        let root = PageState::new(origin.clone(), ParserKind::Web, None);
        self.load_queue(root, None).await;

        let origin_key = origin.origin();
        while let Some(mut target) = self.pop_frontier(&origin_key) {
            if self.visited.contains_url(target.url()) {
                continue;
            }
            let politeness = tokio::time::sleep(Duration::from_secs_f64(delay.max(0.0)));

            let without_ssl_allowed = self.policy.can_download_without_ssl(&target).await;
            let if_modified = target.if_modified_since();
            let fetched = self
                .client
                .get_bytes(target.url(), target.kind(), target.referrer(), if_modified, false)
                .await;
            let fetched = match fetched {
                Err(CrawlError::TlsVerifyFailure) => {
                    warn!(url = %target.url(), routine = "priority_crawl", "SSL certificate verify failed");
                    if without_ssl_allowed {
                        info!(url = %target.url(), routine = "priority_crawl", "forcing download without ssl");
                        self.client
                            .get_bytes(target.url(), target.kind(), target.referrer(), if_modified, true)
                            .await
                    } else {
                        continue;
                    }
                }
                other => other,
            };
            let (final_url, head, last_modified, bytes) = match fetched {
                Ok(v) => v,
                Err(CrawlError::NotModified) => {
                    info!(url = %target.url(), routine = "priority_crawl", "page not modified, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(url = %target.url(), routine = "priority_crawl", error = %e, "download failed");
                    continue;
                }
            };
            if final_url != *target.url() {
                let mut rebuilt = PageState::new(final_url, target.kind(), target.referrer().cloned());
                rebuilt.set_if_modified_since(if_modified);
                target = rebuilt;
            }
            target.set_head(head, last_modified);

            // Only text/html/xml/json/css/javascript is decoded and parsed;
            // everything else (pdf, image, audio, video, ...) is kept as raw
            // bytes and handed straight to the sink.
            let content_type = target.head().and_then(|h| h.content_type.as_deref());
            if is_text_content(content_type) {
                let text = decode_text(&bytes, content_type);
                if target.set_text(text).is_err() {
                    continue;
                }
            } else {
                let file_name = format!("{}{}", target.url().file_stem(), target.url().file_extension());
                if let Err(e) = self.sink.store_bytes(&file_name, &bytes).await {
                    warn!(url = %target.url(), routine = "priority_crawl", error = %e, "failed to store raw bytes");
                }
                target.set_bytes(bytes);
            }
            info!(url = %target.url(), routine = "priority_crawl", "downloaded");

            if self.violates_duplicate_policy(&target) {
                info!(url = %target.url(), routine = "priority_crawl", sensibility = self.duplicate_sensibility, "skipping duplicate page");
                continue;
            }

            let is_html = target.is_html().unwrap_or(false);
            if is_html {
                if let Ok(record) = DocumentRecord::from_page(&target, now()) {
                    if let Err(e) = self.sink.store_document(record).await {
                        warn!(url = %target.url(), routine = "priority_crawl", error = %e, "failed to store document");
                    }
                }
            }

            if is_html && self.policy.canonical_url() {
                if let Some(canon) = target.canonical_url() {
                    if &canon != target.url()
                        && !self.visited.contains_url(&canon)
                        && (!self.policy.respect_robots() || self.robots.is_permitted(&canon))
                    {
                        info!(url = %target.url(), routine = "priority_crawl", canonical = %canon, "found a canonical url");
                        let canon_page = PageState::new(canon, target.kind(), Some(target.url().clone()));
                        self.load_queue(canon_page, None).await;
                    }
                }
            }

            if self.policy.should_crawl(&target).await {
                for link in target.links() {
                    if !self.visited.contains_url(&link)
                        && (!self.policy.respect_robots() || self.robots.is_permitted(&link))
                    {
                        let next = PageState::new(link, ParserKind::Web, Some(target.url().clone()));
                        self.load_queue(next, None).await;
                    }
                }
            }

            self.visited.insert(target);
            politeness.await;
        }
    }

    /// The full per-domain sequence: robots, then sitemaps, then the
    /// priority-ordered crawl of the domain's own frontier.
    pub async fn crawl_domain(self: &Arc<Self>, domain: &str) {
        info!(url = domain, routine = "crawl_domain", "starting");
        let origin = match Url::parse(domain, None) {
            Ok(u) => u,
            Err(_) => return,
        };
        let (delay, sitemaps) = self.search_robots(&origin, self.policy.agent_name()).await;
        let delay = match delay {
            Some(d) if d > 0.0 => d,
            _ => self.policy.default_delay(),
        };
        if !sitemaps.is_empty() && self.policy.visit_sitemap(&origin).await {
            self.update_queue_from_sitemap(sitemaps, delay).await;
        }
        self.priority_crawl(&origin, delay).await;
        info!(url = domain, routine = "crawl_domain", "ended");
    }
}

fn now() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc()
}
