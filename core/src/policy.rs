use async_trait::async_trait;
use time::OffsetDateTime;

use crate::page::PageState;
use crate::parse::SitemapUrlEntry;
use crate::url::Url;

/// A weighted cost function over `T` (a page or a sitemap entry), boxed so
/// it can be built up out of the combinators below and stored on a policy.
pub type CostFn<T> = Box<dyn Fn(&T) -> i64 + Send + Sync>;

/// Always cost 1: breadth-first (lowest-cost-first frontier pops insertion
/// order first, i.e. FIFO).
pub fn fifo<T>() -> CostFn<T> {
    Box::new(|_| 1)
}

/// Always cost -1: depth-first (newest pushes sort to the front).
pub fn lifo<T>() -> CostFn<T> {
    Box::new(|_| -1)
}

/// A weighted sum of cost functions: `combine(vec![(w1, f1), (w2, f2)])`
/// scores an item as `w1 * f1(x) + w2 * f2(x)`. This is the one place a
/// "weight" in a scheduling cost means an integer multiplier applied to
/// another cost function's output, never a probability or a fraction.
pub fn combine<T: 'static>(weighted: Vec<(i64, CostFn<T>)>) -> CostFn<T> {
    Box::new(move |x| weighted.iter().map(|(w, f)| w * f(x)).sum())
}

pub fn multiply<T: 'static>(a: CostFn<T>, b: CostFn<T>) -> CostFn<T> {
    Box::new(move |x| a(x) * b(x))
}

/// The bag of decisions a crawl can be customized with. Every method has a
/// default matching an unrestricted, polite, breadth-first crawl; a
/// concrete policy overrides only the decisions it cares about.
///
/// Held as `Arc<dyn CrawlPolicy>` and shared across every concurrently
/// running per-domain worker, hence `async_trait` rather than a
/// struct-of-closures — closures captured once per policy instance don't
/// compose as cleanly across workers spawned from the same `Arc`.
#[async_trait]
pub trait CrawlPolicy: Send + Sync {
    /// Should this page's content actually be kept, given it already passed
    /// `is_html`? Called only after a successful download.
    async fn focus_policy(&self, _page: &PageState) -> bool {
        true
    }

    /// Should this link even be queued for a visit?
    async fn selection_policy(&self, _page: &PageState) -> bool {
        true
    }

    async fn sitemap_selection_policy(&self, _entry: &SitemapUrlEntry) -> bool {
        true
    }

    fn sitemap_scheduling_cost(&self, _entry: &SitemapUrlEntry) -> i64 {
        1
    }

    fn scheduling_cost(&self, _page: &PageState) -> i64 {
        1
    }

    /// Should a HEAD request be issued before the GET?
    async fn headers_before_visit(&self, _page: &PageState) -> bool {
        false
    }

    fn respect_robots(&self) -> bool {
        true
    }

    fn agent_name(&self) -> Option<&str> {
        None
    }

    fn canonical_url(&self) -> bool {
        true
    }

    fn default_delay(&self) -> f64 {
        5.0
    }

    async fn can_download_without_ssl(&self, _page: &PageState) -> bool {
        false
    }

    async fn visit_sitemap(&self, _origin: &Url) -> bool {
        true
    }

    /// A known last-modified timestamp to send as `If-Modified-Since`, or
    /// `None` to always download in full.
    async fn download_if_modified_since(&self, _url: &Url) -> Option<OffsetDateTime> {
        None
    }

    async fn should_visit(&self, page: &PageState, sitemap_entry: Option<&SitemapUrlEntry>) -> bool {
        match sitemap_entry {
            None => self.selection_policy(page).await,
            Some(entry) => {
                self.selection_policy(page).await && self.sitemap_selection_policy(entry).await
            }
        }
    }

    fn queue_weight(&self, page: &PageState) -> i64 {
        self.scheduling_cost(page)
    }

    fn map_queue_weight(&self, page: &PageState, entry: &SitemapUrlEntry) -> i64 {
        self.scheduling_cost(page) + self.sitemap_scheduling_cost(entry)
    }

    /// Both the head and the parsed body must assert HTML — a content-type
    /// header of `text/html` over a body with no `<html>` root (or vice
    /// versa) does not count.
    async fn should_crawl(&self, page: &PageState) -> bool {
        match page.is_html() {
            Ok(true) => match page.html() {
                Ok(doc) if doc.is_html() => self.focus_policy(page).await,
                _ => false,
            },
            _ => false,
        }
    }
}

/// An unrestricted, polite, breadth-first crawl: every default applies.
pub struct OpenPolicy;

#[async_trait]
impl CrawlPolicy for OpenPolicy {}

/// Restricts `selection_policy` to a fixed set of hosts, leaving every
/// other decision at its default.
pub struct DomainPolicy {
    hosts: Vec<String>,
}

impl DomainPolicy {
    pub fn new<I: IntoIterator<Item = String>>(hosts: I) -> Self {
        DomainPolicy {
            hosts: hosts.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CrawlPolicy for DomainPolicy {
    async fn selection_policy(&self, page: &PageState) -> bool {
        self.hosts.iter().any(|h| h == page.url().host())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ParserKind;

    fn page(url: &str) -> PageState {
        PageState::new(Url::parse(url, None).unwrap(), ParserKind::Web, None)
    }

    #[tokio::test]
    async fn open_policy_visits_everything() {
        let policy = OpenPolicy;
        assert!(policy.should_visit(&page("https://example.com/a"), None).await);
    }

    #[tokio::test]
    async fn domain_policy_restricts_by_host() {
        let policy = DomainPolicy::new(vec!["example.com".to_string()]);
        assert!(policy.selection_policy(&page("https://example.com/a")).await);
        assert!(!policy.selection_policy(&page("https://other.com/a")).await);
    }

    #[tokio::test]
    async fn should_crawl_requires_both_head_and_body_to_assert_html() {
        let policy = OpenPolicy;

        let mut matching = page("https://example.com/a");
        matching.set_head(
            crate::page::Head {
                content_type: Some("text/html; charset=utf-8".to_string()),
                ..Default::default()
            },
            None,
        );
        matching.set_text("<html><body>hi</body></html>".to_string()).unwrap();
        assert!(policy.should_crawl(&matching).await);

        let mut header_only = page("https://example.com/b");
        header_only.set_head(
            crate::page::Head {
                content_type: Some("text/html".to_string()),
                ..Default::default()
            },
            None,
        );
        header_only.set_text("no html root here".to_string()).unwrap();
        assert!(!policy.should_crawl(&header_only).await);

        let mut body_only = page("https://example.com/c");
        body_only.set_head(
            crate::page::Head {
                content_type: Some("application/octet-stream".to_string()),
                ..Default::default()
            },
            None,
        );
        body_only.set_text("<html><body>hi</body></html>".to_string()).unwrap();
        assert!(!policy.should_crawl(&body_only).await);
    }

    #[test]
    fn combine_applies_integer_weights() {
        let cost: CostFn<i32> = combine(vec![(2, fifo()), (3, lifo())]);
        // 2*1 + 3*-1 = -1
        assert_eq!(cost(&0), -1);
    }

    #[test]
    fn multiply_multiplies_outputs() {
        let cost: CostFn<i32> = multiply(fifo(), Box::new(|_| 4));
        assert_eq!(cost(&0), 4);
    }
}
