use std::sync::OnceLock;

use time::OffsetDateTime;

use crate::error::{CrawlError, Result};
use crate::hash::{content_hash, simhash, simhash_distance};
use crate::parse::{HtmlDoc, RobotsTxt, SitemapDoc};
use crate::url::Url;

/// Which parser a page's body is routed through, decided by the request
/// that produced it (a web page, a sitemap, or `robots.txt`) rather than by
/// sniffing content — the caller always knows which it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Web,
    Sitemap,
    Robots,
}

#[derive(Debug, Clone, Default)]
pub struct Head {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub cache_control: Option<String>,
    pub expires: Option<String>,
    pub etag: Option<String>,
    pub server: Option<String>,
}

impl Head {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|t| t.to_ascii_lowercase().contains("html"))
            .unwrap_or(false)
    }
}

pub enum ParsedContent {
    Html(HtmlDoc),
    Sitemap(SitemapDoc),
    Robots(RobotsTxt),
    Bytes(Vec<u8>),
}

/// A single fetched page: a URL plus whatever has been learned about it so
/// far. Downloads happen elsewhere (see `crate::client`); this is the record
/// a worker accumulates as it moves a URL through HEAD, GET, and parse.
pub struct PageState {
    url: Url,
    referrer: Option<Url>,
    kind: ParserKind,
    if_modified_since: Option<OffsetDateTime>,
    head: Option<Head>,
    last_modified: Option<OffsetDateTime>,
    raw_text: Option<String>,
    content: Option<ParsedContent>,
    content_hash: OnceLock<[u8; 32]>,
    simhash: OnceLock<u64>,
}

impl PageState {
    pub fn new(url: Url, kind: ParserKind, referrer: Option<Url>) -> Self {
        PageState {
            url,
            referrer,
            kind,
            if_modified_since: None,
            head: None,
            last_modified: None,
            raw_text: None,
            content: None,
            content_hash: OnceLock::new(),
            simhash: OnceLock::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> ParserKind {
        self.kind
    }

    pub fn referrer(&self) -> Option<&Url> {
        self.referrer.as_ref()
    }

    /// The conditional-request hint a policy supplied when this page was
    /// enqueued (`policy::download_if_modified_since`), sent as
    /// `If-Modified-Since` on the eventual GET.
    pub fn if_modified_since(&self) -> Option<OffsetDateTime> {
        self.if_modified_since
    }

    pub fn set_if_modified_since(&mut self, ts: Option<OffsetDateTime>) {
        self.if_modified_since = ts;
    }

    pub fn comes_from_same_domain(&self) -> bool {
        match &self.referrer {
            Some(r) => self.url.same_host(r),
            None => false,
        }
    }

    pub fn set_head(&mut self, head: Head, last_modified: Option<OffsetDateTime>) {
        self.last_modified = last_modified;
        self.head = Some(head);
    }

    pub fn last_modified(&self) -> Option<OffsetDateTime> {
        self.last_modified
    }

    pub fn head(&self) -> Option<&Head> {
        self.head.as_ref()
    }

    pub fn is_html(&self) -> Result<bool> {
        self.head
            .as_ref()
            .map(Head::is_html)
            .ok_or(CrawlError::MissingDownload)
    }

    /// Parses `text` according to `self.kind` and stores it as the page's
    /// content, also resetting the cached hashes (a redirect to a new URL
    /// can replace content after the fact).
    pub fn set_text(&mut self, text: String) -> Result<()> {
        let parsed = match self.kind {
            ParserKind::Web => ParsedContent::Html(HtmlDoc::parse(&text)),
            ParserKind::Sitemap => ParsedContent::Sitemap(crate::parse::parse_sitemap(&text)?),
            ParserKind::Robots => ParsedContent::Robots(crate::parse::parse_robots_txt(&text)),
        };
        self.raw_text = Some(text);
        self.content = Some(parsed);
        self.content_hash = OnceLock::new();
        self.simhash = OnceLock::new();
        Ok(())
    }

    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.content = Some(ParsedContent::Bytes(bytes));
        self.content_hash = OnceLock::new();
        self.simhash = OnceLock::new();
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.raw_text.as_deref()
    }

    pub fn html(&self) -> Result<&HtmlDoc> {
        match &self.content {
            Some(ParsedContent::Html(doc)) => Ok(doc),
            Some(_) => Err(CrawlError::WrongParserForContentType(
                "expected html content".to_string(),
            )),
            None => Err(CrawlError::MissingDownload),
        }
    }

    pub fn sitemap(&self) -> Result<&SitemapDoc> {
        match &self.content {
            Some(ParsedContent::Sitemap(doc)) => Ok(doc),
            Some(_) => Err(CrawlError::WrongParserForContentType(
                "expected sitemap content".to_string(),
            )),
            None => Err(CrawlError::MissingDownload),
        }
    }

    pub fn robots(&self) -> Result<&RobotsTxt> {
        match &self.content {
            Some(ParsedContent::Robots(doc)) => Ok(doc),
            Some(_) => Err(CrawlError::WrongParserForContentType(
                "expected robots.txt content".to_string(),
            )),
            None => Err(CrawlError::MissingDownload),
        }
    }

    fn hashable_bytes(&self) -> Result<&[u8]> {
        match &self.content {
            Some(ParsedContent::Bytes(b)) => Ok(b.as_slice()),
            _ => self
                .raw_text
                .as_deref()
                .map(str::as_bytes)
                .ok_or(CrawlError::MissingDownload),
        }
    }

    pub fn content_hash(&self) -> Result<[u8; 32]> {
        if let Some(h) = self.content_hash.get() {
            return Ok(*h);
        }
        let h = content_hash(self.hashable_bytes()?);
        Ok(*self.content_hash.get_or_init(|| h))
    }

    pub fn simhash(&self, size: u32) -> Result<u64> {
        if let Some(h) = self.simhash.get() {
            return Ok(*h);
        }
        let text = self.raw_text.as_deref().ok_or(CrawlError::MissingDownload)?;
        let h = simhash(text, size);
        Ok(*self.simhash.get_or_init(|| h))
    }

    pub fn duplicate(&self, other: &PageState) -> Result<bool> {
        Ok(self.content_hash()? == other.content_hash()?)
    }

    /// Strictly less than `max_dist`, never `<=` — a page at exactly the
    /// threshold distance is treated as distinct.
    pub fn near_duplicate(&self, other: &PageState, max_dist: u32, size: u32) -> Result<bool> {
        let a = self.simhash(size)?;
        let b = other.simhash(size)?;
        Ok(simhash_distance(a, b) < max_dist)
    }

    pub fn canonical_url(&self) -> Option<Url> {
        match &self.content {
            Some(ParsedContent::Html(doc)) => doc.canonical_url(),
            _ => None,
        }
    }

    pub fn links(&self) -> Vec<Url> {
        match &self.content {
            Some(ParsedContent::Html(doc)) => doc.links(&self.url),
            _ => Vec::new(),
        }
    }
}

impl PartialEq for PageState {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, kind: ParserKind) -> PageState {
        PageState::new(Url::parse(url, None).unwrap(), kind, None)
    }

    #[test]
    fn equality_is_url_based() {
        let a = page("https://example.com/a", ParserKind::Web);
        let b = page("https://example.com/a", ParserKind::Web);
        assert_eq!(a, b);
    }

    #[test]
    fn methods_require_download_first() {
        let p = page("https://example.com/a", ParserKind::Web);
        assert!(matches!(p.is_html(), Err(CrawlError::MissingDownload)));
        assert!(matches!(p.content_hash(), Err(CrawlError::MissingDownload)));
    }

    #[test]
    fn content_hash_is_cached_and_duplicate_detection_works() {
        let mut a = page("https://example.com/a", ParserKind::Web);
        let mut b = page("https://example.com/b", ParserKind::Web);
        a.set_text("<html>same body</html>".to_string()).unwrap();
        b.set_text("<html>same body</html>".to_string()).unwrap();
        assert!(a.duplicate(&b).unwrap());
        assert_eq!(a.content_hash().unwrap(), a.content_hash().unwrap());
    }

    #[test]
    fn near_duplicate_uses_strict_less_than() {
        let mut a = page("https://example.com/a", ParserKind::Web);
        let mut b = page("https://example.com/b", ParserKind::Web);
        a.set_text("repeated words repeated words repeated words".to_string())
            .unwrap();
        b.set_text("repeated words repeated words repeated words".to_string())
            .unwrap();
        // distance is 0, which is < any positive max_dist, never <=
        assert!(a.near_duplicate(&b, 1, 64).unwrap());
        assert!(!a.near_duplicate(&b, 0, 64).unwrap());
    }
}
