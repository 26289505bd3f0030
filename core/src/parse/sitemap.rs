use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{CrawlError, Result};
use crate::url::Url;

#[derive(Debug, Clone)]
pub struct SitemapIndexEntry {
    pub loc: Url,
    pub lastmod: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewsEntry {
    pub title: Option<String>,
    pub name: Option<String>,
    pub language: Option<String>,
    pub publication_date: Option<String>,
    pub keywords: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SitemapUrlEntry {
    pub loc: Url,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<String>,
    pub news: Option<NewsEntry>,
}

#[derive(Debug, Clone)]
pub enum SitemapDoc {
    /// A sitemap-of-sitemaps. `has_lastmod` is true when at least one child
    /// carried a `lastmod`, in which case `entries` is sorted ascending by
    /// that ISO-8601 timestamp (a plain string sort is valid for strict
    /// ISO-8601 date/datetime forms).
    Index {
        entries: Vec<SitemapIndexEntry>,
        has_lastmod: bool,
    },
    UrlSet {
        entries: Vec<SitemapUrlEntry>,
    },
}

fn local_name(qname: &[u8]) -> &str {
    let s = std::str::from_utf8(qname).unwrap_or("");
    match s.find(':') {
        Some(idx) => &s[idx + 1..],
        None => s,
    }
}

#[derive(Default)]
struct IndexEntryBuilder {
    loc: Option<String>,
    lastmod: Option<String>,
}

#[derive(Default)]
struct UrlEntryBuilder {
    loc: Option<String>,
    lastmod: Option<String>,
    changefreq: Option<String>,
    priority: Option<String>,
    news: Option<NewsEntry>,
    in_news: bool,
}

/// Parses XML under the `sitemaps.org`, legacy Google, and news-extension
/// namespaces. Namespace URIs are not validated (only well-formedness and
/// the root element matter) since local tag names alone disambiguate the
/// three recognized namespaces in practice.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDoc> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut root_seen = false;
    let mut is_index = false;

    let mut index_entries: Vec<SitemapIndexEntry> = Vec::new();
    let mut index_builder = IndexEntryBuilder::default();

    let mut url_entries: Vec<SitemapUrlEntry> = Vec::new();
    let mut url_builder = UrlEntryBuilder::default();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = local_name(e.name().as_ref()).to_string();
                if !root_seen {
                    root_seen = true;
                    match name.as_str() {
                        "sitemapindex" => is_index = true,
                        "urlset" => is_index = false,
                        other => return Err(CrawlError::UnsupportedSitemap(other.to_string())),
                    }
                }
                match name.as_str() {
                    "sitemap" => index_builder = IndexEntryBuilder::default(),
                    "url" => url_builder = UrlEntryBuilder::default(),
                    "news" => url_builder.in_news = true,
                    _ => {}
                }
                stack.push(name);
            }
            // A self-closing element (`<sitemap/>`) can never carry a `loc`,
            // so it never produces an entry; still needed for the root check.
            Event::Empty(e) => {
                let name = local_name(e.name().as_ref()).to_string();
                if !root_seen {
                    root_seen = true;
                    match name.as_str() {
                        "sitemapindex" => is_index = true,
                        "urlset" => is_index = false,
                        other => return Err(CrawlError::UnsupportedSitemap(other.to_string())),
                    }
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref()).to_string();
                match name.as_str() {
                    "sitemap" => {
                        if let Some(loc) = index_builder.loc.take() {
                            if let Ok(loc) = Url::parse(&loc, None) {
                                index_entries.push(SitemapIndexEntry {
                                    loc,
                                    lastmod: index_builder.lastmod.take(),
                                });
                            }
                        }
                        index_builder = IndexEntryBuilder::default();
                    }
                    "url" => {
                        if let Some(loc) = url_builder.loc.take() {
                            if let Ok(loc) = Url::parse(&loc, None) {
                                url_entries.push(SitemapUrlEntry {
                                    loc,
                                    lastmod: url_builder.lastmod.take(),
                                    changefreq: url_builder.changefreq.take(),
                                    priority: url_builder.priority.take(),
                                    news: url_builder.news.take(),
                                });
                            }
                        }
                        url_builder = UrlEntryBuilder::default();
                    }
                    "news" => url_builder.in_news = false,
                    _ => {}
                }
                stack.pop();
            }
            Event::Text(e) => {
                let text = e.unescape()?.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                let Some(leaf) = stack.last().map(|s| s.as_str()) else {
                    continue;
                };
                if is_index {
                    match leaf {
                        "loc" => index_builder.loc = Some(text),
                        "lastmod" => index_builder.lastmod = Some(text),
                        _ => {}
                    }
                } else if url_builder.in_news {
                    let news = url_builder.news.get_or_insert_with(NewsEntry::default);
                    match leaf {
                        "title" => news.title = Some(text),
                        "name" => news.name = Some(text),
                        "language" => news.language = Some(text),
                        "publication_date" => news.publication_date = Some(text),
                        "keywords" => news.keywords = Some(text),
                        _ => {}
                    }
                } else {
                    match leaf {
                        "loc" => url_builder.loc = Some(text),
                        "lastmod" => url_builder.lastmod = Some(text),
                        "changefreq" => url_builder.changefreq = Some(text),
                        "priority" => url_builder.priority = Some(text),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(CrawlError::MalformedXml("empty document".to_string()));
    }

    if is_index {
        let has_lastmod = index_entries.iter().any(|e| e.lastmod.is_some());
        if has_lastmod {
            index_entries.sort_by(|a, b| a.lastmod.cmp(&b.lastmod));
        }
        Ok(SitemapDoc::Index {
            entries: index_entries,
            has_lastmod,
        })
    } else {
        Ok(SitemapDoc::UrlSet {
            entries: url_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_index_sorted_by_lastmod() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sitemap><loc>https://example.com/a.xml</loc><lastmod>2024-01-01</lastmod></sitemap>
            <sitemap><loc>https://example.com/b.xml</loc><lastmod>2023-01-01</lastmod></sitemap>
        </sitemapindex>"#;
        match parse_sitemap(xml).unwrap() {
            SitemapDoc::Index { entries, has_lastmod } => {
                assert!(has_lastmod);
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].loc.path(), "/b.xml");
                assert_eq!(entries[1].loc.path(), "/a.xml");
            }
            _ => panic!("expected index"),
        }
    }

    #[test]
    fn parses_urlset_in_insertion_order() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <url><loc>https://example.com/1</loc></url>
            <url><loc>https://example.com/2</loc><changefreq>daily</changefreq></url>
        </urlset>"#;
        match parse_sitemap(xml).unwrap() {
            SitemapDoc::UrlSet { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].loc.path(), "/1");
                assert_eq!(entries[1].loc.path(), "/2");
                assert_eq!(entries[1].changefreq.as_deref(), Some("daily"));
            }
            _ => panic!("expected urlset"),
        }
    }

    #[test]
    fn parses_news_extension() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
            xmlns:news="http://www.google.com/schemas/sitemap-news/0.9">
            <url>
                <loc>https://example.com/story</loc>
                <news:news>
                    <news:publication>
                        <news:name>Example Times</news:name>
                        <news:language>en</news:language>
                    </news:publication>
                    <news:publication_date>2024-05-01</news:publication_date>
                    <news:title>Big story</news:title>
                    <news:keywords>news, example</news:keywords>
                </news:news>
            </url>
        </urlset>"#;
        match parse_sitemap(xml).unwrap() {
            SitemapDoc::UrlSet { entries } => {
                assert_eq!(entries.len(), 1);
                let news = entries[0].news.as_ref().unwrap();
                assert_eq!(news.name.as_deref(), Some("Example Times"));
                assert_eq!(news.title.as_deref(), Some("Big story"));
            }
            _ => panic!("expected urlset"),
        }
    }

    #[test]
    fn unsupported_root_errors() {
        let xml = r#"<rss><channel></channel></rss>"#;
        let err = parse_sitemap(xml).unwrap_err();
        assert!(matches!(err, CrawlError::UnsupportedSitemap(tag) if tag == "rss"));
    }
}
