use lazy_static::lazy_static;
use scraper::{Html, Selector};

use crate::url::Url;

lazy_static! {
    static ref SEL_HTML: Selector = Selector::parse("html").unwrap();
    static ref SEL_TITLE: Selector = Selector::parse("head title").unwrap();
    static ref SEL_HEADINGS: Selector = Selector::parse("h1, h2, h3").unwrap();
    static ref SEL_PARAGRAPHS: Selector = Selector::parse("p").unwrap();
    static ref SEL_ARTICLE_HEADINGS: Selector =
        Selector::parse("article h1, article h2, article h3, [class*=\"article\"] h1, [class*=\"article\"] h2, [class*=\"article\"] h3").unwrap();
    static ref SEL_ARTICLE_PARAGRAPHS: Selector =
        Selector::parse("article p, [class*=\"article\"] p").unwrap();
    static ref SEL_FIGCAPTION: Selector = Selector::parse("figcaption").unwrap();
    static ref SEL_CANONICAL: Selector = Selector::parse("link[rel=\"canonical\"]").unwrap();
    static ref SEL_META_DESCRIPTION: Selector = Selector::parse("meta[name=\"description\"]").unwrap();
    static ref SEL_META_KEYWORDS: Selector = Selector::parse("meta[name=\"keywords\"]").unwrap();
    static ref SEL_META_AUTHOR: Selector = Selector::parse("meta[name=\"author\"]").unwrap();
    static ref SEL_ANCHOR: Selector = Selector::parse("a[href]").unwrap();
}

#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    pub description: String,
    pub keywords: Option<String>,
    pub author: String,
    pub language: String,
}

/// Parses an HTML document and exposes the tree queries the worker and the
/// document-store sink need.
pub struct HtmlDoc {
    doc: Html,
    raw: String,
}

/// Strips a leading `<?xml ...?>` or `<!--?xml ...?-->` declaration, which
/// `scraper`'s underlying parser chokes on otherwise.
fn strip_xml_declaration(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix("<!--?xml") {
        if let Some(end) = rest.find("?-->") {
            return rest[end + 4..].trim_start();
        }
    } else if let Some(rest) = text.strip_prefix("<?xml") {
        if let Some(end) = rest.find("?>") {
            return rest[end + 2..].trim_start();
        }
    }
    text
}

impl HtmlDoc {
    pub fn parse(text: &str) -> Self {
        let cleaned = strip_xml_declaration(text);
        HtmlDoc {
            doc: Html::parse_document(cleaned),
            raw: cleaned.to_string(),
        }
    }

    /// Whether the source markup itself contains an `<html>` tag.
    ///
    /// `scraper`'s tree construction (like any HTML5 parser) always
    /// synthesizes an `<html><head></head><body>...</body></html>` wrapper
    /// around whatever it's given, so querying the parsed tree for an
    /// `html` element would always return true, even over plain text. This
    /// checks the raw source instead, matching `lxml.html.fromstring`'s
    /// lenient (non-synthesizing) behavior in the original implementation.
    pub fn is_html(&self) -> bool {
        self.raw.to_ascii_lowercase().contains("<html")
    }

    pub fn page_title(&self) -> Option<String> {
        self.doc
            .select(&SEL_TITLE)
            .next()
            .map(|el| el.text().collect::<String>())
    }

    pub fn headings(&self) -> Vec<String> {
        self.doc
            .select(&SEL_HEADINGS)
            .map(|el| el.text().collect::<String>())
            .collect()
    }

    pub fn paragraph_text(&self) -> Vec<String> {
        self.doc
            .select(&SEL_PARAGRAPHS)
            .map(|el| el.text().collect::<String>())
            .collect()
    }

    pub fn article_headings(&self) -> Vec<String> {
        self.doc
            .select(&SEL_ARTICLE_HEADINGS)
            .map(|el| el.text().collect::<String>())
            .collect()
    }

    pub fn article_text(&self) -> Vec<String> {
        self.doc
            .select(&SEL_ARTICLE_PARAGRAPHS)
            .map(|el| el.text().collect::<String>())
            .collect()
    }

    pub fn figcaptions(&self) -> Vec<String> {
        self.doc
            .select(&SEL_FIGCAPTION)
            .map(|el| el.text().collect::<String>())
            .collect()
    }

    pub fn canonical_url(&self) -> Option<Url> {
        let href = self
            .doc
            .select(&SEL_CANONICAL)
            .next()
            .and_then(|el| el.value().attr("href"))?;
        Url::parse(href, None).ok()
    }

    pub fn metadata(&self) -> PageMetadata {
        let description = self
            .doc
            .select(&SEL_META_DESCRIPTION)
            .next()
            .and_then(|el| el.value().attr("content"))
            .unwrap_or("")
            .to_string();
        let keywords = self
            .doc
            .select(&SEL_META_KEYWORDS)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.to_string());
        let author = self
            .doc
            .select(&SEL_META_AUTHOR)
            .next()
            .and_then(|el| el.value().attr("content"))
            .unwrap_or("")
            .to_string();
        let language = self
            .doc
            .select(&SEL_HTML)
            .next()
            .and_then(|el| el.value().attr("lang"))
            .unwrap_or("")
            .to_string();
        PageMetadata {
            description,
            keywords,
            author,
            language,
        }
    }

    /// Every `<a href>` on the page, resolved against `base_url`. A lone `/`
    /// is dropped (it always resolves back to the domain root and is not a
    /// useful outbound link); malformed hrefs are silently skipped.
    pub fn links(&self, base_url: &Url) -> Vec<Url> {
        let mut out = Vec::new();
        for el in self.doc.select(&SEL_ANCHOR) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            if href == "/" {
                continue;
            }
            if let Ok(u) = Url::parse(href, Some(base_url)) {
                out.push(u);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_html_root() {
        let doc = HtmlDoc::parse("<html><body>hi</body></html>");
        assert!(doc.is_html());
    }

    #[test]
    fn non_html_has_no_root() {
        let doc = HtmlDoc::parse("just some text, no markup here");
        assert!(!doc.is_html());
    }

    #[test]
    fn extracts_title_and_headings() {
        let doc = HtmlDoc::parse(
            "<html><head><title>Hi</title></head><body><h1>One</h1><h4>Skip</h4></body></html>",
        );
        assert_eq!(doc.page_title().as_deref(), Some("Hi"));
        assert_eq!(doc.headings(), vec!["One".to_string()]);
    }

    #[test]
    fn article_scoping_by_tag_and_class() {
        let doc = HtmlDoc::parse(
            "<html><body><article><p>in article</p></article><div class=\"post-article\"><p>in div</p></div><p>outside</p></body></html>",
        );
        let text = doc.article_text();
        assert_eq!(text.len(), 2);
        assert!(text.contains(&"in article".to_string()));
        assert!(text.contains(&"in div".to_string()));
    }

    #[test]
    fn canonical_and_metadata() {
        let doc = HtmlDoc::parse(
            r#"<html lang="en"><head>
                <link rel="canonical" href="https://example.com/canon">
                <meta name="description" content="desc">
                <meta name="author" content="me">
            </head><body></body></html>"#,
        );
        let canon = doc.canonical_url().unwrap();
        assert_eq!(canon.host(), "example.com");
        let meta = doc.metadata();
        assert_eq!(meta.description, "desc");
        assert_eq!(meta.author, "me");
        assert_eq!(meta.language, "en");
    }

    #[test]
    fn links_drops_lone_slash_and_skips_malformed() {
        let base = Url::parse("https://example.com/page", None).unwrap();
        let doc = HtmlDoc::parse(
            r#"<html><body><a href="/">root</a><a href="/a">a</a><a href="http://">bad</a></body></html>"#,
        );
        let links = doc.links(&base);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].path(), "/a");
    }

    #[test]
    fn strips_leading_xml_declaration() {
        let doc = HtmlDoc::parse("<?xml version=\"1.0\"?><html><body>ok</body></html>");
        assert!(doc.is_html());
    }
}
