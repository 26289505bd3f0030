use std::hash::{Hash, Hasher};

use crate::error::{CrawlError, Result};

/// A normalized, domain-keyed web address.
///
/// Equality and hashing only consider `host`, `path`, and `query` — the
/// fragment is dropped on construction and the scheme is always coerced to
/// `https`, so two URLs that differ only by fragment or by an `http`/`https`
/// scheme compare equal.
#[derive(Debug, Clone)]
pub struct Url {
    host: String,
    path: String,
    query: Option<String>,
}

impl Url {
    /// Parses `raw` as an absolute URL, or resolves it against `base` when it
    /// has neither a scheme nor a host (a relative reference).
    ///
    /// A single trailing `/` is stripped before parsing, matching
    /// `URL.__init__`'s `url.rstrip('/')`.
    pub fn parse(raw: &str, base: Option<&Url>) -> Result<Self> {
        let trimmed = raw.strip_suffix('/').unwrap_or(raw);

        let parsed = match url::Url::parse(trimmed) {
            Ok(u) => u,
            Err(_) => {
                let base = base.ok_or_else(|| CrawlError::MalformedUrl(raw.to_string()))?;
                base.as_url()
                    .join(trimmed)
                    .map_err(|_| CrawlError::MalformedUrl(raw.to_string()))?
            }
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| CrawlError::MalformedUrl(raw.to_string()))?
            .to_string();
        if host.is_empty() {
            return Err(CrawlError::MalformedUrl(raw.to_string()));
        }

        let query = parsed.query().map(|q| q.to_string());
        Ok(Url {
            host,
            path: parsed.path().to_string(),
            query,
        })
    }

    fn as_url(&self) -> url::Url {
        let mut s = format!("https://{}{}", self.host, self.path);
        if let Some(q) = &self.query {
            s.push('?');
            s.push_str(q);
        }
        url::Url::parse(&s).expect("Url invariants guarantee a parseable https URL")
    }

    /// The full absolute URL string, e.g. `https://example.com/a?b=c`.
    pub fn as_str(&self) -> String {
        self.as_url().to_string()
    }

    /// `scheme://host`, with no path or query.
    pub fn origin(&self) -> String {
        format!("https://{}", self.host)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The lowercased file extension of the path, e.g. `.html`, or `""` when
    /// the path has no extension.
    pub fn file_extension(&self) -> String {
        let file_name = self.path.rsplit('/').next().unwrap_or("");
        match file_name.rfind('.') {
            Some(idx) if idx > 0 => file_name[idx..].to_lowercase(),
            _ => String::new(),
        }
    }

    /// The file stem (name without extension) of the final path segment.
    pub fn file_stem(&self) -> String {
        let file_name = self.path.rsplit('/').next().unwrap_or("");
        match file_name.rfind('.') {
            Some(idx) if idx > 0 => file_name[..idx].to_string(),
            _ => file_name.to_string(),
        }
    }

    pub fn same_host(&self, other: &Url) -> bool {
        self.host == other.host
    }
}

impl PartialEq for Url {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.path == other.path && self.query == other.query
    }
}

impl Eq for Url {}

impl Hash for Url {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.path.hash(state);
        self.query.hash(state);
    }
}

impl std::fmt::Display for Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_ignored() {
        let a = Url::parse("https://example.com/a", None).unwrap();
        let b = Url::parse("https://example.com/a/", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn scheme_is_coerced_to_https() {
        let u = Url::parse("http://example.com/", None).unwrap();
        assert_eq!(u.origin(), "https://example.com");
    }

    #[test]
    fn fragment_is_ignored_in_equality() {
        let a = Url::parse("https://example.com/a#section", None).unwrap();
        let b = Url::parse("https://example.com/a", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn relative_reference_requires_base() {
        let err = Url::parse("/a/b", None);
        assert!(err.is_err());
    }

    #[test]
    fn relative_reference_resolves_against_base() {
        let base = Url::parse("https://example.com/x/y", None).unwrap();
        let resolved = Url::parse("/a/b", Some(&base)).unwrap();
        assert_eq!(resolved.origin(), "https://example.com");
        assert_eq!(resolved.path(), "/a/b");
    }

    #[test]
    fn file_extension_and_stem() {
        let u = Url::parse("https://example.com/dir/page.HTML", None).unwrap();
        assert_eq!(u.file_extension(), ".html");
        assert_eq!(u.file_stem(), "page");
    }

    #[test]
    fn round_trip_parse_then_display() {
        let u = Url::parse("https://example.com/a?b=c", None).unwrap();
        let reparsed = Url::parse(&u.as_str(), None).unwrap();
        assert_eq!(u, reparsed);
    }
}
