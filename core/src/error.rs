use thiserror::Error;

/// Error taxonomy for the crawl engine: every fallible operation across the
/// fetcher, parsers, and sinks resolves to one of these.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("not modified")]
    NotModified,

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    #[error("TLS verification failed")]
    TlsVerifyFailure,

    #[error("failed to decode response body")]
    EncodingFailure,

    #[error("operation requires a downloaded body first")]
    MissingDownload,

    #[error("unsupported sitemap root element: {0}")]
    UnsupportedSitemap(String),

    #[error("malformed XML: {0}")]
    MalformedXml(String),

    #[error("wrong parser for content type {0}")]
    WrongParserForContentType(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, CrawlError>;

impl From<reqwest::Error> for CrawlError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CrawlError::Timeout
        } else if e.is_connect() && is_tls_verify_error(&e) {
            CrawlError::TlsVerifyFailure
        } else {
            CrawlError::ConnectionFailure(e.to_string())
        }
    }
}

/// `reqwest`/rustls don't expose a typed "certificate verification failed"
/// variant through the public API, so the underlying error chain is
/// inspected for the wording rustls/webpki use for that specific failure
/// (as opposed to e.g. DNS or refused-connection errors, which should stay
/// `ConnectionFailure` and not trigger a TLS-relaxed retry).
fn is_tls_verify_error(e: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = e.source();
    while let Some(err) = source {
        let msg = err.to_string().to_ascii_lowercase();
        if msg.contains("certificate") || msg.contains("invalid peer certificate") || msg.contains("unknownissuer") {
            return true;
        }
        source = err.source();
    }
    false
}

impl From<quick_xml::Error> for CrawlError {
    fn from(e: quick_xml::Error) -> Self {
        CrawlError::MalformedXml(e.to_string())
    }
}

impl From<sled::Error> for CrawlError {
    fn from(e: sled::Error) -> Self {
        CrawlError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for CrawlError {
    fn from(e: bincode::Error) -> Self {
        CrawlError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(e: std::io::Error) -> Self {
        CrawlError::Storage(e.to_string())
    }
}
