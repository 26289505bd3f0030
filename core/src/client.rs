use std::time::Duration;

use chardetng::EncodingDetector;
use lazy_static::lazy_static;
use reqwest::{header, Client};
use time::format_description::FormatItem;
use time::OffsetDateTime;

use crate::error::{CrawlError, Result};
use crate::page::{Head, ParserKind};
use crate::url::Url;

lazy_static! {
    /// IMF-fixdate, the only legal `Last-Modified`/`If-Modified-Since` form
    /// per RFC 9110 (`Sat, 06 Nov 1994 08:49:37 GMT`).
    static ref HTTP_DATE: Vec<FormatItem<'static>> = time::format_description::parse(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    )
    .expect("static HTTP date format is well-formed");
}

const MAX_REDIRECTS: u32 = 5;

pub struct FetchClient {
    strict: Client,
    relaxed: Client,
}

impl FetchClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let strict = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        let relaxed = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(FetchClient { strict, relaxed })
    }

    fn client(&self, without_ssl: bool) -> &Client {
        if without_ssl {
            &self.relaxed
        } else {
            &self.strict
        }
    }

    fn build_headers(
        &self,
        kind: ParserKind,
        referrer: Option<&Url>,
        if_modified_since: Option<OffsetDateTime>,
    ) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(
            header::ACCEPT_ENCODING,
            header::HeaderValue::from_static("br, gzip, deflate"),
        );
        headers.insert(
            header::HeaderName::from_static("sec-ch-ua"),
            header::HeaderValue::from_static(
                "\"Not A(Brand\";v=\"99\", \"Chromium\";v=\"121\"",
            ),
        );
        headers.insert(
            header::HeaderName::from_static("sec-ch-ua-mobile"),
            header::HeaderValue::from_static("?0"),
        );
        headers.insert(
            header::HeaderName::from_static("sec-ch-ua-platform"),
            header::HeaderValue::from_static("\"Linux\""),
        );
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            header::HeaderValue::from_static("1"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(match kind {
                ParserKind::Web => "text/html;q=1, application/xhtml+xml;q=0.9, */*;q=0.8",
                ParserKind::Sitemap => "application/xml;q=1, application/xhtml+xml;q=0.9",
                ParserKind::Robots => "text/plain",
            }),
        );
        if let Some(r) = referrer {
            if let Ok(v) = header::HeaderValue::from_str(&r.as_str()) {
                headers.insert(header::REFERER, v);
            }
        }
        if let Some(date) = if_modified_since {
            if let Ok(formatted) = date.format(&HTTP_DATE) {
                if let Ok(v) = header::HeaderValue::from_str(&formatted) {
                    headers.insert(header::IF_MODIFIED_SINCE, v);
                }
            }
        }
        headers
    }

    fn read_head(resp: &reqwest::Response) -> (Head, Option<OffsetDateTime>) {
        let get = |name: header::HeaderName| -> Option<String> {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let last_modified = get(header::LAST_MODIFIED).and_then(|raw| {
            time::PrimitiveDateTime::parse(&raw, &HTTP_DATE)
                .ok()
                .map(|d| d.assume_utc())
        });
        let head = Head {
            content_type: get(header::CONTENT_TYPE),
            content_length: get(header::CONTENT_LENGTH).and_then(|v| v.parse().ok()),
            cache_control: get(header::CACHE_CONTROL),
            expires: get(header::EXPIRES),
            etag: get(header::ETAG),
            server: get(header::SERVER),
        };
        (head, last_modified)
    }

    /// Issues a HEAD request. A 304 surfaces as `CrawlError::NotModified`; a
    /// 3xx with no `Location`, or any 4xx/5xx, surfaces as `HttpStatus`. A 3xx
    /// with a `Location` does not retry the HEAD — it rewrites the URL and
    /// falls through to a full GET, exactly as a redirected `download()`
    /// would, since a HEAD redirect target may not itself answer HEAD.
    pub async fn head(
        &self,
        start_url: &Url,
        kind: ParserKind,
        referrer: Option<&Url>,
        if_modified_since: Option<OffsetDateTime>,
        without_ssl: bool,
    ) -> Result<(Url, Head, Option<OffsetDateTime>)> {
        let headers = self.build_headers(kind, referrer, if_modified_since);
        let resp = self
            .client(without_ssl)
            .head(start_url.as_str())
            .headers(headers)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            let (head, last_modified) = Self::read_head(&resp);
            return Ok((start_url.clone(), head, last_modified));
        }
        if status.as_u16() == 304 {
            return Err(CrawlError::NotModified);
        }
        if status.is_redirection() {
            let location = resp
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| CrawlError::HttpStatus(status.as_u16()))?;
            let new_url = Url::parse(location, Some(start_url))?;
            let (final_url, head, last_modified, _text) = self
                .get_text(&new_url, kind, referrer, if_modified_since, without_ssl)
                .await?;
            return Ok((final_url, head, last_modified));
        }
        Err(CrawlError::HttpStatus(status.as_u16()))
    }

    /// Issues a GET request with the same redirect/304 handling as `head`,
    /// and returns the final URL, head, last-modified, and raw response
    /// bytes, undecoded. Callers that already know the body is text (robots,
    /// sitemaps) should prefer `get_text`; callers that need to classify the
    /// body by content-type first (a web target, which may turn out to be a
    /// non-text download) should call this directly.
    pub async fn get_bytes(
        &self,
        start_url: &Url,
        kind: ParserKind,
        referrer: Option<&Url>,
        if_modified_since: Option<OffsetDateTime>,
        without_ssl: bool,
    ) -> Result<(Url, Head, Option<OffsetDateTime>, Vec<u8>)> {
        let mut url = start_url.clone();
        for _ in 0..=MAX_REDIRECTS {
            let headers = self.build_headers(kind, referrer, if_modified_since);
            let resp = self
                .client(without_ssl)
                .get(url.as_str())
                .headers(headers)
                .send()
                .await?;
            let status = resp.status();
            if status.as_u16() == 304 {
                return Err(CrawlError::NotModified);
            }
            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| CrawlError::HttpStatus(status.as_u16()))?;
                url = Url::parse(location, Some(&url))?;
                continue;
            }
            if !status.is_success() {
                return Err(CrawlError::HttpStatus(status.as_u16()));
            }
            let (head, last_modified) = Self::read_head(&resp);
            let bytes = resp.bytes().await?.to_vec();
            return Ok((url, head, last_modified, bytes));
        }
        Err(CrawlError::HttpStatus(310))
    }

    /// Issues a GET request and decodes the body according to its declared
    /// (or detected) charset, regardless of content-type. Used for targets
    /// known ahead of time to be text (robots.txt, sitemap XML).
    pub async fn get_text(
        &self,
        start_url: &Url,
        kind: ParserKind,
        referrer: Option<&Url>,
        if_modified_since: Option<OffsetDateTime>,
        without_ssl: bool,
    ) -> Result<(Url, Head, Option<OffsetDateTime>, String)> {
        let (url, head, last_modified, bytes) = self
            .get_bytes(start_url, kind, referrer, if_modified_since, without_ssl)
            .await?;
        let text = decode_text(&bytes, head.content_type.as_deref());
        Ok((url, head, last_modified, text))
    }
}

/// Decodes `bytes` as text, using the response's declared `charset=` when
/// present and valid, falling back to `chardetng`'s detection otherwise.
pub fn decode_text(bytes: &[u8], content_type: Option<&str>) -> String {
    let declared_charset = content_type
        .and_then(|ct| ct.split("charset=").nth(1))
        .map(|c| c.trim().trim_matches('"').to_string());
    if let Some(label) = &declared_charset {
        if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
            let (text, _, had_errors) = encoding.decode(bytes);
            if !had_errors {
                return text.into_owned();
            }
        }
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Whether a response's content-type should be decoded as text (html, xml,
/// json, css, javascript, or any other `text/*`) rather than kept as raw
/// bytes. A missing content-type defaults to text, matching the page
/// kinds (robots, sitemap) that never carry one reliably.
pub fn is_text_content(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text")
                || ct.contains("html")
                || ct.contains("xml")
                || ct.contains("json")
                || ct.contains("css")
                || ct.contains("javascript")
        }
    }
}
