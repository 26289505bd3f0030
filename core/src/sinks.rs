use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CrawlError, Result};
use crate::page::PageState;

/// The description/keywords/author/language quartet the spec nests under
/// `meta` in the persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub description: String,
    pub keywords: Option<String>,
    pub author: String,
    pub language: String,
}

/// The extracted, flattened record of a crawled HTML page, as handed to a
/// sink for durable storage. Field names follow the persistence schema the
/// core engine promises sinks: `url, domain, name, titles, text, figcapt,
/// links, canonical_url, meta, visited, lastmod, timestamp_utc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub url: String,
    pub domain: String,
    pub name: String,
    pub titles: String,
    pub text: String,
    pub figcapt: String,
    pub links: Vec<String>,
    pub canonical_url: Option<String>,
    pub meta: DocumentMeta,
    /// Always `true` — a record only ever gets built for a page that made it
    /// through the worker's duplicate check and was handed to a sink.
    pub visited: bool,
    pub lastmod: Option<i64>,
    pub timestamp_utc: i64,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collapse_whitespace_all(parts: &[String]) -> String {
    collapse_whitespace(&parts.join(" "))
}

impl DocumentRecord {
    /// Builds a record from an already-downloaded, already-parsed HTML
    /// page. `visited_at` is the caller's clock reading (the crate doesn't
    /// read the system clock itself, so tests can control it).
    pub fn from_page(page: &PageState, visited_at: OffsetDateTime) -> Result<Self> {
        let doc = page.html()?;
        let meta = doc.metadata();
        Ok(DocumentRecord {
            url: page.url().as_str(),
            domain: page.url().host().to_string(),
            name: collapse_whitespace(&doc.page_title().unwrap_or_default()),
            titles: collapse_whitespace_all(&doc.headings()),
            text: collapse_whitespace_all(&doc.paragraph_text()),
            figcapt: collapse_whitespace_all(&doc.figcaptions()),
            links: page.links().iter().map(|u| u.as_str()).collect(),
            canonical_url: page.canonical_url().map(|u| u.as_str()),
            meta: DocumentMeta {
                description: meta.description,
                keywords: meta.keywords,
                author: meta.author,
                language: meta.language,
            },
            visited: true,
            lastmod: page.last_modified().map(|d| d.unix_timestamp()),
            timestamp_utc: visited_at.unix_timestamp(),
        })
    }
}

/// Where an extracted document or raw file ends up. Implementations are
/// constructed by the binary, not by `core` — the crate only needs the
/// trait object to hand finished pages off to.
#[async_trait]
pub trait ExtractorSink: Send + Sync {
    async fn store_document(&self, record: DocumentRecord) -> Result<()>;
    async fn store_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<()>;
}

/// Persists `DocumentRecord`s keyed by URL in an embedded `sled` database.
pub struct DocumentStoreSink {
    db: sled::Db,
}

impl DocumentStoreSink {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(DocumentStoreSink { db })
    }

    pub fn get(&self, url: &str) -> Result<Option<DocumentRecord>> {
        match self.db.get(url.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ExtractorSink for DocumentStoreSink {
    async fn store_document(&self, record: DocumentRecord) -> Result<()> {
        let bytes = bincode::serialize(&record)?;
        self.db.insert(record.url.as_bytes(), bytes)?;
        Ok(())
    }

    async fn store_bytes(&self, _file_name: &str, _bytes: &[u8]) -> Result<()> {
        Err(CrawlError::Storage(
            "DocumentStoreSink only stores parsed documents".to_string(),
        ))
    }
}

/// Dumps raw bytes to disk, one file per document, named after the URL's
/// final path segment.
pub struct FileStoreSink {
    out_dir: PathBuf,
}

impl FileStoreSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        FileStoreSink {
            out_dir: out_dir.into(),
        }
    }
}

#[async_trait]
impl ExtractorSink for FileStoreSink {
    async fn store_document(&self, record: DocumentRecord) -> Result<()> {
        let path = self.out_dir.join(format!("{}.json", sanitize(&record.url)));
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn store_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.out_dir.join(sanitize(file_name));
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ParserKind;
    use crate::url::Url;

    #[test]
    fn document_record_from_page_collapses_whitespace() {
        let mut page = PageState::new(
            Url::parse("https://example.com/a", None).unwrap(),
            ParserKind::Web,
            None,
        );
        page.set_text(
            "<html><head><title>  Hi   There </title></head><body><p>one\n two</p></body></html>"
                .to_string(),
        )
        .unwrap();
        let now = OffsetDateTime::UNIX_EPOCH;
        let record = DocumentRecord::from_page(&page, now).unwrap();
        assert_eq!(record.name, "Hi There");
        assert_eq!(record.text, "one two");
        assert!(record.visited);
    }

    #[tokio::test]
    async fn document_store_round_trips_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DocumentStoreSink::open(dir.path()).unwrap();
        let record = DocumentRecord {
            url: "https://example.com/a".to_string(),
            domain: "example.com".to_string(),
            name: "t".to_string(),
            titles: String::new(),
            text: String::new(),
            figcapt: String::new(),
            links: vec![],
            canonical_url: None,
            meta: DocumentMeta::default(),
            visited: true,
            lastmod: None,
            timestamp_utc: 0,
        };
        sink.store_document(record.clone()).await.unwrap();
        let fetched = sink.get(&record.url).unwrap().unwrap();
        assert_eq!(fetched.url, record.url);
    }
}
