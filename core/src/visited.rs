use parking_lot::Mutex;

use crate::page::PageState;
use crate::url::Url;

/// An append-only record of every page seen so far.
///
/// Deliberately a linear `Vec` scan rather than a hashed index: duplicate
/// and near-duplicate checks need to compare against every prior page's
/// content hash or simhash, not just one keyed by URL, so a hash map over
/// URLs wouldn't save the scan anyway.
pub struct VisitedSet {
    items: Mutex<Vec<PageState>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        VisitedSet {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn contains_url(&self, url: &Url) -> bool {
        self.items.lock().iter().any(|p| p.url() == url)
    }

    pub fn contains_duplicate(&self, page: &PageState) -> bool {
        self.items
            .lock()
            .iter()
            .any(|p| p.duplicate(page).unwrap_or(false))
    }

    pub fn contains_near_duplicate(&self, page: &PageState, max_dist: u32, size: u32) -> bool {
        self.items
            .lock()
            .iter()
            .any(|p| p.near_duplicate(page, max_dist, size).unwrap_or(false))
    }

    /// Appends `page`, unless a page with the same URL is already present.
    /// Returns whether the page was inserted.
    pub fn insert(&self, page: PageState) -> bool {
        let mut items = self.items.lock();
        if items.iter().any(|p| p.url() == page.url()) {
            return false;
        }
        items.push(page);
        true
    }

    pub fn reset(&self) {
        self.items.lock().clear();
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ParserKind;

    fn page(url: &str) -> PageState {
        PageState::new(Url::parse(url, None).unwrap(), ParserKind::Web, None)
    }

    #[test]
    fn insert_rejects_same_url_twice() {
        let set = VisitedSet::new();
        assert!(set.insert(page("https://example.com/a")));
        assert!(!set.insert(page("https://example.com/a")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn contains_url_matches_normalized_equality() {
        let set = VisitedSet::new();
        set.insert(page("https://example.com/a/"));
        assert!(set.contains_url(&Url::parse("https://example.com/a", None).unwrap()));
    }

    #[test]
    fn contains_duplicate_checks_content_hash() {
        let set = VisitedSet::new();
        let mut a = page("https://example.com/a");
        a.set_text("same content".to_string()).unwrap();
        set.insert(a);

        let mut b = page("https://example.com/b");
        b.set_text("same content".to_string()).unwrap();
        assert!(set.contains_duplicate(&b));
    }
}
