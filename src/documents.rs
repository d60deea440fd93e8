//! =============================================================================
//! Open Document Pool
//! =============================================================================
//!
//! Tracks the latest text for every buffer the editor has open. Completion
//! requests attach a snapshot of all *other* open documents as context, so the
//! pool is the single owner of document content and only ever hands out
//! clones.

use std::sync::{Mutex, MutexGuard, PoisonError};

use url::Url;

/// Snapshot of one open buffer. Content is replaced wholesale on every change
/// notification; there is no incremental diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub url: Url,
    pub relative_path: String,
    pub content: String,
}

/// Insertion-ordered set of open documents keyed by URL.
///
/// Every operation locks the whole pool, so each document's fields are always
/// observed as a unit and racing editor-event sources cannot interleave a
/// partial update.
#[derive(Debug, Default)]
pub struct DocumentPool {
    docs: Mutex<Vec<OpenDocument>>,
}

impl DocumentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `url`. A re-open of a known URL keeps
    /// its original position in the context ordering.
    pub fn open(&self, url: Url, relative_path: String, content: String) {
        self.upsert(url, relative_path, content);
    }

    /// Replaces the content for `url`. Updating a never-opened document simply
    /// opens it; editors routinely deliver change events for buffers whose
    /// open event raced ahead of service construction.
    pub fn update(&self, url: Url, relative_path: String, content: String) {
        self.upsert(url, relative_path, content);
    }

    /// Removes the entry for `url`; closing an unknown URL is a no-op.
    pub fn close(&self, url: &Url) {
        self.lock().retain(|doc| doc.url != *url);
    }

    /// Snapshot of all open documents except `excluding`, in insertion order.
    pub fn other_documents(&self, excluding: &Url) -> Vec<OpenDocument> {
        self.lock()
            .iter()
            .filter(|doc| doc.url != *excluding)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn upsert(&self, url: Url, relative_path: String, content: String) {
        let mut docs = self.lock();
        if let Some(existing) = docs.iter_mut().find(|doc| doc.url == url) {
            existing.relative_path = relative_path;
            existing.content = content;
        } else {
            docs.push(OpenDocument {
                url,
                relative_path,
                content,
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OpenDocument>> {
        self.docs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(name: &str) -> Url {
        Url::parse(&format!("file:///project/{name}")).unwrap()
    }

    fn pool_with(names: &[&str]) -> DocumentPool {
        let pool = DocumentPool::new();
        for name in names {
            pool.open(url(name), name.to_string(), format!("content of {name}"));
        }
        pool
    }

    #[test]
    fn other_documents_excludes_the_target() {
        let pool = pool_with(&["a.rs", "b.rs", "c.rs"]);
        let others = pool.other_documents(&url("b.rs"));
        let paths: Vec<_> = others.iter().map(|d| d.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "c.rs"]);
    }

    #[test]
    fn other_documents_reflects_latest_update() {
        let pool = pool_with(&["a.rs", "b.rs"]);
        pool.update(url("b.rs"), "b.rs".to_string(), "updated".to_string());
        let others = pool.other_documents(&url("a.rs"));
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].content, "updated");
    }

    #[test]
    fn update_on_never_opened_url_opens_it() {
        let pool = DocumentPool::new();
        pool.update(url("late.rs"), "late.rs".to_string(), "hello".to_string());
        let others = pool.other_documents(&url("other.rs"));
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].content, "hello");
    }

    #[test]
    fn close_is_idempotent() {
        let pool = pool_with(&["a.rs"]);
        pool.close(&url("a.rs"));
        pool.close(&url("a.rs"));
        pool.close(&url("never-opened.rs"));
        assert!(pool.is_empty());
    }

    #[test]
    fn reopen_keeps_insertion_order() {
        let pool = pool_with(&["a.rs", "b.rs", "c.rs"]);
        pool.open(url("a.rs"), "a.rs".to_string(), "fresh".to_string());
        let others = pool.other_documents(&url("z.rs"));
        let paths: Vec<_> = others.iter().map(|d| d.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "b.rs", "c.rs"]);
        assert_eq!(others[0].content, "fresh");
    }
}
