//! In-memory tag storage for tests and previews.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{TagBackend, TagError, TagResult, TagStore};

type TagMap = HashMap<String, String>;

/// Tags held in memory. Keys are case-insensitive like Vorbis comments.
#[derive(Debug, Clone, Default)]
pub struct MemoryTagStore {
    path: PathBuf,
    tags: TagMap,
    shared: Option<Arc<Mutex<HashMap<PathBuf, TagMap>>>>,
}

impl MemoryTagStore {
    /// Empty store for `path`, not backed by anything.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl TagStore for MemoryTagStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &str) -> Option<String> {
        self.tags.get(&key.to_uppercase()).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.tags.insert(key.to_uppercase(), value);
    }

    fn save(&mut self) -> TagResult<()> {
        if let Some(shared) = &self.shared {
            shared.lock().insert(self.path.clone(), self.tags.clone());
        }
        Ok(())
    }
}

/// Backend serving [`MemoryTagStore`]s for registered paths.
///
/// Unregistered paths are reported as unsupported formats. Saved stores
/// write back into the backend, so later opens see the new tags.
#[derive(Debug, Clone, Default)]
pub struct MemoryTagBackend {
    files: Arc<Mutex<HashMap<PathBuf, TagMap>>>,
    save_count: Arc<Mutex<usize>>,
}

impl MemoryTagBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a taggable file with initial tags.
    pub fn insert(&self, path: impl Into<PathBuf>, tags: &[(&str, &str)]) {
        let map = tags
            .iter()
            .map(|(k, v)| (k.to_uppercase(), v.to_string()))
            .collect();
        self.files.lock().insert(path.into(), map);
    }

    /// Current tags of a registered file.
    pub fn tags(&self, path: &Path) -> Option<HashMap<String, String>> {
        self.files.lock().get(path).cloned()
    }

    /// Total saves across every store this backend opened.
    pub fn save_count(&self) -> usize {
        *self.save_count.lock()
    }
}

impl TagBackend for MemoryTagBackend {
    fn open(&self, path: &Path) -> TagResult<Box<dyn TagStore>> {
        let tags = self
            .files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| TagError::UnsupportedFormat(path.to_path_buf()))?;

        Ok(Box::new(CountingStore {
            inner: MemoryTagStore {
                path: path.to_path_buf(),
                tags,
                shared: Some(Arc::clone(&self.files)),
            },
            save_count: Arc::clone(&self.save_count),
        }))
    }
}

/// Store that also bumps the backend-wide save counter.
struct CountingStore {
    inner: MemoryTagStore,
    save_count: Arc<Mutex<usize>>,
}

impl TagStore for CountingStore {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: String) {
        self.inner.set(key, value)
    }

    fn save(&mut self) -> TagResult<()> {
        *self.save_count.lock() += 1;
        self.inner.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::LOOPSTART;

    #[test]
    fn keys_are_case_insensitive() {
        let mut store = MemoryTagStore::new("a.ogg");
        store.set("loopstart", "10".to_string());
        assert_eq!(store.get(LOOPSTART).as_deref(), Some("10"));
    }

    #[test]
    fn unregistered_path_is_unsupported() {
        let backend = MemoryTagBackend::new();
        let result = backend.open(Path::new("a.mp3"));
        assert!(matches!(result, Err(TagError::UnsupportedFormat(_))));
    }

    #[test]
    fn saved_tags_are_visible_to_later_opens() {
        let backend = MemoryTagBackend::new();
        backend.insert("a.ogg", &[("TITLE", "Town")]);

        let mut store = backend.open(Path::new("a.ogg")).unwrap();
        store.set(LOOPSTART, "42".to_string());
        // Not visible before save
        assert!(backend.tags(Path::new("a.ogg")).unwrap().get(LOOPSTART).is_none());
        store.save().unwrap();

        let reopened = backend.open(Path::new("a.ogg")).unwrap();
        assert_eq!(reopened.get(LOOPSTART).as_deref(), Some("42"));
        assert_eq!(reopened.get("title").as_deref(), Some("Town"));
        assert_eq!(backend.save_count(), 1);
    }
}
