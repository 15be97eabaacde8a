use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::debug;

use crate::model::FileFacts;
use crate::parser::{FactProvider, TypeScriptFacts};

/// Memoizes parsed facts per path so a file reached from several import
/// sites is parsed once.
///
/// Requests that carry explicit content go straight to the provider and are
/// never stored. The cache is owned by whoever runs the analysis; the graph
/// builder only reads through [`FactCache::facts`].
pub struct FactCache {
    provider: Box<dyn FactProvider>,
    entries: Mutex<HashMap<PathBuf, Arc<FileFacts>>>,
}

impl FactCache {
    pub fn new(provider: impl FactProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Facts for `path`, parsing on first request.
    ///
    /// Parse errors are returned and not cached, so a later call retries.
    pub fn facts(&self, path: &Path, content: Option<&str>) -> Result<Arc<FileFacts>> {
        if content.is_some() {
            debug!(path = %path.display(), "explicit content, bypassing fact cache");
            return self.provider.parse_file(path, content).map(Arc::new);
        }

        if let Some(hit) = self.lock().get(path) {
            return Ok(Arc::clone(hit));
        }

        let facts = Arc::new(self.provider.parse_file(path, None)?);
        self.lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::clone(&facts));
        Ok(facts)
    }

    pub fn has(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    /// Forget one path. Returns whether it was cached.
    pub fn delete(&self, path: &Path) -> bool {
        self.lock().remove(path).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<FileFacts>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FactCache {
    fn default() -> Self {
        Self::new(TypeScriptFacts::new())
    }
}
