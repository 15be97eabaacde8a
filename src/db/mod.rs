use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::model::{FileFacts, ImportFact};
use crate::parser::FactProvider;

/// Default location of the persisted fact store, relative to the project root.
pub const DEFAULT_DB_PATH: &str = ".ripple/facts.db";

/// SQLite table of parsed facts keyed by path and modification time.
pub struct FactStore {
    conn: Connection,
}

impl FactStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open fact store")?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory fact store")?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS facts (
                path TEXT PRIMARY KEY,
                mtime INTEGER NOT NULL,
                imports TEXT NOT NULL,
                exports TEXT NOT NULL
            );
            ",
            )
            .context("failed to initialize fact store schema")?;
        Ok(())
    }

    /// Stored facts for `path`, if they were recorded at exactly `mtime`.
    pub fn get(&self, path: &Path, mtime: i64) -> Result<Option<FileFacts>> {
        let row = self
            .conn
            .query_row(
                "SELECT imports, exports FROM facts WHERE path = ?1 AND mtime = ?2",
                params![path.to_string_lossy().to_string(), mtime],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .context("failed to query fact store")?;

        let Some((imports, exports)) = row else {
            return Ok(None);
        };
        let imports: Vec<ImportFact> =
            serde_json::from_str(&imports).context("corrupt imports column")?;
        let exports: BTreeSet<String> =
            serde_json::from_str(&exports).context("corrupt exports column")?;
        Ok(Some(FileFacts { imports, exports }))
    }

    pub fn put(&self, path: &Path, mtime: i64, facts: &FileFacts) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO facts (path, mtime, imports, exports)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(path) DO UPDATE SET mtime=?2, imports=?3, exports=?4",
                params![
                    path.to_string_lossy().to_string(),
                    mtime,
                    serde_json::to_string(&facts.imports)?,
                    serde_json::to_string(&facts.exports)?,
                ],
            )
            .context("failed to store facts")?;
        Ok(())
    }

    pub fn remove(&self, path: &Path) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM facts WHERE path = ?1",
                params![path.to_string_lossy().to_string()],
            )
            .context("failed to delete facts")?;
        Ok(removed > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM facts", [], |row| row.get(0))
            .context("failed to count facts")?;
        Ok(n as usize)
    }
}

/// [`FactProvider`] decorator that consults a [`FactStore`] before parsing.
///
/// Entries are valid only while the file's mtime is unchanged. Requests with
/// explicit content never touch the store. Store failures are logged and the
/// inner provider's result is used.
pub struct PersistentFacts<P> {
    inner: P,
    store: Mutex<FactStore>,
}

impl<P: FactProvider> PersistentFacts<P> {
    pub fn new(inner: P, store: FactStore) -> Self {
        Self {
            inner,
            store: Mutex::new(store),
        }
    }

    fn with_store<T>(&self, f: impl FnOnce(&FactStore) -> Result<T>) -> Result<T> {
        let store = self
            .store
            .lock()
            .map_err(|_| anyhow::anyhow!("fact store lock poisoned"))?;
        f(&*store)
    }
}

impl<P: FactProvider> FactProvider for PersistentFacts<P> {
    fn parse_file(&self, path: &Path, content: Option<&str>) -> Result<FileFacts> {
        if content.is_some() {
            return self.inner.parse_file(path, content);
        }

        let Some(mtime) = mtime_of(path) else {
            return self.inner.parse_file(path, None);
        };

        match self.with_store(|store| store.get(path, mtime)) {
            Ok(Some(facts)) => {
                debug!(path = %path.display(), "fact store hit");
                return Ok(facts);
            }
            Ok(None) => {}
            Err(e) => warn!("fact store read failed for {}: {:#}", path.display(), e),
        }

        let facts = self.inner.parse_file(path, None)?;
        if let Err(e) = self.with_store(|store| store.put(path, mtime, &facts)) {
            warn!("fact store write failed for {}: {:#}", path.display(), e);
        }
        Ok(facts)
    }
}

/// Resolve the store path for a project.
pub fn default_store_path(project_root: &Path) -> PathBuf {
    project_root.join(DEFAULT_DB_PATH)
}

fn mtime_of(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let nanos = modified.duration_since(SystemTime::UNIX_EPOCH).ok()?.as_nanos();
    i64::try_from(nanos).ok()
}
