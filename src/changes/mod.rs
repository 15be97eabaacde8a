//! Building change sets from JSON, command-line flags, or git history.

pub mod git;

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::analysis::absolutize;
use crate::cache::FactCache;
use crate::model::{ChangeType, FileChange};

/// File extensions considered when collecting changes from version control.
pub const TRACKED_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];

/// Parse a JSON array of change elements.
pub fn parse_changes_json(json: &str) -> Result<Vec<FileChange>> {
    serde_json::from_str(json).context("changes must be a JSON array of {changedFile, changeType}")
}

pub fn load_changes_file(path: &Path) -> Result<Vec<FileChange>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_changes_json(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Make every `changedFile` absolute, resolving relative paths against `root`.
pub fn resolve_paths(changes: Vec<FileChange>, root: &Path) -> Vec<FileChange> {
    changes
        .into_iter()
        .map(|c| FileChange {
            changed_file: absolutize(&c.changed_file, root),
            ..c
        })
        .collect()
}

/// Build a single change from command-line values.
pub fn single_change(
    file: &Path,
    change_type: ChangeType,
    exports: Option<&str>,
) -> FileChange {
    let mut change = FileChange::new(file, change_type);
    if let Some(list) = exports {
        let names: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        change.modified_exports = Some(names);
    }
    change
}

pub fn is_tracked_source(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TRACKED_EXTENSIONS.contains(&ext))
}

/// Exports added or removed between two export sets: names only in
/// `current` first, then names only in `previous`.
pub fn diff_exports(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Vec<String> {
    current
        .difference(previous)
        .chain(previous.difference(current))
        .cloned()
        .collect()
}

/// Changed export names of `path` between two revisions of its text.
///
/// Missing text counts as no exports. Returns `None` when nothing changed or
/// either revision fails to parse.
pub fn modified_exports(
    cache: &FactCache,
    path: &Path,
    previous: Option<&str>,
    current: Option<&str>,
) -> Option<Vec<String>> {
    let exports_of = |content: Option<&str>| -> Result<BTreeSet<String>> {
        match content {
            Some(text) => Ok(cache.facts(path, Some(text))?.exports.clone()),
            None => Ok(BTreeSet::new()),
        }
    };

    let before = exports_of(previous);
    let after = exports_of(current);
    match (before, after) {
        (Ok(before), Ok(after)) => {
            let diff = diff_exports(&before, &after);
            (!diff.is_empty()).then_some(diff)
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!("could not analyze exports for {}: {:#}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_changes_json() {
        let changes = parse_changes_json(
            r#"[
                {"changedFile": "src/a.ts", "changeType": "modify", "modifiedExports": ["x"]},
                {"changedFile": "/abs/b.ts", "changeType": "delete"}
            ]"#,
        )
        .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type, ChangeType::Modify);
        assert_eq!(changes[0].modified_exports, Some(vec!["x".to_string()]));
        assert_eq!(changes[1].modified_exports, None);
    }

    #[test]
    fn test_parse_changes_rejects_bad_type() {
        assert!(parse_changes_json(r#"[{"changedFile":"a.ts","changeType":"rename"}]"#).is_err());
        assert!(parse_changes_json(r#"{"changedFile":"a.ts"}"#).is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let changes = vec![
            FileChange::new("src/./a.ts", ChangeType::Add),
            FileChange::new("/elsewhere/b.ts", ChangeType::Add),
        ];
        let resolved = resolve_paths(changes, Path::new("/p"));
        assert_eq!(resolved[0].changed_file, PathBuf::from("/p/src/a.ts"));
        assert_eq!(resolved[1].changed_file, PathBuf::from("/elsewhere/b.ts"));
    }

    #[test]
    fn test_single_change_exports() {
        let c = single_change(Path::new("a.ts"), ChangeType::Modify, Some("x, y,,"));
        assert_eq!(c.modified_exports, Some(vec!["x".to_string(), "y".to_string()]));
        let c = single_change(Path::new("a.ts"), ChangeType::Delete, None);
        assert!(c.modified_exports.is_none());
    }

    #[test]
    fn test_is_tracked_source() {
        assert!(is_tracked_source("src/a.tsx"));
        assert!(is_tracked_source("lib/b.js"));
        assert!(!is_tracked_source("styles/a.css"));
        assert!(!is_tracked_source("README"));
    }

    #[test]
    fn test_diff_exports_symmetric() {
        let before: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let after: BTreeSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(diff_exports(&before, &after), vec!["c", "a"]);
        assert!(diff_exports(&before, &before).is_empty());
    }

    #[test]
    fn test_modified_exports_from_revisions() {
        let cache = FactCache::default();
        let path = Path::new("/p/util.ts");
        let changed = modified_exports(
            &cache,
            path,
            Some("export const a = 1;\nexport function b() {}"),
            Some("export const a = 2;\nexport function c() {}"),
        );
        assert_eq!(changed, Some(vec!["c".to_string(), "b".to_string()]));
        assert!(!cache.has(path));

        let unchanged = modified_exports(
            &cache,
            path,
            Some("export const a = 1;"),
            Some("export const a = 2;"),
        );
        assert_eq!(unchanged, None);

        assert_eq!(
            modified_exports(&cache, path, Some("export const {"), Some("export const a = 1;")),
            None
        );
    }
}
