use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::{debug, info};

use crate::cache::FactCache;
use crate::model::{ChangeType, ContentChanges, FileChange, Hunk, LineChange, LineChangeKind};

use super::{is_tracked_source, modified_exports};

/// A `from..to` revision range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRange {
    pub from: String,
    pub to: String,
}

impl FromStr for GitRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once("..") {
            Some((from, to)) if !from.is_empty() && !to.is_empty() && !to.starts_with('.') => {
                Ok(GitRange {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
            _ => bail!("Invalid git range format '{}'. Use format: commit1..commit2", s),
        }
    }
}

impl std::fmt::Display for GitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// One line of `git diff --name-status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub status: char,
    /// Repository-relative path; the destination for renames and copies.
    pub path: String,
}

impl StatusEntry {
    /// Change type implied by the status letter. Renames and copies count as
    /// additions of the new path; other letters are skipped.
    pub fn change_type(&self) -> Option<ChangeType> {
        match self.status {
            'A' | 'R' | 'C' => Some(ChangeType::Add),
            'D' => Some(ChangeType::Delete),
            'M' | 'T' => Some(ChangeType::Modify),
            _ => None,
        }
    }
}

pub fn parse_name_status(output: &str) -> Vec<StatusEntry> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let status = fields.next()?.chars().next()?;
            let path = fields.last()?.to_string();
            Some(StatusEntry { status, path })
        })
        .collect()
}

const HUNK_HEADER: &str = r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@";

/// Parse zero-context unified diff output into per-file line statistics,
/// keyed by repository-relative path of the new side.
///
/// An omitted hunk line count means one line, as in git's own format.
pub fn parse_unified_diff(diff: &str) -> Result<HashMap<String, ContentChanges>> {
    let hunk_header = Regex::new(HUNK_HEADER)?;
    let mut files: HashMap<String, ContentChanges> = HashMap::new();
    let mut current_file: Option<String> = None;
    let mut current_hunk: Option<Hunk> = None;

    fn flush(
        files: &mut HashMap<String, ContentChanges>,
        file: &Option<String>,
        hunk: &mut Option<Hunk>,
    ) {
        if let (Some(file), Some(hunk)) = (file, hunk.take()) {
            files.entry(file.clone()).or_default().hunks.push(hunk);
        }
    }

    for line in diff.lines() {
        if line.starts_with("diff --git") {
            flush(&mut files, &current_file, &mut current_hunk);
            current_file = None;
            continue;
        }

        if let Some(target) = line.strip_prefix("+++ ") {
            current_file = (target != "/dev/null")
                .then(|| target.strip_prefix("b/").unwrap_or(target).to_string());
            if let Some(ref file) = current_file {
                files.entry(file.clone()).or_default();
            }
            continue;
        }
        if line.starts_with("--- ") {
            continue;
        }

        if let Some(caps) = hunk_header.captures(line) {
            flush(&mut files, &current_file, &mut current_hunk);
            let num = |i: usize, default: usize| {
                caps.get(i)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(default)
            };
            current_hunk = Some(Hunk {
                old_start: num(1, 0),
                old_lines: num(2, 1),
                new_start: num(3, 0),
                new_lines: num(4, 1),
                changes: Vec::new(),
            });
            continue;
        }

        let (Some(file), Some(hunk)) = (current_file.as_ref(), current_hunk.as_mut()) else {
            continue;
        };
        let (kind, content) = if let Some(rest) = line.strip_prefix('+') {
            (LineChangeKind::Addition, rest)
        } else if let Some(rest) = line.strip_prefix('-') {
            (LineChangeKind::Deletion, rest)
        } else {
            continue;
        };

        let stats = files.entry(file.clone()).or_default();
        match kind {
            LineChangeKind::Addition => stats.additions += 1,
            LineChangeKind::Deletion => stats.deletions += 1,
        }
        hunk.changes.push(LineChange {
            kind,
            content: content.to_string(),
        });
    }

    flush(&mut files, &current_file, &mut current_hunk);
    Ok(files)
}

/// A git working copy, addressed by its top-level directory.
pub struct GitRepo {
    toplevel: PathBuf,
}

impl GitRepo {
    /// Locate the repository containing `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        let output = run_git(dir, &["rev-parse", "--show-toplevel"])?;
        let toplevel = PathBuf::from(output.trim());
        debug!(toplevel = %toplevel.display(), "found git repository");
        Ok(Self { toplevel })
    }

    pub fn toplevel(&self) -> &Path {
        &self.toplevel
    }

    pub fn name_status(&self, range: &GitRange) -> Result<Vec<StatusEntry>> {
        let output = run_git(
            &self.toplevel,
            &["diff", "--name-status", &range.from, &range.to],
        )?;
        Ok(parse_name_status(&output))
    }

    pub fn unified_diff(&self, range: &GitRange) -> Result<HashMap<String, ContentChanges>> {
        let output = run_git(&self.toplevel, &["diff", "-U0", &range.from, &range.to])?;
        parse_unified_diff(&output)
    }

    /// File content at a revision, or `None` if it does not exist there.
    pub fn show(&self, rev: &str, path: &str) -> Option<String> {
        run_git(&self.toplevel, &["show", &format!("{}:{}", rev, path)]).ok()
    }

    /// Collect source-file changes in `range`.
    ///
    /// With `detailed`, modified files get their changed export names (by
    /// parsing both revisions through `cache`) and line statistics.
    pub fn collect_changes(
        &self,
        range: &GitRange,
        detailed: bool,
        cache: &FactCache,
    ) -> Result<Vec<FileChange>> {
        let entries = self.name_status(range)?;
        let mut diffs = if detailed {
            self.unified_diff(range)?
        } else {
            HashMap::new()
        };

        let mut changes = Vec::new();
        for entry in entries {
            if !is_tracked_source(&entry.path) {
                continue;
            }
            let Some(change_type) = entry.change_type() else {
                debug!(status = %entry.status, path = %entry.path, "skipping status");
                continue;
            };

            let absolute = self.toplevel.join(&entry.path);
            let mut change = FileChange::new(absolute.clone(), change_type);

            if detailed {
                if change_type == ChangeType::Modify {
                    let previous = self.show(&range.from, &entry.path);
                    let current = self
                        .show(&range.to, &entry.path)
                        .or_else(|| std::fs::read_to_string(&absolute).ok());
                    change.modified_exports =
                        modified_exports(cache, &absolute, previous.as_deref(), current.as_deref());
                }
                change.content_changes = Some(diffs.remove(&entry.path).unwrap_or_default());
            }

            changes.push(change);
        }

        info!(range = %range, count = changes.len(), "collected git changes");
        Ok(changes)
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .context("failed to run git")?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    String::from_utf8(output.stdout).context("git output is not UTF-8")
}
