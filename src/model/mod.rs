use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub mod file_graph;

/// Binding name recorded for namespace imports (`import * as ns`) and
/// wildcard re-exports. Overlaps every export name.
pub const NAMESPACE_BINDING: &str = "*";

/// Export name used for `export default ...` and default imports.
pub const DEFAULT_BINDING: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
        }
    }

    /// Past-tense verb used in reasons ("File was modified").
    pub fn past_tense(&self) -> &'static str {
        match self {
            ChangeType::Add => "added",
            ChangeType::Modify => "modified",
            ChangeType::Delete => "deleted",
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ChangeType::Add),
            "modify" => Ok(ChangeType::Modify),
            "delete" => Ok(ChangeType::Delete),
            _ => Err(format!("unknown change type: {}", s)),
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One element of the input change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub changed_file: PathBuf,
    pub change_type: ChangeType,
    /// Export names known to have changed. Only meaningful for `modify`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_exports: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_changes: Option<ContentChanges>,
}

impl FileChange {
    pub fn new(changed_file: impl Into<PathBuf>, change_type: ChangeType) -> Self {
        Self {
            changed_file: changed_file.into(),
            change_type,
            modified_exports: None,
            content_changes: None,
        }
    }

    pub fn with_exports<I, S>(mut self, exports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modified_exports = Some(exports.into_iter().map(Into::into).collect());
        self
    }
}

/// Line-level statistics for a changed file, taken from a zero-context diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChanges {
    pub additions: usize,
    pub deletions: usize,
    pub hunks: Vec<Hunk>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
    pub changes: Vec<LineChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChange {
    #[serde(rename = "type")]
    pub kind: LineChangeKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineChangeKind {
    Addition,
    Deletion,
}

/// Whether a file can be analyzed for imports/exports or is an opaque leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    #[serde(rename = "js")]
    Source,
    #[serde(rename = "asset")]
    Asset,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Source => "js",
            FileKind::Asset => "asset",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An import statement as reported by the parsing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFact {
    /// The module specifier exactly as written.
    pub source: String,
    /// Names pulled from the module (`default`, named imports, or `*`).
    pub specifiers: BTreeSet<String>,
}

impl ImportFact {
    pub fn new<I, S>(source: impl Into<String>, specifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: source.into(),
            specifiers: specifiers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Parsed facts for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFacts {
    pub imports: Vec<ImportFact>,
    pub exports: BTreeSet<String>,
}
