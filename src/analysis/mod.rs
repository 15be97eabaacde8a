pub mod builder;
pub mod ignore;
pub mod impact;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::cache::FactCache;
use crate::config::Config;
use crate::model::file_graph::{AffectedSet, DependencyGraph, ReverseDependencyIndex, TreeNode};
use crate::model::FileChange;
use crate::resolver::{normalize_path, SpecifierResolver};

use builder::GraphBuilder;
use ignore::IgnoreRules;

/// Everything needed to run one analysis. Also the worker request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub entry_file: PathBuf,
    #[serde(default)]
    pub changes: Vec<FileChange>,
    pub root_dir: PathBuf,
    #[serde(default)]
    pub config: Config,
}

impl AnalysisOptions {
    pub fn new(entry_file: impl Into<PathBuf>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            entry_file: entry_file.into(),
            changes: Vec::new(),
            root_dir: root_dir.into(),
            config: Config::default(),
        }
    }

    pub fn with_changes(mut self, changes: Vec<FileChange>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("entry file {path} is not accessible: {source}")]
    EntryNotAccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid exclude pattern: {0}")]
    InvalidExclude(#[from] globset::Error),
}

/// Result of one run: the annotated graph plus the propagation state.
pub struct Analysis {
    pub root_dir: PathBuf,
    pub graph: DependencyGraph,
    pub index: ReverseDependencyIndex,
    pub affected: AffectedSet,
    /// Recoverable problems met during traversal, in discovery order.
    pub warnings: Vec<String>,
}

impl Analysis {
    /// Output tree with root-relative paths.
    pub fn tree(&self) -> TreeNode {
        self.graph.to_tree(Some(&self.root_dir))
    }

    /// Output tree with absolute paths.
    pub fn absolute_tree(&self) -> TreeNode {
        self.graph.to_tree(None)
    }

    /// Changed or affected files, root-relative and sorted.
    pub fn affected_files(&self) -> Vec<String> {
        self.affected
            .paths()
            .iter()
            .map(|p| {
                crate::model::file_graph::to_relative(p, &self.root_dir)
                    .display()
                    .to_string()
            })
            .collect()
    }
}

/// Run an analysis with a fresh default fact cache.
pub fn analyze(options: &AnalysisOptions) -> Result<Analysis, AnalysisError> {
    analyze_project(options, &FactCache::default())
}

/// Run an analysis reusing `cache` for parsed facts.
///
/// Only an inaccessible entry file (or an invalid exclude pattern) fails the
/// run; every other problem is logged and recorded in
/// [`Analysis::warnings`].
pub fn analyze_project(
    options: &AnalysisOptions,
    cache: &FactCache,
) -> Result<Analysis, AnalysisError> {
    let root_dir = normalize_path(&options.root_dir);
    let entry = absolutize(&options.entry_file, &root_dir);

    std::fs::metadata(&entry).map_err(|source| AnalysisError::EntryNotAccessible {
        path: entry.clone(),
        source,
    })?;

    let changes: Vec<FileChange> = options
        .changes
        .iter()
        .map(|c| FileChange {
            changed_file: absolutize(&c.changed_file, &root_dir),
            ..c.clone()
        })
        .collect();

    let resolver = SpecifierResolver::for_project(&root_dir, &options.config.resolve);
    let ignore = IgnoreRules::new(&options.config.analysis)?;

    info!(
        entry = %entry.display(),
        changes = changes.len(),
        "starting analysis"
    );

    let output = GraphBuilder::new(
        &entry,
        &resolver,
        cache,
        &ignore,
        &changes,
        options.config.analysis.empty_modified_exports,
    )
    .build();

    info!(
        files = output.graph.node_count(),
        edges = output.index.edge_count(),
        affected = output.affected.len(),
        warnings = output.warnings.len(),
        "analysis complete"
    );

    Ok(Analysis {
        root_dir,
        graph: output.graph,
        index: output.index,
        affected: output.affected,
        warnings: output.warnings,
    })
}

/// Join relative paths onto `root` and normalize.
pub fn absolutize(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&root.join(path))
    }
}
