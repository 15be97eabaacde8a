use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cache::FactCache;
use crate::config::EmptyExportsPolicy;
use crate::model::file_graph::{
    AffectedSet, ChildRef, DependencyGraph, FileNode, ImportEdge, ReverseDependencyIndex,
};
use crate::model::{FileChange, FileKind};
use crate::resolver::{Resolution, SpecifierResolver};

use super::ignore::IgnoreRules;
use super::impact;

/// State produced by one traversal.
pub struct BuildOutput {
    pub graph: DependencyGraph,
    pub index: ReverseDependencyIndex,
    pub affected: AffectedSet,
    pub warnings: Vec<String>,
}

/// Cycle-safe depth-first walk from an entry file.
///
/// Each canonical path is expanded once; later references become stubs.
/// Reverse edges are recorded as imports are discovered, and each source
/// node is checked for impact once its children are built.
pub struct GraphBuilder<'a> {
    resolver: &'a SpecifierResolver,
    cache: &'a FactCache,
    ignore: &'a IgnoreRules,
    changes: &'a [FileChange],
    change_by_path: HashMap<PathBuf, &'a FileChange>,
    policy: EmptyExportsPolicy,
    visited: HashSet<PathBuf>,
    graph: DependencyGraph,
    index: ReverseDependencyIndex,
    affected: AffectedSet,
    warnings: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        entry: &Path,
        resolver: &'a SpecifierResolver,
        cache: &'a FactCache,
        ignore: &'a IgnoreRules,
        changes: &'a [FileChange],
        policy: EmptyExportsPolicy,
    ) -> Self {
        let mut change_by_path = HashMap::new();
        for change in changes {
            // First entry for a path wins.
            change_by_path
                .entry(change.changed_file.clone())
                .or_insert(change);
        }
        Self {
            resolver,
            cache,
            ignore,
            changes,
            change_by_path,
            policy,
            visited: HashSet::new(),
            graph: DependencyGraph::new(entry.to_path_buf()),
            index: ReverseDependencyIndex::new(),
            affected: AffectedSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Walk from the entry, then stamp nodes the flood reached after their
    /// own check had already run.
    pub fn build(mut self) -> BuildOutput {
        let entry = self.graph.root.clone();
        self.visit(&entry);
        self.finalize();
        BuildOutput {
            graph: self.graph,
            index: self.index,
            affected: self.affected,
            warnings: self.warnings,
        }
    }

    fn visit(&mut self, path: &Path) -> ChildRef {
        if !self.visited.insert(path.to_path_buf()) {
            return ChildRef::stub(path.to_path_buf(), self.resolver.kind_of(path));
        }

        if let Err(e) = std::fs::metadata(path) {
            self.warn(format!("could not access file {}: {}", path.display(), e));
            self.graph
                .insert(FileNode::new(path.to_path_buf(), FileKind::Asset));
            return ChildRef::expanded(path.to_path_buf(), FileKind::Asset);
        }

        let kind = self.resolver.kind_of(path);
        let mut node = FileNode::new(path.to_path_buf(), kind);
        let change = self.change_by_path.get(path).copied();

        match kind {
            FileKind::Source => {
                if let Some(change) = change {
                    node.change_type = Some(change.change_type);
                    node.reason = Some(impact::self_change_reason(change.change_type));
                    self.affected.mark_changed(path);
                }
                if !self.ignore.is_ignored(path, self.resolver.root_dir()) {
                    self.expand_source(&mut node);
                } else {
                    debug!(path = %path.display(), "ignored, not parsed");
                }
            }
            FileKind::Asset => {
                if let Some(change) = change {
                    node.change_type = Some(change.change_type);
                    node.affected = true;
                    node.reason = Some(impact::asset_change_reason(change.change_type));
                    self.affected.mark_impacted(path);
                    impact::propagate(path, &self.index, &mut self.affected);
                }
            }
        }

        self.graph.insert(node);
        ChildRef::expanded(path.to_path_buf(), kind)
    }

    fn expand_source(&mut self, node: &mut FileNode) {
        let path = node.path.clone();
        let facts = match self.cache.facts(&path, None) {
            Ok(facts) => facts,
            Err(e) => {
                self.warn(format!("error analyzing file {}: {:#}", path.display(), e));
                return;
            }
        };

        let mut edges = Vec::with_capacity(facts.imports.len());
        for import in &facts.imports {
            let resolved = match self.resolver.resolve(&path, &import.source) {
                Resolution::Resolved(target) => {
                    self.index.add_edge(&target, &path);
                    Some(target)
                }
                Resolution::External(_) => None,
                Resolution::NotFound(attempted) => {
                    self.warn(format!(
                        "unresolved import '{}' in {} (tried {})",
                        import.source,
                        path.display(),
                        attempted.display()
                    ));
                    None
                }
            };
            edges.push(ImportEdge {
                specifier: import.source.clone(),
                resolved,
                bindings: import.specifiers.clone(),
            });
        }

        let mut children = Vec::new();
        for target in edges.iter().filter_map(|e| e.resolved.as_ref()) {
            if let Err(e) = std::fs::metadata(target) {
                self.warn(format!(
                    "could not access imported file {}: {}",
                    target.display(),
                    e
                ));
                continue;
            }
            children.push(self.visit(target));
        }

        let causes = impact::determine_affecting_changes(
            &edges,
            self.changes,
            &self.affected,
            self.policy,
        );

        node.imports = Some(edges);
        node.exports = Some(facts.exports.clone());
        node.children = children;

        if !causes.is_empty() {
            node.affected = true;
            node.push_reason(&impact::compose_reason(&causes));
            self.affected.mark_impacted(&path);
            let flooded = impact::propagate(&path, &self.index, &mut self.affected);
            if !flooded.is_empty() {
                debug!(path = %path.display(), count = flooded.len(), "propagated impact");
            }
        }
    }

    /// Stamp nodes that became impacted after their own check ran.
    fn finalize(&mut self) {
        let pending: Vec<PathBuf> = self
            .graph
            .nodes()
            .into_iter()
            .filter(|n| !n.affected && self.affected.is_impacted(&n.path))
            .map(|n| n.path.clone())
            .collect();

        for path in pending {
            let causes = self
                .graph
                .get(&path)
                .and_then(|n| n.imports.as_deref())
                .map(|imports| impact::indirect_causes(imports, &self.affected))
                .unwrap_or_default();
            if let Some(node) = self.graph.get_mut(&path) {
                node.affected = true;
                if !causes.is_empty() {
                    node.push_reason(&impact::compose_reason(&causes));
                }
            }
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}
