use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ChangeType, FileKind};

/// An import statement of an expanded file, with its resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdge {
    pub specifier: String,
    /// `None` for external or dangling specifiers.
    pub resolved: Option<PathBuf>,
    pub bindings: BTreeSet<String>,
}

/// A child slot of an expanded node.
///
/// Exactly one `ChildRef` per path has `stub == false`: the position where
/// the traversal expanded it. Every other reference is a stub and carries no
/// children of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub path: PathBuf,
    pub kind: FileKind,
    pub stub: bool,
}

impl ChildRef {
    pub fn expanded(path: PathBuf, kind: FileKind) -> Self {
        Self {
            path,
            kind,
            stub: false,
        }
    }

    pub fn stub(path: PathBuf, kind: FileKind) -> Self {
        Self {
            path,
            kind,
            stub: true,
        }
    }
}

/// Arena entry for a file expanded during one analysis run.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub path: PathBuf,
    pub kind: FileKind,
    /// Present only for source files whose facts were obtained.
    pub imports: Option<Vec<ImportEdge>>,
    pub exports: Option<BTreeSet<String>>,
    /// Set only if the file literally appears in the change set.
    pub change_type: Option<ChangeType>,
    pub affected: bool,
    pub reason: Option<String>,
    pub children: Vec<ChildRef>,
}

impl FileNode {
    pub fn new(path: PathBuf, kind: FileKind) -> Self {
        Self {
            path,
            kind,
            imports: None,
            exports: None,
            change_type: None,
            affected: false,
            reason: None,
            children: Vec::new(),
        }
    }

    /// Append reason lines, keeping any earlier lines first.
    pub fn push_reason(&mut self, lines: &str) {
        match self.reason {
            Some(ref mut existing) => {
                existing.push('\n');
                existing.push_str(lines);
            }
            None => self.reason = Some(lines.to_string()),
        }
    }

    pub fn is_impacted(&self) -> bool {
        self.change_type.is_some() || self.affected
    }
}

/// Maps a file to the set of files that import it directly.
///
/// Append-only for the lifetime of a run.
#[derive(Debug, Clone, Default)]
pub struct ReverseDependencyIndex {
    importers: HashMap<PathBuf, BTreeSet<PathBuf>>,
}

impl ReverseDependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `importer` imports `target`.
    pub fn add_edge(&mut self, target: &Path, importer: &Path) {
        self.importers
            .entry(target.to_path_buf())
            .or_default()
            .insert(importer.to_path_buf());
    }

    /// Direct importers of `target`, sorted by path.
    pub fn direct_importers(&self, target: &Path) -> Vec<PathBuf> {
        self.importers
            .get(target)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains_edge(&self, target: &Path, importer: &Path) -> bool {
        self.importers
            .get(target)
            .is_some_and(|set| set.contains(importer))
    }

    /// Total number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.importers.values().map(|s| s.len()).sum()
    }
}

/// How a path entered the affected set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffectedVia {
    /// The path is a literal change-set entry.
    SelfChange,
    /// The path was judged impacted, directly or by propagation.
    Impact,
}

/// Accumulated set of impacted files. Grows monotonically during a run and
/// doubles as the revisit guard for propagation.
#[derive(Debug, Clone, Default)]
pub struct AffectedSet {
    entries: HashMap<PathBuf, AffectedVia>,
}

impl AffectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_changed(&mut self, path: &Path) {
        self.entries
            .entry(path.to_path_buf())
            .or_insert(AffectedVia::SelfChange);
    }

    /// Mark `path` as impacted. Returns `true` if it was not impacted before.
    pub fn mark_impacted(&mut self, path: &Path) -> bool {
        match self.entries.get_mut(path) {
            Some(AffectedVia::Impact) => false,
            Some(via) => {
                *via = AffectedVia::Impact;
                true
            }
            None => {
                self.entries.insert(path.to_path_buf(), AffectedVia::Impact);
                true
            }
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_impacted(&self, path: &Path) -> bool {
        matches!(self.entries.get(path), Some(AffectedVia::Impact))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All member paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }
}

/// Arena of expanded nodes keyed by canonical path.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub root: PathBuf,
    nodes: HashMap<PathBuf, FileNode>,
}

impl DependencyGraph {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            nodes: HashMap::new(),
        }
    }

    pub fn insert(&mut self, node: FileNode) {
        self.nodes.insert(node.path.clone(), node);
    }

    pub fn get(&self, path: &Path) -> Option<&FileNode> {
        self.nodes.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut FileNode> {
        self.nodes.get_mut(path)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Expanded nodes sorted by path.
    pub fn nodes(&self) -> Vec<&FileNode> {
        let mut nodes: Vec<_> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    /// Materialize the output tree rooted at the entry file. Paths are made
    /// relative to `relative_to` when given.
    pub fn to_tree(&self, relative_to: Option<&Path>) -> TreeNode {
        let kind = self
            .nodes
            .get(&self.root)
            .map(|n| n.kind)
            .unwrap_or(FileKind::Asset);
        self.tree_for(&ChildRef::expanded(self.root.clone(), kind), relative_to)
    }

    fn tree_for(&self, child: &ChildRef, relative_to: Option<&Path>) -> TreeNode {
        let file = display_path(&child.path, relative_to);
        let node = match self.nodes.get(&child.path) {
            Some(node) if !child.stub => node,
            _ => return TreeNode::stub(file, child.kind),
        };

        TreeNode {
            file,
            kind: node.kind,
            change_type: node.change_type,
            is_affected: node.affected.then_some(true),
            reason: node.reason.clone(),
            imports: node.imports.as_ref().map(|imports| {
                imports
                    .iter()
                    .map(|imp| TreeImport {
                        source: imp.specifier.clone(),
                        specifiers: imp.bindings.iter().cloned().collect(),
                    })
                    .collect()
            }),
            exports: node
                .exports
                .as_ref()
                .map(|exports| exports.iter().cloned().collect()),
            children: node
                .children
                .iter()
                .map(|c| self.tree_for(c, relative_to))
                .collect(),
        }
    }
}

/// Serialized output node. This is the only contract consumed by printers
/// and JSON consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub file: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_affected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<Vec<TreeImport>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<Vec<String>>,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeImport {
    pub source: String,
    pub specifiers: Vec<String>,
}

impl TreeNode {
    pub fn stub(file: String, kind: FileKind) -> Self {
        Self {
            file,
            kind,
            change_type: None,
            is_affected: None,
            reason: None,
            imports: None,
            exports: None,
            children: Vec::new(),
        }
    }

    pub fn is_affected(&self) -> bool {
        self.is_affected.unwrap_or(false)
    }

    /// Pre-order list of nodes that changed or are affected.
    pub fn impacted(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        self.collect_impacted(&mut out);
        out
    }

    fn collect_impacted<'a>(&'a self, out: &mut Vec<&'a TreeNode>) {
        if self.change_type.is_some() || self.is_affected() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_impacted(out);
        }
    }

    /// Find the first node (pre-order) with the given file string.
    pub fn find(&self, file: &str) -> Option<&TreeNode> {
        if self.file == file {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(file))
    }
}

/// Convert an absolute path to a project-relative path.
pub fn to_relative<'a>(path: &'a Path, project_root: &Path) -> &'a Path {
    path.strip_prefix(project_root).unwrap_or(path)
}

fn display_path(path: &Path, relative_to: Option<&Path>) -> String {
    match relative_to {
        Some(root) => to_relative(path, root).display().to_string(),
        None => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str, children: Vec<ChildRef>) -> FileNode {
        let mut n = FileNode::new(PathBuf::from(path), FileKind::Source);
        n.children = children;
        n
    }

    #[test]
    fn test_reverse_index_dedups_edges() {
        let mut index = ReverseDependencyIndex::new();
        index.add_edge(Path::new("/p/b.ts"), Path::new("/p/a.ts"));
        index.add_edge(Path::new("/p/b.ts"), Path::new("/p/a.ts"));
        index.add_edge(Path::new("/p/b.ts"), Path::new("/p/c.ts"));

        assert_eq!(
            index.direct_importers(Path::new("/p/b.ts")),
            vec![PathBuf::from("/p/a.ts"), PathBuf::from("/p/c.ts")]
        );
        assert_eq!(index.edge_count(), 2);
        assert!(index.direct_importers(Path::new("/p/a.ts")).is_empty());
    }

    #[test]
    fn test_affected_set_upgrades_self_change() {
        let mut set = AffectedSet::new();
        let p = Path::new("/p/a.ts");
        set.mark_changed(p);
        assert!(set.contains(p));
        assert!(!set.is_impacted(p));

        assert!(set.mark_impacted(p));
        assert!(set.is_impacted(p));
        assert!(!set.mark_impacted(p));

        // A later self-change never downgrades.
        set.mark_changed(p);
        assert!(set.is_impacted(p));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_push_reason_appends_lines() {
        let mut n = FileNode::new(PathBuf::from("/p/a.ts"), FileKind::Source);
        n.push_reason("File was modified");
        n.push_reason("Directly affected: File 'b.ts' content was modified");
        assert_eq!(
            n.reason.as_deref(),
            Some("File was modified\nDirectly affected: File 'b.ts' content was modified")
        );
    }

    #[test]
    fn test_to_tree_renders_stubs_without_children() {
        let mut graph = DependencyGraph::new(PathBuf::from("/p/a.ts"));
        graph.insert(node(
            "/p/a.ts",
            vec![ChildRef::expanded(PathBuf::from("/p/b.ts"), FileKind::Source)],
        ));
        graph.insert(node(
            "/p/b.ts",
            vec![ChildRef::stub(PathBuf::from("/p/a.ts"), FileKind::Source)],
        ));

        let tree = graph.to_tree(Some(Path::new("/p")));
        assert_eq!(tree.file, "a.ts");
        assert_eq!(tree.children.len(), 1);
        let b = &tree.children[0];
        assert_eq!(b.file, "b.ts");
        assert_eq!(b.children.len(), 1);
        assert_eq!(b.children[0].file, "a.ts");
        assert!(b.children[0].children.is_empty());
    }

    #[test]
    fn test_tree_json_shape() {
        let mut graph = DependencyGraph::new(PathBuf::from("/p/a.ts"));
        let mut root = node("/p/a.ts", vec![]);
        root.change_type = Some(ChangeType::Modify);
        root.reason = Some("File was modified".to_string());
        root.imports = Some(vec![ImportEdge {
            specifier: "./b".to_string(),
            resolved: None,
            bindings: ["x".to_string()].into_iter().collect(),
        }]);
        root.exports = Some(["default".to_string()].into_iter().collect());
        graph.insert(root);

        let json = serde_json::to_value(graph.to_tree(Some(Path::new("/p")))).unwrap();
        assert_eq!(json["file"], "a.ts");
        assert_eq!(json["type"], "js");
        assert_eq!(json["changeType"], "modify");
        assert!(json.get("isAffected").is_none());
        assert_eq!(json["imports"][0]["source"], "./b");
        assert_eq!(json["imports"][0]["specifiers"][0], "x");
        assert_eq!(json["exports"][0], "default");
        assert_eq!(json["children"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_impacted_collects_preorder() {
        let mut leaf = TreeNode::stub("c.ts".to_string(), FileKind::Source);
        leaf.change_type = Some(ChangeType::Delete);
        let mut mid = TreeNode::stub("b.ts".to_string(), FileKind::Source);
        mid.is_affected = Some(true);
        mid.children.push(leaf);
        let mut root = TreeNode::stub("a.ts".to_string(), FileKind::Source);
        root.children.push(mid);

        let files: Vec<_> = root.impacted().iter().map(|n| n.file.clone()).collect();
        assert_eq!(files, vec!["b.ts", "c.ts"]);
        assert!(root.find("c.ts").is_some());
        assert!(root.find("z.ts").is_none());
    }
}
