use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::config::EmptyExportsPolicy;
use crate::model::file_graph::{AffectedSet, ImportEdge, ReverseDependencyIndex};
use crate::model::{ChangeType, FileChange, NAMESPACE_BINDING};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactKind {
    /// Caused by a change-set entry the file imports.
    Direct,
    /// Caused by importing a file already judged impacted.
    Indirect,
}

/// One reason a file is affected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectingChange {
    pub target: PathBuf,
    pub change_type: ChangeType,
    pub kind: ImpactKind,
    /// Imported names that overlap the changed exports. Empty when the
    /// impact is not export-specific.
    pub names: Vec<String>,
}

impl AffectingChange {
    /// Human-readable reason line, e.g.
    /// `Directly affected: Imported file 'util.ts' was deleted`.
    pub fn reason_line(&self) -> String {
        let prefix = match self.kind {
            ImpactKind::Direct => "Directly",
            ImpactKind::Indirect => "Indirectly",
        };
        let name = file_name(&self.target);
        match self.change_type {
            ChangeType::Delete => {
                format!("{} affected: Imported file '{}' was deleted", prefix, name)
            }
            ChangeType::Add => {
                format!(
                    "{} affected: New file '{}' was added that is imported",
                    prefix, name
                )
            }
            ChangeType::Modify if !self.names.is_empty() => format!(
                "{} affected by modified exports from '{}': {}",
                prefix,
                name,
                self.names.join(", ")
            ),
            ChangeType::Modify => {
                format!("{} affected: File '{}' content was modified", prefix, name)
            }
        }
    }
}

/// Join reason lines in discovery order.
pub fn compose_reason(causes: &[AffectingChange]) -> String {
    causes
        .iter()
        .map(AffectingChange::reason_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reason recorded on a file that is itself in the change set.
pub fn self_change_reason(change_type: ChangeType) -> String {
    format!("File was {}", change_type.past_tense())
}

pub fn asset_change_reason(change_type: ChangeType) -> String {
    format!("Asset file was {}", change_type.past_tense())
}

/// Names from `bindings` that overlap `modified`.
///
/// A namespace binding overlaps every modified export.
pub fn overlapping(
    bindings: impl IntoIterator<Item = impl AsRef<str>>,
    modified: &[String],
) -> Vec<String> {
    let bindings: Vec<String> = bindings
        .into_iter()
        .map(|b| AsRef::<str>::as_ref(&b).to_string())
        .collect();
    if bindings.iter().any(|b| b == NAMESPACE_BINDING) {
        return modified.to_vec();
    }
    bindings
        .into_iter()
        .filter(|b| modified.contains(b))
        .collect()
}

/// Evaluate the direct and indirect rules for one file's import edges.
///
/// Direct causes come first (change-set order, then import order), followed
/// by indirect causes in import order. An edge that already produced a
/// direct cause is not counted again as indirect.
pub fn determine_affecting_changes(
    imports: &[ImportEdge],
    changes: &[FileChange],
    affected: &AffectedSet,
    policy: EmptyExportsPolicy,
) -> Vec<AffectingChange> {
    let mut causes = Vec::new();
    let mut direct_edges = vec![false; imports.len()];

    for change in changes {
        for (i, edge) in imports.iter().enumerate() {
            if edge.resolved.as_deref() != Some(change.changed_file.as_path()) {
                continue;
            }
            if let Some(cause) = direct_cause(edge, change, policy) {
                direct_edges[i] = true;
                causes.push(cause);
            }
        }
    }

    for (i, edge) in imports.iter().enumerate() {
        if direct_edges[i] {
            continue;
        }
        if let Some(cause) = indirect_cause(edge, affected) {
            causes.push(cause);
        }
    }

    causes
}

/// Indirect causes only, for files whose own check has already run.
pub fn indirect_causes(imports: &[ImportEdge], affected: &AffectedSet) -> Vec<AffectingChange> {
    imports
        .iter()
        .filter_map(|edge| indirect_cause(edge, affected))
        .collect()
}

fn direct_cause(
    edge: &ImportEdge,
    change: &FileChange,
    policy: EmptyExportsPolicy,
) -> Option<AffectingChange> {
    let names = match change.change_type {
        ChangeType::Add | ChangeType::Delete => Vec::new(),
        ChangeType::Modify => match change.modified_exports.as_deref() {
            Some(modified) if !modified.is_empty() => {
                let names = overlapping(&edge.bindings, modified);
                if names.is_empty() {
                    return None;
                }
                names
            }
            Some(_) if policy == EmptyExportsPolicy::NoImpact => return None,
            _ => Vec::new(),
        },
    };

    Some(AffectingChange {
        target: change.changed_file.clone(),
        change_type: change.change_type,
        kind: ImpactKind::Direct,
        names,
    })
}

fn indirect_cause(edge: &ImportEdge, affected: &AffectedSet) -> Option<AffectingChange> {
    let target = edge.resolved.as_ref()?;
    if !affected.is_impacted(target) {
        return None;
    }
    Some(AffectingChange {
        target: target.clone(),
        change_type: ChangeType::Modify,
        kind: ImpactKind::Indirect,
        names: edge.bindings.iter().cloned().collect(),
    })
}

/// Flood-fill impact from `start` over the reverse index.
///
/// Every dependent not yet impacted is marked and walked in turn; the
/// affected set is the revisit guard. Returns newly marked paths in visit
/// order.
pub fn propagate(
    start: &Path,
    index: &ReverseDependencyIndex,
    affected: &mut AffectedSet,
) -> Vec<PathBuf> {
    let mut marked = Vec::new();
    let mut queue = VecDeque::from([start.to_path_buf()]);

    while let Some(current) = queue.pop_front() {
        for dependent in index.direct_importers(&current) {
            if affected.mark_impacted(&dependent) {
                marked.push(dependent.clone());
                queue.push_back(dependent);
            }
        }
    }

    marked
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
