use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use super::OutputFormat;
use crate::dispatch::{Reconciled, WorkerOutput};
use crate::model::file_graph::TreeNode;
use crate::model::FileChange;

const REASON_WIDTH: usize = 48;

/// Format any serializable value as JSON.
pub fn format_json<T: Serialize>(value: &T, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_default(),
        OutputFormat::Compact => serde_json::to_string(value).unwrap_or_default(),
        OutputFormat::Text => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}

/// Tree, legend and impact summary for one analyzed entry.
pub fn format_analysis_text(tree: &TreeNode) -> String {
    let mut out = String::new();
    out.push_str("\nDependency Tree Analysis:\n");
    out.push_str("=======================\n\n");
    out.push_str(&format_tree(tree));
    out.push_str(&legend());
    out.push_str(&format_summary(tree));
    out
}

/// Several entries one after another, then any failed entries.
pub fn format_reconciled_text(reconciled: &Reconciled) -> String {
    let mut out = String::new();
    for output in &reconciled.outputs {
        let _ = writeln!(out, "Entry: {}", output.entry);
        out.push_str(&format_analysis_text(&output.tree));
        out.push_str(&format_warnings(&output.warnings));
    }
    if !reconciled.outputs.is_empty() {
        let _ = writeln!(
            out,
            "Affected across all entries: {}",
            reconciled.affected_files.len()
        );
        for file in &reconciled.affected_files {
            let _ = writeln!(out, "  {}", file);
        }
    }
    if !reconciled.failures.is_empty() {
        out.push_str("\nFailed entries:\n");
        for failure in &reconciled.failures {
            let _ = writeln!(out, "  {}: {}", failure.entry.display(), failure.message);
        }
    }
    out
}

pub fn format_output_text(output: &WorkerOutput) -> String {
    let mut out = format_analysis_text(&output.tree);
    out.push_str(&format_warnings(&output.warnings));
    out
}

fn format_warnings(warnings: &[String]) -> String {
    if warnings.is_empty() {
        return String::new();
    }
    let mut out = String::from("Warnings:\n");
    for w in warnings {
        let _ = writeln!(out, "  {}", w);
    }
    out.push('\n');
    out
}

fn status_badge(node: &TreeNode) -> String {
    if let Some(change_type) = node.change_type {
        format!("[{}]", change_type.as_str().to_uppercase())
    } else if node.is_affected() {
        "[AFFECTED]".to_string()
    } else {
        String::new()
    }
}

pub fn format_tree(root: &TreeNode) -> String {
    let mut out = String::new();
    write_tree(root, "", true, &mut out);
    out
}

fn write_tree(node: &TreeNode, prefix: &str, is_last: bool, out: &mut String) {
    let marker = if is_last { "└── " } else { "├── " };
    let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });

    let _ = writeln!(out, "{}{}{} {}", prefix, marker, node.file, status_badge(node));

    if let Some(reason) = &node.reason {
        for line in reason.split('\n') {
            let _ = writeln!(out, "{}    → {}", child_prefix, line);
        }
    }

    let mut children: Vec<&TreeNode> = node.children.iter().collect();
    // Nodes with children first, then by file name.
    children.sort_by(|a, b| {
        a.children
            .is_empty()
            .cmp(&b.children.is_empty())
            .then_with(|| base_name(&a.file).cmp(base_name(&b.file)))
    });
    let last = children.len().saturating_sub(1);
    for (i, child) in children.into_iter().enumerate() {
        write_tree(child, &child_prefix, i == last, out);
    }
}

fn base_name(file: &str) -> &str {
    Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file)
}

fn legend() -> String {
    let mut out = String::from("\nLegend:\n");
    out.push_str("  [MODIFY]   - File was modified\n");
    out.push_str("  [DELETE]   - File was deleted\n");
    out.push_str("  [ADD]      - File was added\n");
    out.push_str("  [AFFECTED] - File is affected by changes\n");
    out.push_str("\n→ Indicates impact reason\n\n");
    out
}

struct SummaryRow<'a> {
    file: &'a str,
    status: String,
    reason: &'a str,
}

/// Table of every changed or affected node, in tree order.
pub fn format_summary(tree: &TreeNode) -> String {
    let mut out = String::from("Impact Summary:\n==============\n\n");

    let rows: Vec<SummaryRow> = tree
        .impacted()
        .into_iter()
        .map(|node| SummaryRow {
            file: &node.file,
            status: match node.change_type {
                Some(ct) => ct.as_str().to_uppercase(),
                None => "AFFECTED".to_string(),
            },
            reason: node.reason.as_deref().unwrap_or("-"),
        })
        .collect();

    if rows.is_empty() {
        out.push_str("No files were impacted by the changes.\n\n");
        return out;
    }

    let file_width = rows
        .iter()
        .map(|r| r.file.chars().count())
        .max()
        .unwrap_or(0)
        .max("File".len());
    let status_width = rows
        .iter()
        .map(|r| r.status.len())
        .max()
        .unwrap_or(0)
        .max("Status".len());

    let border = |left: &str, mid: &str, right: &str| {
        format!(
            "{}{}{}{}{}{}{}\n",
            left,
            "─".repeat(file_width + 2),
            mid,
            "─".repeat(status_width + 2),
            mid,
            "─".repeat(REASON_WIDTH + 2),
            right
        )
    };
    let row = |file: &str, status: &str, reason: &str| {
        format!(
            "│ {:<fw$} │ {:<sw$} │ {:<rw$} │\n",
            file,
            status,
            reason,
            fw = file_width,
            sw = status_width,
            rw = REASON_WIDTH
        )
    };

    out.push_str(&border("┌", "┬", "┐"));
    out.push_str(&row("File", "Status", "Impact Reason"));
    out.push_str(&border("├", "┼", "┤"));
    for r in &rows {
        for (i, line) in r.reason.split('\n').enumerate() {
            if i == 0 {
                out.push_str(&row(r.file, &r.status, line));
            } else {
                out.push_str(&row("", "", line));
            }
        }
    }
    out.push_str(&border("└", "┴", "┘"));
    out.push('\n');
    out
}

/// Change listing printed by the git command before analysis.
pub fn format_changes_text(range: &str, changes: &[FileChange], detailed: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nAnalyzing changes between: {}", range);
    let _ = writeln!(out, "Changed files: {}", changes.len());

    if detailed {
        out.push_str("\nDetailed changes:\n");
        for change in changes {
            let _ = writeln!(
                out,
                "\n{} ({})",
                change.changed_file.display(),
                change.change_type.as_str().to_uppercase()
            );
            if let Some(content) = &change.content_changes {
                let _ = writeln!(out, "  Changes: +{} -{}", content.additions, content.deletions);
                for hunk in &content.hunks {
                    let _ = writeln!(
                        out,
                        "  @@ -{},{} +{},{} @@",
                        hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines
                    );
                    for line in &hunk.changes {
                        let sign = match line.kind {
                            crate::model::LineChangeKind::Addition => '+',
                            crate::model::LineChangeKind::Deletion => '-',
                        };
                        let _ = writeln!(out, "    {}{}", sign, line.content);
                    }
                }
            }
            if let Some(exports) = change.modified_exports.as_ref().filter(|e| !e.is_empty()) {
                let _ = writeln!(out, "  Modified exports: {}", exports.join(", "));
            }
        }
    }

    out.push_str("\n----------------------------------------\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeType, ContentChanges, FileKind, Hunk, LineChange, LineChangeKind};

    fn node(file: &str, children: Vec<TreeNode>) -> TreeNode {
        let mut n = TreeNode::stub(file.to_string(), FileKind::Source);
        n.children = children;
        n
    }

    fn sample_tree() -> TreeNode {
        let mut util = node("src/util.ts", vec![]);
        util.change_type = Some(ChangeType::Modify);
        util.reason = Some("File was modified".to_string());

        let mut page = node("src/page.tsx", vec![util]);
        page.is_affected = Some(true);
        page.reason = Some(
            "Directly affected by modified exports from 'util.ts': a\nDirectly affected: File 'b.css' content was modified"
                .to_string(),
        );

        let about = node("src/about.tsx", vec![]);
        node("src/main.tsx", vec![about, page])
    }

    #[test]
    fn test_tree_markers_and_reasons() {
        let text = format_tree(&sample_tree());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "└── src/main.tsx ");
        // page has children so it sorts before about
        assert_eq!(lines[1], "    ├── src/page.tsx [AFFECTED]");
        assert_eq!(
            lines[2],
            "    │       → Directly affected by modified exports from 'util.ts': a"
        );
        assert_eq!(
            lines[3],
            "    │       → Directly affected: File 'b.css' content was modified"
        );
        assert_eq!(lines[4], "    │   └── src/util.ts [MODIFY]");
        assert_eq!(lines[5], "    │           → File was modified");
        assert_eq!(lines[6], "    └── src/about.tsx ");
    }

    #[test]
    fn test_leaf_children_sorted_by_basename() {
        let tree = node(
            "main.ts",
            vec![node("z/a.ts", vec![]), node("a/c.ts", vec![]), node("m/b.ts", vec![])],
        );
        let text = format_tree(&tree);
        let order: Vec<&str> = text.lines().skip(1).collect();
        assert!(order[0].ends_with("z/a.ts "));
        assert!(order[1].ends_with("m/b.ts "));
        assert!(order[2].ends_with("a/c.ts "));
    }

    #[test]
    fn test_summary_table() {
        let text = format_summary(&sample_tree());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Impact Summary:");
        assert_eq!(lines[1], "==============");
        assert!(lines[3].starts_with("┌──────────────┬──────────┬"));
        assert!(lines[3].ends_with(&format!("{}┐", "─".repeat(50))));
        assert_eq!(
            lines[4],
            format!("│ File         │ Status   │ {:<48} │", "Impact Reason")
        );
        // pre-order: page before util
        assert!(lines[6].starts_with("│ src/page.tsx │ AFFECTED │ Directly affected by"));
        assert!(lines[7].starts_with("│              │          │ Directly affected: File"));
        assert!(lines[8].starts_with("│ src/util.ts  │ MODIFY   │ File was modified"));
        assert!(lines[9].starts_with("└"));
    }

    #[test]
    fn test_summary_empty() {
        let text = format_summary(&node("src/main.tsx", vec![]));
        assert!(text.contains("No files were impacted by the changes."));
        assert!(!text.contains('┌'));
    }

    #[test]
    fn test_summary_missing_reason_shows_dash() {
        let mut tree = node("a.ts", vec![]);
        tree.change_type = Some(ChangeType::Add);
        let text = format_summary(&tree);
        assert!(text.contains("│ a.ts │ ADD    │ -"));
    }

    #[test]
    fn test_analysis_text_sections() {
        let text = format_analysis_text(&sample_tree());
        assert!(text.starts_with("\nDependency Tree Analysis:\n=======================\n\n"));
        assert!(text.contains("  [AFFECTED] - File is affected by changes\n"));
        assert!(text.contains("\n→ Indicates impact reason\n"));
        assert!(text.contains("Impact Summary:"));
    }

    #[test]
    fn test_changes_text_detailed() {
        let mut change = FileChange::new("/repo/src/a.ts", ChangeType::Modify)
            .with_exports(["x", "y"]);
        change.content_changes = Some(ContentChanges {
            additions: 1,
            deletions: 1,
            hunks: vec![Hunk {
                old_start: 3,
                old_lines: 1,
                new_start: 3,
                new_lines: 1,
                changes: vec![
                    LineChange {
                        kind: LineChangeKind::Deletion,
                        content: "old".to_string(),
                    },
                    LineChange {
                        kind: LineChangeKind::Addition,
                        content: "new".to_string(),
                    },
                ],
            }],
        });
        let text = format_changes_text("HEAD^..HEAD", &[change], true);
        assert!(text.contains("Analyzing changes between: HEAD^..HEAD"));
        assert!(text.contains("Changed files: 1"));
        assert!(text.contains("\n/repo/src/a.ts (MODIFY)\n"));
        assert!(text.contains("  Changes: +1 -1\n  @@ -3,1 +3,1 @@\n    -old\n    +new\n"));
        assert!(text.contains("  Modified exports: x, y"));
    }

    #[test]
    fn test_format_json_compact() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(format_json(&value, &OutputFormat::Compact), r#"{"a":1}"#);
        assert!(format_json(&value, &OutputFormat::Json).contains('\n'));
    }
}
