use std::fs;
use std::path::{Path, PathBuf};

use ripple::analysis::{analyze, analyze_project, Analysis, AnalysisError, AnalysisOptions};
use ripple::cache::FactCache;
use ripple::config::{Config, EmptyExportsPolicy};
use ripple::db::{default_store_path, FactStore, PersistentFacts};
use ripple::model::{ChangeType, FileChange, FileKind};
use ripple::parser::TypeScriptFacts;

/// A throwaway project directory with helpers for writing sources.
struct TestProject {
    dir: tempfile::TempDir,
}

impl TestProject {
    fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, content: &str) -> &Self {
        let full = self.path(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
        self
    }

    fn options(&self, entry: &str, changes: Vec<FileChange>) -> AnalysisOptions {
        AnalysisOptions::new(entry, self.root()).with_changes(changes)
    }

    fn analyze(&self, entry: &str, changes: Vec<FileChange>) -> Analysis {
        analyze(&self.options(entry, changes)).unwrap()
    }
}

/// src/main.ts -> src/page.tsx -> src/util.ts
fn layered_project() -> TestProject {
    let p = TestProject::new();
    p.write(
        "src/main.ts",
        "import Page from './page';\nconsole.log(Page);\n",
    )
    .write(
        "src/page.tsx",
        "import { a } from './util';\nexport default function Page() { return a; }\n",
    )
    .write(
        "src/util.ts",
        "export const a = 1;\nexport const b = 2;\n",
    );
    p
}

#[test]
fn test_tree_shape_and_facts() {
    let p = layered_project();
    let tree = p.analyze("src/main.ts", Vec::new()).tree();

    assert_eq!(tree.file, "src/main.ts");
    assert_eq!(tree.kind, FileKind::Source);
    assert_eq!(tree.children.len(), 1);

    let page = &tree.children[0];
    assert_eq!(page.file, "src/page.tsx");
    assert_eq!(page.exports.as_deref(), Some(&["default".to_string()][..]));
    let imports = page.imports.as_ref().unwrap();
    assert_eq!(imports[0].source, "./util");
    assert_eq!(imports[0].specifiers, vec!["a"]);

    let util = &page.children[0];
    assert_eq!(util.exports.as_ref().unwrap(), &vec!["a", "b"]);
    assert!(tree.impacted().is_empty());
}

#[test]
fn test_cycle_terminates_with_stub() {
    let p = TestProject::new();
    p.write("src/main.ts", "import { a } from './a';\n")
        .write("src/a.ts", "import { b } from './b';\nexport const a = b;\n")
        .write("src/b.ts", "import { a } from './a';\nexport const b = 1;\n");

    let tree = p.analyze("src/main.ts", Vec::new()).tree();
    let b = tree.find("src/b.ts").unwrap();
    assert_eq!(b.children.len(), 1);
    let back_edge = &b.children[0];
    assert_eq!(back_edge.file, "src/a.ts");
    assert!(back_edge.imports.is_none());
    assert!(back_edge.children.is_empty());
}

#[test]
fn test_self_change_is_marked() {
    let p = layered_project();
    let change = FileChange::new(p.path("src/util.ts"), ChangeType::Modify).with_exports(["b"]);
    let analysis = p.analyze("src/main.ts", vec![change]);
    let tree = analysis.tree();

    let util = tree.find("src/util.ts").unwrap();
    assert_eq!(util.change_type, Some(ChangeType::Modify));
    assert_eq!(util.reason.as_deref(), Some("File was modified"));
    assert_eq!(analysis.affected_files(), vec!["src/util.ts"]);
}

#[test]
fn test_unrelated_export_change_does_not_affect_importer() {
    let p = layered_project();
    let change = FileChange::new(p.path("src/util.ts"), ChangeType::Modify).with_exports(["b"]);
    let tree = p.analyze("src/main.ts", vec![change]).tree();

    let page = tree.find("src/page.tsx").unwrap();
    assert!(!page.is_affected());
    assert!(page.reason.is_none());
    assert!(!tree.is_affected());
}

#[test]
fn test_export_change_floods_to_entry() {
    let p = layered_project();
    let change = FileChange::new(p.path("src/util.ts"), ChangeType::Modify).with_exports(["a"]);
    let analysis = p.analyze("src/main.ts", vec![change]);
    let tree = analysis.tree();

    let page = tree.find("src/page.tsx").unwrap();
    assert!(page.is_affected());
    assert_eq!(
        page.reason.as_deref(),
        Some("Directly affected by modified exports from 'util.ts': a")
    );
    assert!(tree.is_affected());
    assert_eq!(
        tree.reason.as_deref(),
        Some("Indirectly affected by modified exports from 'page.tsx': default")
    );
    assert_eq!(
        analysis.affected_files(),
        vec!["src/main.ts", "src/page.tsx", "src/util.ts"]
    );
}

#[test]
fn test_content_change_without_export_list() {
    let p = TestProject::new();
    p.write("src/a.ts", "import { b } from './b';\nexport const a = b;\n")
        .write("src/b.ts", "import { c } from './c';\nexport const b = c;\n")
        .write("src/c.ts", "export const c = 1;\n");

    let change = FileChange::new(p.path("src/c.ts"), ChangeType::Modify);
    let tree = p.analyze("src/a.ts", vec![change]).tree();

    assert_eq!(
        tree.find("src/b.ts").unwrap().reason.as_deref(),
        Some("Directly affected: File 'c.ts' content was modified")
    );
    assert_eq!(
        tree.reason.as_deref(),
        Some("Indirectly affected by modified exports from 'b.ts': b")
    );
}

#[test]
fn test_empty_export_list_policy() {
    let p = layered_project();
    let change = FileChange::new(p.path("src/util.ts"), ChangeType::Modify)
        .with_exports(Vec::<String>::new());

    let full = analyze(&p.options("src/main.ts", vec![change.clone()])).unwrap();
    assert!(full.tree().find("src/page.tsx").unwrap().is_affected());

    let mut config = Config::default();
    config.analysis.empty_modified_exports = EmptyExportsPolicy::NoImpact;
    let none = analyze(&p.options("src/main.ts", vec![change]).with_config(config)).unwrap();
    assert!(!none.tree().find("src/page.tsx").unwrap().is_affected());
}

#[test]
fn test_namespace_import_overlaps_every_export() {
    let p = TestProject::new();
    p.write("src/main.ts", "import * as util from './util';\nutil.a;\n")
        .write("src/util.ts", "export const a = 1;\nexport const b = 2;\n");

    let change = FileChange::new(p.path("src/util.ts"), ChangeType::Modify).with_exports(["b"]);
    let tree = p.analyze("src/main.ts", vec![change]).tree();
    assert_eq!(
        tree.reason.as_deref(),
        Some("Directly affected by modified exports from 'util.ts': b")
    );
}

#[test]
fn test_delete_and_add_reasons() {
    let p = TestProject::new();
    p.write(
        "src/main.ts",
        "import { old } from './old';\nimport { fresh } from './fresh';\n",
    )
    .write("src/old.ts", "export const old = 1;\n")
    .write("src/fresh.ts", "export const fresh = 1;\n");

    let changes = vec![
        FileChange::new(p.path("src/old.ts"), ChangeType::Delete),
        FileChange::new(p.path("src/fresh.ts"), ChangeType::Add),
    ];
    let tree = p.analyze("src/main.ts", changes).tree();
    assert_eq!(
        tree.reason.as_deref(),
        Some(
            "Directly affected: Imported file 'old.ts' was deleted\n\
             Directly affected: New file 'fresh.ts' was added that is imported"
        )
    );
    assert_eq!(
        tree.find("src/fresh.ts").unwrap().reason.as_deref(),
        Some("File was added")
    );
}

#[test]
fn test_re_export_is_an_import_edge() {
    let p = TestProject::new();
    p.write("src/index.ts", "export { a } from './a';\nexport * from './b';\n")
        .write("src/a.ts", "export const a = 1;\n")
        .write("src/b.ts", "export const b = 1;\n");

    let change = FileChange::new(p.path("src/b.ts"), ChangeType::Modify).with_exports(["b"]);
    let tree = p.analyze("src/index.ts", vec![change]).tree();

    assert_eq!(tree.children.len(), 2);
    assert_eq!(
        tree.reason.as_deref(),
        Some("Directly affected by modified exports from 'b.ts': b")
    );
}

#[test]
fn test_asset_change() {
    let p = TestProject::new();
    p.write("src/main.ts", "import Page from './page';\n")
        .write(
            "src/page.tsx",
            "import './page.css';\nexport default function Page() {}\n",
        )
        .write("src/page.css", ".page {}\n");

    let change = FileChange::new(p.path("src/page.css"), ChangeType::Modify);
    let analysis = p.analyze("src/main.ts", vec![change]);
    let tree = analysis.tree();

    let css = tree.find("src/page.css").unwrap();
    assert_eq!(css.kind, FileKind::Asset);
    assert!(css.is_affected());
    assert_eq!(css.reason.as_deref(), Some("Asset file was modified"));
    assert!(css.imports.is_none());

    assert_eq!(
        tree.find("src/page.tsx").unwrap().reason.as_deref(),
        Some("Directly affected: File 'page.css' content was modified")
    );
    assert!(tree.is_affected());
}

#[test]
fn test_alias_import() {
    let p = TestProject::new();
    p.write("src/main.ts", "import { x } from '@/lib/x';\n")
        .write("src/lib/x.ts", "export const x = 1;\n");

    let tree = p.analyze("src/main.ts", Vec::new()).tree();
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].file, "src/lib/x.ts");
}

#[test]
fn test_directory_index_and_external_packages() {
    let p = TestProject::new();
    p.write(
        "src/main.ts",
        "import React from 'react';\nimport { h } from './helpers';\n",
    )
    .write("src/helpers/index.ts", "export const h = 1;\n");

    let analysis = p.analyze("src/main.ts", Vec::new());
    let tree = analysis.tree();
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].file, "src/helpers/index.ts");
    assert_eq!(tree.imports.as_ref().unwrap().len(), 2);
    assert!(analysis.warnings.is_empty());
}

#[test]
fn test_dangling_import_is_a_warning() {
    let p = TestProject::new();
    p.write("src/main.ts", "import { gone } from './missing';\n");

    let analysis = p.analyze("src/main.ts", Vec::new());
    assert!(analysis.tree().children.is_empty());
    assert_eq!(analysis.warnings.len(), 1);
    assert!(analysis.warnings[0].contains("'./missing'"));
}

#[test]
fn test_parse_failure_degrades_to_leaf() {
    let p = TestProject::new();
    p.write(
        "src/main.ts",
        "import { a } from './broken';\nimport { ok } from './ok';\n",
    )
    .write("src/broken.ts", "export const = {{;\n")
    .write("src/ok.ts", "export const ok = 1;\n");

    let analysis = p.analyze("src/main.ts", Vec::new());
    let tree = analysis.tree();
    assert_eq!(tree.children.len(), 2);

    let broken = tree.find("src/broken.ts").unwrap();
    assert!(broken.imports.is_none());
    assert!(broken.exports.is_none());
    assert!(analysis
        .warnings
        .iter()
        .any(|w| w.contains("error analyzing file")));
}

#[test]
fn test_missing_entry_is_fatal() {
    let p = TestProject::new();
    let result = analyze(&p.options("src/main.tsx", Vec::new()));
    assert!(matches!(
        result,
        Err(AnalysisError::EntryNotAccessible { .. })
    ));
}

#[test]
fn test_analysis_is_idempotent() {
    let p = layered_project();
    let change = FileChange::new("src/util.ts", ChangeType::Modify).with_exports(["a"]);

    let first = p.analyze("src/main.ts", vec![change.clone()]);
    let second = p.analyze("src/main.ts", vec![change]);
    assert_eq!(first.tree(), second.tree());
    assert_eq!(
        serde_json::to_string(&first.tree()).unwrap(),
        serde_json::to_string(&second.tree()).unwrap()
    );
    assert_eq!(first.affected_files(), second.affected_files());
}

#[test]
fn test_ignored_directory_is_not_parsed() {
    let p = TestProject::new();
    p.write("src/main.ts", "import { v } from './vendor/dist/v';\n")
        .write("src/vendor/dist/v.ts", "import { w } from './w';\nexport const v = w;\n")
        .write("src/vendor/dist/w.ts", "export const w = 1;\n");

    let tree = p.analyze("src/main.ts", Vec::new()).tree();
    let v = tree.find("src/vendor/dist/v.ts").unwrap();
    assert!(v.imports.is_none());
    assert!(v.children.is_empty());
}

#[test]
fn test_persistent_fact_store_survives_runs() {
    let p = layered_project();
    let store_path = default_store_path(p.root());
    let options = p.options("src/main.ts", Vec::new());

    let run = || {
        let store = FactStore::open(&store_path).unwrap();
        let cache = FactCache::new(PersistentFacts::new(TypeScriptFacts::new(), store));
        analyze_project(&options, &cache).unwrap().tree()
    };

    let first = run();
    assert_eq!(FactStore::open(&store_path).unwrap().count().unwrap(), 3);
    let second = run();
    assert_eq!(first, second);
}

#[test]
fn test_json_output_shape() {
    let p = layered_project();
    let change = FileChange::new(p.path("src/util.ts"), ChangeType::Modify).with_exports(["a"]);
    let json = serde_json::to_value(p.analyze("src/main.ts", vec![change]).tree()).unwrap();

    assert_eq!(json["file"], "src/main.ts");
    assert_eq!(json["type"], "js");
    assert_eq!(json["isAffected"], true);
    assert!(json.get("changeType").is_none());

    let util = &json["children"][0]["children"][0];
    assert_eq!(util["changeType"], "modify");
    assert_eq!(util["imports"], serde_json::json!([]));
    assert_eq!(util["exports"], serde_json::json!(["a", "b"]));
}
