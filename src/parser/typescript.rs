use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tree_sitter::{Language, Node, Parser};

use crate::model::{FileFacts, ImportFact, DEFAULT_BINDING, NAMESPACE_BINDING};

use super::FactProvider;

/// Default fact provider for JavaScript and TypeScript sources.
#[derive(Default)]
pub struct TypeScriptFacts {
    // We create parsers per-call since tree_sitter::Parser is not Sync
}

impl TypeScriptFacts {
    pub fn new() -> Self {
        Self::default()
    }

    fn language_for(path: &Path) -> Language {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts" | "mts" | "cts") => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Some("tsx") => tree_sitter_typescript::LANGUAGE_TSX.into(),
            _ => tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    /// Parse source text without touching the filesystem.
    pub fn parse_source(&self, source: &str, path: &Path) -> Result<FileFacts> {
        let mut parser = Parser::new();
        parser
            .set_language(&Self::language_for(path))
            .context("failed to set parser language")?;
        let tree = parser
            .parse(source, None)
            .context("tree-sitter failed to parse")?;

        let root = tree.root_node();
        if root.has_error() {
            anyhow::bail!("syntax error in {}", path.display());
        }

        let mut extractor = Extractor::new(source);
        extractor.visit_children(root);
        Ok(FileFacts {
            imports: extractor.imports,
            exports: extractor.exports,
        })
    }
}

impl FactProvider for TypeScriptFacts {
    fn parse_file(&self, path: &Path, content: Option<&str>) -> Result<FileFacts> {
        match content {
            Some(text) => self.parse_source(text, path),
            None => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                self.parse_source(&text, path)
            }
        }
    }
}

/// Walks a tree-sitter CST collecting module imports and exported names.
struct Extractor<'a> {
    source: &'a str,
    imports: Vec<ImportFact>,
    exports: BTreeSet<String>,
}

impl<'a> Extractor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            imports: Vec::new(),
            exports: BTreeSet::new(),
        }
    }

    fn node_text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn string_value(&self, node: Node) -> String {
        self.node_text(node)
            .trim_matches(|c| c == '\'' || c == '"' || c == '`')
            .to_string()
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_node(child);
        }
    }

    fn visit_node(&mut self, node: Node) {
        match node.kind() {
            "import_statement" => self.extract_import(node),
            "export_statement" => {
                self.extract_export(node);
                // Dynamic imports can hide inside exported initializers.
                self.visit_children(node);
            }
            "call_expression" => {
                self.try_extract_dynamic_import(node);
                self.visit_children(node);
            }
            _ => self.visit_children(node),
        }
    }

    fn extract_import(&mut self, node: Node) {
        let source = match node.child_by_field_name("source") {
            Some(n) => self.string_value(n),
            // `import x = require(...)` and friends
            None => return,
        };

        let mut specifiers = BTreeSet::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "import_clause" {
                self.collect_import_clause(child, &mut specifiers);
            }
        }

        self.imports.push(ImportFact { source, specifiers });
    }

    fn collect_import_clause(&self, node: Node, specifiers: &mut BTreeSet<String>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    specifiers.insert(DEFAULT_BINDING.to_string());
                }
                "namespace_import" => {
                    specifiers.insert(NAMESPACE_BINDING.to_string());
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for spec in child.children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        if let Some(name) = spec.child_by_field_name("name") {
                            specifiers.insert(self.node_text(name).to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn extract_export(&mut self, node: Node) {
        let source = node
            .child_by_field_name("source")
            .map(|n| self.string_value(n));

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();

        if children.iter().any(|c| c.kind() == "default") {
            self.exports.insert(DEFAULT_BINDING.to_string());
            return;
        }

        for child in children {
            match child.kind() {
                "export_clause" => self.extract_export_clause(child, source.as_deref()),
                "*" => {
                    if let Some(ref src) = source {
                        self.imports
                            .push(ImportFact::new(src.clone(), [NAMESPACE_BINDING]));
                    }
                }
                "namespace_export" => {
                    // export * as ns from '...'
                    if let Some(name) = self.last_named_child_text(child) {
                        self.exports.insert(name);
                    }
                    if let Some(ref src) = source {
                        self.imports
                            .push(ImportFact::new(src.clone(), [NAMESPACE_BINDING]));
                    }
                }
                "lexical_declaration" | "variable_declaration" => {
                    self.extract_variable_names(child);
                }
                "function_declaration"
                | "generator_function_declaration"
                | "class_declaration"
                | "abstract_class_declaration"
                | "interface_declaration"
                | "type_alias_declaration"
                | "enum_declaration"
                | "internal_module"
                | "module" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        self.exports.insert(self.node_text(name).to_string());
                    }
                }
                _ => {}
            }
        }
    }

    fn extract_export_clause(&mut self, node: Node, source: Option<&str>) {
        let mut reexported = BTreeSet::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "export_specifier" {
                continue;
            }
            let Some(name_node) = child.child_by_field_name("name") else {
                continue;
            };
            let local_name = self.node_text(name_node).to_string();
            let exported_name = child
                .child_by_field_name("alias")
                .map(|n| self.node_text(n).to_string())
                .unwrap_or_else(|| local_name.clone());

            self.exports.insert(exported_name);
            reexported.insert(local_name);
        }

        // export { a } from './x' depends on './x' just like an import does.
        if let Some(src) = source {
            self.imports.push(ImportFact {
                source: src.to_string(),
                specifiers: reexported,
            });
        }
    }

    fn extract_variable_names(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "variable_declarator" {
                continue;
            }
            let Some(name) = child.child_by_field_name("name") else {
                continue;
            };
            if name.kind() == "identifier" {
                self.exports.insert(self.node_text(name).to_string());
            } else {
                // Destructuring: export const { a, b: c } = obj
                self.collect_pattern_bindings(name);
            }
        }
    }

    fn collect_pattern_bindings(&mut self, node: Node) {
        match node.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => {
                self.exports.insert(self.node_text(node).to_string());
            }
            "pair_pattern" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.collect_pattern_bindings(value);
                }
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.collect_pattern_bindings(child);
                }
            }
        }
    }

    fn last_named_child_text(&self, node: Node) -> Option<String> {
        let count = node.named_child_count();
        if count == 0 {
            return None;
        }
        node.named_child(count - 1)
            .map(|n| self.string_value(n))
    }

    /// `import('./x')` with a literal argument.
    fn try_extract_dynamic_import(&mut self, node: Node) {
        let is_import = node
            .child_by_field_name("function")
            .is_some_and(|f| f.kind() == "import");
        if !is_import {
            return;
        }
        let Some(args) = node.child_by_field_name("arguments") else {
            return;
        };

        let mut cursor = args.walk();
        let first_arg = args.named_children(&mut cursor).next();
        if let Some(arg) = first_arg {
            // Template strings and variables cannot be resolved statically.
            if arg.kind() == "string" {
                let source = self.string_value(arg);
                self.imports.push(ImportFact::new(source, [NAMESPACE_BINDING]));
            }
        }
    }
}
