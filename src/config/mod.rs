use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default config file names, searched in order.
const CONFIG_FILENAMES: &[&str] = &["ripple.toml", ".ripple/config.toml"];

/// Source extensions, tried in this order during resolution.
pub const DEFAULT_SOURCE_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx"];

pub const DEFAULT_ASSET_EXTENSIONS: &[&str] = &[".css", ".svg", ".png", ".jpg", ".jpeg", ".gif"];

/// Directory names whose contents are never parsed.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &["node_modules", ".git", ".vscode", "dist", "build"];

/// Top-level project configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolve: ResolveConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub source_extensions: Vec<String>,
    pub asset_extensions: Vec<String>,
    /// Specifier prefix -> root-relative base directory.
    pub aliases: BTreeMap<String, String>,
    /// Merge `compilerOptions.paths` from `tsconfig.json` into `aliases`.
    pub tsconfig: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            source_extensions: to_strings(DEFAULT_SOURCE_EXTENSIONS),
            asset_extensions: to_strings(DEFAULT_ASSET_EXTENSIONS),
            aliases: BTreeMap::from([("@/".to_string(), "src".to_string())]),
            tsconfig: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ignore_dirs: Vec<String>,
    /// Glob patterns (root-relative) of files that are never parsed.
    pub exclude: Vec<String>,
    pub empty_modified_exports: EmptyExportsPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: to_strings(DEFAULT_IGNORE_DIRS),
            exclude: Vec::new(),
            empty_modified_exports: EmptyExportsPolicy::default(),
        }
    }
}

/// How to read a `modify` change whose `modifiedExports` is present but empty.
///
/// An absent list always means "unknown" and implies full impact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyExportsPolicy {
    /// Empty means unknown: every importer is affected.
    #[default]
    FullImpact,
    /// Empty means no export changed: importers are not directly affected.
    NoImpact,
}

/// Find the config file for a project.
///
/// If `config_override` is provided, use that path directly.
/// Otherwise, search for config files in the project root.
pub fn find_config_path(project_root: &Path, config_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(override_path) = config_override {
        if override_path.exists() {
            return Some(override_path.to_path_buf());
        }
        return None;
    }

    CONFIG_FILENAMES
        .iter()
        .map(|name| project_root.join(name))
        .find(|path| path.exists())
}

/// Load and parse a config from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(toml_str: &str) -> Result<Config> {
    let config: Config = toml::from_str(toml_str)?;
    Ok(config)
}

/// Load the project config, falling back to defaults when no file exists.
/// An explicit override that does not exist is an error.
pub fn load_project_config(project_root: &Path, config_override: Option<&Path>) -> Result<Config> {
    match find_config_path(project_root, config_override) {
        Some(path) => load_config(&path),
        None => {
            if let Some(missing) = config_override {
                anyhow::bail!("Config file not found: {}", missing.display());
            }
            Ok(Config::default())
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
