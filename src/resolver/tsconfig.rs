use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::Alias;

/// Alias mappings read from a `tsconfig.json` `compilerOptions.paths` table.
#[derive(Debug, Clone)]
pub struct TsConfig {
    /// The directory containing the tsconfig.json file.
    pub config_dir: PathBuf,
    /// The baseUrl used to anchor `paths` targets.
    pub base_url: Option<PathBuf>,
    pub aliases: Vec<Alias>,
}

impl TsConfig {
    /// Parse a tsconfig.json file for alias settings.
    pub fn parse(tsconfig_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(tsconfig_path)
            .with_context(|| format!("Failed to read {}", tsconfig_path.display()))?;
        Self::parse_from_str(&content, tsconfig_path)
    }

    /// Parse tsconfig.json content from a string.
    /// `tsconfig_path` is used to resolve relative paths.
    pub fn parse_from_str(content: &str, tsconfig_path: &Path) -> Result<Self> {
        let config_dir = tsconfig_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let json: serde_json::Value =
            serde_json::from_str(content).context("tsconfig.json is not valid JSON")?;
        let compiler_options = json.get("compilerOptions");

        let base_url = compiler_options
            .and_then(|co| co.get("baseUrl"))
            .and_then(|v| v.as_str())
            .map(|url| super::normalize_path(&config_dir.join(url)));

        let aliases = Self::parse_paths(compiler_options, base_url.as_deref().unwrap_or(&config_dir));

        Ok(TsConfig {
            config_dir,
            base_url,
            aliases,
        })
    }

    /// Load `tsconfig.json` from the project root if one exists.
    pub fn find(project_root: &Path) -> Option<Result<Self>> {
        let path = project_root.join("tsconfig.json");
        path.is_file().then(|| Self::parse(&path))
    }

    fn parse_paths(compiler_options: Option<&serde_json::Value>, base: &Path) -> Vec<Alias> {
        let paths_obj = match compiler_options
            .and_then(|co| co.get("paths"))
            .and_then(|p| p.as_object())
        {
            Some(obj) => obj,
            None => return Vec::new(),
        };

        let mut aliases = Vec::new();
        for (pattern, targets) in paths_obj {
            let targets = match targets.as_array() {
                Some(arr) => arr,
                None => continue,
            };

            let (prefix, wildcard) = split_on_wildcard(pattern);
            let bases: Vec<PathBuf> = targets
                .iter()
                .filter_map(|t| t.as_str())
                .map(|target| super::normalize_path(&base.join(split_on_wildcard(target).0)))
                .collect();
            if bases.is_empty() {
                continue;
            }

            aliases.push(Alias {
                prefix: prefix.to_string(),
                bases,
                exact: !wildcard,
            });
        }
        aliases
    }
}

/// Split a pattern on its `*` wildcard, returning the prefix and whether a
/// wildcard was present. Anything after the wildcard is ignored.
fn split_on_wildcard(pattern: &str) -> (&str, bool) {
    match pattern.find('*') {
        Some(pos) => (&pattern[..pos], true),
        None => (pattern, false),
    }
}
