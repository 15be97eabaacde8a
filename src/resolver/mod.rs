use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::config::ResolveConfig;
use crate::model::FileKind;

pub mod tsconfig;

/// Result of resolving a module specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved to an existing file.
    Resolved(PathBuf),
    /// A bare specifier that matches no alias. Forms no edge.
    External(String),
    /// A relative or aliased specifier that matched no file (dangling import).
    NotFound(PathBuf),
}

impl Resolution {
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Resolution::Resolved(path) => Some(path),
            _ => None,
        }
    }
}

/// A specifier prefix rewritten to one or more base directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub prefix: String,
    /// Absolute bases, tried in order.
    pub bases: Vec<PathBuf>,
    /// Exact aliases match only the whole specifier.
    pub exact: bool,
}

/// Maps module specifiers to files under a project root.
///
/// Resolution is a pure function of the filesystem state and
/// `(from_file, specifier)`. Candidates are tried in a fixed order:
/// 1. the exact path, if it is a regular file
/// 2. the path plus each source extension
/// 3. the path plus each asset extension
/// 4. `path/index.<ext>` for each source extension
#[derive(Debug, Clone)]
pub struct SpecifierResolver {
    root_dir: PathBuf,
    source_extensions: Vec<String>,
    asset_extensions: Vec<String>,
    /// Sorted by prefix length, longest first.
    aliases: Vec<Alias>,
}

impl SpecifierResolver {
    /// Create a resolver using only the aliases from `config`.
    pub fn new(root_dir: &Path, config: &ResolveConfig) -> Self {
        let root_dir = normalize_path(root_dir);
        let aliases = config
            .aliases
            .iter()
            .map(|(prefix, base)| Alias {
                prefix: prefix.clone(),
                bases: vec![normalize_path(&root_dir.join(base))],
                exact: false,
            })
            .collect();

        let mut resolver = Self {
            root_dir,
            source_extensions: config.source_extensions.clone(),
            asset_extensions: config.asset_extensions.clone(),
            aliases: Vec::new(),
        };
        resolver.extend_aliases(aliases);
        resolver
    }

    /// Create a resolver and merge `tsconfig.json` path aliases when enabled.
    /// An unreadable tsconfig is logged and skipped.
    pub fn for_project(root_dir: &Path, config: &ResolveConfig) -> Self {
        let mut resolver = Self::new(root_dir, config);
        if config.tsconfig {
            match tsconfig::TsConfig::find(&resolver.root_dir) {
                Some(Ok(ts)) => {
                    debug!(count = ts.aliases.len(), "loaded tsconfig path aliases");
                    resolver.extend_aliases(ts.aliases);
                }
                Some(Err(e)) => warn!("ignoring tsconfig.json: {:#}", e),
                None => {}
            }
        }
        resolver
    }

    pub fn with_alias(mut self, prefix: &str, base: &Path) -> Self {
        let base = normalize_path(&self.root_dir.join(base));
        self.extend_aliases(vec![Alias {
            prefix: prefix.to_string(),
            bases: vec![base],
            exact: false,
        }]);
        self
    }

    fn extend_aliases(&mut self, aliases: Vec<Alias>) {
        for alias in aliases {
            // First definition of a prefix wins.
            if !self.aliases.iter().any(|a| a.prefix == alias.prefix) {
                self.aliases.push(alias);
            }
        }
        self.aliases
            .sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()).then(a.prefix.cmp(&b.prefix)));
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Kind inferred from the file extension.
    pub fn kind_of(&self, path: &Path) -> FileKind {
        let name = path.to_string_lossy();
        if self
            .source_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
        {
            FileKind::Source
        } else {
            FileKind::Asset
        }
    }

    /// Resolve `specifier` as written inside `from_file`.
    pub fn resolve(&self, from_file: &Path, specifier: &str) -> Resolution {
        let (bases, catch_all) = if is_relative(specifier) {
            let dir = from_file.parent().unwrap_or(&self.root_dir);
            (vec![normalize_path(&dir.join(specifier))], false)
        } else {
            match self.alias_bases(specifier) {
                Some(found) => found,
                None => return Resolution::External(specifier.to_string()),
            }
        };

        for base in &bases {
            if let Some(found) = self.try_candidates(base) {
                debug!(specifier, resolved = %found.display(), "resolved import");
                return Resolution::Resolved(found);
            }
        }

        // A `*` alias only shadows bare packages it can actually serve.
        if catch_all {
            return Resolution::External(specifier.to_string());
        }

        let attempted = bases.into_iter().next().unwrap_or_default();
        Resolution::NotFound(attempted)
    }

    /// Convenience form of [`resolve`](Self::resolve) that drops the reason.
    pub fn resolve_path(&self, from_file: &Path, specifier: &str) -> Option<PathBuf> {
        self.resolve(from_file, specifier).into_path()
    }

    /// Candidate bases from the longest matching alias, and whether that
    /// alias is a catch-all (empty prefix).
    fn alias_bases(&self, specifier: &str) -> Option<(Vec<PathBuf>, bool)> {
        let alias = self.aliases.iter().find(|a| {
            if a.exact {
                specifier == a.prefix
            } else {
                specifier.starts_with(a.prefix.as_str())
            }
        })?;

        let rest = specifier[alias.prefix.len()..].trim_start_matches('/');
        let bases = alias
            .bases
            .iter()
            .map(|base| {
                if rest.is_empty() {
                    base.clone()
                } else {
                    normalize_path(&base.join(rest))
                }
            })
            .collect();
        Some((bases, alias.prefix.is_empty()))
    }

    fn try_candidates(&self, base: &Path) -> Option<PathBuf> {
        if base.is_file() {
            return Some(base.to_path_buf());
        }

        let with_suffix = |ext: &String| PathBuf::from(format!("{}{}", base.display(), ext));

        self.source_extensions
            .iter()
            .chain(self.asset_extensions.iter())
            .map(with_suffix)
            .find(|candidate| candidate.is_file())
            .or_else(|| {
                self.source_extensions
                    .iter()
                    .map(|ext| base.join(format!("index{}", ext)))
                    .find(|candidate| candidate.is_file())
            })
    }
}

/// `./x`, `../x`, `.` and `..` are relative; everything else is bare or aliased.
pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Normalize a path by resolving `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                // Only pop if there's a normal component to pop
                if components
                    .last()
                    .is_some_and(|c| matches!(c, Component::Normal(_)))
                {
                    components.pop();
                } else if !matches!(components.last(), Some(Component::RootDir)) {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}
