use std::path::{Component, Path};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::AnalysisConfig;
use crate::model::file_graph::to_relative;

/// Decides which source files are left unparsed during traversal.
///
/// A path is ignored when any of its components equals an ignored directory
/// name, or when its root-relative form matches an exclude glob.
pub struct IgnoreRules {
    dirs: Vec<String>,
    exclude: GlobSet,
}

impl IgnoreRules {
    pub fn new(config: &AnalysisConfig) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            dirs: config.ignore_dirs.clone(),
            exclude: builder.build()?,
        })
    }

    pub fn is_ignored(&self, path: &Path, root: &Path) -> bool {
        let relative = to_relative(path, root);
        let in_ignored_dir = relative.components().any(|c| match c {
            Component::Normal(name) => self.dirs.iter().any(|d| name == d.as_str()),
            _ => false,
        });
        in_ignored_dir || self.exclude.is_match(relative)
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            dirs: AnalysisConfig::default().ignore_dirs,
            exclude: GlobSet::empty(),
        }
    }
}
