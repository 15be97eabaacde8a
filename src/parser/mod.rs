use anyhow::Result;
use std::path::Path;

use crate::model::FileFacts;

pub mod typescript;

pub use typescript::TypeScriptFacts;

/// Extracts import/export facts from one source file.
///
/// When `content` is `None` the provider reads the file itself; otherwise the
/// given text is parsed as if it were the file's content (for example a
/// historical revision). Unparseable content is an error.
pub trait FactProvider: Send + Sync {
    fn parse_file(&self, path: &Path, content: Option<&str>) -> Result<FileFacts>;
}

impl<T: FactProvider + ?Sized> FactProvider for Box<T> {
    fn parse_file(&self, path: &Path, content: Option<&str>) -> Result<FileFacts> {
        (**self).parse_file(path, content)
    }
}

impl<T: FactProvider + ?Sized> FactProvider for std::sync::Arc<T> {
    fn parse_file(&self, path: &Path, content: Option<&str>) -> Result<FileFacts> {
        (**self).parse_file(path, content)
    }
}
