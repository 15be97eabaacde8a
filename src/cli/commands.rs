use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::analysis::{analyze_project, AnalysisOptions};
use crate::cache::FactCache;
use crate::changes::git::{GitRange, GitRepo};
use crate::changes::{load_changes_file, parse_changes_json, resolve_paths, single_change};
use crate::config::{load_project_config, Config};
use crate::db::{default_store_path, FactStore, PersistentFacts};
use crate::dispatch::{
    dispatch_all, reconcile, serve_worker, Dispatcher, ProcessWorker, ThreadWorker, WorkerOutput,
};
use crate::model::file_graph::to_relative;
use crate::model::{ChangeType, FileChange};
use crate::parser::TypeScriptFacts;
use crate::resolver::normalize_path;

use super::output::{
    format_changes_text, format_json, format_output_text, format_reconciled_text,
};
use super::{EntryArgs, OutputFormat};

/// Project root plus its loaded configuration.
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
}

/// Resolve the project root (default: current directory) and load its config.
pub fn load_project(root: Option<&Path>, config: Option<&Path>) -> Result<Project> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let root = match root {
        Some(r) if r.is_absolute() => normalize_path(r),
        Some(r) => normalize_path(&cwd.join(r)),
        None => normalize_path(&cwd),
    };
    let config = load_project_config(&root, config)?;
    debug!(root = %root.display(), "loaded project");
    Ok(Project { root, config })
}

/// Change set from exactly one of the accepted sources, with paths made
/// absolute against the project root. No source means no changes.
pub fn gather_changes(
    project: &Project,
    changes_json: Option<&str>,
    changes_file: Option<&Path>,
    file: Option<&Path>,
    change_type: Option<ChangeType>,
    exports: Option<&str>,
) -> Result<Vec<FileChange>> {
    let changes = if let Some(json) = changes_json {
        parse_changes_json(json)?
    } else if let Some(path) = changes_file {
        load_changes_file(path)?
    } else if let (Some(file), Some(change_type)) = (file, change_type) {
        vec![single_change(file, change_type, exports)]
    } else {
        Vec::new()
    };
    Ok(resolve_paths(changes, &project.root))
}

fn build_cache(project: &Project, persist: bool) -> Result<FactCache> {
    if !persist {
        return Ok(FactCache::default());
    }
    let path = default_store_path(&project.root);
    let store = FactStore::open(&path)
        .with_context(|| format!("Failed to open fact store {}", path.display()))?;
    info!(store = %path.display(), "using persistent fact store");
    Ok(FactCache::new(PersistentFacts::new(TypeScriptFacts::new(), store)))
}

/// Run the `analyze` command.
///
/// A single entry is analyzed in-process. Several entries are dispatched to
/// isolated workers and reconciled. The flag is true when any entry failed.
pub fn run_analyze(
    project: &Project,
    entries: &EntryArgs,
    changes: Vec<FileChange>,
    format: &OutputFormat,
) -> Result<(String, bool)> {
    let requests: Vec<AnalysisOptions> = entries
        .entries
        .iter()
        .map(|entry| {
            AnalysisOptions::new(entry.clone(), project.root.clone())
                .with_changes(changes.clone())
                .with_config(project.config.clone())
        })
        .collect();

    if let [request] = requests.as_slice() {
        let cache = build_cache(project, entries.persist_cache)?;
        let analysis = analyze_project(request, &cache)?;
        let output = WorkerOutput {
            entry: to_relative(&request.entry_file, &project.root)
                .display()
                .to_string(),
            tree: analysis.tree(),
            affected_files: analysis.affected_files(),
            warnings: analysis.warnings,
        };
        let text = match format {
            OutputFormat::Text => format_output_text(&output),
            _ => format_json(&output, format),
        };
        return Ok((text, false));
    }

    if entries.persist_cache {
        debug!("persistent fact store applies to single-entry runs only");
    }

    let process_worker;
    let dispatcher: &dyn Dispatcher = if entries.in_process {
        &ThreadWorker
    } else {
        process_worker = ProcessWorker::current_exe()?;
        &process_worker
    };

    let results = dispatch_all(dispatcher, &requests);
    let reconciled = reconcile(&requests, results);
    let has_failures = !reconciled.failures.is_empty();

    let text = match format {
        OutputFormat::Text => format_reconciled_text(&reconciled),
        _ => format_json(&reconciled, format),
    };
    Ok((text, has_failures))
}

/// Run the `git` command.
pub fn run_git(
    project: &Project,
    entries: &EntryArgs,
    range: &str,
    detailed: bool,
    list: bool,
    format: &OutputFormat,
) -> Result<(String, bool)> {
    let range: GitRange = range.parse()?;
    let repo = GitRepo::discover(&project.root)?;
    let cache = build_cache(project, entries.persist_cache)?;
    let changes = repo.collect_changes(&range, detailed, &cache)?;

    if list {
        return Ok((format_json(&changes, format), false));
    }

    if changes.is_empty() {
        return Ok((
            "No relevant file changes found in the specified range.".to_string(),
            false,
        ));
    }

    let (analysis, has_failures) = run_analyze(project, entries, changes.clone(), format)?;
    let text = match format {
        OutputFormat::Text => format!(
            "{}{}",
            format_changes_text(&range.to_string(), &changes, detailed),
            analysis
        ),
        _ => {
            let analysis: serde_json::Value =
                serde_json::from_str(&analysis).context("analysis output is not JSON")?;
            let report = serde_json::json!({
                "range": range.to_string(),
                "changes": changes,
                "analysis": analysis,
            });
            format_json(&report, format)
        }
    };
    Ok((text, has_failures))
}

/// Run the hidden `worker` command: one request on stdin, one response on
/// stdout.
pub fn run_worker() -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_worker(stdin.lock(), stdout.lock())?;
    Ok(())
}
