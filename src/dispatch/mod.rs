//! Isolated workers for whole-entry analysis jobs.
//!
//! Protocol: one JSON request in, one JSON response out.
//! - Request: serialized [`AnalysisOptions`]
//! - Response: `{"status": "success", "result": {...}}` or
//!   `{"status": "error", "message": "..."}`
//!
//! Workers share no state with the caller or with each other. Results come
//! back in request order regardless of completion order.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::{analyze, AnalysisOptions};
use crate::model::file_graph::{to_relative, TreeNode};

/// Subcommand name the binary answers worker requests on.
pub const WORKER_SUBCOMMAND: &str = "worker";

pub type WorkerRequest = AnalysisOptions;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker: {reason}")]
    SpawnFailed { reason: String },

    /// Worker exited unsuccessfully before sending a response.
    #[error("Worker stopped with exit code {code}")]
    Exited { code: i32 },

    #[error("worker terminated by signal before responding")]
    Killed,

    /// Worker answered with an error response.
    #[error("{message}")]
    Remote { message: String },

    #[error("invalid worker response: {reason}")]
    InvalidResponse { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOutput {
    /// Entry file, relative to the request's root.
    pub entry: String,
    pub tree: TreeNode,
    pub affected_files: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerResponse {
    Success { result: WorkerOutput },
    Error { message: String },
}

impl WorkerResponse {
    pub fn into_result(self) -> WorkerResult<WorkerOutput> {
        match self {
            WorkerResponse::Success { result } => Ok(result),
            WorkerResponse::Error { message } => Err(WorkerError::Remote { message }),
        }
    }
}

/// Runs one request in isolation.
pub trait Dispatcher: Send + Sync {
    fn run(&self, request: &WorkerRequest) -> WorkerResult<WorkerOutput>;
}

/// Run a request in the current process. This is what every worker does
/// once it has a request in hand.
pub fn execute(request: &WorkerRequest) -> WorkerResponse {
    match analyze(request) {
        Ok(analysis) => WorkerResponse::Success {
            result: WorkerOutput {
                entry: to_relative(&request.entry_file, &request.root_dir)
                    .display()
                    .to_string(),
                tree: analysis.tree(),
                affected_files: analysis.affected_files(),
                warnings: analysis.warnings,
            },
        },
        Err(e) => WorkerResponse::Error {
            message: e.to_string(),
        },
    }
}

/// Worker side of the process protocol: read one request, write one
/// response line.
pub fn serve_worker(mut reader: impl Read, mut writer: impl Write) -> WorkerResult<()> {
    let mut input = String::new();
    reader.read_to_string(&mut input)?;

    let response = match serde_json::from_str::<WorkerRequest>(&input) {
        Ok(request) => execute(&request),
        Err(e) => WorkerResponse::Error {
            message: format!("invalid request: {}", e),
        },
    };

    serde_json::to_writer(&mut writer, &response)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Spawns a fresh subprocess per request.
pub struct ProcessWorker {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessWorker {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-invoke the running binary with the worker subcommand.
    pub fn current_exe() -> WorkerResult<Self> {
        let program = std::env::current_exe().map_err(|e| WorkerError::SpawnFailed {
            reason: format!("cannot locate current executable: {}", e),
        })?;
        Ok(Self::new(program, vec![WORKER_SUBCOMMAND.to_string()]))
    }
}

impl Dispatcher for ProcessWorker {
    fn run(&self, request: &WorkerRequest) -> WorkerResult<WorkerOutput> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| WorkerError::SpawnFailed {
                reason: format!("{}: {}", self.program.display(), e),
            })?;

        debug!(pid = child.id(), entry = %request.entry_file.display(), "spawned worker");

        {
            let mut stdin = child.stdin.take().ok_or_else(|| WorkerError::SpawnFailed {
                reason: "failed to capture stdin".to_string(),
            })?;
            let body = serde_json::to_vec(request)?;
            if let Err(e) = stdin.write_all(&body) {
                // The worker may have died already; its exit status says why.
                warn!("failed to send request to worker: {}", e);
            }
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let response_line = stdout.lines().rev().find(|l| !l.trim().is_empty());

        let parsed = response_line.map(serde_json::from_str::<WorkerResponse>);

        // A parsed response wins over the exit status.
        match (parsed, output.status.code()) {
            (Some(Ok(response)), _) => response.into_result(),
            (parsed, Some(0)) => Err(WorkerError::InvalidResponse {
                reason: match parsed {
                    Some(Err(e)) => e.to_string(),
                    _ => "worker exited without a response".to_string(),
                },
            }),
            (_, Some(code)) => Err(WorkerError::Exited { code }),
            (_, None) => Err(WorkerError::Killed),
        }
    }
}

/// Runs each request on a dedicated thread with fresh analysis state.
/// The result crosses back over a channel, never through shared memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadWorker;

impl Dispatcher for ThreadWorker {
    fn run(&self, request: &WorkerRequest) -> WorkerResult<WorkerOutput> {
        let (tx, rx) = mpsc::channel();
        let request = request.clone();
        let handle = std::thread::Builder::new()
            .name("ripple-worker".to_string())
            .spawn(move || {
                let _ = tx.send(execute(&request));
            })
            .map_err(|e| WorkerError::SpawnFailed {
                reason: e.to_string(),
            })?;

        let response = rx.recv();
        let _ = handle.join();
        match response {
            Ok(response) => response.into_result(),
            Err(_) => Err(WorkerError::InvalidResponse {
                reason: "worker thread stopped without a response".to_string(),
            }),
        }
    }
}

/// Dispatch every request concurrently; results line up with `requests`.
pub fn dispatch_all(
    dispatcher: &dyn Dispatcher,
    requests: &[WorkerRequest],
) -> Vec<WorkerResult<WorkerOutput>> {
    requests
        .par_iter()
        .map(|request| dispatcher.run(request))
        .collect()
}

/// Merged view of several worker results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciled {
    pub outputs: Vec<WorkerOutput>,
    /// Union of every successful worker's affected files, sorted.
    pub affected_files: Vec<String>,
    pub failures: Vec<WorkerFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerFailure {
    pub entry: PathBuf,
    pub message: String,
}

/// Combine results after every worker has returned.
pub fn reconcile(
    requests: &[WorkerRequest],
    results: Vec<WorkerResult<WorkerOutput>>,
) -> Reconciled {
    let mut affected = BTreeSet::new();
    let mut reconciled = Reconciled::default();

    for (request, result) in requests.iter().zip(results) {
        match result {
            Ok(output) => {
                affected.extend(output.affected_files.iter().cloned());
                reconciled.outputs.push(output);
            }
            Err(e) => {
                warn!("analysis of {} failed: {}", request.entry_file.display(), e);
                reconciled.failures.push(WorkerFailure {
                    entry: request.entry_file.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    reconciled.affected_files = affected.into_iter().collect();
    reconciled
}
