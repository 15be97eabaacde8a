use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub mod commands;
pub mod output;

#[derive(Parser)]
#[command(
    name = "ripple",
    version,
    about = "Change-impact analysis over JavaScript/TypeScript import graphs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Project root (default: current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Path to config file (default: ripple.toml or .ripple/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level for stderr diagnostics; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: LogLevel,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze which files a change set affects
    Analyze {
        #[command(flatten)]
        entries: EntryArgs,

        /// JSON array of changes: [{"changedFile", "changeType", "modifiedExports"?}]
        #[arg(short = 'f', long, conflicts_with_all = ["changes_file", "file"])]
        changes: Option<String>,

        /// Read the JSON change array from a file
        #[arg(long, conflicts_with = "file")]
        changes_file: Option<PathBuf>,

        /// A single changed file
        #[arg(long, requires = "change_type")]
        file: Option<PathBuf>,

        /// Change type for --file
        #[arg(long = "type", value_enum)]
        change_type: Option<ChangeTypeArg>,

        /// Comma-separated modified export names for --file
        #[arg(long, requires = "file")]
        exports: Option<String>,
    },

    /// Derive changes from a git revision range, then analyze them
    Git {
        #[command(flatten)]
        entries: EntryArgs,

        /// Revision range (e.g. HEAD^..HEAD, main..feature)
        #[arg(short, long, default_value = "HEAD^..HEAD")]
        range: String,

        /// Compute modified exports and line statistics for modified files
        #[arg(short, long)]
        detailed: bool,

        /// Print the collected changes as JSON and stop
        #[arg(long)]
        list: bool,
    },

    /// Serve one analysis request from stdin (used for parallel dispatch)
    #[command(hide = true)]
    Worker,
}

#[derive(Args, Clone)]
pub struct EntryArgs {
    /// Entry file; repeat to analyze several entries in parallel
    #[arg(short, long = "entry", default_value = "src/main.tsx")]
    pub entries: Vec<PathBuf>,

    /// Run parallel entries on threads instead of worker processes
    #[arg(long)]
    pub in_process: bool,

    /// Persist parsed facts in .ripple/facts.db between runs
    #[arg(long)]
    pub persist_cache: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ChangeTypeArg {
    Add,
    Modify,
    Delete,
}

impl From<ChangeTypeArg> for crate::model::ChangeType {
    fn from(arg: ChangeTypeArg) -> Self {
        match arg {
            ChangeTypeArg::Add => crate::model::ChangeType::Add,
            ChangeTypeArg::Modify => crate::model::ChangeType::Modify,
            ChangeTypeArg::Delete => crate::model::ChangeType::Delete,
        }
    }
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Compact,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
