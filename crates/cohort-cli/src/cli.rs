//! CLI argument definitions.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use cohort_ingest::DEFAULT_ENCODING;

#[derive(Parser)]
#[command(
    name = "cohort",
    version,
    about = "Validate clinical cohort data files and run submissions",
    long_about = "Validate clinical cohort data files against declared definitions.\n\n\
                  `check` validates a single file; `submit` runs a full submission\n\
                  for a cohort and period, including cross-file patient ID checks."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow cell values in log output.
    ///
    /// Values are redacted by default since they may contain patient data.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load and validate one file against its definition.
    Check(CheckArgs),

    /// Run a submission for a cohort and period.
    Submit(SubmitArgs),

    /// List the loaded definitions.
    Definitions(EngineArgs),
}

/// Options shared by every command that builds an engine.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Definition file (JSON or TOML) or a directory of them.
    #[arg(long = "definitions", short = 'd', value_name = "PATH")]
    pub definitions: PathBuf,

    /// Engine configuration file (TOML).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for spill files of disk-backed loads.
    #[arg(long = "spill-dir", value_name = "DIR")]
    pub spill_dir: Option<PathBuf>,

    /// Maximum number of columns validated in parallel.
    #[arg(long = "max-parallel-columns", value_name = "N")]
    pub max_parallel_columns: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// File type whose definition applies.
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub file_type: String,

    /// CSV file to validate.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Character encoding of the file.
    #[arg(long = "encoding", default_value = DEFAULT_ENCODING)]
    pub encoding: String,

    /// Print the report as JSON instead of tables.
    #[arg(long = "json")]
    pub json: bool,

    /// Exit with status 2 when any value is invalid.
    #[arg(long = "fail-on-invalid")]
    pub fail_on_invalid: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[arg(long = "cohort")]
    pub cohort: String,

    /// Reporting period, e.g. 2024-Q1.
    #[arg(long = "period")]
    pub period: String,

    /// File to upload, as TYPE=PATH. Repeat for each file.
    #[arg(long = "file", value_name = "TYPE=PATH", required = true)]
    pub files: Vec<FileArg>,

    /// Character encoding of the files.
    #[arg(long = "encoding", default_value = DEFAULT_ENCODING)]
    pub encoding: String,

    /// Name recorded as uploader and acknowledger.
    #[arg(long = "actor", default_value = "cli")]
    pub actor: String,

    /// Acknowledge every completed file once loading finishes.
    #[arg(long = "acknowledge")]
    pub acknowledge: bool,

    /// Comment stored with acknowledgments.
    #[arg(long = "comment", requires = "acknowledge")]
    pub comment: Option<String>,

    /// Write the final submission as JSON.
    #[arg(long = "report", value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Exit with status 2 when any value is invalid.
    #[arg(long = "fail-on-invalid")]
    pub fail_on_invalid: bool,
}

/// A `TYPE=PATH` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArg {
    pub file_type: String,
    pub path: PathBuf,
}

impl FromStr for FileArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (file_type, path) = value
            .split_once('=')
            .ok_or_else(|| format!("expected TYPE=PATH, got '{value}'"))?;
        let file_type = file_type.trim();
        let path = path.trim();
        if file_type.is_empty() || path.is_empty() {
            return Err(format!("expected TYPE=PATH, got '{value}'"));
        }
        Ok(Self {
            file_type: file_type.to_string(),
            path: PathBuf::from(path),
        })
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
