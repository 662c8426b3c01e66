//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::GeneralConfig;
use crate::models::Level;
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Toolsweep - run static-analysis tools over a source tree
///
/// Collects the files of a directory, runs the configured analysis tools
/// on them and writes a single merged report.
///
/// Examples:
///   toolsweep ./my-project
///   toolsweep ./my-project --tool pylint --format markdown
///   toolsweep . --project-config project.json --fail-on error
///   toolsweep . --files src/a.py,src/b.py
///   toolsweep --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory to analyze
    #[arg(value_name = "DIR", default_value = ".")]
    pub directory: PathBuf,

    /// Run only this tool
    ///
    /// Fails when the tool is unknown or disabled (see --force-tool).
    #[arg(short, long, value_name = "NAME")]
    pub tool: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .toolsweep.toml in the current directory,
    /// then in the analyzed directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project configuration (JSON) that overrides local tool settings
    #[arg(long, value_name = "FILE", env = "TOOLSWEEP_PROJECT_CONFIG")]
    pub project_config: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// Default: from config or toolsweep_report.json
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (json, markdown)
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Allow tools to access the network
    #[arg(long)]
    pub allow_network: bool,

    /// Skip unreadable directories instead of failing
    #[arg(long)]
    pub force_file_permissions: bool,

    /// Run the tool given with --tool even if it is disabled
    #[arg(long, requires = "tool")]
    pub force_tool: bool,

    /// Number of tools run concurrently
    #[arg(long, alias = "concurrency", value_name = "NUM")]
    pub parallel: Option<usize>,

    /// Per-tool timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub tool_timeout: Option<u64>,

    /// Only analyze these files (comma-separated, relative to DIR)
    #[arg(long, value_name = "FILES", value_delimiter = ',')]
    pub files: Option<Vec<String>>,

    /// Extra glob patterns to exclude (comma-separated)
    ///
    /// Example: --exclude "**/generated/**,**/*.pb.go"
    #[arg(long, value_name = "PATTERNS", value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Fail if issues at or above this level are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is reached.
    /// Values: error, warning, info
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Generate a default .toolsweep.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Markdown format
    Markdown,
}

/// Issue level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Info,
    Warning,
    Error,
}

impl From<FailOnLevel> for Level {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Info => Level::Info,
            FailOnLevel::Warning => Level::Warning,
            FailOnLevel::Error => Level::Error,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.parallel == Some(0) {
            return Err("Parallelism must be at least 1".to_string());
        }

        if self.tool_timeout == Some(0) {
            return Err("Tool timeout must be at least 1 second".to_string());
        }

        if let Some(ref tool) = self.tool {
            if tool.trim().is_empty() {
                return Err("Tool name must not be empty".to_string());
            }
        }

        if let Some(ref files) = self.files {
            if files.iter().all(|f| f.trim().is_empty()) {
                return Err("--files needs at least one file".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level from the flags and the `verbose` config setting.
    ///
    /// `--quiet` wins over both.
    pub fn log_level(&self, general: &GeneralConfig) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// The files the run is restricted to, if any.
    pub fn restrict_to(&self) -> Option<BTreeSet<String>> {
        self.files.as_ref().map(|files| {
            files
                .iter()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect()
        })
    }
}
