//! External-process tool runner.
//!
//! A process tool receives its configuration as a single JSON document on
//! stdin and writes one JSON finding per line on stdout.

use super::{ToolInvocation, ToolRunner};
use crate::error::ToolFailure;
use crate::models::Finding;
use crate::resolver::PatternSetting;
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Maximum bytes of stderr kept in an execution error.
const STDERR_TAIL: usize = 2048;

/// Payload written to the tool's stdin.
#[derive(Debug, Serialize)]
struct ToolRequest<'a> {
    tool: &'a str,
    files: &'a [String],
    /// `None` asks the tool to use its default patterns.
    patterns: Option<&'a [PatternSetting]>,
    allow_network: bool,
    timeout_seconds: u64,
}

/// Runs a tool as a child process.
#[derive(Debug, Clone)]
pub struct ProcessTool {
    program: String,
    args: Vec<String>,
}

impl ProcessTool {
    /// Build from a command line such as `["pylint-adapter", "--json"]`.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl ToolRunner for ProcessTool {
    async fn run(&self, invocation: &ToolInvocation) -> Result<Vec<Finding>, ToolFailure> {
        let request = ToolRequest {
            tool: &invocation.tool.name,
            files: &invocation.files,
            patterns: invocation.settings.patterns.patterns(),
            allow_network: invocation.allow_network,
            timeout_seconds: invocation.timeout_seconds(),
        };
        let payload = serde_json::to_vec(&request).map_err(execution_error)?;

        debug!(
            "Spawning {} for {} ({} files)",
            self.program,
            invocation.tool.name,
            invocation.files.len()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&invocation.directory)
            .env(
                "TOOLSWEEP_ALLOW_NETWORK",
                if invocation.allow_network { "1" } else { "0" },
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolFailure::ExecutionError {
                message: format!("failed to start `{}`: {}", self.program, e),
            })?;

        // Stdin must be fed while stdout and stderr drain.
        let stdin = child.stdin.take();
        let feed = async {
            if let Some(mut stdin) = stdin {
                // A tool may exit without reading its input; that is not an error here.
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!("{}: stdin closed early: {}", invocation.tool.name, e);
                }
                // Dropping stdin sends EOF.
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(execution_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr
                .get(start..)
                .unwrap_or(&stderr)
                .trim();
            return Err(ToolFailure::ExecutionError {
                message: format!("{}: {}", output.status, tail),
            });
        }

        Ok(parse_findings(&invocation.tool.name, &output.stdout))
    }
}

/// Parse JSON-lines output, skipping lines that are not findings.
pub fn parse_findings(tool: &str, stdout: &[u8]) -> Vec<Finding> {
    let text = String::from_utf8_lossy(stdout);
    let mut findings = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Finding>(line) {
            Ok(finding) => findings.push(finding),
            Err(e) => warn!("{}: ignoring output line {}: {}", tool, index + 1, e),
        }
    }

    findings
}

fn execution_error(err: impl std::fmt::Display) -> ToolFailure {
    ToolFailure::ExecutionError {
        message: err.to_string(),
    }
}
