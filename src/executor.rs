//! Run coordination.
//!
//! One call to [`Executor::run`] walks the states
//! `Init -> ConfigResolved -> FilesCollected -> ToolsInvoked -> Aggregated -> Reported`,
//! or ends in `Errored` on a fatal condition. A failing tool never makes the
//! run fatal; cancellation always does.

use crate::analysis::{aggregate, ToolDiagnostic, ToolOutcome, ToolResult};
use crate::error::{DegradedInput, FatalError, RemoteConfigError, ToolFailure};
use crate::models::Report;
use crate::resolver::{
    remote_or_degraded, LocalSettings, PlannedInvocation, ProjectConfiguration, ToolConfigResolver,
};
use crate::scanner::{CollectOptions, FileCollector};
use crate::tools::ToolRegistry;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default number of tools invoked at once.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Progress of a run through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    ConfigResolved,
    FilesCollected,
    ToolsInvoked,
    Aggregated,
    Reported,
    Errored,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cooperative cancellation shared between the caller and a run.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. In-flight tool invocations are dropped.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`Cancellation::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as `self`, so this only returns on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Inputs of a single run.
#[derive(Debug)]
pub struct RunRequest {
    /// Root of the source tree.
    pub directory: PathBuf,
    /// Restrict the run to this tool.
    pub tool: Option<String>,
    pub local: LocalSettings,
    /// `None` when no project configuration was requested; `Some(Err)` when fetching it failed.
    pub remote: Option<Result<ProjectConfiguration, RemoteConfigError>>,
    /// Run-wide network permission; a tool needs this and its own permission.
    pub allow_network: bool,
    /// Skip unreadable subtrees instead of failing.
    pub force_file_permissions: bool,
    /// Run an explicitly requested tool even when it is disabled.
    pub force_tool: bool,
    /// Only analyze these files (e.g. the files of a diff).
    pub restrict_to: Option<BTreeSet<String>>,
    /// Upper bound on concurrently running tools.
    pub parallelism: usize,
}

impl RunRequest {
    pub fn new(directory: impl Into<PathBuf>, local: LocalSettings) -> Self {
        Self {
            directory: directory.into(),
            tool: None,
            local,
            remote: None,
            allow_network: false,
            force_file_permissions: false,
            force_tool: false,
            restrict_to: None,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Non-fatal conditions collected during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunDiagnostics {
    /// One entry per resolved tool, sorted by tool name.
    pub tools: Vec<ToolDiagnostic>,
    pub degraded: Vec<DegradedInput>,
}

impl RunDiagnostics {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ToolFailure)> {
        self.tools.iter().filter_map(|d| match &d.outcome {
            ToolOutcome::Failed { failure } => Some((d.tool.as_str(), failure)),
            _ => None,
        })
    }

    /// True when tools were invoked and none of them succeeded.
    pub fn all_tools_failed(&self) -> bool {
        let attempted = self
            .tools
            .iter()
            .filter(|d| !matches!(d.outcome, ToolOutcome::Skipped { .. }))
            .count();
        attempted > 0 && self.failures().count() == attempted
    }

    /// True when anything other than a clean run happened.
    pub fn has_warnings(&self) -> bool {
        !self.degraded.is_empty() || self.failures().next().is_some()
    }
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub diagnostics: RunDiagnostics,
}

/// Coordinates configuration, file collection, tool invocation and aggregation.
pub struct Executor {
    registry: Arc<ToolRegistry>,
    cancellation: Cancellation,
    show_progress: bool,
    state: RunState,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            cancellation: Cancellation::new(),
            show_progress: false,
            state: RunState::Init,
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// State reached by the last run.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute one run.
    ///
    /// Returns a report whenever the run got past tool invocation, even when
    /// some or all tools failed.
    pub async fn run(&mut self, request: RunRequest) -> Result<RunOutcome, FatalError> {
        self.state = RunState::Init;
        match self.execute(request).await {
            Ok(outcome) => {
                self.transition(RunState::Reported);
                Ok(outcome)
            }
            Err(err) => {
                warn!("Run aborted in state {}: {}", self.state, err);
                self.transition(RunState::Errored);
                Err(err)
            }
        }
    }

    async fn execute(&mut self, request: RunRequest) -> Result<RunOutcome, FatalError> {
        self.check_cancelled()?;

        let (remote, degraded) = remote_or_degraded(request.remote);
        if let Some(ref input) = degraded {
            warn!("{}; continuing with local settings", input);
        }

        let resolved = ToolConfigResolver::new(&self.registry)
            .force_requested(request.force_tool)
            .resolve(request.tool.as_deref(), &request.local, remote.as_ref())?;
        self.transition(RunState::ConfigResolved);
        self.check_cancelled()?;

        let options = CollectOptions {
            force_file_permissions: request.force_file_permissions,
            restrict_to: request.restrict_to,
        };
        let files = FileCollector::new(&request.directory, &resolved.exclusions, options).collect()?;
        info!("Collected {} files", files.len());
        self.transition(RunState::FilesCollected);
        self.check_cancelled()?;

        let plan = resolved.plan(&request.directory, &files, request.allow_network);
        let mut diagnostics = RunDiagnostics {
            tools: plan
                .skipped
                .into_iter()
                .map(|(tool, reason)| ToolDiagnostic {
                    tool,
                    outcome: ToolOutcome::Skipped { reason },
                })
                .collect(),
            degraded: degraded.into_iter().collect(),
        };

        let progress = self.progress_bar(plan.invocations.len());
        let cancellation = self.cancellation.clone();
        let results = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                if let Some(pb) = &progress {
                    pb.abandon();
                }
                return Err(FatalError::Cancelled);
            }
            results = invoke_all(plan.invocations, request.parallelism, progress.clone()) => results,
        };
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        self.transition(RunState::ToolsInvoked);

        let (report, tool_diagnostics) = aggregate(results, &resolved);
        diagnostics.tools.extend(tool_diagnostics);
        diagnostics.tools.sort_by(|a, b| a.tool.cmp(&b.tool));
        self.transition(RunState::Aggregated);

        info!(
            "Aggregated {} findings from {} tools",
            report.len(),
            diagnostics.tools.len()
        );
        Ok(RunOutcome {
            report,
            diagnostics,
        })
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state: {} -> {}", self.state, next);
        self.state = next;
    }

    fn check_cancelled(&self) -> Result<(), FatalError> {
        if self.cancellation.is_cancelled() {
            Err(FatalError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.show_progress || len == 0 {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tools {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }
}

/// Run every invocation, at most `parallelism` at a time.
async fn invoke_all(
    invocations: Vec<PlannedInvocation>,
    parallelism: usize,
    progress: Option<ProgressBar>,
) -> BTreeMap<String, ToolResult> {
    stream::iter(invocations)
        .map(|planned| {
            let progress = progress.clone();
            async move {
                let name = planned.invocation.tool.name.clone();
                let result = invoke(&planned).await;
                if let Some(pb) = progress {
                    pb.set_message(name.clone());
                    pb.inc(1);
                }
                (name, result)
            }
        })
        .buffer_unordered(parallelism.max(1))
        .collect()
        .await
}

async fn invoke(planned: &PlannedInvocation) -> ToolResult {
    let invocation = &planned.invocation;
    info!(
        "Running {} on {} files",
        invocation.tool.name,
        invocation.files.len()
    );

    match tokio::time::timeout(invocation.timeout, planned.runner.run(invocation)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "{} timed out after {:?}",
                invocation.tool.name, invocation.timeout
            );
            Err(ToolFailure::Timeout {
                seconds: invocation.timeout_seconds(),
            })
        }
    }
}
