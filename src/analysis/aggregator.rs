//! Finding aggregation and filtering.
//!
//! Raw results of every tool are folded into one [`Report`]. Exclusions and
//! pattern selections are applied again here, so a tool that ignores its
//! configuration cannot leak findings into the report.

use crate::error::ToolFailure;
use crate::exclusion::{normalize_path, ExclusionRuleSet};
use crate::models::{Finding, Issue, Report};
use crate::resolver::ResolvedConfiguration;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Raw output of one tool invocation.
pub type ToolResult = Result<Vec<Finding>, ToolFailure>;

/// What happened to a single tool during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool produced results; `dropped` counts findings removed by filtering.
    Succeeded { kept: usize, dropped: usize },
    Failed { failure: ToolFailure },
    Skipped { reason: String },
}

/// Outcome of a tool, tagged with its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDiagnostic {
    pub tool: String,
    pub outcome: ToolOutcome,
}

impl ToolDiagnostic {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failed { .. })
    }
}

/// Merge per-tool results into a report.
///
/// Failed tools contribute nothing and are listed in the returned diagnostics.
/// Duplicate findings collapse into one.
pub fn aggregate(
    results: BTreeMap<String, ToolResult>,
    config: &ResolvedConfiguration,
) -> (Report, Vec<ToolDiagnostic>) {
    let mut report = Report::new();
    let mut diagnostics = Vec::with_capacity(results.len());

    for (tool, result) in results {
        let findings = match result {
            Ok(findings) => findings,
            Err(failure) => {
                warn!("Tool {} failed: {}", tool, failure);
                diagnostics.push(ToolDiagnostic {
                    tool,
                    outcome: ToolOutcome::Failed { failure },
                });
                continue;
            }
        };

        let (exclusions, patterns) = match config.tools.get(&tool) {
            Some(effective) => (
                &effective.exclusions,
                effective.settings.patterns.explicit_ids(),
            ),
            None => (&config.exclusions, None),
        };

        let total = findings.len();
        let mut kept = 0;
        for finding in findings {
            if let Some(finding) = filter_finding(finding, &tool, exclusions, patterns.as_ref()) {
                kept += 1;
                report.insert(finding);
            }
        }

        debug!("{}: kept {} of {} findings", tool, kept, total);
        diagnostics.push(ToolDiagnostic {
            tool,
            outcome: ToolOutcome::Succeeded {
                kept,
                dropped: total - kept,
            },
        });
    }

    (report, diagnostics)
}

/// Apply path and pattern policy to one finding.
///
/// Only issues are filtered by pattern. Every kind is filtered by path.
pub fn filter_finding(
    finding: Finding,
    tool: &str,
    exclusions: &ExclusionRuleSet,
    patterns: Option<&BTreeSet<&str>>,
) -> Option<Finding> {
    match finding {
        Finding::Issue(mut issue) => {
            issue.file = normalize_path(&issue.file).into_owned();
            issue.tool = tool.to_string();
            if exclusions.is_excluded(&issue.file) {
                return None;
            }
            if let Some(allowed) = patterns {
                if !allowed.contains(issue.pattern_id.as_str()) {
                    return None;
                }
            }
            Some(Finding::Issue(issue))
        }
        Finding::FileMetrics(mut metrics) => {
            metrics.file = normalize_path(&metrics.file).into_owned();
            (!exclusions.is_excluded(&metrics.file)).then_some(Finding::FileMetrics(metrics))
        }
        Finding::FileError(mut err) => {
            err.file = normalize_path(&err.file).into_owned();
            (!exclusions.is_excluded(&err.file)).then_some(Finding::FileError(err))
        }
        Finding::DuplicationClone(mut clone) => {
            let before = clone.occurrences.len();
            for occurrence in &mut clone.occurrences {
                occurrence.file = normalize_path(&occurrence.file).into_owned();
            }
            clone
                .occurrences
                .retain(|o| !exclusions.is_excluded(&o.file));
            // a clone needs two sides once anything was cut away
            if clone.occurrences.len() < before && clone.occurrences.len() < 2 {
                return None;
            }
            Some(Finding::DuplicationClone(clone))
        }
    }
}

/// Group issues by file path.
pub fn group_by_file<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> BTreeMap<String, Vec<Issue>> {
    let mut grouped: BTreeMap<String, Vec<Issue>> = BTreeMap::new();

    for issue in issues {
        grouped
            .entry(issue.file.clone())
            .or_default()
            .push(issue.clone());
    }

    // Sort issues within each file by line number
    for issues in grouped.values_mut() {
        issues.sort_by_key(|i| i.location.clone());
    }

    grouped
}

/// Identify the files with the most issues.
pub fn most_problematic_files(report: &Report, n: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = group_by_file(report.issues())
        .into_iter()
        .map(|(file, issues)| (file, issues.len()))
        .collect();

    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(n);
    counts
}
