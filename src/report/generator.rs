//! Report rendering.
//!
//! Turns a [`RunOutcome`] into a JSON document or a Markdown summary.

use crate::analysis::{group_by_file, most_problematic_files, ToolOutcome};
use crate::executor::{RunDiagnostics, RunOutcome};
use crate::models::{
    DuplicationClone, FileError, FileMetrics, Finding, Issue, IssueSummary, Level, Report,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Metadata about a run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// Analyzed directory, as given on the command line.
    pub directory: String,
    pub analysis_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_tool: Option<String>,
    pub tools_run: usize,
    pub tools_failed: usize,
    pub total_findings: usize,
    pub duration_seconds: f64,
}

/// Everything written to the report file.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub metadata: ReportMetadata,
    pub summary: IssueSummary,
    #[serde(flatten)]
    pub report: Report,
    pub diagnostics: RunDiagnostics,
}

impl ReportDocument {
    pub fn new(
        outcome: RunOutcome,
        directory: &Path,
        requested_tool: Option<String>,
        duration_seconds: f64,
    ) -> Self {
        let RunOutcome {
            report,
            diagnostics,
        } = outcome;

        let tools_run = diagnostics
            .tools
            .iter()
            .filter(|d| !matches!(d.outcome, ToolOutcome::Skipped { .. }))
            .count();

        let metadata = ReportMetadata {
            directory: directory.display().to_string(),
            analysis_date: Utc::now(),
            requested_tool,
            tools_run,
            tools_failed: diagnostics.failures().count(),
            total_findings: report.len(),
            duration_seconds,
        };

        Self {
            metadata,
            summary: IssueSummary::from_issues(report.issues()),
            report,
            diagnostics,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(doc: &ReportDocument) -> String {
    let mut output = String::new();

    output.push_str("# Toolsweep Report\n\n");
    output.push_str(&generate_metadata_section(&doc.metadata));
    output.push_str(&generate_summary_section(&doc.summary, &doc.report));
    output.push_str(&generate_tools_section(&doc.diagnostics));
    output.push_str(&generate_issues_section(&doc.report));
    output.push_str(&generate_metrics_section(&doc.report));
    output.push_str(&generate_duplication_section(&doc.report));
    output.push_str(&generate_file_errors_section(&doc.report));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Directory:** `{}`\n", metadata.directory));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(ref tool) = metadata.requested_tool {
        section.push_str(&format!("- **Tool:** `{}`\n", tool));
    }
    section.push_str(&format!("- **Tools Run:** {}\n", metadata.tools_run));
    if metadata.tools_failed > 0 {
        section.push_str(&format!("- **Tools Failed:** {}\n", metadata.tools_failed));
    }
    section.push_str(&format!(
        "- **Total Findings:** {}\n",
        metadata.total_findings
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &IssueSummary, report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    section.push_str("### Issue Level Breakdown\n\n");
    section.push_str(&format!(
        "| {} Error | {} Warning | {} Info | **Total** |\n",
        Level::Error.emoji(),
        Level::Warning.emoji(),
        Level::Info.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | **{}** |\n\n",
        summary.errors, summary.warnings, summary.infos, summary.total
    ));

    if !summary.by_tool.is_empty() {
        section.push_str("### Issues by Tool\n\n");
        section.push_str("| Tool | Count |\n");
        section.push_str("|:---|:---:|\n");
        for (tool, count) in &summary.by_tool {
            section.push_str(&format!("| {} | {} |\n", tool, count));
        }
        section.push('\n');
    }

    if !summary.by_category.is_empty() {
        section.push_str("### Issues by Category\n\n");
        section.push_str("| Category | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

        for (category, count) in categories {
            section.push_str(&format!("| {} | {} |\n", category, count));
        }
        section.push('\n');
    }

    let problematic = most_problematic_files(report, 5);
    if !problematic.is_empty() {
        section.push_str("### Most Problematic Files\n\n");
        section.push_str("| File | Issues |\n");
        section.push_str("|:---|:---:|\n");

        for (file, count) in problematic {
            section.push_str(&format!("| `{}` | {} |\n", file, count));
        }
        section.push('\n');
    }

    section
}

/// Generate the per-tool outcome table.
fn generate_tools_section(diagnostics: &RunDiagnostics) -> String {
    if diagnostics.tools.is_empty() && diagnostics.degraded.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Tools\n\n");

    if !diagnostics.tools.is_empty() {
        section.push_str("| Tool | Status | Details |\n");
        section.push_str("|:---|:---:|:---|\n");
        for diagnostic in &diagnostics.tools {
            let (status, details) = match &diagnostic.outcome {
                ToolOutcome::Succeeded { kept, dropped } => (
                    "✅ ok",
                    format!("{} findings kept, {} filtered", kept, dropped),
                ),
                ToolOutcome::Failed { failure } => ("❌ failed", failure.to_string()),
                ToolOutcome::Skipped { reason } => ("⏭️ skipped", reason.clone()),
            };
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                diagnostic.tool, status, details
            ));
        }
        section.push('\n');
    }

    for degraded in &diagnostics.degraded {
        section.push_str(&format!("> ⚠️ {}\n\n", degraded));
    }

    section
}

/// Generate the issues section.
fn generate_issues_section(report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Issues by File\n\n");

    let files = group_by_file(report.issues());
    if files.is_empty() {
        section.push_str("No issues were found in the analyzed files. 🎉\n\n");
        return section;
    }

    for (file, issues) in files {
        section.push_str(&format!("### {}\n\n", file));
        section.push_str(&format!("*Issues: {}*\n\n", issues.len()));
        for issue in &issues {
            section.push_str(&generate_issue_line(issue));
        }
        section.push('\n');
    }

    section
}

/// Generate a single issue line.
fn generate_issue_line(issue: &Issue) -> String {
    let category = issue
        .category
        .as_deref()
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default();

    format!(
        "- {} **{}** line {} `{}`{} ({}): {}\n",
        issue.level.emoji(),
        issue.level,
        issue.location,
        issue.pattern_id,
        category,
        issue.tool,
        issue.message
    )
}

fn generate_metrics_section(report: &Report) -> String {
    let metrics: Vec<&FileMetrics> = report
        .iter()
        .filter_map(|f| match f {
            Finding::FileMetrics(m) => Some(m),
            _ => None,
        })
        .collect();
    if metrics.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## File Metrics\n\n");
    section.push_str("| File | LOC | Comments | Complexity | Classes | Methods |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");
    for m in metrics {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {} |\n",
            m.file,
            cell(m.loc),
            cell(m.comment_lines),
            cell(m.complexity),
            cell(m.classes),
            cell(m.methods)
        ));
    }
    section.push('\n');

    section
}

fn cell(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn generate_duplication_section(report: &Report) -> String {
    let clones: Vec<&DuplicationClone> = report
        .iter()
        .filter_map(|f| match f {
            Finding::DuplicationClone(c) => Some(c),
            _ => None,
        })
        .collect();
    if clones.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Duplication\n\n");
    for clone in clones {
        section.push_str(&format!(
            "- {} lines, {} tokens, {} occurrences\n",
            clone.lines,
            clone.tokens,
            clone.occurrences.len()
        ));
        for occurrence in &clone.occurrences {
            section.push_str(&format!(
                "  - `{}` lines {}-{}\n",
                occurrence.file, occurrence.start_line, occurrence.end_line
            ));
        }
    }
    section.push('\n');

    section
}

fn generate_file_errors_section(report: &Report) -> String {
    let errors: Vec<&FileError> = report
        .iter()
        .filter_map(|f| match f {
            Finding::FileError(e) => Some(e),
            _ => None,
        })
        .collect();
    if errors.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Files Not Analyzed\n\n");
    for error in errors {
        section.push_str(&format!("- `{}`: {}\n", error.file, error.message));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by toolsweep v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(doc: &ReportDocument) -> Result<String> {
    serde_json::to_string_pretty(doc).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ToolDiagnostic;
    use crate::error::{DegradedInput, ToolFailure};
    use crate::models::{CloneOccurrence, Location};

    fn create_test_document() -> ReportDocument {
        let report: Report = vec![
            Finding::Issue(Issue {
                tool: "pylint".to_string(),
                file: "src/app.py".to_string(),
                pattern_id: "PyLint_E1101".to_string(),
                location: Location::line(10),
                message: "Instance has no member".to_string(),
                level: Level::Error,
                category: Some("ErrorProne".to_string()),
            }),
            Finding::Issue(Issue {
                tool: "pylint".to_string(),
                file: "src/app.py".to_string(),
                pattern_id: "PyLint_C0111".to_string(),
                location: Location::line(1),
                message: "Missing docstring".to_string(),
                level: Level::Info,
                category: None,
            }),
            Finding::FileMetrics(FileMetrics {
                file: "src/app.py".to_string(),
                loc: Some(120),
                comment_lines: None,
                complexity: Some(7),
                classes: None,
                methods: None,
            }),
            Finding::DuplicationClone(DuplicationClone {
                lines: 12,
                tokens: 80,
                occurrences: vec![
                    CloneOccurrence {
                        file: "src/a.py".to_string(),
                        start_line: 1,
                        end_line: 12,
                    },
                    CloneOccurrence {
                        file: "src/b.py".to_string(),
                        start_line: 30,
                        end_line: 41,
                    },
                ],
            }),
        ]
        .into_iter()
        .collect();

        let diagnostics = RunDiagnostics {
            tools: vec![
                ToolDiagnostic {
                    tool: "eslint".to_string(),
                    outcome: ToolOutcome::Failed {
                        failure: ToolFailure::Timeout { seconds: 60 },
                    },
                },
                ToolDiagnostic {
                    tool: "pylint".to_string(),
                    outcome: ToolOutcome::Succeeded {
                        kept: 4,
                        dropped: 1,
                    },
                },
                ToolDiagnostic {
                    tool: "rubocop".to_string(),
                    outcome: ToolOutcome::Skipped {
                        reason: "no applicable files".to_string(),
                    },
                },
            ],
            degraded: vec![DegradedInput::RemoteConfigUnavailable {
                reason: "connection refused".to_string(),
            }],
        };

        ReportDocument::new(
            RunOutcome {
                report,
                diagnostics,
            },
            Path::new("./project"),
            None,
            2.5,
        )
    }

    #[test]
    fn test_document_metadata() {
        let doc = create_test_document();
        assert_eq!(doc.metadata.tools_run, 2);
        assert_eq!(doc.metadata.tools_failed, 1);
        assert_eq!(doc.metadata.total_findings, 4);
        assert_eq!(doc.summary.total, 2);
        assert_eq!(doc.summary.errors, 1);
        assert_eq!(doc.summary.infos, 1);
    }

    #[test]
    fn test_generate_markdown_report() {
        let doc = create_test_document();
        let markdown = generate_markdown_report(&doc);

        assert!(markdown.contains("# Toolsweep Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("## Issues by File"));
        assert!(markdown.contains("### src/app.py"));
        assert!(markdown.contains("Instance has no member"));
        assert!(markdown.contains("timed out after 60s"));
        assert!(markdown.contains("no applicable files"));
        assert!(markdown.contains("connection refused"));
        assert!(markdown.contains("## File Metrics"));
        assert!(markdown.contains("`src/b.py` lines 30-41"));
    }

    #[test]
    fn test_issues_sorted_by_line_in_markdown() {
        let markdown = generate_markdown_report(&create_test_document());
        let docstring = markdown.find("Missing docstring").unwrap();
        let member = markdown.find("Instance has no member").unwrap();
        assert!(docstring < member);
    }

    #[test]
    fn test_empty_report_markdown() {
        let doc = ReportDocument::new(
            RunOutcome {
                report: Report::new(),
                diagnostics: RunDiagnostics::default(),
            },
            Path::new("."),
            Some("pylint".to_string()),
            0.0,
        );
        let markdown = generate_markdown_report(&doc);
        assert!(markdown.contains("No issues were found"));
        assert!(markdown.contains("- **Tool:** `pylint`"));
        assert!(!markdown.contains("## Tools"));
    }

    #[test]
    fn test_generate_json_report() {
        let doc = create_test_document();
        let json = generate_json_report(&doc).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["metadata"]["tools_failed"], 1);
        assert_eq!(value["findings"].as_array().unwrap().len(), 4);
        assert_eq!(value["diagnostics"]["tools"][0]["outcome"]["status"], "failed");
        assert_eq!(
            value["diagnostics"]["tools"][0]["outcome"]["failure"]["type"],
            "timeout"
        );
        assert!(value["metadata"].get("requested_tool").is_none());
    }
}
