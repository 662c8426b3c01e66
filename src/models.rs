//! Data models for findings and reports.
//!
//! Tools emit [`Finding`]s. The aggregator folds the surviving findings of
//! every tool into a [`Report`], a set with no meaningful order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Level reported by a tool for an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Style and informational findings
    Info,
    /// Code smells and likely bugs
    Warning,
    /// Errors and security problems
    Error,
}

impl Default for Level {
    fn default() -> Self {
        Level::Warning
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Info => write!(f, "Info"),
            Level::Warning => write!(f, "Warning"),
            Level::Error => write!(f, "Error"),
        }
    }
}

impl Level {
    /// Returns an emoji representation of the level.
    pub fn emoji(&self) -> &'static str {
        match self {
            Level::Info => "🔵",
            Level::Warning => "🟡",
            Level::Error => "🔴",
        }
    }
}

/// Position of an issue inside a file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// 1-indexed line.
    pub line: usize,
    /// 1-indexed column, when the tool reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl Location {
    pub fn line(line: usize) -> Self {
        Self { line, column: None }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(col) => write!(f, "{}:{}", self.line, col),
            None => write!(f, "{}", self.line),
        }
    }
}

/// A pattern violation reported by a tool.
///
/// Two issues are the same finding when tool, file, pattern id, location
/// and message are equal. Level and category are carried along but do not
/// take part in equality, ordering or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Short name of the tool that produced the issue.
    #[serde(default)]
    pub tool: String,
    /// Path relative to the analysis root.
    pub file: String,
    /// Tool-assigned pattern identifier.
    pub pattern_id: String,
    pub location: Location,
    pub message: String,
    #[serde(default)]
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Issue {
    fn identity(&self) -> (&str, &str, &str, &Location, &str) {
        (
            &self.tool,
            &self.file,
            &self.pattern_id,
            &self.location,
            &self.message,
        )
    }
}

impl PartialEq for Issue {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Issue {}

impl PartialOrd for Issue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Issue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl Hash for Issue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// Per-file metrics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileMetrics {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_lines: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<u64>,
}

/// One location of a duplicated block.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CloneOccurrence {
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// A block of code duplicated across one or more files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DuplicationClone {
    pub lines: usize,
    pub tokens: usize,
    pub occurrences: Vec<CloneOccurrence>,
}

/// A file the tool could not analyze.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileError {
    pub file: String,
    pub message: String,
}

/// A unit of tool output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Issue(Issue),
    FileMetrics(FileMetrics),
    DuplicationClone(DuplicationClone),
    FileError(FileError),
}

impl Finding {
    /// The single file this finding belongs to, if it has exactly one.
    pub fn file(&self) -> Option<&str> {
        match self {
            Finding::Issue(issue) => Some(&issue.file),
            Finding::FileMetrics(metrics) => Some(&metrics.file),
            Finding::FileError(err) => Some(&err.file),
            Finding::DuplicationClone(_) => None,
        }
    }

    /// Returns the issue when this finding is one.
    pub fn as_issue(&self) -> Option<&Issue> {
        match self {
            Finding::Issue(issue) => Some(issue),
            _ => None,
        }
    }
}

/// The aggregated result of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub findings: BTreeSet<Finding>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a finding, returning false when an identical one was present.
    pub fn insert(&mut self, finding: Finding) -> bool {
        self.findings.insert(finding)
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.findings.iter().filter_map(Finding::as_issue)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter()
    }
}

impl FromIterator<Finding> for Report {
    fn from_iter<T: IntoIterator<Item = Finding>>(iter: T) -> Self {
        Self {
            findings: iter.into_iter().collect(),
        }
    }
}

/// Summary of issues in a report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueSummary {
    /// Total number of issues.
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    /// Issues grouped by tool.
    pub by_tool: BTreeMap<String, usize>,
    /// Issues grouped by category; uncategorized issues are not counted.
    pub by_category: BTreeMap<String, usize>,
}

impl IssueSummary {
    /// Creates a summary from a sequence of issues.
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let mut summary = Self::default();

        for issue in issues {
            summary.total += 1;
            match issue.level {
                Level::Error => summary.errors += 1,
                Level::Warning => summary.warnings += 1,
                Level::Info => summary.infos += 1,
            }

            *summary.by_tool.entry(issue.tool.clone()).or_insert(0) += 1;
            if let Some(category) = &issue.category {
                *summary.by_category.entry(category.clone()).or_insert(0) += 1;
            }
        }

        summary
    }
}

/// Detect the language of a file from its extension.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let name = path.rsplit(['/', '\\']).next()?.to_ascii_lowercase();
    // Dockerfiles are named, not suffixed: `Dockerfile`, `Dockerfile.dev`.
    if name == "dockerfile" || name.starts_with("dockerfile.") {
        return Some("dockerfile");
    }
    let ext = name.rsplit_once('.')?.1;
    let language = match ext {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "scala" | "sc" => "scala",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "sh" | "bash" => "shell",
        "md" | "markdown" => "markdown",
        "yml" | "yaml" => "yaml",
        "json" => "json",
        "css" | "scss" | "less" => "css",
        "html" | "htm" => "html",
        "vue" => "vue",
        "svelte" => "svelte",
        "dockerfile" => "dockerfile",
        _ => return None,
    };
    Some(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(pattern: &str, level: Level) -> Issue {
        Issue {
            tool: "pylint".to_string(),
            file: "lib/main.py".to_string(),
            pattern_id: pattern.to_string(),
            location: Location::line(3),
            message: "Missing docstring".to_string(),
            level,
            category: Some("Documentation".to_string()),
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
    }

    #[test]
    fn test_issue_identity_ignores_level() {
        let a = issue("PyLint_C0111", Level::Info);
        let b = issue("PyLint_C0111", Level::Error);
        assert_eq!(a, b);

        let report: Report = vec![Finding::Issue(a), Finding::Issue(b)].into_iter().collect();
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_issue_identity_includes_location() {
        let a = issue("PyLint_C0111", Level::Info);
        let b = Issue {
            location: Location { line: 3, column: Some(7) },
            ..a.clone()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_finding_json_shape() {
        let json = r#"{"kind":"issue","file":"a.py","pattern_id":"E1","location":{"line":2},"message":"m"}"#;
        let finding: Finding = serde_json::from_str(json).unwrap();
        let issue = finding.as_issue().unwrap();
        assert_eq!(issue.level, Level::Warning);
        assert_eq!(issue.tool, "");
        assert_eq!(finding.file(), Some("a.py"));

        let clone: Finding = serde_json::from_str(
            r#"{"kind":"duplication_clone","lines":10,"tokens":80,"occurrences":[]}"#,
        )
        .unwrap();
        assert_eq!(clone.file(), None);
    }

    #[test]
    fn test_issue_summary() {
        let issues = vec![
            issue("A", Level::Error),
            issue("B", Level::Warning),
            Issue {
                category: None,
                ..issue("C", Level::Info)
            },
        ];

        let summary = IssueSummary::from_issues(&issues);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.infos, 1);
        assert_eq!(summary.by_tool.get("pylint"), Some(&3));
        assert_eq!(summary.by_category.get("Documentation"), Some(&2));
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path("lib/main.py"), Some("python"));
        assert_eq!(language_for_path("web/App.TSX"), Some("typescript"));
        assert_eq!(language_for_path("Makefile"), None);
        assert_eq!(language_for_path("notes.unknownext"), None);
    }

    #[test]
    fn test_language_for_dockerfiles() {
        assert_eq!(language_for_path("Dockerfile"), Some("dockerfile"));
        assert_eq!(language_for_path("build/Dockerfile"), Some("dockerfile"));
        assert_eq!(language_for_path("deploy\\Dockerfile.dev"), Some("dockerfile"));
        assert_eq!(language_for_path("ci/app.dockerfile"), Some("dockerfile"));
        assert_eq!(language_for_path("docs/dockerfiles.md"), Some("markdown"));
    }
}
