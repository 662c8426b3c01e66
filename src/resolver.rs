//! Per-tool configuration resolution.
//!
//! Local settings come from `.toolsweep.toml`. A project configuration may
//! also be supplied from a remote source. For every tool the remote entry,
//! when there is one, wins over the local entry as a whole; tools the remote
//! configuration does not mention keep their local settings.

use crate::error::{DegradedInput, RemoteConfigError, ResolveError};
use crate::exclusion::{ExclusionRuleSet, ExclusionRules};
use crate::tools::{ToolDescriptor, ToolInvocation, ToolRegistry, ToolRunner};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default per-tool timeout when neither the tool nor the run sets one.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// A pattern enabled for a tool, with optional parameter overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSetting {
    /// Tool-internal pattern identifier.
    #[serde(alias = "internal_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl PatternSetting {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parameters: BTreeMap::new(),
        }
    }
}

/// An explicit pattern selection for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPatternSet {
    pub tool_uuid: String,
    pub enabled: bool,
    pub was_locally_edited: bool,
    pub patterns: Vec<PatternSetting>,
}

/// Which patterns a tool runs with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PatternConfiguration {
    /// The tool's own default pattern set; findings are not filtered by pattern.
    #[default]
    Defaults,
    /// Only the listed patterns.
    Explicit(ToolPatternSet),
}

impl PatternConfiguration {
    /// Pattern ids to filter on. `None` unless the selection is explicit and non-empty.
    pub fn explicit_ids(&self) -> Option<BTreeSet<&str>> {
        match self {
            PatternConfiguration::Explicit(set) if !set.patterns.is_empty() => {
                Some(set.patterns.iter().map(|p| p.id.as_str()).collect())
            }
            _ => None,
        }
    }

    /// Patterns to hand to the tool. `None` means "use your defaults".
    pub fn patterns(&self) -> Option<&[PatternSetting]> {
        match self {
            PatternConfiguration::Explicit(set) => Some(&set.patterns),
            PatternConfiguration::Defaults => None,
        }
    }
}

/// Settings for a single tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    pub enabled: bool,
    pub timeout: Option<Duration>,
    pub allow_network: bool,
    pub patterns: PatternConfiguration,
    /// Extra exclusions for this tool only, added to the global rules.
    pub exclusions: ExclusionRules,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: None,
            allow_network: false,
            patterns: PatternConfiguration::Defaults,
            exclusions: ExclusionRules::default(),
        }
    }
}

/// Configuration available on the machine running the analysis.
#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub exclusions: ExclusionRules,
    pub tools: BTreeMap<String, ToolSettings>,
    pub default_timeout: Duration,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            exclusions: ExclusionRules::default(),
            tools: BTreeMap::new(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// Pattern configuration for one tool inside a project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolConfiguration {
    pub uuid: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub was_locally_edited: bool,
    #[serde(default)]
    pub patterns: Vec<PatternSetting>,
}

fn default_true() -> bool {
    true
}

/// Authoritative project configuration, fetched elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfiguration {
    /// Replaces the local exclusion rules when present.
    #[serde(default)]
    pub exclusions: Option<ExclusionRules>,
    #[serde(default)]
    pub tools: Vec<RemoteToolConfiguration>,
}

impl ProjectConfiguration {
    /// Read a project configuration exported as JSON.
    pub fn load(path: &Path) -> Result<Self, RemoteConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn tool(&self, uuid: &str) -> Option<&RemoteToolConfiguration> {
        self.tools.iter().find(|t| t.uuid == uuid)
    }
}

/// Split a fetch outcome into the configuration to use and the degradation to record.
pub fn remote_or_degraded(
    remote: Option<Result<ProjectConfiguration, RemoteConfigError>>,
) -> (Option<ProjectConfiguration>, Option<DegradedInput>) {
    match remote {
        None => (None, None),
        Some(Ok(config)) => (Some(config), None),
        Some(Err(err)) => (
            None,
            Some(DegradedInput::RemoteConfigUnavailable {
                reason: err.to_string(),
            }),
        ),
    }
}

/// A tool ready to run, with its fully resolved settings.
#[derive(Clone)]
pub struct EffectiveTool {
    pub descriptor: ToolDescriptor,
    pub runner: Arc<dyn ToolRunner>,
    pub settings: ToolSettings,
    /// Global rules plus the tool's own.
    pub exclusions: ExclusionRuleSet,
    pub timeout: Duration,
}

impl fmt::Debug for EffectiveTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveTool")
            .field("descriptor", &self.descriptor)
            .field("settings", &self.settings)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Output of [`ToolConfigResolver::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedConfiguration {
    /// Rules applied while walking the tree.
    pub exclusions: ExclusionRuleSet,
    /// Enabled tools keyed by short name.
    pub tools: BTreeMap<String, EffectiveTool>,
    pub requested: Option<String>,
}

/// An invocation paired with the runner that executes it.
#[derive(Clone)]
pub struct PlannedInvocation {
    pub invocation: ToolInvocation,
    pub runner: Arc<dyn ToolRunner>,
}

/// The tools to run for a given file snapshot.
#[derive(Default)]
pub struct ExecutionPlan {
    pub invocations: Vec<PlannedInvocation>,
    /// Tools left out, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl ResolvedConfiguration {
    /// Match tools against the collected files.
    ///
    /// A tool with no applicable files is skipped, not failed.
    pub fn plan(&self, directory: &Path, files: &BTreeSet<String>, allow_network: bool) -> ExecutionPlan {
        let mut plan = ExecutionPlan::default();

        for (name, tool) in &self.tools {
            let applicable: Vec<String> = files
                .iter()
                .filter(|f| !tool.exclusions.is_excluded(f) && tool.descriptor.applies_to(f))
                .cloned()
                .collect();

            if applicable.is_empty() {
                debug!("Skipping {}: no applicable files", name);
                plan.skipped
                    .push((name.clone(), "no applicable files".to_string()));
                continue;
            }

            plan.invocations.push(PlannedInvocation {
                invocation: ToolInvocation {
                    tool: tool.descriptor.clone(),
                    directory: directory.to_path_buf(),
                    files: applicable,
                    settings: tool.settings.clone(),
                    timeout: tool.timeout,
                    allow_network: allow_network && tool.settings.allow_network,
                },
                runner: Arc::clone(&tool.runner),
            });
        }

        plan
    }
}

/// Resolves effective per-tool settings against a registry.
pub struct ToolConfigResolver<'a> {
    registry: &'a ToolRegistry,
    force_requested: bool,
}

impl<'a> ToolConfigResolver<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self {
            registry,
            force_requested: false,
        }
    }

    /// Run an explicitly requested tool even when it is disabled.
    pub fn force_requested(mut self, force: bool) -> Self {
        self.force_requested = force;
        self
    }

    /// Produce the effective configuration.
    ///
    /// With `requested` set only that tool is resolved, and a disabled tool is
    /// reported as [`ResolveError::ToolNotEnabled`]. Without it every enabled
    /// registered tool is resolved.
    pub fn resolve(
        &self,
        requested: Option<&str>,
        local: &LocalSettings,
        remote: Option<&ProjectConfiguration>,
    ) -> Result<ResolvedConfiguration, ResolveError> {
        let candidates: Vec<_> = match requested {
            Some(name) => match self.registry.get(name) {
                Some(tool) => vec![tool],
                None => {
                    return Err(ResolveError::UnknownTool {
                        name: name.to_string(),
                        available: self.registry.names(),
                    })
                }
            },
            None => self.registry.iter().collect(),
        };

        for name in local.tools.keys() {
            if self.registry.get(name).is_none() {
                debug!("Ignoring settings for unregistered tool {}", name);
            }
        }
        for entry in remote.iter().flat_map(|r| &r.tools) {
            if self.registry.by_uuid(&entry.uuid).is_none() {
                debug!("Project configuration names unregistered tool {}", entry.uuid);
            }
        }

        let base_rules = match remote.and_then(|r| r.exclusions.as_ref()) {
            Some(rules) => rules.clone(),
            None => local.exclusions.clone(),
        };
        let exclusions = base_rules.compile()?;

        let mut tools = BTreeMap::new();
        for tool in candidates {
            let name = &tool.descriptor.name;
            let local_settings = local.tools.get(name).cloned().unwrap_or_default();

            let settings = match remote.and_then(|r| r.tool(&tool.descriptor.uuid)) {
                Some(entry) => {
                    debug!("Using project configuration for {}", name);
                    ToolSettings {
                        enabled: entry.enabled,
                        patterns: if entry.was_locally_edited {
                            PatternConfiguration::Explicit(ToolPatternSet {
                                tool_uuid: entry.uuid.clone(),
                                enabled: entry.enabled,
                                was_locally_edited: true,
                                patterns: entry.patterns.clone(),
                            })
                        } else {
                            PatternConfiguration::Defaults
                        },
                        ..local_settings
                    }
                }
                None => local_settings,
            };

            if !settings.enabled {
                if requested.is_some() && !self.force_requested {
                    return Err(ResolveError::ToolNotEnabled(name.clone()));
                }
                if requested.is_none() {
                    debug!("Tool {} is disabled", name);
                    continue;
                }
            }

            if !settings.exclusions.is_empty() {
                debug!("{} adds its own exclusion rules", name);
            }
            let tool_rules = base_rules.union(&settings.exclusions);
            let effective = EffectiveTool {
                descriptor: tool.descriptor.clone(),
                runner: Arc::clone(&tool.runner),
                timeout: settings.timeout.unwrap_or(local.default_timeout),
                exclusions: tool_rules.compile()?,
                settings,
            };
            tools.insert(name.clone(), effective);
        }

        Ok(ResolvedConfiguration {
            exclusions,
            tools,
            requested: requested.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolFailure;
    use crate::models::Finding;
    use async_trait::async_trait;

    struct NoopTool;

    #[async_trait]
    impl ToolRunner for NoopTool {
        async fn run(&self, _invocation: &ToolInvocation) -> Result<Vec<Finding>, ToolFailure> {
            Ok(Vec::new())
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::builder()
            .register(
                ToolDescriptor::new("pylint", "uuid-pylint").with_languages(["python"]),
                Arc::new(NoopTool),
            )
            .register(
                ToolDescriptor::new("eslint", "uuid-eslint").with_languages(["javascript"]),
                Arc::new(NoopTool),
            )
            .build()
    }

    fn explicit(uuid: &str, ids: &[&str]) -> PatternConfiguration {
        PatternConfiguration::Explicit(ToolPatternSet {
            tool_uuid: uuid.to_string(),
            enabled: true,
            was_locally_edited: true,
            patterns: ids.iter().map(|id| PatternSetting::new(*id)).collect(),
        })
    }

    #[test]
    fn test_local_only_resolves_all_tools_with_defaults() {
        let registry = registry();
        let resolved = ToolConfigResolver::new(&registry)
            .resolve(None, &LocalSettings::default(), None)
            .unwrap();

        assert_eq!(resolved.tools.len(), 2);
        for tool in resolved.tools.values() {
            assert_eq!(tool.settings.patterns, PatternConfiguration::Defaults);
            assert_eq!(tool.timeout, DEFAULT_TOOL_TIMEOUT);
        }
    }

    #[test]
    fn test_remote_entry_overrides_local_per_tool() {
        let registry = registry();
        let mut local = LocalSettings::default();
        local.tools.insert(
            "pylint".to_string(),
            ToolSettings {
                timeout: Some(Duration::from_secs(30)),
                patterns: explicit("uuid-pylint", &["PyLint_W0611"]),
                ..Default::default()
            },
        );
        local.tools.insert(
            "eslint".to_string(),
            ToolSettings {
                patterns: explicit("uuid-eslint", &["no-undef"]),
                ..Default::default()
            },
        );

        let remote = ProjectConfiguration {
            exclusions: None,
            tools: vec![RemoteToolConfiguration {
                uuid: "uuid-pylint".to_string(),
                enabled: true,
                was_locally_edited: true,
                patterns: vec![
                    PatternSetting::new("PyLint_C0111"),
                    PatternSetting::new("PyLint_E1101"),
                ],
            }],
        };

        let resolved = ToolConfigResolver::new(&registry)
            .resolve(None, &local, Some(&remote))
            .unwrap();

        let pylint = &resolved.tools["pylint"];
        let ids = pylint.settings.patterns.explicit_ids().unwrap();
        assert_eq!(
            ids,
            ["PyLint_C0111", "PyLint_E1101"].into_iter().collect::<BTreeSet<_>>()
        );
        // local-only keys survive the override
        assert_eq!(pylint.timeout, Duration::from_secs(30));

        let eslint = &resolved.tools["eslint"];
        assert_eq!(
            eslint.settings.patterns.explicit_ids().unwrap(),
            ["no-undef"].into_iter().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_remote_unedited_tool_uses_defaults() {
        let registry = registry();
        let remote = ProjectConfiguration {
            exclusions: None,
            tools: vec![RemoteToolConfiguration {
                uuid: "uuid-pylint".to_string(),
                enabled: true,
                was_locally_edited: false,
                patterns: vec![PatternSetting::new("PyLint_C0111")],
            }],
        };
        let resolved = ToolConfigResolver::new(&registry)
            .resolve(Some("pylint"), &LocalSettings::default(), Some(&remote))
            .unwrap();
        assert_eq!(
            resolved.tools["pylint"].settings.patterns,
            PatternConfiguration::Defaults
        );
    }

    #[test]
    fn test_remote_exclusions_replace_local() {
        let registry = registry();
        let mut local = LocalSettings::default();
        local.exclusions.ignore_paths.insert("local/".to_string());
        let remote = ProjectConfiguration {
            exclusions: Some(ExclusionRules {
                ignore_paths: ["remote/".to_string()].into_iter().collect(),
                ..Default::default()
            }),
            tools: Vec::new(),
        };

        let with_remote = ToolConfigResolver::new(&registry)
            .resolve(None, &local, Some(&remote))
            .unwrap();
        assert!(with_remote.exclusions.is_excluded("remote/a.py"));
        assert!(!with_remote.exclusions.is_excluded("local/a.py"));

        let without = ToolConfigResolver::new(&registry)
            .resolve(None, &local, None)
            .unwrap();
        assert!(without.exclusions.is_excluded("local/a.py"));
    }

    #[test]
    fn test_unknown_tool_lists_valid_names() {
        let registry = registry();
        let err = ToolConfigResolver::new(&registry)
            .resolve(Some("rubocop"), &LocalSettings::default(), None)
            .unwrap_err();
        match err {
            ResolveError::UnknownTool { name, available } => {
                assert_eq!(name, "rubocop");
                assert_eq!(available, vec!["eslint", "pylint"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_requested_disabled_tool_is_not_enabled() {
        let registry = registry();
        let remote = ProjectConfiguration {
            exclusions: None,
            tools: vec![RemoteToolConfiguration {
                uuid: "uuid-pylint".to_string(),
                enabled: false,
                was_locally_edited: false,
                patterns: Vec::new(),
            }],
        };

        let err = ToolConfigResolver::new(&registry)
            .resolve(Some("pylint"), &LocalSettings::default(), Some(&remote))
            .unwrap_err();
        assert!(matches!(err, ResolveError::ToolNotEnabled(ref n) if n == "pylint"));

        let forced = ToolConfigResolver::new(&registry)
            .force_requested(true)
            .resolve(Some("pylint"), &LocalSettings::default(), Some(&remote))
            .unwrap();
        assert!(forced.tools.contains_key("pylint"));
    }

    #[test]
    fn test_disabled_tools_dropped_without_request() {
        let registry = registry();
        let mut local = LocalSettings::default();
        local.tools.insert(
            "eslint".to_string(),
            ToolSettings {
                enabled: false,
                ..Default::default()
            },
        );
        let resolved = ToolConfigResolver::new(&registry)
            .resolve(None, &local, None)
            .unwrap();
        assert_eq!(resolved.tools.keys().collect::<Vec<_>>(), vec!["pylint"]);
    }

    #[test]
    fn test_plan_skips_tools_without_files() {
        let registry = registry();
        let mut local = LocalSettings::default();
        local.tools.insert(
            "pylint".to_string(),
            ToolSettings {
                allow_network: true,
                exclusions: ExclusionRules {
                    ignore_paths: ["docs/".to_string()].into_iter().collect(),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let resolved = ToolConfigResolver::new(&registry)
            .resolve(None, &local, None)
            .unwrap();

        let files: BTreeSet<String> = ["lib/main.py", "docs/conf.py", "README.md"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let plan = resolved.plan(Path::new("/src"), &files, false);

        assert_eq!(plan.invocations.len(), 1);
        let inv = &plan.invocations[0].invocation;
        assert_eq!(inv.tool.name, "pylint");
        assert_eq!(inv.files, vec!["lib/main.py"]);
        assert!(!inv.allow_network, "run-level flag gates tool permission");
        assert_eq!(plan.skipped, vec![("eslint".to_string(), "no applicable files".to_string())]);
    }

    #[test]
    fn test_remote_or_degraded() {
        let (config, degraded) = remote_or_degraded(Some(Err(RemoteConfigError::Unavailable(
            "timeout".to_string(),
        ))));
        assert!(config.is_none());
        assert!(matches!(
            degraded,
            Some(DegradedInput::RemoteConfigUnavailable { ref reason }) if reason.contains("timeout")
        ));

        let (config, degraded) = remote_or_degraded(None);
        assert!(config.is_none() && degraded.is_none());
    }

    #[test]
    fn test_project_configuration_json() {
        let json = r#"{
            "exclusions": {"ignore_paths": ["lib/tests/"]},
            "tools": [{"uuid": "uuid-pylint", "was_locally_edited": true,
                       "patterns": [{"internal_id": "PyLint_C0111", "parameters": {"max": 3}}]}]
        }"#;
        let config: ProjectConfiguration = serde_json::from_str(json).unwrap();
        assert!(config.tools[0].enabled);
        assert_eq!(config.tools[0].patterns[0].id, "PyLint_C0111");
        assert_eq!(
            config.tools[0].patterns[0].parameters["max"],
            serde_json::json!(3)
        );
    }

    #[test]
    fn test_project_configuration_load_errors() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = ProjectConfiguration::load(&temp.path().join("missing.json"));
        assert!(matches!(missing, Err(RemoteConfigError::Io(_))));

        let bad = temp.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(
            ProjectConfiguration::load(&bad),
            Err(RemoteConfigError::Parse(_))
        ));
    }
}
