//! Configuration file handling.
//!
//! This module handles loading `.toolsweep.toml` files, merging them with
//! command-line arguments, and turning them into local settings and a tool
//! registry.

use crate::exclusion::ExclusionRules;
use crate::resolver::{
    LocalSettings, PatternConfiguration, PatternSetting, ToolPatternSet, ToolSettings,
};
use crate::tools::{ProcessTool, ToolDescriptor, ToolRegistry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Name of the configuration file looked up in the working and analyzed directories.
pub const CONFIG_FILE_NAME: &str = ".toolsweep.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// File selection settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Per-tool settings, keyed by tool short name.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of tools run concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for tools that do not set their own.
    #[serde(default = "default_timeout")]
    pub tool_timeout_seconds: u64,

    /// Allow tools to use the network.
    #[serde(default)]
    pub allow_network: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
            tool_timeout_seconds: default_timeout(),
            allow_network: false,
        }
    }
}

fn default_output() -> String {
    "toolsweep_report.json".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout() -> u64 {
    900 // 15 min
}

/// File selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Path prefixes that are never analyzed.
    #[serde(default)]
    pub ignore_paths: Vec<String>,

    /// Glob patterns to exclude.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// Glob patterns to exclude, per file extension.
    #[serde(default)]
    pub extension_excludes: BTreeMap<String, Vec<String>>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ignore_paths: Vec::new(),
            excludes: default_excludes(),
            extension_excludes: BTreeMap::new(),
        }
    }
}

fn default_excludes() -> Vec<String> {
    vec![
        "**/node_modules/**",
        "**/__pycache__/**",
        "**/*.min.js",
        "**/*.min.css",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl ScannerConfig {
    fn rules(&self) -> ExclusionRules {
        ExclusionRules {
            ignore_paths: self.ignore_paths.iter().cloned().collect(),
            excludes: self.excludes.iter().cloned().collect(),
            extension_excludes: self
                .extension_excludes
                .iter()
                .map(|(ext, globs)| (ext.clone(), globs.iter().cloned().collect()))
                .collect(),
        }
    }
}

/// Settings for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Identifier used by project configurations; defaults to the short name.
    #[serde(default)]
    pub uuid: Option<String>,

    /// Command line that runs the tool. Tools without one are not registered.
    #[serde(default)]
    pub command: Vec<String>,

    /// Languages the tool analyzes; empty means all files.
    #[serde(default)]
    pub languages: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    #[serde(default)]
    pub allow_network: bool,

    /// Explicit patterns. When absent the tool runs with its defaults.
    #[serde(default)]
    pub patterns: Option<Vec<PatternSetting>>,

    /// Extra path prefixes ignored for this tool only.
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Extra globs ignored for this tool only.
    #[serde(default)]
    pub excludes: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ToolConfig {
    fn uuid_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.uuid.as_deref().unwrap_or(name)
    }

    fn settings(&self, name: &str) -> ToolSettings {
        let patterns = match &self.patterns {
            Some(patterns) => PatternConfiguration::Explicit(ToolPatternSet {
                tool_uuid: self.uuid_or(name).to_string(),
                enabled: self.enabled,
                was_locally_edited: true,
                patterns: patterns.clone(),
            }),
            None => PatternConfiguration::Defaults,
        };

        ToolSettings {
            enabled: self.enabled,
            timeout: self.timeout_seconds.map(Duration::from_secs),
            allow_network: self.allow_network,
            patterns,
            exclusions: ExclusionRules {
                ignore_paths: self.exclude_paths.iter().cloned().collect(),
                excludes: self.excludes.iter().cloned().collect(),
                extension_excludes: BTreeMap::new(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load `.toolsweep.toml` from a directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given explicitly on the command line override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(concurrency) = args.parallel {
            self.general.concurrency = concurrency;
        }
        if let Some(timeout) = args.tool_timeout {
            self.general.tool_timeout_seconds = timeout;
        }
        if let Some(ref excludes) = args.exclude {
            self.scanner.excludes.extend(excludes.iter().cloned());
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        // Flags always override
        if args.allow_network {
            self.general.allow_network = true;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Local settings for the resolver.
    pub fn local_settings(&self) -> LocalSettings {
        LocalSettings {
            exclusions: self.scanner.rules(),
            tools: self
                .tools
                .iter()
                .map(|(name, tool)| (name.clone(), tool.settings(name)))
                .collect(),
            default_timeout: Duration::from_secs(self.general.tool_timeout_seconds),
        }
    }

    /// Register every tool that declares a command.
    pub fn registry(&self) -> ToolRegistry {
        let mut builder = ToolRegistry::builder();
        for (name, tool) in &self.tools {
            let Some(runner) = ProcessTool::from_command(&tool.command) else {
                warn!("Tool {} has no command; only its settings are used", name);
                continue;
            };
            let descriptor = ToolDescriptor::new(name.clone(), tool.uuid_or(name))
                .with_languages(tool.languages.iter().cloned());
            builder = builder.register(descriptor, Arc::new(runner));
        }
        builder.build()
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[general]
output = "custom_report.json"
verbose = true
concurrency = 2

[scanner]
ignore_paths = ["lib/tests/"]
excludes = ["**/*.snap"]

[scanner.extension_excludes]
py = ["**/migrations/**"]

[tools.pylint]
uuid = "uuid-pylint"
command = ["pylint-adapter", "--json"]
languages = ["python"]
timeout_seconds = 60
exclude_paths = ["docs/"]
patterns = [{ id = "PyLint_C0111" }, { id = "PyLint_E1101", parameters = { max = 3 } }]

[tools.eslint]
enabled = false
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.concurrency, 4);
        assert_eq!(config.general.tool_timeout_seconds, 900);
        assert!(config.tools.is_empty());
        assert!(config.scanner.excludes.contains(&"**/node_modules/**".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.general.output, "custom_report.json");
        assert!(config.general.verbose);
        assert_eq!(config.general.concurrency, 2);
        assert_eq!(config.scanner.excludes, vec!["**/*.snap"]);

        let pylint = &config.tools["pylint"];
        assert_eq!(pylint.command, vec!["pylint-adapter", "--json"]);
        let patterns = pylint.patterns.as_ref().unwrap();
        assert_eq!(patterns[1].parameters["max"], serde_json::json!(3));
        assert!(!config.tools["eslint"].enabled);
        assert_eq!(config.scanner.extension_excludes["py"], vec!["**/migrations/**"]);
    }

    #[test]
    fn test_local_settings_conversion() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let local = config.local_settings();

        assert_eq!(local.default_timeout, Duration::from_secs(900));
        assert!(local.exclusions.ignore_paths.contains("lib/tests/"));

        let pylint = &local.tools["pylint"];
        assert_eq!(pylint.timeout, Some(Duration::from_secs(60)));
        assert!(pylint.exclusions.ignore_paths.contains("docs/"));
        assert_eq!(
            pylint.patterns.explicit_ids().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["PyLint_C0111", "PyLint_E1101"]
        );

        let eslint = &local.tools["eslint"];
        assert!(!eslint.enabled);
        assert_eq!(eslint.patterns, PatternConfiguration::Defaults);
    }

    #[test]
    fn test_registry_only_has_tools_with_commands() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let registry = config.registry();
        assert_eq!(registry.names(), vec!["pylint"]);
        let pylint = registry.get("pylint").unwrap();
        assert_eq!(pylint.descriptor.uuid, "uuid-pylint");
        assert_eq!(pylint.descriptor.languages, vec!["python"]);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[scanner]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.general.concurrency, 4);
    }
}
