//! Tool plugins and the registry that names them.
//!
//! The analysis itself is done by external tools. The pipeline only knows a
//! tool through its [`ToolDescriptor`] and the [`ToolRunner`] that invokes it.

pub mod process;

pub use process::ProcessTool;

use crate::error::ToolFailure;
use crate::models::Finding;
use crate::resolver::ToolSettings;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Identity of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Short name used on the command line (e.g. `pylint`).
    pub name: String,
    /// Stable identifier used by project configurations.
    pub uuid: String,
    /// Languages the tool analyzes. Empty means every file.
    pub languages: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
            languages: Vec::new(),
        }
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages
            .into_iter()
            .map(|l| l.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Whether the tool should see the given file.
    pub fn applies_to(&self, path: &str) -> bool {
        if self.languages.is_empty() {
            return true;
        }
        match crate::models::language_for_path(path) {
            Some(lang) => self.languages.iter().any(|l| l == lang),
            None => false,
        }
    }
}

/// Everything a tool needs for one run.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: ToolDescriptor,
    /// Analysis root; the tool's working directory.
    pub directory: PathBuf,
    /// Files relative to `directory`.
    pub files: Vec<String>,
    pub settings: ToolSettings,
    pub timeout: Duration,
    pub allow_network: bool,
}

impl ToolInvocation {
    /// The timeout in whole seconds, rounded up so a sub-second limit never reads as zero.
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout.as_secs() + u64::from(self.timeout.subsec_nanos() > 0)
    }
}

/// Invokes a tool and returns its raw findings.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> Result<Vec<Finding>, ToolFailure>;
}

/// A tool together with its runner.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub runner: Arc<dyn ToolRunner>,
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Immutable mapping from short names to tool implementations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn by_uuid(&self, uuid: &str) -> Option<&RegisteredTool> {
        self.tools.values().find(|t| t.descriptor.uuid == uuid)
    }

    /// Short names of every registered tool, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.values()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Builder for [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistryBuilder {
    /// Register a tool. A later registration under the same name replaces the earlier one.
    pub fn register(mut self, descriptor: ToolDescriptor, runner: Arc<dyn ToolRunner>) -> Self {
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool { descriptor, runner },
        );
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}
