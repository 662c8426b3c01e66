//! toolsweep - static-analysis orchestration.
//!
//! A run collects the files of a source tree, resolves which analysis tools
//! to run and with which patterns, invokes every tool with a bounded level
//! of parallelism and merges the findings into one deduplicated [`Report`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolsweep::{Config, Executor, RunRequest};
//!
//! # async fn demo() -> Result<(), toolsweep::FatalError> {
//! let config = Config::default();
//! let mut executor = Executor::new(Arc::new(config.registry()));
//! let outcome = executor
//!     .run(RunRequest::new("./project", config.local_settings()))
//!     .await?;
//! println!("{} findings", outcome.report.len());
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod executor;
pub mod models;
pub mod report;
pub mod resolver;
pub mod scanner;
pub mod tools;

pub use config::Config;
pub use error::{DegradedInput, FatalError, RemoteConfigError, ToolFailure};
pub use exclusion::{ExclusionRuleSet, ExclusionRules};
pub use executor::{Cancellation, Executor, RunDiagnostics, RunOutcome, RunRequest, RunState};
pub use models::{Finding, Issue, Level, Location, Report};
pub use resolver::{
    LocalSettings, PatternConfiguration, PatternSetting, ProjectConfiguration, ToolConfigResolver,
    ToolSettings,
};
pub use scanner::{CollectOptions, FileCollector};
pub use tools::{ProcessTool, ToolDescriptor, ToolInvocation, ToolRegistry, ToolRunner};
