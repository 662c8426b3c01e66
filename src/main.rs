//! Toolsweep - static-analysis orchestration CLI
//!
//! Runs the configured analysis tools over a directory and writes a merged
//! report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Fatal error (missing directory, unknown tool, config error, cancelled)
//!   2 - Issues found at or above the --fail-on level
//!   3 - One or more tools failed

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use toolsweep::cli::{Args, OutputFormat};
use toolsweep::config::{Config, CONFIG_FILE_NAME};
use toolsweep::report::{self, ReportDocument};
use toolsweep::{Cancellation, Executor, Level, ProjectConfiguration, RunRequest};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // The config file can turn on verbose logging, so it is read first and
    // its messages are logged once the subscriber exists.
    let (mut config, config_log) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(&config.general));
    config_log.emit();

    info!("toolsweep v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_analysis(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .toolsweep.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Add a [tools.<name>] table with a command for each analysis tool.");
    Ok(())
}

/// Initialize logging at the given level.
///
/// `RUST_LOG`, when set, takes precedence over the verbosity settings.
fn init_logging(level: tracing::Level) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact();

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(
            builder.with_env_filter(filter).finish(),
        ),
        Err(_) => tracing::subscriber::set_global_default(
            builder.with_max_level(level).finish(),
        ),
    };
    result.expect("Failed to set tracing subscriber");
}

/// Run the complete workflow. Returns the process exit code.
async fn run_analysis(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let registry = config.registry();
    if registry.is_empty() {
        warn!("No tools with a command are configured; the report will be empty");
    }

    let remote = args.project_config.as_deref().map(|path| {
        info!("Loading project configuration from: {}", path.display());
        ProjectConfiguration::load(path)
    });

    let request = RunRequest {
        tool: args.tool.clone(),
        remote,
        allow_network: config.general.allow_network,
        force_file_permissions: args.force_file_permissions,
        force_tool: args.force_tool,
        restrict_to: args.restrict_to(),
        parallelism: config.general.concurrency,
        ..RunRequest::new(&args.directory, config.local_settings())
    };

    let cancellation = Cancellation::new();
    spawn_ctrl_c_handler(cancellation.clone());

    if !args.quiet {
        println!("🔬 Analyzing {}", args.directory.display());
        println!("   Tools: {}", describe_tools(&registry.names(), args.tool.as_deref()));
        println!("   Parallelism: {}", config.general.concurrency);
    }

    let mut executor = Executor::new(Arc::new(registry))
        .with_cancellation(cancellation)
        .show_progress(!args.quiet);
    let outcome = executor.run(request).await?;

    let duration = start_time.elapsed().as_secs_f64();
    let doc = ReportDocument::new(outcome, &args.directory, args.tool.clone(), duration);

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&doc)?,
        OutputFormat::Markdown => report::generate_markdown_report(&doc),
    };
    let output_path = PathBuf::from(&config.general.output);
    report::write_report(&output, &output_path)?;

    if !args.quiet {
        print_summary(&doc, &output_path);
    }

    // Check --fail-on threshold
    if let Some(fail_level) = args.fail_on {
        let threshold = Level::from(fail_level);
        if doc.report.issues().any(|i| i.level >= threshold) {
            eprintln!(
                "\n⛔ Issues found at or above {} level. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    if doc.diagnostics.failures().next().is_some() {
        for (tool, failure) in doc.diagnostics.failures() {
            eprintln!("⚠️  {}: {}", tool, failure);
        }
        if doc.diagnostics.all_tools_failed() {
            eprintln!("⚠️  Every tool failed; the empty report does not mean a clean tree.");
        }
        return Ok(3);
    }

    Ok(0)
}

fn describe_tools(names: &[String], requested: Option<&str>) -> String {
    match requested {
        Some(tool) => tool.to_string(),
        None if names.is_empty() => "(none configured)".to_string(),
        None => names.join(", "),
    }
}

fn print_summary(doc: &ReportDocument, output_path: &Path) {
    let summary = &doc.summary;

    println!("\n📊 Analysis Summary:");
    println!(
        "   Tools run: {} ({} failed)",
        doc.metadata.tools_run, doc.metadata.tools_failed
    );
    println!("   Total findings: {}", doc.metadata.total_findings);
    println!(
        "   Issues: {} ({} Error: {} | {} Warning: {} | {} Info: {})",
        summary.total,
        Level::Error.emoji(),
        summary.errors,
        Level::Warning.emoji(),
        summary.warnings,
        Level::Info.emoji(),
        summary.infos
    );
    println!("   Duration: {:.1}s", doc.metadata.duration_seconds);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );
}

/// Cancel the run on Ctrl-C.
fn spawn_ctrl_c_handler(cancellation: Cancellation) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancellation.cancel();
        }
    });
}

/// Config loading messages, held until logging is initialized.
#[derive(Debug, Default)]
struct ConfigLog {
    loaded_from: Option<PathBuf>,
    warnings: Vec<String>,
}

impl ConfigLog {
    fn emit(self) {
        for warning in &self.warnings {
            warn!("Failed to load config: {}", warning);
        }
        match self.loaded_from {
            Some(path) => info!("Loaded config from {}", path.display()),
            None => debug!("No config file found, using defaults"),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigLog)> {
    let mut log = ConfigLog::default();

    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        log.loaded_from = Some(config_path.clone());
        return Ok((config, log));
    }

    // Try current directory, then the analyzed directory
    for dir in [PathBuf::from("."), args.directory.clone()] {
        match Config::load_from_dir(&dir) {
            Ok(Some(config)) => {
                log.loaded_from = Some(dir.join(CONFIG_FILE_NAME));
                return Ok((config, log));
            }
            Ok(None) => {}
            Err(e) => log.warnings.push(format!("{:#}", e)),
        }
    }

    Ok((Config::default(), log))
}
