//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use pagegen_cohort::CohortAssigner;
use pagegen_core::{CandidateStatus, GenerationReport, PageSetGenerator, ProgressReporter};
use pagegen_gateway::{RetryEvent, RetryObserver};
use pagegen_shared::{
    AppConfig, config_file_path, init_config_at, load_config, load_config_from,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pagegen: build the indexable service×location page set.
#[derive(Parser)]
#[command(
    name = "pagegen",
    version,
    about = "Generate the sitemap of indexable service×location landing pages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.pagegen/pagegen.toml).
    #[arg(long, global = true, env = "PAGEGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch both catalogues, evaluate every pair, and write the sitemap.
    Generate {
        /// Sitemap JSON output path.
        #[arg(short, long, default_value = "sitemap.json")]
        out: PathBuf,

        /// Also write the full generation report (every candidate and its outcome).
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Evaluate a single service×location pair and print the decision.
    Explain {
        /// Service slug.
        #[arg(long)]
        service: String,

        /// Location slug.
        #[arg(long)]
        location: String,
    },

    /// Assign a visitor to an A/B cohort.
    Cohort {
        /// Previously issued cohort token.
        #[arg(long)]
        token: Option<String>,

        /// Stable identity (e.g. an IP address) for token-free assignment.
        #[arg(long, conflicts_with = "token")]
        identity: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pagegen=info",
        1 => "pagegen=debug",
        _ => "pagegen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Generate { out, report } => {
            cmd_generate(config_path, &out, report.as_deref()).await
        }
        Command::Explain { service, location } => {
            cmd_explain(config_path, &service, &location).await
        }
        Command::Cohort { token, identity } => {
            cmd_cohort(config_path, token.as_deref(), identity.as_deref())
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Load config from `--config` when given, otherwise the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(config_path: Option<&Path>, out: &Path, report_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    info!(base_url = %config.content_store.base_url, "generating page set");

    let progress = Arc::new(CliProgress::new());
    let generator = PageSetGenerator::from_app_config(&config, progress.clone())?;
    let report = generator.generate(progress.as_ref()).await;
    if report.is_err() {
        progress.spinner.finish_and_clear();
    }
    let report = report?;

    write_json(out, &report.entries)?;
    if let Some(path) = report_path {
        write_json(path, &report)?;
    }

    println!();
    println!("  Sitemap written to {}", out.display());
    println!("  Run:        {}", report.run_id);
    println!("  Entries:    {} ({} static)", report.entries.len(), report.static_routes);
    println!("  Candidates: {}", report.candidates.len());
    println!("  Indexed:    {}", report.indexed);
    println!("  Rejected:   {}", report.evaluated - report.indexed);
    println!("  Failed:     {}", report.failed);
    println!(
        "  Requests:   {} ({} retries, peak {} in flight)",
        report.gateway.calls, report.gateway.retries, report.gateway.peak_in_flight
    );
    println!("  Time:       {:.1}s", report.duration.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_explain(config_path: Option<&Path>, service: &str, location: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let progress = Arc::new(CliProgress::new());
    progress.phase("Evaluating page");

    let generator = PageSetGenerator::from_app_config(&config, progress.clone())?;
    let row = generator.explain(service, location).await;
    progress.spinner.finish_and_clear();
    let row = row?;

    println!("{}", row.path);
    match &row.status {
        CandidateStatus::Indexed => println!("  indexable"),
        CandidateStatus::Rejected { reasons } => {
            println!("  not indexable:");
            for reason in reasons {
                println!("    - {reason}");
            }
        }
        CandidateStatus::Failed { error } => println!("  evaluation failed: {error}"),
    }

    Ok(())
}

fn cmd_cohort(config_path: Option<&Path>, token: Option<&str>, identity: Option<&str>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let assigner = CohortAssigner::from_config(&config.cohort)?;

    let output = match identity {
        Some(identity) => serde_json::json!({
            "variant": assigner.assign_for_identity(identity),
            "identity": identity,
        }),
        None => serde_json::to_value(assigner.assign(token, &mut rand::thread_rng()))?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    init_config_at(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).wrap_err_with(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner; also surfaces retries.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn pair_evaluated(&self, completed: usize, total: usize) {
        self.spinner
            .set_message(format!("Evaluating pages [{completed}/{total}]"));
    }

    fn done(&self, _report: &GenerationReport) {
        self.spinner.finish_and_clear();
    }
}

impl RetryObserver for CliProgress {
    fn retry_scheduled(&self, event: &RetryEvent) {
        self.spinner.set_message(format!(
            "Retrying {} (attempt {}, HTTP {}) in {}ms",
            event.operation,
            event.attempt + 1,
            event.status,
            event.delay.as_millis()
        ));
    }
}
