//! Keyfabric CLI
//!
//! Generates deterministic placeholder credentials and fills missing
//! configuration slots with them.
//!
//! The generated values are synthetic: they look like API keys and private
//! keys but authenticate nothing.
//!
//! # Usage
//!
//! ```bash
//! # Show today's seed
//! keyfabric seed
//!
//! # Print placeholder tokens
//! keyfabric generate infolinks groq private_key
//!
//! # Fill unset slots in a dotenv file
//! keyfabric --env-file .env refresh
//!
//! # Fill unset slots in the current shell
//! eval "$(keyfabric refresh infolinks viglink)"
//!
//! # Only repair required names that are missing
//! keyfabric --env-file .env repair --require VITE_BSC_PRIVATE_KEY
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use keyfabric_core::repair::repair_env;
use keyfabric_core::{
    CancelToken, ConfigStore, CredentialOutcome, CredentialSynthesizer, DEFAULT_REQUIRED_NAMES,
    DEFAULT_SERVICES, DotenvStore, EnvStore, ErrorSink, HttpSink, RefreshOrchestrator,
    RefreshReport, SeedFabric, ServiceRegistry, TokenShape, TracingSink,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod config;

use config::KeyfabricConfig;

#[derive(Parser)]
#[command(name = "keyfabric")]
#[command(about = "Deterministic placeholder credentials for local and CI environments")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to keyfabric.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Apply values to this dotenv file instead of the process environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print today's seed
    Seed {
        /// Seed namespace (defaults to "keyfabric")
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Print placeholder tokens without applying them
    Generate {
        /// Service names (e.g., infolinks, groq, private_key)
        #[arg(required = true)]
        services: Vec<String>,
    },

    /// Print the configuration variable each service is applied to
    ConfigName {
        #[arg(required = true)]
        services: Vec<String>,
    },

    /// List registered services
    Services,

    /// Apply placeholder tokens to every unset slot
    Refresh {
        /// Services to refresh (defaults to all built-in services)
        services: Vec<String>,
    },

    /// Refresh only the services whose required slots are unset
    Repair {
        /// Required configuration names (repeatable)
        #[arg(long = "require", value_name = "NAME")]
        required: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;
    debug!("Loaded configuration from {:?}", config.config_path);

    let synth = build_synthesizer(&config)?;

    match cli.command {
        Commands::Seed { namespace } => show_seed(synth.fabric(), namespace.as_deref(), cli.format),
        Commands::Generate { services } => generate(&synth, &services, cli.format),
        Commands::ConfigName { services } => show_config_names(&synth, &services, cli.format),
        Commands::Services => list_services(synth.registry(), cli.format),
        Commands::Refresh { services } => {
            let services = if services.is_empty() {
                DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect()
            } else {
                services
            };
            let job = Job::Refresh(services);
            run_job(synth, &config, cli.env_file, job, cli.format).await
        }
        Commands::Repair { required } => {
            let required = if required.is_empty() {
                DEFAULT_REQUIRED_NAMES.iter().map(|s| s.to_string()).collect()
            } else {
                required
            };
            let job = Job::Repair(required);
            run_job(synth, &config, cli.env_file, job, cli.format).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_synthesizer(config: &KeyfabricConfig) -> Result<CredentialSynthesizer> {
    let fabric = match &config.host_tag {
        Some(tag) => SeedFabric::new(Some(tag.clone())),
        None => SeedFabric::from_env(),
    };
    let mut synth = CredentialSynthesizer::new(fabric, config.registry()?);
    if let Some(namespace) = &config.namespace {
        synth = synth.with_project_tag(namespace.clone());
    }
    Ok(synth)
}

fn build_sink(config: &KeyfabricConfig) -> Result<Arc<dyn ErrorSink>> {
    match &config.sink.endpoint {
        Some(endpoint) => {
            let sink = HttpSink::with_timeout(endpoint, config.sink.timeout())
                .with_context(|| format!("Invalid error sink endpoint {:?}", endpoint))?;
            info!("Reporting refresh errors to {}", sink.endpoint());
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(TracingSink)),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn show_seed(fabric: &SeedFabric, namespace: Option<&str>, format: OutputFormat) -> Result<()> {
    let seed = fabric.get_seed(namespace);
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "seed": seed,
            "day_bucket": fabric.day_bucket(),
            "host_tag": fabric.host_tag(),
        })),
        OutputFormat::Text => {
            println!("{}", seed);
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct GeneratedToken {
    config_name: String,
    token: String,
}

fn generate(
    synth: &CredentialSynthesizer,
    services: &[String],
    format: OutputFormat,
) -> Result<()> {
    let mut tokens = BTreeMap::new();
    for service in services {
        let token = synth
            .create(service)
            .with_context(|| format!("Failed to generate token for {:?}", service))?;
        tokens.insert(
            service.as_str(),
            GeneratedToken {
                config_name: synth.config_name(service),
                token,
            },
        );
    }

    match format {
        OutputFormat::Json => print_json(&tokens),
        OutputFormat::Text => {
            for (service, generated) in &tokens {
                println!("{}: {}", service, generated.token);
            }
            Ok(())
        }
    }
}

fn show_config_names(
    synth: &CredentialSynthesizer,
    services: &[String],
    format: OutputFormat,
) -> Result<()> {
    let names: BTreeMap<&str, String> = services
        .iter()
        .map(|s| (s.as_str(), synth.config_name(s)))
        .collect();

    match format {
        OutputFormat::Json => print_json(&names),
        OutputFormat::Text => {
            for (service, name) in &names {
                println!("{}: {}", service, name);
            }
            Ok(())
        }
    }
}

fn describe_shape(shape: &TokenShape) -> String {
    format!("{}<{} x{:?}>", shape.prefix, shape.length, shape.charset)
}

fn list_services(registry: &ServiceRegistry, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let descriptors: Vec<_> = registry
                .names()
                .into_iter()
                .filter_map(|name| registry.get(name))
                .collect();
            print_json(&descriptors)
        }
        OutputFormat::Text => {
            println!("Registered services:");
            for name in registry.names() {
                println!(
                    "  {:<14} {:<28} {}",
                    name,
                    registry.config_name(name),
                    describe_shape(&registry.shape_for(name))
                );
            }
            Ok(())
        }
    }
}

enum Job {
    Refresh(Vec<String>),
    Repair(Vec<String>),
}

async fn run_job(
    synth: CredentialSynthesizer,
    config: &KeyfabricConfig,
    env_file: Option<PathBuf>,
    job: Job,
    format: OutputFormat,
) -> Result<()> {
    let sink = build_sink(config)?;
    let policy = config.retry.to_policy();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling refresh");
            trigger.cancel();
        }
    });

    match env_file {
        Some(path) => {
            info!("Applying placeholders to {:?}", path);
            let orchestrator = RefreshOrchestrator::new(synth, DotenvStore::new(path), sink)
                .with_policy(policy)
                .with_sink_timeout(config.sink.timeout());
            let report = execute(&orchestrator, job, &cancel).await?;
            print_report(&report, format)?;
            finish(&report)
        }
        None => {
            let orchestrator = RefreshOrchestrator::new(synth, EnvStore::from_process(), sink)
                .with_policy(policy)
                .with_sink_timeout(config.sink.timeout());
            let report = execute(&orchestrator, job, &cancel).await?;
            match format {
                OutputFormat::Json => print_report(&report, format)?,
                OutputFormat::Text => {
                    // Commented summary plus exports, so the output can be eval'd.
                    for line in report_lines(&report) {
                        println!("# {}", line);
                    }
                    for (name, value) in orchestrator.store().overlay()? {
                        println!("export {}={}", name, shell_quote(value.expose()));
                    }
                }
            }
            finish(&report)
        }
    }
}

async fn execute<S: ConfigStore>(
    orchestrator: &RefreshOrchestrator<S, Arc<dyn ErrorSink>>,
    job: Job,
    cancel: &CancelToken,
) -> Result<RefreshReport> {
    let report = match job {
        Job::Refresh(services) => orchestrator.refresh_with_cancel(&services, cancel).await,
        Job::Repair(required) => repair_env(orchestrator, &required, cancel)
            .await
            .context("Failed to inspect configuration store")?,
    };
    Ok(report)
}

fn report_lines(report: &RefreshReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.len() + 1);
    for (service, result) in &report.results {
        let detail = match &result.outcome {
            CredentialOutcome::Success { applied: true, value } => {
                format!("applied {}", value.preview(10))
            }
            CredentialOutcome::Success { applied: false, .. } => "already set".to_string(),
            CredentialOutcome::Error { error } => format!("error: {}", error),
        };
        lines.push(format!(
            "{:<14} {:<28} {} (attempts: {})",
            service, result.config_name, detail, result.attempts
        ));
    }
    lines.push("Values are synthetic placeholders, not working credentials.".to_string());
    lines
}

fn print_report(report: &RefreshReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Text => {
            if report.is_empty() {
                println!("Nothing to refresh");
                return Ok(());
            }
            for line in report_lines(report) {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

fn finish(report: &RefreshReport) -> Result<()> {
    if report.failed() > 0 {
        anyhow::bail!(
            "{} of {} service(s) failed to refresh",
            report.failed(),
            report.len()
        );
    }
    Ok(())
}

/// Single-quote a value for POSIX shells.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
