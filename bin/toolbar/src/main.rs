use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use toolbar::commands;
use toolbar::config::AppConfig;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "toolbar", version, about = "Plugin host and event automation daemon")]
struct Cli {
    /// Configuration file (JSON, TOML or YAML).
    #[arg(long, short, global = true, env = "TOOLBAR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the daemon, reading JSON-lines notifications from stdin.
    Run,
    /// Check a workflow document.
    Validate { file: PathBuf },
    /// List discovered plugins and their load order.
    Plugins,
    /// Run one event from a JSON file through the stored workflows.
    Simulate { event: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref());

    let level = config
        .as_ref()
        .map_or_else(|_| "info".to_string(), |c| c.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Run => match commands::run(&config).await {
            Ok(stats) => {
                info!(
                    emitted = stats.emitted,
                    duplicates = stats.duplicates,
                    ignored = stats.ignored,
                    rejected = stats.rejected,
                    "Input closed"
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Daemon failed");
                ExitCode::FAILURE
            }
        },
        Command::Validate { file } => match commands::validate(&file).await {
            Ok(outcome) => {
                println!(
                    "{}: {} valid ({} migrated), {} invalid",
                    file.display(),
                    outcome.loaded,
                    outcome.migrated,
                    outcome.skipped.len()
                );
                for skipped in &outcome.skipped {
                    let name = skipped.name.as_deref().unwrap_or("<unnamed>");
                    println!("  #{} {name}: {}", skipped.index, skipped.reason);
                }
                if outcome.skipped.is_empty() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                error!(error = %e, "Validation failed");
                ExitCode::FAILURE
            }
        },
        Command::Plugins => {
            let listing = commands::plugins(&config);
            for descriptor in &listing.descriptors {
                println!(
                    "{} {} deps=[{}] {}",
                    descriptor.name,
                    descriptor.version,
                    descriptor.dependencies.join(", "),
                    descriptor.description
                );
            }
            for name in &listing.disabled {
                println!("{name} (disabled)");
            }
            println!("load order: {}", listing.resolution.order.join(" -> "));
            for excluded in &listing.resolution.excluded {
                println!("excluded: {excluded}");
            }
            for problem in &listing.problems {
                println!("problem: {problem}");
            }
            ExitCode::SUCCESS
        }
        Command::Simulate { event } => match commands::simulate(&config, &event).await {
            Ok(reports) => match serde_json::to_string_pretty(&reports) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "Cannot print run reports");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                error!(error = %e, "Simulation failed");
                ExitCode::FAILURE
            }
        },
    }
}
