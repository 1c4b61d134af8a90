mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use pacfind_core::config::DiscoveryConfig;
use pacfind_core::execution::{PrivilegedAction, PrivilegedExecutor, ProcessPrivilegedExecutor};
use pacfind_core::export::{packages_to_json, updates_to_json, write_records};
use pacfind_core::models::{AggregationResult, Query};
use pacfind_core::orchestration::{
    Aggregator, BatchResolver, CancellationToken, LatestMetadataPolicy, MergePolicy,
    SourcePriorityPolicy, UpdateDiffer,
};
use pacfind_core::sources::Catalog;

#[derive(Parser)]
#[command(name = "pacfind")]
#[command(author, version, about = "Search and update discovery across pacman repositories and the AUR", long_about = None)]
struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Skip the AUR entirely
    #[arg(long, global = true)]
    offline: bool,

    /// pacman database directory (default: /var/lib/pacman)
    #[arg(long, global = true)]
    dbpath: Option<PathBuf>,

    /// pacman.conf to read repository names from (default: /etc/pacman.conf)
    #[arg(long, global = true)]
    pacman_conf: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every repository and the AUR by package name
    Search {
        term: String,
        /// Match the whole name instead of a substring
        #[arg(long)]
        exact: bool,
    },
    /// Resolve one record per name, in the order given
    Info {
        #[arg(required = true)]
        names: Vec<String>,
        /// Prefer the most recently modified exact match over repository order
        #[arg(long)]
        latest: bool,
        /// How many names are searched at once
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// List installed packages with a newer version available
    Updates,
    /// List installed packages
    Installed {
        /// Only show packages whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },
    /// Exit successfully only if the package is installed
    IsInstalled { name: String },
    /// Search and write the results to a JSON file
    Export { term: String, file: PathBuf },
    /// Install a package through the privileged helper
    Install { name: String },
    /// Remove a package through the privileged helper
    Uninstall { name: String },
    /// Upgrade a single package through the privileged helper
    Upgrade { name: String },
    /// Upgrade the whole system through the privileged helper
    UpgradeAll,
}

#[derive(Serialize)]
struct InstalledStatus<'a> {
    name: &'a str,
    installed: bool,
    version: Option<&'a str>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = discovery_config(&cli);
    debug!(?config, "resolved configuration");

    let cancellation = CancellationToken::new();
    spawn_interrupt_handler(cancellation.clone());

    run(cli, config, cancellation).await
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn discovery_config(cli: &Cli) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::load();
    if let Some(dbpath) = &cli.dbpath {
        config.dbpath = dbpath.clone();
    }
    if let Some(pacman_conf) = &cli.pacman_conf {
        config.pacman_conf = pacman_conf.clone();
        config.reload_repositories();
    }
    if cli.offline {
        config.remote = None;
    }
    config
}

fn spawn_interrupt_handler(cancellation: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received; cancelling");
                cancellation.cancel();
            }
            Err(error) => warn!(%error, "failed to listen for interrupts"),
        }
    });
}

async fn run(cli: Cli, config: DiscoveryConfig, cancellation: CancellationToken) -> Result<ExitCode> {
    let json = cli.json;

    match cli.command {
        Commands::Search { term, exact } => {
            let (_, aggregator) = open_engine(&config);
            let query = if exact {
                Query::exact(term)
            } else {
                Query::substring(term)
            };
            let result = aggregator.search_all(&query, &cancellation).await;
            ensure_usable(&result)?;
            if json {
                println!("{}", packages_to_json(&result.records)?);
            } else {
                render::print_records(&result.records);
            }
        }
        Commands::Info {
            names,
            latest,
            concurrency,
        } => {
            let (catalog, aggregator) = open_engine(&config);
            let policy: Arc<dyn MergePolicy> = if latest {
                Arc::new(LatestMetadataPolicy)
            } else {
                Arc::new(SourcePriorityPolicy::for_catalog(&catalog))
            };
            let records = BatchResolver::new(aggregator, policy)
                .with_concurrency(concurrency.unwrap_or(config.batch_concurrency))
                .resolve_many(&names, &cancellation)
                .await
                .context("failed to resolve packages")?;
            if json {
                println!("{}", packages_to_json(&records)?);
            } else {
                for (index, record) in records.iter().enumerate() {
                    if index > 0 {
                        println!();
                    }
                    render::print_details(record);
                }
            }
        }
        Commands::Updates => {
            let (catalog, aggregator) = open_engine(&config);
            render::report_failures(catalog.registration_failures());
            let updates = UpdateDiffer::new(aggregator)
                .compute_updates(&cancellation)
                .await
                .context("failed to compute updates")?;
            if json {
                println!("{}", updates_to_json(&updates)?);
            } else if updates.is_empty() {
                println!("Everything is up to date");
            } else {
                render::print_updates(&updates);
            }
        }
        Commands::Installed { filter } => {
            let (_, aggregator) = open_engine(&config);
            let mut installed = aggregator
                .list_installed()
                .await
                .context("failed to read the installed package database")?;
            if let Some(filter) = filter {
                let query = Query::substring(filter);
                installed.retain(|record| query.matches(&record.name));
            }
            if json {
                println!("{}", packages_to_json(&installed)?);
            } else {
                render::print_records(&installed);
            }
        }
        Commands::IsInstalled { name } => {
            let (_, aggregator) = open_engine(&config);
            let record = aggregator
                .installed_package(&name)
                .await
                .context("failed to read the installed package database")?;
            if json {
                let status = InstalledStatus {
                    name: &name,
                    installed: record.is_some(),
                    version: record.as_ref().map(|r| r.version.as_str()),
                };
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                match &record {
                    Some(record) => println!("{} {} is installed", record.name, record.version),
                    None => println!("{name} is not installed"),
                }
            }
            if record.is_none() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Export { term, file } => {
            let (_, aggregator) = open_engine(&config);
            let result = aggregator
                .search_all(&Query::substring(term.as_str()), &cancellation)
                .await;
            ensure_exportable(&result, &term)?;
            write_records(&file, &result.records)
                .with_context(|| format!("failed to export to {}", file.display()))?;
            if !json {
                println!(
                    "Wrote {} record(s) to {}",
                    result.records.len(),
                    file.display()
                );
            }
        }
        Commands::Install { name } => {
            return privileged(&config, PrivilegedAction::Install(name), cancellation).await;
        }
        Commands::Uninstall { name } => {
            return privileged(&config, PrivilegedAction::Uninstall(name), cancellation).await;
        }
        Commands::Upgrade { name } => {
            return privileged(&config, PrivilegedAction::Upgrade(name), cancellation).await;
        }
        Commands::UpgradeAll => {
            return privileged(&config, PrivilegedAction::UpgradeAll, cancellation).await;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_engine(config: &DiscoveryConfig) -> (Arc<Catalog>, Arc<Aggregator>) {
    let catalog = Arc::new(Catalog::open(config));
    let aggregator = Arc::new(Aggregator::new(catalog.clone()));
    (catalog, aggregator)
}

/// Reports per-source failures and rejects results where every source failed.
fn ensure_usable(result: &AggregationResult) -> Result<()> {
    render::report_aggregation(result);
    if result.is_total_failure() {
        bail!("every package source failed; see warnings above");
    }
    Ok(())
}

/// An export only ever writes a complete, non-empty result.
fn ensure_exportable(result: &AggregationResult, term: &str) -> Result<()> {
    ensure_usable(result)?;
    if result.cancelled {
        bail!("interrupted; nothing was written");
    }
    if result.is_empty() {
        bail!("package {term} not found");
    }
    Ok(())
}

async fn privileged(
    config: &DiscoveryConfig,
    action: PrivilegedAction,
    cancellation: CancellationToken,
) -> Result<ExitCode> {
    println!("Running: {action}");
    let executor = ProcessPrivilegedExecutor::new(config.privileged.clone());
    let outcome = executor
        .run(action.clone(), cancellation)
        .await
        .with_context(|| format!("failed to {action}"))?;

    if !outcome.stdout.is_empty() {
        print!("{}", outcome.stdout);
    }
    if !outcome.stderr.is_empty() {
        eprint!("{}", outcome.stderr);
    }
    if !outcome.success() {
        bail!("{action} failed with {:?}", outcome.status);
    }
    Ok(ExitCode::SUCCESS)
}
