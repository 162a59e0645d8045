//! CLI harness for media usage scans and batch jobs.
//!
//! Drives the scanner and job manager against a site snapshot (JSON) and a
//! file-backed state store, so that separate invocations share one job.
//!
//! # Usage
//!
//! ```bash
//! mu-check [OPTIONS] <COMMAND>
//!
//! # Where is resource 12 used?
//! mu-check --site site.json scan 12
//!
//! # Queue every unprocessed resource and let another invocation drain it
//! mu-check start --detach
//! mu-check resume
//!
//! # Stop the running job and show how far it got
//! mu-check cancel
//! mu-check progress
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use mu_core::{
    Config, ContentSources, EntityId, EntityKey, FileKvStore, KeyValueStore, MemoryContentStore,
    ResourceId, TermId,
};
use mu_jobs::{JobEvent, JobManager, ProgressReport};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Media usage checker.
///
/// Finds where a media resource is referenced across site content and runs
/// batch jobs that pre-compute usage for every resource.
#[derive(Parser)]
#[command(name = "mu-check", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Site snapshot (JSON) to scan.
    #[arg(short, long, global = true, env = "MU_SITE", default_value = "site.json")]
    site: Utf8PathBuf,

    /// Directory holding cached usage and job state.
    #[arg(long, global = true, env = "MU_STATE", default_value = "mu-state")]
    state: Utf8PathBuf,

    /// Optional configuration file (JSON).
    #[arg(short, long, global = true, env = "MU_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Report where a resource is used.
    Scan {
        /// Resource id.
        id: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Queue every unprocessed resource and process the queue.
    Start {
        /// Only queue the job; run `resume` later to process it.
        #[arg(long)]
        detach: bool,
    },

    /// Process a job queued by an earlier invocation.
    Resume,

    /// Cancel the running job.
    Cancel,

    /// Show job progress.
    Progress {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Drop cached usage after a content change.
    Invalidate {
        /// What changed.
        #[command(subcommand)]
        target: InvalidateTarget,
    },
}

/// Targets for `invalidate`.
#[derive(Subcommand)]
enum InvalidateTarget {
    /// A resource was edited or deleted.
    Resource {
        /// Resource id.
        id: u64,
    },
    /// A content entity was edited or deleted.
    Entity {
        /// Entity id.
        id: u64,
    },
    /// A taxonomy term was edited or deleted.
    Term {
        /// Term id.
        id: u64,
    },
    /// A global setting changed.
    Setting {
        /// Setting name.
        name: String,
    },
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads and validates the configuration, falling back to defaults.
fn load_config(cli: &Cli) -> color_eyre::Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Builds a [`JobManager`] over the site snapshot and state directory.
///
/// # Errors
///
/// Returns an error if the site file is missing or malformed, or the state
/// directory cannot be created.
fn build_manager(cli: &Cli) -> color_eyre::Result<JobManager> {
    let config = load_config(cli)?;

    if !cli.site.exists() {
        return Err(color_eyre::eyre::eyre!("Site file does not exist: {}", cli.site));
    }
    let raw = std::fs::read_to_string(cli.site.as_std_path())?;
    let site = MemoryContentStore::from_json(&raw)
        .map_err(|e| color_eyre::eyre::eyre!("Invalid site file {}: {}", cli.site, e))?;
    let store: Arc<dyn KeyValueStore> = Arc::new(FileKvStore::open(cli.state.clone())?);

    debug!(site = %cli.site, state = %cli.state, "stores opened");
    Ok(JobManager::new(
        ContentSources::from_store(Arc::new(site)),
        store,
        config,
    ))
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Prints where a resource is used.
fn run_scan(manager: &JobManager, id: &str, json: bool) -> color_eyre::Result<()> {
    let report = manager.request_scan(id)?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        writeln!(handle, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    if !report.used {
        writeln!(handle, "Resource {id} is not used anywhere.")?;
        return Ok(());
    }
    writeln!(handle, "Resource {id} is used in {} place(s):", report.references.len())?;
    for reference in &report.references {
        write!(handle, "  [{}] {}", reference.kind, reference.label)?;
        if let Some(link) = &reference.edit_link {
            write!(handle, " <{link}>")?;
        }
        writeln!(handle)?;
    }
    writeln!(handle, "It must not be deleted.")?;
    Ok(())
}

/// Queues a job and, unless detached, processes it to the end.
async fn run_start(manager: &JobManager, detach: bool) -> color_eyre::Result<()> {
    let events = manager.subscribe();
    let report = if detach {
        manager.enqueue_job().await?
    } else {
        manager.start_job().await?
    };
    print_line(&report.message)?;

    if report.started && !detach {
        wait_for_worker(manager, events).await?;
    }
    Ok(())
}

/// Processes a queued job.
async fn run_resume(manager: &JobManager) -> color_eyre::Result<()> {
    let events = manager.subscribe();
    if !manager.resume().await? {
        return print_line("Nothing to resume.");
    }
    wait_for_worker(manager, events).await
}

/// Follows worker events until it stops, cancelling on Ctrl-C.
async fn wait_for_worker(
    manager: &JobManager,
    mut events: tokio::sync::broadcast::Receiver<JobEvent>,
) -> color_eyre::Result<()> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(JobEvent::UnitProcessed { resource_id, references, progress }) => {
                    debug!(
                        resource = %resource_id,
                        references,
                        processed = progress.processed,
                        total = progress.total,
                        "unit processed"
                    );
                }
                Ok(event) if event.is_terminal() => break,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => debug!(missed, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, cancelling job");
                let report = manager.cancel_job().await?;
                print_line(&report.message)?;
                break;
            }
        }
    }

    if let Some(exit) = manager.join_worker().await? {
        info!(?exit, "worker finished");
    }
    print_progress(&manager.request_progress()?, false)
}

/// Cancels the running job.
async fn run_cancel(manager: &JobManager) -> color_eyre::Result<()> {
    let report = manager.cancel_job().await?;
    if !report.cancelled {
        warn!(message = %report.message, "nothing cancelled");
    }
    print_line(&report.message)
}

/// Applies an invalidation and prints what was dropped.
fn run_invalidate(manager: &JobManager, target: &InvalidateTarget) -> color_eyre::Result<()> {
    let entity = match target {
        InvalidateTarget::Resource { id } => {
            let id = ResourceId::new(*id)
                .ok_or_else(|| color_eyre::eyre::eyre!("Resource id must be positive"))?;
            let dropped = manager.on_resource_mutated(id)?;
            let message = if dropped {
                format!("Invalidated resource {id}.")
            } else {
                format!("Resource {id} had no cached usage.")
            };
            return print_line(&message);
        }
        InvalidateTarget::Entity { id } => EntityKey::from(EntityId::new(*id)),
        InvalidateTarget::Term { id } => EntityKey::from(TermId::new(*id)),
        InvalidateTarget::Setting { name } => EntityKey::Setting(name.clone()),
    };

    let invalidated = manager.on_entity_mutated(&entity)?;
    let ids: Vec<String> = invalidated.iter().map(ToString::to_string).collect();
    print_line(&format!(
        "Invalidated {} resource(s) after {entity} changed: [{}]",
        ids.len(),
        ids.join(", ")
    ))
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_line(line: &str) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{line}")?;
    Ok(())
}

/// Prints job progress.
fn print_progress(report: &ProgressReport, json: bool) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        writeln!(handle, "{}", serde_json::to_string_pretty(report)?)?;
        return Ok(());
    }

    writeln!(handle)?;
    writeln!(handle, "Media Usage Progress")?;
    writeln!(handle, "====================")?;
    writeln!(handle, "Processed: {}", report.processed)?;
    writeln!(handle, "Pending:   {}", report.pending)?;
    writeln!(handle, "Total:     {}", report.total)?;
    writeln!(
        handle,
        "Remaining: ~{} {}",
        report.estimated_time, report.time_unit
    )?;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Open the stores
    let manager = build_manager(&cli)?;

    // 5. Route to appropriate command
    match &cli.command {
        Commands::Scan { id, json } => run_scan(&manager, id, *json),
        Commands::Start { detach } => run_start(&manager, *detach).await,
        Commands::Resume => run_resume(&manager).await,
        Commands::Cancel => run_cancel(&manager).await,
        Commands::Progress { json } => print_progress(&manager.request_progress()?, *json),
        Commands::Invalidate { target } => run_invalidate(&manager, target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_invalidate_term() {
        let cli = Cli::try_parse_from(["mu-check", "invalidate", "term", "9"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Invalidate {
                target: InvalidateTarget::Term { id: 9 }
            }
        ));
        assert_eq!(cli.site, "site.json");
    }

    #[test]
    fn test_parse_start_detach() {
        let cli = Cli::try_parse_from(["mu-check", "--state", "s", "start", "--detach"]).unwrap();
        assert!(matches!(cli.command, Commands::Start { detach: true }));
        assert_eq!(cli.state, "s");
    }
}
