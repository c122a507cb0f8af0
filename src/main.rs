use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

mod cli;

use cadence::agent::{Agent, AgentSnapshot};
use cadence::config::{Config, load_config};
use cadence::memory::Event;
use cadence::scheduler::{ActivationStatus, Dispatcher, SharedAgent};
use cli::Cli;
use cli::commands::Commands;
use cli::demo::{Organization, build_organization};

/// How long waiting agents sit before the demo pings them
const PING_AFTER: Duration = Duration::from_millis(500);

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("cadence.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            agents,
            idle,
            iterations,
            concurrency,
            seconds,
            snapshot_dir,
        } => {
            let mut config = config.clone();
            if let Some(n) = iterations {
                config.scheduler.max_iterations = Some(*n);
            }
            if let Some(c) = concurrency {
                config.scheduler.max_concurrent_agents = *c;
            }
            config.validate().context("Invalid run options")?;

            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(handle_run_command(
                &config,
                *agents,
                *idle,
                Duration::from_secs(*seconds),
                snapshot_dir.as_deref(),
            ))
        }
        Commands::Config => handle_config_command(config),
    }
}

fn snapshot_path(dir: &Path, agent: &Agent) -> PathBuf {
    dir.join(format!("{}.json", agent.name()))
}

/// Restore every agent that has a snapshot in `dir`
fn restore_snapshots(org: &Organization, dir: &Path) -> Result<usize> {
    let mut restored = 0;
    for agent in org.all() {
        let path = snapshot_path(dir, agent);
        if !path.exists() {
            continue;
        }
        let snapshot = AgentSnapshot::load(&path).with_context(|| format!("Failed to load snapshot {}", path.display()))?;
        agent.restore(&snapshot).context("Failed to restore agent")?;
        restored += 1;
    }
    info!("Restored {} agent snapshots from {}", restored, dir.display());
    Ok(restored)
}

fn save_snapshots(org: &Organization, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).context("Failed to create snapshot directory")?;
    for agent in org.all() {
        let path = snapshot_path(dir, agent);
        agent
            .snapshot()
            .save(&path)
            .with_context(|| format!("Failed to save snapshot {}", path.display()))?;
    }
    info!("Saved agent snapshots to {}", dir.display());
    Ok(())
}

async fn handle_run_command(
    config: &Config,
    agents: usize,
    idle: usize,
    limit: Duration,
    snapshot_dir: Option<&Path>,
) -> Result<()> {
    info!("Running demo: {} working, {} idle", agents, idle);
    let org = build_organization(config, agents, idle);
    if let Some(dir) = snapshot_dir {
        restore_snapshots(&org, dir)?;
    }

    let dispatcher = Dispatcher::new(&config.scheduler).context("Failed to create dispatcher")?;
    for (i, agent) in org.all().enumerate() {
        let handle: SharedAgent = agent.clone();
        dispatcher
            .add_agent_with_priority(handle, (i + 1) as f64)
            .context("Failed to register agent")?;
    }

    println!(
        "{} {} agents, {} workers, budget {}",
        "Starting:".green(),
        org.all().count(),
        config.scheduler.max_concurrent_agents,
        config
            .scheduler
            .max_iterations
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unlimited".to_string())
    );

    dispatcher.start().context("Failed to start dispatcher")?;

    let started = Instant::now();
    let mut pinged = false;
    let interval = config.scheduler.poll_interval();
    loop {
        if !dispatcher.is_running() {
            println!("{}", "Iteration budget exhausted".cyan());
            break;
        }
        if started.elapsed() >= limit {
            println!("{}", "Time limit reached".cyan());
            break;
        }
        if !pinged && started.elapsed() >= PING_AFTER {
            for agent in org.all().filter(|a| a.status() == ActivationStatus::Waiting) {
                agent.deliver_event(Event::new("message", format!("ping for {}", agent.name())));
            }
            pinged = true;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Interrupted".yellow());
                break;
            }
        }
    }

    dispatcher.stop().await;
    print_report(&org, &dispatcher);
    if let Some(dir) = snapshot_dir {
        save_snapshots(&org, dir)?;
    }
    Ok(())
}

fn print_report(org: &Organization, dispatcher: &Dispatcher) {
    println!();
    println!("{:<12} {:<8} {:<8} {:>5}", "AGENT".bold(), "STAGE".bold(), "STATUS".bold(), "TICKS".bold());
    for agent in org.all() {
        let status = match agent.status() {
            ActivationStatus::Active => "active".green(),
            ActivationStatus::Waiting => "waiting".yellow(),
        };
        println!(
            "{:<12} {:<8} {:<8} {:>5}",
            agent.name(),
            agent.stage().to_string(),
            status,
            agent.tick_count()
        );
    }

    let stats = dispatcher.stats();
    println!();
    println!(
        "{} dispatched {}, completed {}, failed {}, peak in flight {}",
        "Stats:".green(),
        stats.dispatched,
        stats.completed,
        stats.failed,
        stats.peak_in_flight
    );
    println!("{} {}", "Notes written:".green(), org.notes.lock().len());
}

fn handle_config_command(config: &Config) -> Result<()> {
    info!("Printing resolved configuration");
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_command_with_budget() {
        let mut config = Config::default();
        config.scheduler.max_iterations = Some(20);
        config.scheduler.poll_interval_ms = 5;
        handle_run_command(&config, 2, 1, Duration::from_secs(5), None).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_command_saves_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.scheduler.max_iterations = Some(10);
        config.scheduler.poll_interval_ms = 5;
        handle_run_command(&config, 1, 1, Duration::from_secs(5), Some(dir.path()))
            .await
            .unwrap();

        let saved = AgentSnapshot::load(&dir.path().join("idle-0.json")).unwrap();
        assert_eq!(saved.name, "idle-0");
        assert!(dir.path().join("worker-0.json").exists());
    }

    #[test]
    fn test_restore_snapshots_applies_saved_stage() {
        let dir = tempfile::tempdir().unwrap();
        let org = build_organization(&Config::default(), 1, 0);
        let snapshot = AgentSnapshot {
            name: "worker-0".into(),
            stage: cadence::agent::Stage::Attend,
            status: ActivationStatus::Active,
        };
        snapshot.save(&dir.path().join("worker-0.json")).unwrap();

        assert_eq!(restore_snapshots(&org, dir.path()).unwrap(), 1);
        assert_eq!(org.working[0].stage(), cadence::agent::Stage::Attend);
    }

    #[test]
    fn test_restore_snapshots_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let org = build_organization(&Config::default(), 1, 0);
        fs::write(dir.path().join("worker-0.json"), "{ not json").unwrap();
        assert!(restore_snapshots(&org, dir.path()).is_err());
    }

    #[test]
    fn test_config_command_prints() {
        assert!(handle_config_command(&Config::default()).is_ok());
    }

    #[test]
    fn test_agent_arc_coerces_to_shared() {
        let org = build_organization(&Config::default(), 1, 0);
        let shared: SharedAgent = Arc::<Agent>::clone(&org.working[0]);
        assert_eq!(shared.identity(), "worker-0");
    }
}
