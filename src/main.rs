//! `cloud-compose` command line.
//!
//! Thin driver over the library: loads the project file and the recorded
//! status, wires the REST client into the core, and prints results.
//!
//! ## Usage
//!
//! 1. Create a `.env` file with `CLOUD_API_TOKEN` (and optionally `CLOUD_API_URL`)
//! 2. Run: `cloud-compose --file project.yaml up`

#![allow(clippy::print_stdout)] // The binary reports to stdout

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use cloud_compose::compose_starter::target_names;
use cloud_compose::compose_state::now_unix_ms;
use cloud_compose::{
    CloudClient, CloudClientConfig, FleetRefresher, JsonFileStatusStore, LifecycleDriver,
    LifecycleReport, NoBuilder, Project, ProjectStatus, Reconciler, ReconcilerConfig, StatusStore,
};

type BoxError = Box<dyn std::error::Error>;

/// Run multi-service projects on the remote compute platform
#[derive(Parser)]
#[command(name = "cloud-compose", version, propagate_version = true)]
struct Cli {
    /// Project file (YAML or JSON)
    #[arg(short, long, global = true, env = "COMPOSE_FILE", default_value = "compose.yaml")]
    file: PathBuf,

    /// Recorded status file
    #[arg(long, global = true, env = "COMPOSE_STATE_PATH")]
    state: Option<PathBuf>,

    /// Never build missing images. This binary ships without an image
    /// builder, so a missing image is always an error
    #[arg(long, global = true)]
    no_build: bool,

    /// Push built images to the remote catalog. Ignored: this binary ships
    /// without an image builder
    #[arg(long, global = true)]
    push: bool,

    /// Runtime override for a service build, as `<service>=<ref>`.
    /// Ignored: this binary ships without an image builder
    #[arg(long = "runtime", global = true, value_parser = parse_runtime)]
    runtimes: Vec<(String, String)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or adopt) resources and start the instances
    Up(WaitArgs),
    /// Create (or adopt) resources without starting them
    Create(Services),
    /// Start instances
    Start(WaitArgs),
    /// Stop instances
    Stop(StopArgs),
    /// Show owned instances
    Ps,
    /// Show instance console output
    Logs(LogsArgs),
    /// Stop and delete owned instances and service groups
    Down(DownArgs),
}

#[derive(Args)]
struct Services {
    /// Service aliases (default: all)
    services: Vec<String>,
}

#[derive(Args)]
struct WaitArgs {
    #[command(flatten)]
    services: Services,
    /// Ask the platform to hold the call until instances run (ms, 0 = don't wait)
    #[arg(long, default_value_t = 0)]
    wait: u64,
}

#[derive(Args)]
struct StopArgs {
    #[command(flatten)]
    services: Services,
    /// Connection drain timeout (ms)
    #[arg(long, default_value_t = 0)]
    drain: u64,
    /// Stop without draining
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct LogsArgs {
    #[command(flatten)]
    services: Services,
    /// Only the last N lines
    #[arg(long)]
    tail: Option<u32>,
}

#[derive(Args)]
struct DownArgs {
    /// Also delete the project's volumes
    #[arg(long)]
    volumes: bool,
}

fn parse_runtime(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((service, runtime)) if !service.trim().is_empty() && !runtime.trim().is_empty() => {
            Ok((service.trim().to_string(), runtime.trim().to_string()))
        }
        _ => Err(format!("expected <service>=<ref>, got '{raw}'")),
    }
}

fn load_project(path: &Path) -> Result<Project, BoxError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read project file {}: {e}", path.display()))?;
    let project: Project = serde_yaml::from_str(&raw)?;
    if project.name.trim().is_empty() {
        return Err(format!("project file {} has no name", path.display()).into());
    }
    Ok(project)
}

async fn refreshed(
    client: &CloudClient,
    project: &Project,
    store: &JsonFileStatusStore,
) -> Result<ProjectStatus, BoxError> {
    let recorded = store.load_project(&project.name, now_unix_ms())?;
    let report = FleetRefresher::new(client).refresh(project, &recorded).await?;
    Ok(report.status)
}

fn print_report(action: &str, report: &LifecycleReport) {
    for name in &report.succeeded {
        println!("{action} {name}");
    }
    for failure in &report.failed {
        println!("{action} {} failed: {}", failure.name, failure.reason);
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let client = CloudClient::new(CloudClientConfig::from_env()?)?;
    let mut project = load_project(&cli.file)?;
    let store = JsonFileStatusStore::new(
        cli.state
            .clone()
            .unwrap_or_else(JsonFileStatusStore::default_path),
    );

    if cli.push || !cli.runtimes.is_empty() {
        warn!("--push and --runtime have no effect without an image builder");
    }
    let mut cfg = ReconcilerConfig::from_env();
    cfg.no_build |= cli.no_build;
    cfg.push |= cli.push;
    cfg.runtimes.extend(cli.runtimes);
    let reconciler = Reconciler::new(cfg, &client, &NoBuilder);
    let driver = LifecycleDriver::new(&client);

    match cli.command {
        Command::Up(args) => {
            let done = reconciler.reconcile(&mut project, &args.services.services).await?;
            let mut status = store.load_project(&project.name, now_unix_ms())?;
            status.record(&done, now_unix_ms());
            store.save(&status)?;

            let names: Vec<String> = done.instances.iter().map(|i| i.name.clone()).collect();
            let report = driver.start(&names, Duration::from_millis(args.wait)).await?;
            print_report("started", &report);
        }
        Command::Create(args) => {
            let done = reconciler.reconcile(&mut project, &args.services).await?;
            let mut status = store.load_project(&project.name, now_unix_ms())?;
            status.record(&done, now_unix_ms());
            store.save(&status)?;

            for instance in &done.instances {
                println!("created {} ({})", instance.name, instance.state);
            }
        }
        Command::Start(args) => {
            let status = refreshed(&client, &project, &store).await?;
            let names = target_names(&project, &status, &args.services.services)?;
            let report = driver.start(&names, Duration::from_millis(args.wait)).await?;
            print_report("started", &report);
        }
        Command::Stop(args) => {
            let status = refreshed(&client, &project, &store).await?;
            let names = target_names(&project, &status, &args.services.services)?;
            let report = driver
                .stop(&names, Duration::from_millis(args.drain), args.force)
                .await?;
            print_report("stopped", &report);
        }
        Command::Ps => {
            let status = refreshed(&client, &project, &store).await?;
            store.save(&status)?;
            for entry in &status.instances {
                let state = entry
                    .state
                    .map_or_else(|| "unknown".to_string(), |s| s.to_string());
                println!("{:<40} {:<10} {}", entry.name, state, entry.uuid.as_deref().unwrap_or("-"));
            }
        }
        Command::Logs(args) => {
            let status = refreshed(&client, &project, &store).await?;
            let names = target_names(&project, &status, &args.services.services)?;
            for logs in driver.logs(&names, args.tail).await {
                match logs.output {
                    Ok(output) => {
                        println!("==> {} <==", logs.name);
                        println!("{output}");
                    }
                    Err(e) => println!("==> {} <== unavailable: {e}", logs.name),
                }
            }
        }
        Command::Down(args) => {
            let mut status = refreshed(&client, &project, &store).await?;
            let report = driver.down(&project, &mut status, args.volumes).await?;
            store.save(&status)?;

            print_report("deleted instance", &report.instances);
            print_report("deleted service group", &report.service_groups);
            print_report("deleted volume", &report.volumes);
        }
    }

    info!(project = %project.name, "done");
    Ok(())
}
