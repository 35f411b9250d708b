//! Convoy - compose-compatible service supervisor
//!
//! This is the main CLI entry point for Convoy.

use clap::{Parser, Subcommand, ValueEnum};
use convoy::compose::parser::parse_duration;
use convoy::compose::{ComposeLoader, ComposeParser, ComposeProject};
use convoy::container::ContainerManager;
use convoy::error::{ConvoyError, Result};
use convoy::plan::{DependencyGraph, DeploymentPlan};
use convoy::runtime::{DockerRuntime, Runtime};
use convoy::supervisor::{Supervisor, SupervisorConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Convoy - compose-compatible service supervisor
#[derive(Parser)]
#[command(name = "convoy")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Bring up interdependent services in order and keep them running", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Compose file (repeat to merge, later files win)
    #[arg(short, long = "file", global = true)]
    file: Vec<PathBuf>,

    /// Project name
    #[arg(short, long = "project-name", global = true)]
    project: Option<String>,

    /// Container backend
    #[arg(long, value_enum, default_value_t = Backend::Docker, global = true)]
    runtime: Backend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Drive the docker CLI
    Docker,
    /// In-memory runtime that starts nothing
    Simulated,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and start services, then supervise them
    Up {
        /// Exit once the deployment is up
        #[arg(long)]
        detach: bool,
        /// Time a service gets to report healthy (e.g. 60s)
        #[arg(long, value_parser = parse_duration)]
        start_timeout: Option<Duration>,
        /// Time the whole deployment gets (e.g. 5m)
        #[arg(long, value_parser = parse_duration)]
        deploy_timeout: Option<Duration>,
        /// Services allowed to start at the same time
        #[arg(long)]
        max_parallel: Option<usize>,
    },
    /// Stop and remove services, networks and volumes
    Down {
        /// Grace period before a service is killed (e.g. 10s)
        #[arg(short, long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
    /// Validate and print the resolved compose configuration
    Config {
        /// Print as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Print the start order with networks and volumes
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let working_dir = std::env::current_dir()?;
    let project = load_project(&working_dir, &cli.file, cli.project.clone())?;

    match cli.command {
        Commands::Up {
            detach,
            start_timeout,
            deploy_timeout,
            max_parallel,
        } => {
            let mut config = SupervisorConfig::default();
            if let Some(timeout) = start_timeout {
                config.start_timeout = timeout;
            }
            if let Some(timeout) = deploy_timeout {
                config.deploy_timeout = timeout;
            }
            if let Some(parallel) = max_parallel {
                config.max_concurrent_starts = parallel;
            }

            let plan = DependencyGraph::build(&project.registry)?;
            let supervisor = Supervisor::new(&project.name, runtime(cli.runtime)?, config);
            up(&supervisor, plan, detach).await?;
        }

        Commands::Down { timeout } => {
            let mut config = SupervisorConfig::default();
            if let Some(grace) = timeout {
                config.stop_grace_period = grace;
            }

            let plan = DependencyGraph::build(&project.registry)?;
            let supervisor = Supervisor::new(&project.name, runtime(cli.runtime)?, config);
            supervisor.adopt(plan).await?;
            let report = supervisor.teardown().await?;
            println!("Stopped project {}", project.name);
            print!("{}", report);
        }

        Commands::Config { json } => {
            for warning in &project.warnings {
                eprintln!("Warning: {}", warning);
            }

            let output = if json {
                serde_json::to_string_pretty(&project.config)?
            } else {
                serde_yaml::to_string(&project.config)
                    .map_err(|e| ConvoyError::ComposeParse(e.to_string()))?
            };
            println!("{}", output.trim_end());
        }

        Commands::Plan => {
            let plan = DependencyGraph::build(&project.registry)?;
            print_plan(&project.name, &plan);
        }
    }

    Ok(())
}

fn load_project(
    working_dir: &Path,
    files: &[PathBuf],
    project: Option<String>,
) -> Result<ComposeProject> {
    let files = if files.is_empty() {
        let file = ComposeParser::find_compose_file(working_dir).ok_or_else(|| {
            ConvoyError::NotFound(format!(
                "no compose file in {}",
                working_dir.display()
            ))
        })?;
        vec![file]
    } else {
        files.to_vec()
    };

    ComposeLoader::new(working_dir)?
        .project_name(project)
        .load_files(&files)
}

fn runtime(backend: Backend) -> Result<Arc<dyn Runtime>> {
    let runtime: Arc<dyn Runtime> = match backend {
        Backend::Docker => Arc::new(DockerRuntime::new()),
        Backend::Simulated => {
            // Get base path for convoy data
            let base_path = dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("/var/lib"))
                .join("convoy");
            Arc::new(ContainerManager::new(base_path)?)
        }
    };
    tracing::debug!("Using {} runtime", runtime.name());
    Ok(runtime)
}

async fn up(supervisor: &Supervisor, plan: DeploymentPlan, detach: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            interrupt.cancel();
        }
    });

    match supervisor.deploy(plan, cancel.clone()).await {
        Ok(report) => {
            println!("Started project {}", supervisor.project());
            print!("{}", report);
        }
        Err(e) => {
            if !detach {
                tracing::error!("Deployment failed: {}", e);
                supervisor.teardown().await?;
            }
            return Err(e);
        }
    }

    if detach {
        return Ok(());
    }

    supervisor.supervise(cancel).await?;
    let report = supervisor.teardown().await?;
    println!("Stopped project {}", supervisor.project());
    print!("{}", report);
    Ok(())
}

fn print_plan(project: &str, plan: &DeploymentPlan) {
    println!("Project {}", project);
    for (index, service) in plan.iter().enumerate() {
        if service.depends_on.is_empty() {
            println!("{:>3}. {}", index + 1, service.name);
        } else {
            println!(
                "{:>3}. {} (after {})",
                index + 1,
                service.name,
                service.depends_on.join(", ")
            );
        }
    }

    if !plan.networks().is_empty() {
        println!("Networks:");
        for network in plan.networks() {
            let external = if network.external { " (external)" } else { "" };
            println!("  {}{}", network.name, external);
        }
    }

    if !plan.volumes().is_empty() {
        println!("Volumes:");
        for volume in plan.volumes() {
            let external = if volume.external { " (external)" } else { "" };
            println!("  {}{}", volume.name, external);
        }
    }
}
