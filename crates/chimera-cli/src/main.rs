mod config;

use async_trait::async_trait;
use chimera_agent::{HttpGenerationBackend, RuleBasedScorer};
use chimera_channels::{
    HttpSignalSource, InboxSignalSource, PlatformPublisher, PublishRequest, PublishResponse,
    SignalSource, WebhookPublisher,
};
use chimera_core::{ChimeraError, ChimeraResult};
use chimera_orchestrator::{Collaborators, ComponentHandle, Health, Swarm};
use chimera_security::AuditLog;
use clap::{Parser, Subcommand, ValueEnum};
use config::ChimeraConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chimera", about = "Chimera social content orchestration swarm")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "chimera.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the swarm until ctrl-c
    Run {
        /// Start a single component group instead of everything
        #[arg(long, value_enum)]
        only: Option<Only>,
        /// Count quota and log drafts without calling the publisher
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the config file and exit
    CheckConfig,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Only {
    /// The planning loop
    Planner,
    /// Workers plus the lease reaper
    Workers,
    /// Judges plus the HITL sweeper
    Judges,
}

/// Stands in for the platform publisher in dry runs, where the gate never
/// calls it.
struct NoPublisher;

#[async_trait]
impl PlatformPublisher for NoPublisher {
    fn name(&self) -> &str {
        "none"
    }

    async fn publish(&self, request: &PublishRequest) -> ChimeraResult<PublishResponse> {
        Err(ChimeraError::Config(format!(
            "no publisher configured for {}",
            request.platform
        )))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = ChimeraConfig::load(&cli.config).await?;

    match cli.command {
        Commands::CheckConfig => {
            config.check()?;
            println!("Config OK: {}", cli.config.display());
            println!("  agent:           {}", config.swarm.agent_id);
            println!("  workers/judges:  {}/{}", config.swarm.workers, config.swarm.judges);
            println!("  dry run:         {}", config.swarm.dry_run);
            println!(
                "  daily caps:      x={} linkedin={}",
                config.swarm.rate_limits.x, config.swarm.rate_limits.linkedin
            );
            println!("  scheduled posts: {}", config.swarm.scheduled_posts.len());
        }
        Commands::Run { only, dry_run } => {
            if dry_run {
                config.swarm.dry_run = true;
            }
            config.check()?;
            run(config, only).await?;
        }
    }

    Ok(())
}

async fn run(config: ChimeraConfig, only: Option<Only>) -> anyhow::Result<()> {
    let generation = config
        .generation
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no [generation] backend configured"))?;
    let publisher: Arc<dyn PlatformPublisher> = match config.publisher.clone() {
        Some(webhook) => Arc::new(WebhookPublisher::new(webhook)),
        None => Arc::new(NoPublisher),
    };
    let signals: Arc<dyn SignalSource> = match &config.signals.url {
        Some(url) => Arc::new(HttpSignalSource::new(
            url.clone(),
            Duration::from_secs(config.signals.timeout_secs),
        )),
        None => {
            info!("No signal source configured, running scheduled posts only");
            Arc::new(InboxSignalSource::new())
        }
    };
    let collaborators = Collaborators::new(
        Arc::new(HttpGenerationBackend::new(generation)),
        Arc::new(RuleBasedScorer::new(config.scorer.clone())),
        publisher.clone(),
        signals,
    );
    let audit = Arc::new(AuditLog::new(
        config.swarm.agent_id.clone(),
        config.audit_dir(),
    ));
    let swarm = Swarm::new(config.swarm, collaborators, audit)?;

    info!(
        agent_id = %swarm.config().agent_id,
        publisher = publisher.name(),
        dry_run = swarm.gate().is_dry_run(),
        only = ?only,
        "Starting Chimera swarm"
    );
    let handles: Vec<ComponentHandle> = match only {
        None => swarm.start_all(),
        Some(Only::Planner) => vec![swarm.start_planner()],
        Some(Only::Workers) => vec![
            swarm.start_reaper(),
            swarm.start_workers(swarm.config().workers),
        ],
        Some(Only::Judges) => vec![
            swarm.start_sweeper(),
            swarm.start_judges(swarm.config().judges),
        ],
    };

    let mut health = swarm.monitor().subscribe();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "Could not listen for ctrl-c, shutting down");
                }
                break;
            }
            changed = health.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *health.borrow_and_update();
                match current {
                    Health::Fatal => error!("Planning state unreachable for too long, operator action required"),
                    Health::Degraded => warn!("Running degraded on cached planning state"),
                    Health::Healthy => info!("Swarm healthy"),
                }
            }
        }
    }

    info!("Shutting down");
    for handle in handles {
        handle.stop().await;
    }
    info!(metrics = %swarm.monitor().to_json(), "Swarm stopped");
    Ok(())
}
