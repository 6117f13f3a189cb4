//! RabbitMQ Agent - broker statistics for a host monitoring agent
//!
//! Periodically reads the RabbitMQ management API and enqueues:
//! - Per-vhost and per-queue metric items with host-tagged keys
//! - Vhost and queue discovery lists for dynamic registration
//! - Broker/runtime versions and an agent heartbeat

mod api;
mod config;
mod delivery;
mod discovery;
mod error;
mod items;
mod job;
mod metrics;
mod model;

use anyhow::{Context, Result};
use config::AgentConfig;
use delivery::ItemQueue;
use job::RabbitmqJob;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Upper bound on the delivery flush at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main agent state
struct Agent {
    config: AgentConfig,
    job: RabbitmqJob,
    forwarder: JoinHandle<()>,
}

impl Agent {
    /// Create new agent instance
    fn new(config: AgentConfig) -> Result<Self> {
        info!(
            "Initializing RabbitMQ Agent v{} for host {}",
            env!("CARGO_PKG_VERSION"),
            config.hostname
        );

        let (queue, receiver) = ItemQueue::new(config.delivery.queue_capacity);
        let forwarder = delivery::spawn_forwarder(&config.delivery, receiver);

        let job = RabbitmqJob::new(&config, queue).context("Failed to build management API client")?;

        info!(
            "Polling {} every {}s",
            config.api.base_url(),
            config.interval_secs
        );

        Ok(Agent {
            config,
            job,
            forwarder,
        })
    }

    /// Start agent main loop
    async fn run(self) -> Result<()> {
        let mut poll_timer = interval(self.config.interval());
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll_timer.tick() => {
                    self.job.poll_once().await;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down gracefully");
                    break;
                }
            }
        }

        // Dropping the job closes the queue; give the forwarder a bounded flush.
        drop(self.job);
        let mut forwarder = self.forwarder;
        match timeout(SHUTDOWN_GRACE, &mut forwarder).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Forwarder task failed: {}", e),
            Err(_) => {
                warn!(
                    "Forwarder still busy after {}s, abandoning undelivered items",
                    SHUTDOWN_GRACE.as_secs()
                );
                forwarder.abort();
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rabbitmq_agent=info")),
        )
        .init();

    let config_source = AgentConfig::resolve_path(std::env::args().nth(1))
        .context("Failed to locate configuration")?;
    info!("Loading configuration from {}", config_source.path().display());

    let config = AgentConfig::load_from(&config_source)
        .await
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let agent = Agent::new(config).context("Failed to create agent")?;

    agent.run().await.context("Agent execution failed")?;

    Ok(())
}
