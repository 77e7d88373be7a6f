//! Command handlers.

use crate::config::SwitchyardConfig;
use crate::simulator::{SimulatedInvoker, generate_workload, seeded_rng};
use anyhow::Context;
use console::style;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use switchyard_core::ids::AgentId;
use switchyard_core::ports::EventBus;
use switchyard_nats::{NatsConfig, NatsEventBus};
use switchyard_orchestrator::{Coordinator, HeartbeatService, Orchestrator};
use switchyard_store::{MemoryEventBus, MemoryStore};
use tokio::sync::watch;
use tracing::info;

/// Run the configured workload against simulated agents and print a report.
pub async fn simulate(
    config: SwitchyardConfig,
    task_count: usize,
    seed: Option<u64>,
    nats_url: Option<String>,
) -> anyhow::Result<()> {
    config.validate()?;

    let nats_config = match (nats_url, config.nats.clone()) {
        (Some(url), Some(base)) => Some(NatsConfig {
            urls: vec![url],
            ..base
        }),
        (Some(url), None) => Some(NatsConfig::new(url)),
        (None, base) => base,
    };
    let nats = match nats_config {
        Some(nats_config) => Some(Arc::new(
            NatsEventBus::connect_with_config(nats_config)
                .await
                .context("connecting to NATS")?,
        )),
        None => None,
    };
    let bus: Arc<dyn EventBus> = match &nats {
        Some(nats) => nats.clone() as Arc<dyn EventBus>,
        None => Arc::new(MemoryEventBus::new()),
    };
    let store = Arc::new(MemoryStore::new());

    let coordinator = Arc::new(Coordinator::new(store, bus, config.coordinator.clone()));
    coordinator.init();

    let mut agent_ids = Vec::with_capacity(config.agents.len());
    for agent in &config.agents {
        let record = coordinator.register_agent(agent.registration.clone()).await?;
        coordinator.record_heartbeat(&record.agent_id).await?;
        agent_ids.push(record.agent_id);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let heartbeat = HeartbeatService::new(
        agent_ids.clone(),
        coordinator.clone(),
        config.orchestrator.heartbeat_interval(),
    );
    let heartbeat_handle = tokio::spawn(async move { heartbeat.run(shutdown_rx).await });

    let mut rng = seeded_rng(seed);
    let specs = generate_workload(&config.workload, task_count, &mut rng);
    let invoker = Arc::new(SimulatedInvoker::new(&config.agents, rng));
    let orchestrator = Orchestrator::new(coordinator.clone(), invoker, config.orchestrator.clone());

    println!(
        "{} Simulating {} task(s) across {} agent(s)",
        style("▶").cyan(),
        style(specs.len()).bold(),
        agent_ids.len()
    );

    for spec in specs {
        orchestrator.submit(spec);
    }
    let started = Instant::now();
    let dispatched = orchestrator.run_until_idle().await?;
    info!(
        dispatched,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Workload drained"
    );

    print_report(&orchestrator, &agent_ids).await?;

    let _ = shutdown_tx.send(true);
    heartbeat_handle.await.context("heartbeat task panicked")?;
    coordinator.close().await;
    if let Some(nats) = nats {
        nats.shutdown().await?;
    }
    Ok(())
}

async fn print_report(orchestrator: &Orchestrator, agent_ids: &[AgentId]) -> anyhow::Result<()> {
    let coordinator = orchestrator.coordinator();
    let summary = orchestrator.summary();

    println!();
    println!("{}", style("Tasks").bold());
    println!("  completed: {}", style(summary.completed).green());
    println!("  failed:    {}", style(summary.failed).red());

    println!();
    println!("{}", style("Agents").bold());
    for agent_id in agent_ids {
        let health = coordinator.get_agent_health(agent_id).await?;
        let breaker = coordinator.router().breaker_state(agent_id).await?;
        println!(
            "  {:<16} {:<12} score {:.2}  ok {:>4}  failed {:>4}  breaker {:?}",
            agent_id.as_str(),
            format!("{:?}", health.status),
            health.health_score,
            health.success_count,
            health.failure_count,
            breaker
        );
    }

    let stats = coordinator.router().stats();
    println!();
    println!("{}", style("Routing").bold());
    for (strategy, count) in stats.decisions.iter().filter(|(_, c)| **c > 0) {
        println!("  {:<16} {}", strategy, count);
    }
    println!(
        "  failures {}  retries {}  breaker trips {}",
        stats.failures, stats.retries, stats.breaker_trips
    );
    Ok(())
}

/// Validate the configuration file.
pub fn validate(config: &SwitchyardConfig, path: &Path) -> anyhow::Result<()> {
    config.validate()?;

    let source = if path.exists() {
        path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };
    println!("{} Configuration from {} is valid", style("✓").green(), source);
    println!("  Agents: {}", config.agents.len());
    for agent in &config.agents {
        let registration = &agent.registration;
        println!(
            "    - {} ({}, capacity {})",
            registration.agent_id, registration.agent_type, registration.max_concurrent_tasks
        );
    }
    println!("  Workload entries: {}", config.workload.len());
    Ok(())
}

/// Print the effective configuration as YAML.
pub fn show_config(config: &SwitchyardConfig) -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
