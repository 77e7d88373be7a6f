//! Task orchestration scenarios.

use std::sync::Arc;
use switchyard_core::events::Event;
use switchyard_core::ids::AgentId;
use switchyard_core::routing::{BreakerState, RoutingStrategy};
use switchyard_orchestrator::{Orchestrator, OrchestratorConfig, TaskSpec, TaskState};
use switchyard_tests::{AgentFixture, ScriptedInvoker, TestContext, eager_breaker_config};

fn orchestrator(ctx: &TestContext, invoker: Arc<ScriptedInvoker>) -> Orchestrator {
    Orchestrator::new(
        ctx.coordinator.clone(),
        invoker,
        OrchestratorConfig::default()
            .with_default_max_retries(2)
            .with_default_timeout_seconds(5),
    )
}

fn code_task() -> TaskSpec {
    TaskSpec::new("code").with_capabilities(["code"])
}

#[tokio::test]
async fn test_workload_fails_over_and_recovers() {
    let ctx = TestContext::with_config(eager_breaker_config(2)).await;
    ctx.add_agent(AgentFixture::coder("primary", 10, 4)).await.unwrap();
    ctx.add_agent(AgentFixture::coder("standby", 1, 4)).await.unwrap();
    let invoker = Arc::new(ScriptedInvoker::failing_on(&["primary"]));
    let orchestrator = orchestrator(&ctx, invoker.clone());

    for _ in 0..2 {
        orchestrator.submit(code_task().with_strategy(RoutingStrategy::PriorityBased));
    }
    orchestrator.run_until_idle().await.unwrap();
    assert_eq!(invoker.handled_by(), vec!["primary", "primary"]);
    let primary = AgentId::from("primary");
    assert_eq!(
        ctx.coordinator.router().breaker_state(&primary).await.unwrap(),
        BreakerState::HalfOpen
    );

    // The probe goes to primary, which is healthy again and closes the breaker.
    invoker.set_failing("primary", false);
    let probe = orchestrator.submit(code_task().with_strategy(RoutingStrategy::PriorityBased));
    orchestrator.run_until_idle().await.unwrap();

    assert!(matches!(
        orchestrator.task(probe).unwrap().state,
        TaskState::Completed { ref agent_id, .. } if agent_id == &primary
    ));
    assert_eq!(
        ctx.coordinator.router().breaker_state(&primary).await.unwrap(),
        BreakerState::Closed
    );

    let transitions: Vec<(BreakerState, BreakerState)> = ctx
        .events("routing.breaker.primary")
        .await
        .into_iter()
        .filter_map(|e| match e {
            Event::BreakerStateChanged(p) => Some((p.previous, p.current)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (BreakerState::Closed, BreakerState::Open),
            (BreakerState::Open, BreakerState::HalfOpen),
            (BreakerState::HalfOpen, BreakerState::Closed),
        ]
    );
}

#[tokio::test]
async fn test_unroutable_tasks_fail_without_blocking_the_queue() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("coder", 1, 4)).await.unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let orchestrator = orchestrator(&ctx, invoker.clone());

    let review = orchestrator.submit(
        TaskSpec::new("review")
            .with_capabilities(["review"])
            .with_priority(9),
    );
    let code = orchestrator.submit(code_task());

    assert_eq!(orchestrator.run_until_idle().await.unwrap(), 2);

    match orchestrator.task(review).unwrap().state {
        TaskState::Failed { reason, agent_id } => {
            assert!(reason.contains("no agent available for this task type (review)"));
            assert!(agent_id.is_none());
        }
        other => panic!("unexpected state {:?}", other),
    }
    assert!(orchestrator.task(code).unwrap().state.is_terminal());
    assert_eq!(invoker.handled_by(), vec!["coder"]);

    let failures = ctx.events("routing.failed.review").await;
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn test_outcomes_feed_health_scores() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("steady", 1, 4)).await.unwrap();
    ctx.add_agent(AgentFixture::reviewer("flaky")).await.unwrap();
    let invoker = Arc::new(ScriptedInvoker::failing_on(&["flaky"]));
    let orchestrator = orchestrator(&ctx, invoker.clone());

    for _ in 0..3 {
        orchestrator.submit(
            TaskSpec::new("review")
                .with_capabilities(["review"])
                .with_strategy(RoutingStrategy::PriorityBased),
        );
    }
    orchestrator.run_until_idle().await.unwrap();

    let flaky = ctx
        .coordinator
        .get_agent_health(&AgentId::from("flaky"))
        .await
        .unwrap();
    let steady = ctx
        .coordinator
        .get_agent_health(&AgentId::from("steady"))
        .await
        .unwrap();
    assert!(flaky.health_score < steady.health_score);
    assert_eq!(flaky.current_load, 0);

    let errors = ctx
        .coordinator
        .health()
        .error_history(&AgentId::from("flaky"))
        .await
        .unwrap();
    assert_eq!(errors.len(), 3);
    assert_eq!(orchestrator.summary().failed, 3);
    assert_eq!(invoker.handled_by(), vec!["flaky", "flaky", "flaky"]);
}
