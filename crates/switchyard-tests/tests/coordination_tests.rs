//! End-to-end coordination scenarios over the in-process store.

use chrono::{TimeDelta, Utc};
use std::collections::BTreeSet;
use switchyard_core::events::Event;
use switchyard_core::health::HealthStatus;
use switchyard_core::ids::{AgentId, TaskId};
use switchyard_core::routing::{BreakerState, RoutingRequest, RoutingStrategy};
use switchyard_tests::{
    AgentFixture, TestContext, backdate_agent, backdate_in_flight, eager_breaker_config,
};

fn code_request() -> RoutingRequest {
    RoutingRequest::new(TaskId::new(), "code").with_capabilities(["code"])
}

#[tokio::test]
async fn test_failing_primary_trips_breaker_and_traffic_moves() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("A", 10, 2)).await.unwrap();
    ctx.add_agent(AgentFixture::coder("B", 5, 5)).await.unwrap();
    let a = AgentId::from("A");

    let first = ctx.coordinator.route_with_retry(&code_request()).await.unwrap();
    assert_eq!(first.agent_id, Some(a.clone()));

    ctx.fail_tasks(&a, 5).await.unwrap();
    assert_eq!(
        ctx.coordinator.router().breaker_state(&a).await.unwrap(),
        BreakerState::Open
    );

    for strategy in RoutingStrategy::ALL {
        let result = ctx
            .coordinator
            .route_with_retry(&code_request().with_strategy(strategy))
            .await
            .unwrap();
        assert_eq!(result.agent_id, Some(AgentId::from("B")), "{:?}", strategy);
    }

    let health = ctx.coordinator.get_agent_health(&a).await.unwrap();
    assert_eq!(health.failure_count, 5);
    assert_eq!(health.status, HealthStatus::Unhealthy);

    let trips: Vec<Event> = ctx
        .events("routing.breaker.A")
        .await
        .into_iter()
        .filter(|e| matches!(e, Event::BreakerStateChanged(p) if p.current == BreakerState::Open))
        .collect();
    assert_eq!(trips.len(), 1);
}

#[tokio::test]
async fn test_breaker_recovers_through_single_probe() {
    let ctx = TestContext::with_config(eager_breaker_config(1)).await;
    ctx.add_agent(AgentFixture::coder("solo", 1, 10)).await.unwrap();
    let solo = AgentId::from("solo");

    ctx.fail_tasks(&solo, 1).await.unwrap();
    let request = || code_request().with_strategy(RoutingStrategy::PriorityBased);

    let probe = ctx.coordinator.router().route(&request()).await.unwrap();
    assert!(probe.success);
    assert_eq!(
        ctx.coordinator.router().breaker_state(&solo).await.unwrap(),
        BreakerState::HalfOpen
    );
    let blocked = ctx.coordinator.router().route(&request()).await.unwrap();
    assert!(!blocked.success);

    let task_id = TaskId::new();
    ctx.coordinator.record_task_start(&solo, task_id).await.unwrap();
    ctx.coordinator
        .record_task_completion(&solo, task_id, true)
        .await
        .unwrap();

    assert_eq!(
        ctx.coordinator.router().breaker_state(&solo).await.unwrap(),
        BreakerState::Closed
    );
    assert!(ctx.coordinator.router().route(&request()).await.unwrap().success);
}

#[tokio::test]
async fn test_overload_is_reported_not_rejected() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("busy", 1, 1)).await.unwrap();
    let busy = AgentId::from("busy");

    ctx.coordinator.record_task_start(&busy, TaskId::new()).await.unwrap();
    ctx.coordinator.record_task_start(&busy, TaskId::new()).await.unwrap();

    let health = ctx.coordinator.get_agent_health(&busy).await.unwrap();
    assert_eq!(health.current_load, 2);

    let routed = ctx
        .coordinator
        .route_with_retry(&code_request().with_max_retries(1))
        .await
        .unwrap();
    assert!(!routed.success);
    assert!(routed.error_message.unwrap().contains("at capacity"));

    assert_eq!(ctx.events("health.busy.overload").await.len(), 1);
}

#[tokio::test]
async fn test_lost_completion_frees_capacity_after_timeout() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("single", 1, 1)).await.unwrap();
    let single = AgentId::from("single");

    let lost = TaskId::new();
    ctx.coordinator.record_task_start(&single, lost).await.unwrap();
    for _ in 0..3 {
        ctx.coordinator.record_heartbeat(&single).await.unwrap();
    }
    ctx.coordinator.health().sweep().await.unwrap();

    let request = || code_request().with_max_retries(1);
    let blocked = ctx.coordinator.route_with_retry(&request()).await.unwrap();
    assert!(!blocked.success);
    assert!(blocked.error_message.unwrap().contains("at capacity"));

    let timeout = ctx.coordinator.health().config().in_flight_timeout_secs as i64;
    backdate_in_flight(
        ctx.store.as_ref(),
        &single,
        lost,
        Utc::now() - TimeDelta::seconds(timeout + 60),
    )
    .await
    .unwrap();
    let sweep = ctx.coordinator.health().sweep().await.unwrap();
    assert_eq!(sweep.reaped, 1);

    let health = ctx.coordinator.get_agent_health(&single).await.unwrap();
    assert_eq!(health.current_load, 0);
    let routed = ctx.coordinator.route_with_retry(&request()).await.unwrap();
    assert_eq!(routed.agent_id, Some(single.clone()));

    // A completion arriving after the reap changes nothing.
    ctx.coordinator
        .record_task_completion(&single, lost, false)
        .await
        .unwrap();
    let health = ctx.coordinator.get_agent_health(&single).await.unwrap();
    assert_eq!(health.failure_count, 0);
    assert_eq!(
        ctx.coordinator.router().breaker_state(&single).await.unwrap(),
        BreakerState::Closed
    );
}

#[tokio::test]
async fn test_duplicate_completion_is_counted_once() {
    let ctx = TestContext::with_config(eager_breaker_config(2)).await;
    ctx.add_agent(AgentFixture::coder("pair", 1, 2)).await.unwrap();
    let pair = AgentId::from("pair");

    let first = TaskId::new();
    let second = TaskId::new();
    ctx.coordinator.record_task_start(&pair, first).await.unwrap();
    ctx.coordinator.record_task_start(&pair, second).await.unwrap();
    for _ in 0..2 {
        ctx.coordinator
            .record_task_completion(&pair, first, false)
            .await
            .unwrap();
    }

    let health = ctx.coordinator.get_agent_health(&pair).await.unwrap();
    assert_eq!(health.current_load as usize, health.in_flight.len());
    assert_eq!(health.current_load, 1);
    assert_eq!(health.failure_count, 1);
    assert_eq!(
        ctx.coordinator.router().breaker_state(&pair).await.unwrap(),
        BreakerState::Closed
    );
}

#[tokio::test]
async fn test_silent_agent_goes_offline_then_expires() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("quiet", 1, 1)).await.unwrap();
    ctx.add_agent(AgentFixture::coder("chatty", 1, 1)).await.unwrap();
    let quiet = AgentId::from("quiet");

    backdate_agent(ctx.store.as_ref(), &quiet, Utc::now() - TimeDelta::seconds(120))
        .await
        .unwrap();

    assert_eq!(
        ctx.coordinator.get_agent_health(&quiet).await.unwrap().status,
        HealthStatus::Offline
    );
    let routed = ctx.coordinator.route_with_retry(&code_request()).await.unwrap();
    assert_eq!(routed.agent_id, Some(AgentId::from("chatty")));

    let sweep = ctx.coordinator.health().sweep().await.unwrap();
    assert_eq!(sweep.transitions, 1);
    assert!(ctx.coordinator.discovery().cleanup_expired().await.unwrap().is_empty());

    backdate_agent(ctx.store.as_ref(), &quiet, Utc::now() - TimeDelta::seconds(600))
        .await
        .unwrap();
    let expired = ctx.coordinator.discovery().cleanup_expired().await.unwrap();
    assert_eq!(expired, vec![quiet.clone()]);

    let caps: BTreeSet<String> = ["code".to_string()].into();
    let remaining = ctx
        .coordinator
        .find_agents_by_capability(&caps, &BTreeSet::new())
        .await
        .unwrap();
    assert_eq!(remaining, vec![AgentId::from("chatty")]);

    assert_eq!(ctx.events("discovery.expired.>").await.len(), 1);
}

#[tokio::test]
async fn test_capability_and_tag_lookup() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("coder", 5, 1)).await.unwrap();
    ctx.add_agent(AgentFixture::reviewer("reviewer")).await.unwrap();

    let code: BTreeSet<String> = ["code".to_string()].into();
    let careful: BTreeSet<String> = ["careful".to_string()].into();
    let both: BTreeSet<String> = ["code".to_string(), "review".to_string()].into();

    let ranked = ctx
        .coordinator
        .find_agents_by_capability(&code, &careful)
        .await
        .unwrap();
    assert_eq!(ranked, vec![AgentId::from("reviewer"), AgentId::from("coder")]);

    let narrowed = ctx
        .coordinator
        .find_agents_by_capability(&both, &BTreeSet::new())
        .await
        .unwrap();
    assert_eq!(narrowed, vec![AgentId::from("reviewer")]);

    let err = ctx
        .coordinator
        .find_agents_by_capability(&BTreeSet::new(), &BTreeSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, switchyard_core::Error::InvalidRequest(_)));
}

#[tokio::test]
async fn test_store_outage_surfaces_as_error() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("A", 1, 1)).await.unwrap();
    ctx.store.set_available(false);

    let err = tokio_test::assert_err!(ctx.coordinator.route_with_retry(&code_request()).await);
    assert!(err.is_store_failure());

    ctx.store.set_available(true);
    let routed = tokio_test::assert_ok!(ctx.coordinator.route_with_retry(&code_request()).await);
    assert!(routed.success);
}

#[tokio::test]
async fn test_deregistration_keeps_health_history() {
    let ctx = TestContext::new().await;
    ctx.add_agent(AgentFixture::coder("gone", 1, 1)).await.unwrap();
    let gone = AgentId::from("gone");
    ctx.fail_tasks(&gone, 2).await.unwrap();

    ctx.coordinator.deregister_agent(&gone).await.unwrap();
    let routed = ctx.coordinator.route_with_retry(&code_request()).await.unwrap();
    assert!(!routed.success);

    let health = ctx.coordinator.get_agent_health(&gone).await.unwrap();
    assert_eq!(health.failure_count, 2);

    let events = ctx.events("discovery.>").await;
    assert!(events.iter().any(|e| matches!(e, Event::AgentDeregistered(_))));
}
