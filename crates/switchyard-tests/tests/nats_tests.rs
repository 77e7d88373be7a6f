//! Coordination events over NATS JetStream.
//!
//! Run with: `cargo test -p switchyard-tests --test nats_tests --features integration`

#![cfg(feature = "integration")]

use futures::StreamExt;
use std::time::Duration;
use switchyard_core::events::Event;
use switchyard_core::ids::{AgentId, TaskId};
use switchyard_core::ports::EventBus;
use switchyard_core::routing::RoutingRequest;
use switchyard_tests::AgentFixture;
use switchyard_tests::context::NatsContext;

#[tokio::test]
async fn test_registration_events_reach_subscribers() {
    let ctx = NatsContext::start("SWITCHYARD_REG")
        .await
        .expect("Failed to create context");

    let mut stream = ctx
        .bus
        .subscribe("discovery.registered.>")
        .await
        .expect("Failed to subscribe");

    ctx.coordinator.init();
    ctx.coordinator
        .register_agent(AgentFixture::coder("nats-coder", 1, 2))
        .await
        .expect("Failed to register");
    ctx.coordinator.close().await;

    let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("Timeout waiting for event")
        .expect("Stream ended")
        .expect("Failed to decode event");

    match received {
        Event::AgentRegistered(p) => {
            assert_eq!(p.agent_id, AgentId::from("nats-coder"));
            assert!(!p.replaced);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_routing_decision_is_published() {
    let ctx = NatsContext::start("SWITCHYARD_ROUTING")
        .await
        .expect("Failed to create context");

    let mut stream = ctx
        .bus
        .subscribe("routing.decision.>")
        .await
        .expect("Failed to subscribe");

    ctx.coordinator.init();
    ctx.coordinator
        .register_agent(AgentFixture::coder("router-target", 1, 2))
        .await
        .unwrap();
    ctx.coordinator
        .record_heartbeat(&AgentId::from("router-target"))
        .await
        .unwrap();

    let result = ctx
        .coordinator
        .route_with_retry(&RoutingRequest::new(TaskId::new(), "code").with_capabilities(["code"]))
        .await
        .unwrap();
    assert!(result.success);
    ctx.coordinator.close().await;

    let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("Timeout waiting for event")
        .expect("Stream ended")
        .expect("Failed to decode event");
    assert!(matches!(received, Event::RoutingDecision(p) if p.agent_id.as_str() == "router-target"));

    let metrics = ctx.bus.metrics().snapshot();
    assert!(metrics.messages_published >= 3);
}
