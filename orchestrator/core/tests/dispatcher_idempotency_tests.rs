// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command dispatch: idempotent publishing, rollback on publish failure and
//! downstream failures during swarm creation.

mod common;

use common::{Harness, SlowLookupIdempotencyStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use swarmctl_core::application::{
    CommandDispatcher, ConfigUpdateCommand, CreateSwarmCommand, DispatcherSettings,
    SwarmLifecycleService,
};
use swarmctl_core::domain::errors::ControlPlaneError;
use swarmctl_core::domain::lifecycle::SwarmLifecycleStatus;
use swarmctl_core::domain::scope::CommandTarget;

const START_KEY: &str = "signal.swarm-start.sw1.swarm-controller.ALL";
const TEMPLATE_KEY: &str = "signal.swarm-template.sw1.swarm-controller.ALL";

fn create(swarm_id: &str, idempotency_key: &str) -> CreateSwarmCommand {
    CreateSwarmCommand {
        swarm_id: swarm_id.to_string(),
        idempotency_key: idempotency_key.to_string(),
        template_id: Some("pipeline".to_string()),
        template: Some(json!({ "workers": [{ "role": "processor", "instance": "p1" }] })),
    }
}

async fn ready_swarm(harness: &Harness, swarm_id: &str) {
    harness
        .dispatcher
        .create_swarm(create(swarm_id, "create-1"))
        .await
        .unwrap();
    harness
        .lifecycle
        .transition(swarm_id, SwarmLifecycleStatus::Ready)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_publishes_template_to_controller() {
    let harness = Harness::new();
    let accepted = harness
        .dispatcher
        .create_swarm(create("sw1", "create-1"))
        .await
        .unwrap();

    assert!(!accepted.duplicate);
    assert_eq!(accepted.timeout_ms, 60_000);
    assert_eq!(
        accepted.watch.success_topic,
        "event.outcome.ready.sw1.swarm-controller.*"
    );
    assert_eq!(
        accepted.watch.error_topic,
        "event.outcome.error.sw1.swarm-controller.*"
    );

    let envelopes = harness.publisher.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(
        envelopes[0].routing_key,
        "signal.swarm-template.sw1.swarm-controller.ALL"
    );
    assert_eq!(envelopes[0].body["correlationId"], accepted.correlation_id.as_str());
    assert_eq!(envelopes[0].body["origin"], "orch-1");
    assert_eq!(envelopes[0].body["data"]["templateId"], "pipeline");

    let record = harness.lifecycle.get("sw1").await.unwrap();
    assert_eq!(record.status, SwarmLifecycleStatus::Creating);
    assert_eq!(record.controller_instance.as_deref(), Some("sw1-ctrl"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_publish_once() {
    let harness = Harness::new();
    ready_swarm(&harness, "sw1").await;

    let mut handles = Vec::new();
    for _ in 0..32 {
        let dispatcher = harness.dispatcher.clone();
        handles.push(tokio::spawn(async move {
            dispatcher.start_swarm("sw1", "start-1").await
        }));
    }

    let mut correlation_ids = Vec::new();
    for handle in handles {
        correlation_ids.push(handle.await.unwrap().unwrap().correlation_id);
    }

    correlation_ids.dedup();
    assert_eq!(correlation_ids.len(), 1, "every caller sees the winner's correlation id");
    assert_eq!(harness.publisher.count(START_KEY), 1);
    assert_eq!(
        harness.lifecycle.get("sw1").await.unwrap().status,
        SwarmLifecycleStatus::Starting
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_with_same_key_publish_once() {
    let harness = Harness::new();
    let dispatcher = Arc::new(CommandDispatcher::new(
        harness.lifecycle.clone(),
        Arc::new(SlowLookupIdempotencyStore::new(Duration::from_millis(5))),
        harness.publisher.clone(),
        harness.compute.clone(),
        DispatcherSettings {
            origin: "orch-1".to_string(),
            command_timeout_ms: 60_000,
        },
    ));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            dispatcher.create_swarm(create("sw1", "create-1")).await
        }));
    }

    let mut accepted = Vec::new();
    for handle in handles {
        accepted.push(handle.await.unwrap().expect("no caller may see a conflict"));
    }

    let winners = accepted.iter().filter(|a| !a.duplicate).count();
    assert_eq!(winners, 1);
    let mut correlation_ids: Vec<_> = accepted.into_iter().map(|a| a.correlation_id).collect();
    correlation_ids.sort();
    correlation_ids.dedup();
    assert_eq!(correlation_ids.len(), 1);
    assert_eq!(harness.publisher.count(TEMPLATE_KEY), 1);
}

#[tokio::test]
async fn test_retry_after_completion_returns_original() {
    let harness = Harness::new();
    ready_swarm(&harness, "sw1").await;

    let first = harness.dispatcher.start_swarm("sw1", "start-1").await.unwrap();
    harness
        .lifecycle
        .transition("sw1", SwarmLifecycleStatus::Running)
        .await
        .unwrap();
    let second = harness.dispatcher.start_swarm("sw1", "start-1").await.unwrap();

    assert_eq!(first.correlation_id, second.correlation_id);
    assert!(second.duplicate);
    assert_eq!(harness.publisher.count(START_KEY), 1);

    // A new key is a new command.
    let third = harness.dispatcher.start_swarm("sw1", "start-2").await.unwrap();
    assert_ne!(third.correlation_id, first.correlation_id);
    assert_eq!(harness.publisher.count(START_KEY), 2);
}

#[tokio::test]
async fn test_publish_failure_rolls_back_reservation() {
    let harness = Harness::new();
    ready_swarm(&harness, "sw1").await;

    harness.publisher.set_failing(true);
    let err = harness
        .dispatcher
        .start_swarm("sw1", "start-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPlaneError::PublishFailure { .. }));
    assert!(err.retryable());
    assert_eq!(
        harness.lifecycle.get("sw1").await.unwrap().status,
        SwarmLifecycleStatus::Ready,
        "no transition without a publish"
    );

    harness.publisher.set_failing(false);
    let retried = harness.dispatcher.start_swarm("sw1", "start-1").await.unwrap();
    assert!(!retried.duplicate);
    assert_eq!(harness.publisher.count(START_KEY), 1);
    assert_eq!(
        harness.lifecycle.get("sw1").await.unwrap().status,
        SwarmLifecycleStatus::Starting
    );
}

#[tokio::test]
async fn test_controller_launch_failure_is_downstream_unavailable() {
    let harness = Harness::new();
    harness.compute.set_fail_launch(true);

    let err = harness
        .dispatcher
        .create_swarm(create("sw1", "create-1"))
        .await
        .unwrap_err();
    match &err {
        ControlPlaneError::DownstreamUnavailable { hint, .. } => {
            assert_eq!(hint, "scale the controller pool")
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(harness.publisher.envelopes().is_empty());
    assert_eq!(
        harness.lifecycle.get("sw1").await.unwrap().status,
        SwarmLifecycleStatus::Failed
    );

    // The reservation was released, so the same command can be retried.
    harness.compute.set_fail_launch(false);
    let accepted = harness
        .dispatcher
        .create_swarm(create("sw1", "create-1"))
        .await
        .unwrap();
    assert!(!accepted.duplicate);
    assert_eq!(
        harness.lifecycle.get("sw1").await.unwrap().status,
        SwarmLifecycleStatus::Creating
    );
}

#[tokio::test]
async fn test_create_conflicts_with_live_swarm() {
    let harness = Harness::new();
    harness
        .dispatcher
        .create_swarm(create("sw1", "create-1"))
        .await
        .unwrap();

    let err = harness
        .dispatcher
        .create_swarm(create("sw1", "create-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPlaneError::Conflict(_)));
    assert_eq!(harness.publisher.envelopes().len(), 1);

    // The rejected key was released rather than bound to a command that never ran.
    let again = harness
        .dispatcher
        .create_swarm(create("sw1", "create-2"))
        .await
        .unwrap_err();
    assert!(matches!(again, ControlPlaneError::Conflict(_)));
}

#[tokio::test]
async fn test_recreate_after_failure_removes_previous_controller() {
    let harness = Harness::new();
    harness
        .dispatcher
        .create_swarm(create("sw1", "create-1"))
        .await
        .unwrap();
    harness
        .lifecycle
        .transition("sw1", SwarmLifecycleStatus::Failed)
        .await
        .unwrap();

    let accepted = harness
        .dispatcher
        .create_swarm(create("sw1", "create-2"))
        .await
        .unwrap();
    assert!(!accepted.duplicate);
    assert_eq!(*harness.compute.removed.lock(), vec!["sw1".to_string()]);
    assert_eq!(harness.publisher.count(TEMPLATE_KEY), 2);
    assert_eq!(
        harness.lifecycle.get("sw1").await.unwrap().status,
        SwarmLifecycleStatus::Creating
    );
}

#[tokio::test]
async fn test_illegal_and_invalid_commands_are_never_published() {
    let harness = Harness::new();
    harness
        .dispatcher
        .create_swarm(create("sw1", "create-1"))
        .await
        .unwrap();

    let err = harness.dispatcher.stop_swarm("sw1", "stop-1").await.unwrap_err();
    assert!(matches!(err, ControlPlaneError::Lifecycle(_)));

    let err = harness.dispatcher.start_swarm("sw1", "   ").await.unwrap_err();
    assert!(matches!(err, ControlPlaneError::Validation(_)));

    let err = harness.dispatcher.start_swarm("ghost", "start-1").await.unwrap_err();
    assert!(matches!(err, ControlPlaneError::NotFound(_)));

    let err = harness
        .dispatcher
        .start_swarm("bad.swarm", "start-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPlaneError::Validation(_)));

    assert_eq!(harness.publisher.envelopes().len(), 1);
}

#[tokio::test]
async fn test_config_update_goes_through_controller() {
    let harness = Harness::new();
    harness
        .dispatcher
        .create_swarm(create("sw1", "create-1"))
        .await
        .unwrap();

    let mut patch = serde_json::Map::new();
    patch.insert("batchSize".to_string(), json!(10));
    let accepted = harness
        .dispatcher
        .update_config(ConfigUpdateCommand {
            swarm_id: "sw1".to_string(),
            role: "processor".to_string(),
            instance: "ALL".to_string(),
            idempotency_key: "cfg-1".to_string(),
            patch,
            command_target: CommandTarget::Role,
        })
        .await
        .unwrap();

    let envelopes = harness.publisher.envelopes();
    let update = envelopes
        .iter()
        .find(|e| e.routing_key == "signal.config-update.sw1.swarm-controller.ALL")
        .expect("config-update published on the controller key");
    assert_eq!(update.body["scope"]["role"], "processor");
    assert_eq!(update.body["scope"]["instance"], "ALL");
    assert_eq!(update.body["commandTarget"], "ROLE");
    assert_eq!(update.body["data"]["batchSize"], 10);
    assert_eq!(update.body["correlationId"], accepted.correlation_id.as_str());
}

#[tokio::test]
async fn test_status_requests_are_not_deduplicated() {
    let harness = Harness::new();
    let first = harness.dispatcher.request_status("sw1").await.unwrap();
    let second = harness.dispatcher.request_status("sw1").await.unwrap();

    assert_ne!(first, second);
    assert_eq!(
        harness
            .publisher
            .count("signal.status-request.sw1.swarm-controller.ALL"),
        2
    );
}
