// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end lifecycle through an assembled node with embedded controllers.

use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use swarmctl::node::ControlPlaneNode;
use swarmctl_core::application::{CreateSwarmCommand, SwarmLifecycleService};
use swarmctl_core::domain::errors::ControlPlaneError;
use swarmctl_core::domain::lifecycle::SwarmLifecycleStatus;
use swarmctl_core::domain::node_config::ControlPlaneConfigManifest;

fn embedded_config() -> ControlPlaneConfigManifest {
    let mut config = ControlPlaneConfigManifest::default();
    config.spec.controller.embedded = true;
    config.spec.controller.status_interval_secs = 1;
    config
}

async fn wait_for_status(node: &ControlPlaneNode, swarm_id: &str, expected: SwarmLifecycleStatus) {
    let reached = timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(record) = node.lifecycle.get(swarm_id).await {
                if record.status == expected {
                    return;
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "swarm {} never reached {}", swarm_id, expected);
}

#[tokio::test]
async fn test_swarm_lifecycle_with_embedded_controller() {
    let node = ControlPlaneNode::build(&embedded_config());
    let tasks = node.start();

    let accepted = node
        .dispatcher
        .create_swarm(CreateSwarmCommand {
            swarm_id: "sw1".to_string(),
            idempotency_key: "create-1".to_string(),
            template_id: Some("empty-v1".to_string()),
            template: Some(json!({ "workers": [] })),
        })
        .await
        .unwrap();
    assert!(!accepted.duplicate);
    wait_for_status(&node, "sw1", SwarmLifecycleStatus::Ready).await;

    let record = node.lifecycle.get("sw1").await.unwrap();
    let controllers = node.controllers.as_ref().unwrap();
    assert_eq!(record.controller_instance, controllers.instance("sw1"));

    node.dispatcher.start_swarm("sw1", "start-1").await.unwrap();
    wait_for_status(&node, "sw1", SwarmLifecycleStatus::Running).await;

    node.dispatcher.stop_swarm("sw1", "stop-1").await.unwrap();
    wait_for_status(&node, "sw1", SwarmLifecycleStatus::Stopped).await;

    node.dispatcher.remove_swarm("sw1", "remove-1").await.unwrap();
    let gone = timeout(Duration::from_secs(5), async {
        loop {
            if let Err(ControlPlaneError::NotFound(_)) = node.lifecycle.get("sw1").await {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(gone.is_ok(), "swarm was never removed");
    assert!(controllers.instance("sw1").is_none());

    tasks.shutdown(&node).await;
}

#[tokio::test]
async fn test_duplicate_create_is_accepted_once() {
    let node = ControlPlaneNode::build(&embedded_config());
    let tasks = node.start();

    let command = CreateSwarmCommand {
        swarm_id: "sw2".to_string(),
        idempotency_key: "create-sw2".to_string(),
        template_id: None,
        template: Some(json!({ "workers": [] })),
    };
    let first = node.dispatcher.create_swarm(command.clone()).await.unwrap();
    let second = node.dispatcher.create_swarm(command).await.unwrap();

    assert_eq!(first.correlation_id, second.correlation_id);
    assert!(second.duplicate);
    assert_eq!(node.controllers.as_ref().unwrap().running_count(), 1);

    tasks.shutdown(&node).await;
}
