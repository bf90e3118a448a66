// Copyright (c) 2022 MASSA LABS <info@massa.net>

use super::tools::*;
use crate::{start_execution_worker, start_worker_node};
use parex_execution_exports::test_exports::{call, TestServices};
use parex_execution_exports::ExecutionError;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn test_remote_workers_execute_batches() {
    let port = free_port();
    let services = TestServices::new();
    let mut node = start_worker_node(
        worker_node_config("node-b", port, 2),
        services.service_pack.clone(),
    )
    .unwrap();
    let (mut manager, controller) =
        start_execution_worker(cluster_config(port), services.service_pack.clone());

    let batch = vec![
        call("alice", "store", "set:a", vec![1]),
        call("bob", "store", "set:b", vec![2]),
        call("alice", "store", "get:a", Vec::new()),
        call("carol", "store", "fail:c", Vec::new()),
    ];
    declare(&services, &batch);
    let traces = controller
        .execute_transactions(batch.clone(), services.chain_id)
        .unwrap();
    assert_trace_order(&batch, &traces);
    assert_eq!(traces[2].return_value, vec![1]);
    assert!(!traces[3].is_successful());

    let stats = wait_for_stats(controller.as_ref(), Duration::from_secs(5), |stats| {
        stats.ready_workers == 2
    });
    assert_eq!(stats.registered_workers, 2);

    manager.stop();
    node.stop();
}

#[test]
#[serial]
fn test_remote_abort_fails_the_batch() {
    let port = free_port();
    let services = TestServices::new();
    let mut node = start_worker_node(
        worker_node_config("node-b", port, 1),
        services.service_pack.clone(),
    )
    .unwrap();
    let (mut manager, controller) =
        start_execution_worker(cluster_config(port), services.service_pack.clone());

    let result = controller.execute_transactions(
        vec![call("alice", "store", "abort", Vec::new())],
        services.chain_id,
    );
    assert!(matches!(result, Err(ExecutionError::GroupAborted(_))));

    // the connection is still usable
    let batch = vec![services.write_call("alice", "store", "a")];
    assert!(controller
        .execute_transactions(batch, services.chain_id)
        .is_ok());

    manager.stop();
    node.stop();
}

#[test]
#[serial]
fn test_duplicate_worker_names_are_refused() {
    let port = free_port();
    let services = TestServices::new();
    let mut first = start_worker_node(
        worker_node_config("node-b", port, 2),
        services.service_pack.clone(),
    )
    .unwrap();
    let (mut manager, controller) =
        start_execution_worker(cluster_config(port), services.service_pack.clone());
    controller.initialize_pool().unwrap();
    wait_for_stats(controller.as_ref(), Duration::from_secs(5), |stats| {
        stats.ready_workers == 2
    });

    let mut twin = start_worker_node(
        worker_node_config("node-b", port, 2),
        services.service_pack.clone(),
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(controller.get_stats().registered_workers, 2);

    let mut other = start_worker_node(
        worker_node_config("node-c", port, 1),
        services.service_pack.clone(),
    )
    .unwrap();
    let stats = wait_for_stats(controller.as_ref(), Duration::from_secs(5), |stats| {
        stats.ready_workers == 3
    });
    assert_eq!(stats.registered_workers, 3);

    twin.stop();
    other.stop();
    manager.stop();
    first.stop();
}

#[test]
#[serial]
fn test_departed_worker_node_leaves_the_pool() {
    let port = free_port();
    let services = TestServices::new();
    let mut node = start_worker_node(
        worker_node_config("node-b", port, 1),
        services.service_pack.clone(),
    )
    .unwrap();
    let (mut manager, controller) =
        start_execution_worker(cluster_config(port), services.service_pack.clone());
    controller.initialize_pool().unwrap();

    node.stop();
    let stats = wait_for_stats(controller.as_ref(), Duration::from_secs(5), |stats| {
        stats.registered_workers == 0
    });
    assert_eq!(stats.registered_workers, 0);

    let result = controller.execute_transactions(
        vec![services.write_call("alice", "store", "a")],
        services.chain_id,
    );
    assert!(matches!(result, Err(ExecutionError::NoAvailableWorker(_))));
    manager.stop();
}
