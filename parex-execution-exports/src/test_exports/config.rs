// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::{ClusterConfig, ExecutionConfig, RouterMode};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            node_name: "parex-test".to_string(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            seeds: Vec::new(),
            formation_timeout: Duration::from_millis(2_000),
            handshake_timeout: Duration::from_millis(1_000),
            connect_retry_interval: Duration::from_millis(50),
            max_message_size: 1_048_576,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            mode: RouterMode::Local,
            local_worker_count: 4,
            worker_mailbox_size: 16,
            worker_ready_timeout: Duration::from_millis(2_000),
            dispatch_timeout: None,
            discard_pending_changes: true,
            cluster: ClusterConfig::default(),
        }
    }
}
