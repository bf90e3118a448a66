// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Named crossbeam channels exposing their occupancy as prometheus metrics.

use std::sync::Arc;

use receiver::ParexReceiver;
use sender::ParexSender;

pub mod receiver;
pub mod sender;

#[derive(Clone)]
pub struct ParexChannel {}

impl ParexChannel {
    /// Creates a channel whose metrics are registered under `name`.
    /// `capacity` of `None` gives an unbounded channel.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<T>(name: String, capacity: Option<usize>) -> (ParexSender<T>, ParexReceiver<T>) {
        use prometheus::{Counter, Gauge};
        use tracing::debug;

        let (s, r) = if let Some(capacity) = capacity {
            crossbeam::channel::bounded::<T>(capacity)
        } else {
            crossbeam::channel::unbounded::<T>()
        };

        let metric_prefix = metric_prefix(&name);

        // gauge of the number of queued messages
        // inc() when sending, set to the channel length when receiving
        let actual_len = Gauge::new(
            format!("{}_channel_actual_size", metric_prefix),
            "Actual length of channel",
        )
        .expect("Failed to create gauge");

        let received = Counter::new(
            format!("{}_channel_total_receive", metric_prefix),
            "Total received messages",
        )
        .expect("Failed to create counter");

        // registration fails when a channel with the same name already exists,
        // the metrics then stay local to this channel
        if let Err(e) = prometheus::register(Box::new(actual_len.clone())) {
            debug!("Failed to register actual_len gauge for {} : {}", name, e);
        }

        if let Err(e) = prometheus::register(Box::new(received.clone())) {
            debug!("Failed to register received counter for {} : {}", name, e);
        }

        let sender = ParexSender {
            sender: s,
            name: name.clone(),
            actual_len: actual_len.clone(),
        };

        let receiver = ParexReceiver {
            receiver: r,
            name,
            actual_len,
            received,
            ref_counter: Arc::new(()),
        };

        (sender, receiver)
    }
}

/// Metric names only accept `[a-zA-Z0-9_]` and cannot start with a digit.
fn metric_prefix(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("parex_{}", sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_channel_tracks_length() {
        let (sender, receiver) =
            ParexChannel::new::<u32>("test_channel_tracks_length".to_string(), Some(4));
        sender.send(1).unwrap();
        sender.send(2).unwrap();
        assert_eq!(sender.actual_len.get(), 2.0);
        assert_eq!(receiver.recv().unwrap(), 1);
        assert_eq!(receiver.actual_len.get(), 1.0);
        assert_eq!(receiver.received.get(), 1.0);
        assert_eq!(receiver.recv_timeout(Duration::from_millis(10)).unwrap(), 2);
    }

    #[test]
    fn test_metric_prefix_is_sanitized() {
        assert_eq!(metric_prefix("node-a/worker0"), "parex_node_a_worker0");
    }

    #[test]
    fn test_bounded_channel_reports_full() {
        let (sender, _receiver) =
            ParexChannel::new::<u32>("test_bounded_channel_reports_full".to_string(), Some(1));
        sender.try_send(1).unwrap();
        assert!(sender.try_send(2).is_err());
    }
}
