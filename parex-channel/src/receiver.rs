// Copyright (c) 2022 MASSA LABS <info@massa.net>

use std::{
    ops::Deref,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use prometheus::{Counter, Gauge};

#[derive(Clone)]
pub struct ParexReceiver<T> {
    pub(crate) receiver: Receiver<T>,
    pub(crate) name: String,
    /// channel size
    pub(crate) actual_len: Gauge,
    /// total received messages
    pub(crate) received: Counter,
    /// reference counter to know how many receiver are cloned
    pub(crate) ref_counter: Arc<()>,
}

impl<T> Drop for ParexReceiver<T> {
    fn drop(&mut self) {
        if Arc::strong_count(&self.ref_counter) == 1 {
            // last receiver: the metrics are not updated anymore
            let _ = prometheus::unregister(Box::new(self.actual_len.clone()));
            let _ = prometheus::unregister(Box::new(self.received.clone()));
        }
    }
}

impl<T> ParexReceiver<T> {
    fn on_received(&self) {
        // use the len of the channel instead of actual_len.dec()
        // to stay correct when messages are received through the inner receiver
        self.actual_len.set(self.receiver.len() as f64);
        self.received.inc();
    }

    /// attempt to receive a message from the channel
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let msg = self.receiver.try_recv()?;
        self.on_received();
        Ok(msg)
    }

    /// block until a message is received or every sender is dropped
    pub fn recv(&self) -> Result<T, RecvError> {
        let msg = self.receiver.recv()?;
        self.on_received();
        Ok(msg)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let msg = self.receiver.recv_timeout(timeout)?;
        self.on_received();
        Ok(msg)
    }

    pub fn recv_deadline(&self, deadline: Instant) -> Result<T, RecvTimeoutError> {
        let msg = self.receiver.recv_deadline(deadline)?;
        self.on_received();
        Ok(msg)
    }

    /// Name the channel was created with
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Deref for ParexReceiver<T> {
    type Target = Receiver<T>;

    fn deref(&self) -> &Self::Target {
        &self.receiver
    }
}
