// Copyright (c) 2022 MASSA LABS <info@massa.net>

use std::{ops::Deref, time::Duration};

use crossbeam::channel::{SendError, SendTimeoutError, Sender, TrySendError};
use prometheus::Gauge;

#[derive(Clone, Debug)]
pub struct ParexSender<T> {
    pub(crate) sender: Sender<T>,
    pub(crate) name: String,
    /// channel size
    pub(crate) actual_len: Gauge,
}

impl<T> ParexSender<T> {
    /// Send a message to the channel, blocking while a bounded channel is full
    pub fn send(&self, msg: T) -> Result<(), SendError<T>> {
        self.sender.send(msg)?;
        self.actual_len.inc();
        Ok(())
    }

    pub fn send_timeout(&self, msg: T, duration: Duration) -> Result<(), SendTimeoutError<T>> {
        self.sender.send_timeout(msg, duration)?;
        self.actual_len.inc();
        Ok(())
    }

    pub fn try_send(&self, msg: T) -> Result<(), TrySendError<T>> {
        self.sender.try_send(msg)?;
        self.actual_len.inc();
        Ok(())
    }

    /// Name the channel was created with
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Deref for ParexSender<T> {
    type Target = Sender<T>;

    fn deref(&self) -> &Self::Target {
        &self.sender
    }
}
