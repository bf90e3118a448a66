// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::cluster::binder::{MessageReader, MessageWriter};
use crate::cluster::messages::{
    CoordinatorMessage, CoordinatorMessageSerializer, WorkerMessage, WorkerMessageDeserializer,
};
use crate::registry::WorkerLink;
use crate::request::{GroupRequest, GroupResponder};
use parex_execution_exports::ExecutionError;
use parex_models::{trace::TransactionTrace, worker_id::WorkerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

#[derive(Default)]
struct PendingRequests {
    /// set once the connection is lost, no request is accepted afterwards
    closed: bool,
    responders: HashMap<u64, GroupResponder>,
}

/// Link to a worker connected to the coordinator.
/// Results are read by the connection thread and matched to requests by identifier.
pub(crate) struct RemoteWorkerLink {
    worker_id: WorkerId,
    writer: Mutex<MessageWriter<CoordinatorMessage, CoordinatorMessageSerializer>>,
    pending: Mutex<PendingRequests>,
}

impl RemoteWorkerLink {
    pub fn new(
        worker_id: WorkerId,
        writer: MessageWriter<CoordinatorMessage, CoordinatorMessageSerializer>,
    ) -> Self {
        RemoteWorkerLink {
            worker_id,
            writer: Mutex::new(writer),
            pending: Mutex::new(PendingRequests::default()),
        }
    }

    pub fn send(&self, message: &CoordinatorMessage) -> Result<(), ExecutionError> {
        self.writer.lock().send(message)
    }

    /// Tell the worker why it is refused, then drop the connection
    pub fn reject(&self, reason: String) {
        let mut writer = self.writer.lock();
        let _ = writer.send(&CoordinatorMessage::Rejected { reason });
        writer.shutdown();
    }

    /// Read group results until the connection fails
    pub fn read_results(
        &self,
        reader: &mut MessageReader<WorkerMessage, WorkerMessageDeserializer>,
    ) -> Result<(), ExecutionError> {
        loop {
            match reader.next()? {
                WorkerMessage::GroupResult { request_id, result } => {
                    self.complete(request_id, result)
                }
                WorkerMessage::Register { .. } => {
                    return Err(ExecutionError::ProtocolError(format!(
                        "{} registered twice on the same connection",
                        self.worker_id
                    )))
                }
            }
        }
    }

    fn complete(&self, request_id: u64, result: Result<Vec<TransactionTrace>, String>) {
        let responder = self.pending.lock().responders.remove(&request_id);
        match responder {
            Some(responder) => responder.respond(result.map_err(|reason| {
                ExecutionError::GroupAborted(format!("on {}: {}", self.worker_id, reason))
            })),
            None => warn!(
                "{} answered unknown request {}",
                self.worker_id, request_id
            ),
        }
    }

    /// Fail every request still waiting for an answer and refuse new ones
    pub fn fail_pending(&self, reason: &str) {
        let responders: Vec<GroupResponder> = {
            let mut pending = self.pending.lock();
            pending.closed = true;
            pending.responders.drain().map(|(_, responder)| responder).collect()
        };
        for responder in responders {
            responder.respond(Err(ExecutionError::WorkerUnreachable(
                self.worker_id.clone(),
                reason.to_string(),
            )));
        }
    }
}

impl WorkerLink for RemoteWorkerLink {
    fn submit(&self, request: GroupRequest) -> Result<(), ExecutionError> {
        let (call, responder) = request.into_parts();
        {
            let mut pending = self.pending.lock();
            if pending.closed {
                return Err(ExecutionError::WorkerUnreachable(
                    self.worker_id.clone(),
                    "connection closed".to_string(),
                ));
            }
            pending.responders.insert(call.request_id, responder);
        }
        let request_id = call.request_id;
        let message = CoordinatorMessage::ExecuteGroup {
            request_id,
            chain_id: call.chain_id,
            transactions: call.transactions,
        };
        if let Err(err) = self.send(&message) {
            self.pending.lock().responders.remove(&request_id);
            return Err(match err {
                ExecutionError::IoError(err) => {
                    ExecutionError::WorkerUnreachable(self.worker_id.clone(), err.to_string())
                }
                other => other,
            });
        }
        Ok(())
    }

    fn close(&self) {
        let mut writer = self.writer.lock();
        let _ = writer.send(&CoordinatorMessage::Shutdown);
        writer.shutdown();
    }
}
