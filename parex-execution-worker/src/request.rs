// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Group execution requests coupled with the sender of their result.

use crossbeam_channel::{Receiver, Sender};
use parex_execution_exports::ExecutionError;
use parex_models::{chain::ChainId, trace::TransactionTrace, transaction::Transaction};
use std::sync::atomic::{AtomicU64, Ordering};

/// Traces of a group, in group order, or the reason the group failed
pub(crate) type GroupResult = Result<Vec<TransactionTrace>, ExecutionError>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// What a worker needs to execute a group
pub(crate) struct GroupCall {
    /// process-unique request identifier
    pub request_id: u64,
    /// chain the group executes against
    pub chain_id: ChainId,
    /// transactions of the group, in submission order
    pub transactions: Vec<Transaction>,
}

/// Sends the result of a group back to the requestor
pub(crate) struct GroupResponder(Sender<GroupResult>);

impl GroupResponder {
    /// Send the result. Errors are ignored: they only mean the requestor
    /// gave up on the batch and does not need the result anymore.
    pub fn respond(self, result: GroupResult) {
        let _ = self.0.send(result);
    }
}

/// A group call coupled with its responder
pub(crate) struct GroupRequest {
    call: GroupCall,
    responder: GroupResponder,
}

impl GroupRequest {
    /// Create a request and the receiver of its result
    pub fn new(chain_id: ChainId, transactions: Vec<Transaction>) -> (Self, Receiver<GroupResult>) {
        let (response_tx, response_rx) = crossbeam_channel::bounded(1);
        let request = GroupRequest {
            call: GroupCall {
                request_id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
                chain_id,
                transactions,
            },
            responder: GroupResponder(response_tx),
        };
        (request, response_rx)
    }

    /// Identifier of the request
    pub fn request_id(&self) -> u64 {
        self.call.request_id
    }

    /// Number of transactions in the group
    pub fn len(&self) -> usize {
        self.call.transactions.len()
    }

    /// Destructure self into a (call, responder) pair
    pub fn into_parts(self) -> (GroupCall, GroupResponder) {
        (self.call, self.responder)
    }
}
