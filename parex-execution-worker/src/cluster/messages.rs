// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Messages exchanged between a cluster coordinator and remote workers.
//!
//! Every message starts with a varint type tag followed by its fields.

use nom::{
    error::{context, ContextError, ErrorKind, ParseError},
    multi::length_count,
    IResult,
};
use parex_models::{
    chain::{ChainId, ChainIdDeserializer, ChainIdSerializer},
    config::MAX_MESSAGE_LENGTH,
    trace::{TransactionTrace, TransactionTraceDeserializer, TransactionTraceSerializer},
    transaction::{Transaction, TransactionDeserializer, TransactionSerializer},
    worker_id::{WorkerId, WorkerIdDeserializer, WorkerIdSerializer},
};
use parex_serialization::{
    Deserializer, SerializeError, Serializer, StringDeserializer, StringSerializer,
    U32VarIntDeserializer, U32VarIntSerializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use std::ops::Bound::Included;

/// Upper bound on the number of transactions (or traces) of one group on the wire
const MAX_GROUP_LENGTH: u32 = 1_000_000;

const REGISTER: u32 = 0;
const GROUP_RESULT: u32 = 1;

const REGISTERED: u32 = 0;
const REJECTED: u32 = 1;
const EXECUTE_GROUP: u32 = 2;
const SHUTDOWN: u32 = 3;

const RESULT_OK: u32 = 0;
const RESULT_ERR: u32 = 1;

/// Messages sent by a remote worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerMessage {
    /// first message of a connection
    Register {
        worker_id: WorkerId,
        protocol_version: u32,
    },
    /// traces of a group, or the reason it was aborted
    GroupResult {
        request_id: u64,
        result: Result<Vec<TransactionTrace>, String>,
    },
}

/// Messages sent by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CoordinatorMessage {
    /// the worker joined the pool
    Registered,
    /// the worker was refused and the connection will be closed
    Rejected { reason: String },
    /// execute a group
    ExecuteGroup {
        request_id: u64,
        chain_id: ChainId,
        transactions: Vec<Transaction>,
    },
    /// the coordinator is stopping
    Shutdown,
}

fn serialize_count(
    serializer: &U32VarIntSerializer,
    count: usize,
    buffer: &mut Vec<u8>,
) -> Result<(), SerializeError> {
    let count: u32 = count
        .try_into()
        .ok()
        .filter(|count| *count <= MAX_GROUP_LENGTH)
        .ok_or_else(|| SerializeError::LengthTooBig(format!("group of {} elements", count)))?;
    serializer.serialize(&count, buffer)
}

#[derive(Default, Clone)]
pub(crate) struct WorkerMessageSerializer {
    u32_serializer: U32VarIntSerializer,
    u64_serializer: U64VarIntSerializer,
    worker_id_serializer: WorkerIdSerializer,
    trace_serializer: TransactionTraceSerializer,
    string_serializer: StringSerializer,
}

impl WorkerMessageSerializer {
    pub const fn new() -> Self {
        Self {
            u32_serializer: U32VarIntSerializer::new(),
            u64_serializer: U64VarIntSerializer::new(),
            worker_id_serializer: WorkerIdSerializer::new(),
            trace_serializer: TransactionTraceSerializer::new(),
            string_serializer: StringSerializer::new(),
        }
    }
}

impl Serializer<WorkerMessage> for WorkerMessageSerializer {
    fn serialize(&self, value: &WorkerMessage, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        match value {
            WorkerMessage::Register {
                worker_id,
                protocol_version,
            } => {
                self.u32_serializer.serialize(&REGISTER, buffer)?;
                self.worker_id_serializer.serialize(worker_id, buffer)?;
                self.u32_serializer.serialize(protocol_version, buffer)?;
            }
            WorkerMessage::GroupResult { request_id, result } => {
                self.u32_serializer.serialize(&GROUP_RESULT, buffer)?;
                self.u64_serializer.serialize(request_id, buffer)?;
                match result {
                    Ok(traces) => {
                        self.u32_serializer.serialize(&RESULT_OK, buffer)?;
                        serialize_count(&self.u32_serializer, traces.len(), buffer)?;
                        for trace in traces {
                            self.trace_serializer.serialize(trace, buffer)?;
                        }
                    }
                    Err(reason) => {
                        self.u32_serializer.serialize(&RESULT_ERR, buffer)?;
                        self.string_serializer.serialize(reason, buffer)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct WorkerMessageDeserializer {
    tag_deserializer: U32VarIntDeserializer,
    version_deserializer: U32VarIntDeserializer,
    request_id_deserializer: U64VarIntDeserializer,
    count_deserializer: U32VarIntDeserializer,
    worker_id_deserializer: WorkerIdDeserializer,
    trace_deserializer: TransactionTraceDeserializer,
    reason_deserializer: StringDeserializer,
}

impl WorkerMessageDeserializer {
    pub const fn new() -> Self {
        Self {
            tag_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            version_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            request_id_deserializer: U64VarIntDeserializer::new(Included(0), Included(u64::MAX)),
            count_deserializer: U32VarIntDeserializer::new(Included(0), Included(MAX_GROUP_LENGTH)),
            worker_id_deserializer: WorkerIdDeserializer::new(),
            trace_deserializer: TransactionTraceDeserializer::new(),
            reason_deserializer: StringDeserializer::new(
                Included(0),
                Included(MAX_MESSAGE_LENGTH),
            ),
        }
    }
}

impl Deserializer<WorkerMessage> for WorkerMessageDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], WorkerMessage, E> {
        context(
            "Failed WorkerMessage deserialization",
            |input: &'a [u8]| -> IResult<&'a [u8], WorkerMessage, E> {
                let (rest, tag) = self.tag_deserializer.deserialize::<E>(input)?;
                match tag {
                    REGISTER => {
                        let (rest, worker_id) = self.worker_id_deserializer.deserialize::<E>(rest)?;
                        let (rest, protocol_version) =
                            self.version_deserializer.deserialize::<E>(rest)?;
                        Ok((
                            rest,
                            WorkerMessage::Register {
                                worker_id,
                                protocol_version,
                            },
                        ))
                    }
                    GROUP_RESULT => {
                        let (rest, request_id) =
                            self.request_id_deserializer.deserialize::<E>(rest)?;
                        let (rest, result_tag) = self.tag_deserializer.deserialize::<E>(rest)?;
                        let (rest, result) = match result_tag {
                            RESULT_OK => {
                                let (rest, traces) = length_count(
                                    |input| self.count_deserializer.deserialize::<E>(input),
                                    |input| self.trace_deserializer.deserialize::<E>(input),
                                )(rest)?;
                                (rest, Ok(traces))
                            }
                            RESULT_ERR => {
                                let (rest, reason) =
                                    self.reason_deserializer.deserialize::<E>(rest)?;
                                (rest, Err(reason))
                            }
                            _ => {
                                return Err(nom::Err::Error(E::from_error_kind(
                                    rest,
                                    ErrorKind::Tag,
                                )))
                            }
                        };
                        Ok((rest, WorkerMessage::GroupResult { request_id, result }))
                    }
                    _ => Err(nom::Err::Error(E::from_error_kind(input, ErrorKind::Tag))),
                }
            },
        )(buffer)
    }
}

#[derive(Default, Clone)]
pub(crate) struct CoordinatorMessageSerializer {
    u32_serializer: U32VarIntSerializer,
    u64_serializer: U64VarIntSerializer,
    chain_id_serializer: ChainIdSerializer,
    transaction_serializer: TransactionSerializer,
    string_serializer: StringSerializer,
}

impl CoordinatorMessageSerializer {
    pub const fn new() -> Self {
        Self {
            u32_serializer: U32VarIntSerializer::new(),
            u64_serializer: U64VarIntSerializer::new(),
            chain_id_serializer: ChainIdSerializer::new(),
            transaction_serializer: TransactionSerializer::new(),
            string_serializer: StringSerializer::new(),
        }
    }
}

impl Serializer<CoordinatorMessage> for CoordinatorMessageSerializer {
    fn serialize(
        &self,
        value: &CoordinatorMessage,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        match value {
            CoordinatorMessage::Registered => self.u32_serializer.serialize(&REGISTERED, buffer)?,
            CoordinatorMessage::Rejected { reason } => {
                self.u32_serializer.serialize(&REJECTED, buffer)?;
                self.string_serializer.serialize(reason, buffer)?;
            }
            CoordinatorMessage::ExecuteGroup {
                request_id,
                chain_id,
                transactions,
            } => {
                self.u32_serializer.serialize(&EXECUTE_GROUP, buffer)?;
                self.u64_serializer.serialize(request_id, buffer)?;
                self.chain_id_serializer.serialize(chain_id, buffer)?;
                serialize_count(&self.u32_serializer, transactions.len(), buffer)?;
                for transaction in transactions {
                    self.transaction_serializer.serialize(transaction, buffer)?;
                }
            }
            CoordinatorMessage::Shutdown => self.u32_serializer.serialize(&SHUTDOWN, buffer)?,
        }
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct CoordinatorMessageDeserializer {
    tag_deserializer: U32VarIntDeserializer,
    request_id_deserializer: U64VarIntDeserializer,
    count_deserializer: U32VarIntDeserializer,
    chain_id_deserializer: ChainIdDeserializer,
    transaction_deserializer: TransactionDeserializer,
    reason_deserializer: StringDeserializer,
}

impl CoordinatorMessageDeserializer {
    pub const fn new() -> Self {
        Self {
            tag_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            request_id_deserializer: U64VarIntDeserializer::new(Included(0), Included(u64::MAX)),
            count_deserializer: U32VarIntDeserializer::new(Included(0), Included(MAX_GROUP_LENGTH)),
            chain_id_deserializer: ChainIdDeserializer::new(),
            transaction_deserializer: TransactionDeserializer::new(),
            reason_deserializer: StringDeserializer::new(
                Included(0),
                Included(MAX_MESSAGE_LENGTH),
            ),
        }
    }
}

impl Deserializer<CoordinatorMessage> for CoordinatorMessageDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], CoordinatorMessage, E> {
        context(
            "Failed CoordinatorMessage deserialization",
            |input: &'a [u8]| -> IResult<&'a [u8], CoordinatorMessage, E> {
                let (rest, tag) = self.tag_deserializer.deserialize::<E>(input)?;
                match tag {
                    REGISTERED => Ok((rest, CoordinatorMessage::Registered)),
                    REJECTED => {
                        let (rest, reason) = self.reason_deserializer.deserialize::<E>(rest)?;
                        Ok((rest, CoordinatorMessage::Rejected { reason }))
                    }
                    EXECUTE_GROUP => {
                        let (rest, request_id) =
                            self.request_id_deserializer.deserialize::<E>(rest)?;
                        let (rest, chain_id) = self.chain_id_deserializer.deserialize::<E>(rest)?;
                        let (rest, transactions) = length_count(
                            |input| self.count_deserializer.deserialize::<E>(input),
                            |input| self.transaction_deserializer.deserialize::<E>(input),
                        )(rest)?;
                        Ok((
                            rest,
                            CoordinatorMessage::ExecuteGroup {
                                request_id,
                                chain_id,
                                transactions,
                            },
                        ))
                    }
                    SHUTDOWN => Ok((rest, CoordinatorMessage::Shutdown)),
                    _ => Err(nom::Err::Error(E::from_error_kind(input, ErrorKind::Tag))),
                }
            },
        )(buffer)
    }
}
