// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::config::{
    MAX_LOGS_PER_TRACE, MAX_MESSAGE_LENGTH, MAX_STATE_CHANGES_PER_TRACE, MAX_STATE_VALUE_SIZE,
};
use crate::resource::{ResourcePath, ResourcePathDeserializer, ResourcePathSerializer};
use crate::transaction::{TransactionId, TransactionIdDeserializer, TransactionIdSerializer};
use nom::{
    error::{context, ContextError, ErrorKind, ParseError},
    multi::length_count,
    sequence::tuple,
    IResult, Parser,
};
use parex_serialization::{
    Deserializer, SerializeError, Serializer, StringDeserializer, StringSerializer,
    U32VarIntDeserializer, U32VarIntSerializer, VecU8Deserializer, VecU8Serializer,
};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

/// Change of one state value produced by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// changed path
    pub path: ResourcePath,
    /// new value, `None` for a deletion
    pub value: Option<Vec<u8>>,
}

/// Outcome of one transaction execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// executed successfully
    Executed,
    /// the contract raised an error
    ContractError(String),
    /// the contract hit an invalid instruction or an unknown method
    InvalidInstruction(String),
    /// the execution ran out of resources
    OutOfResources(String),
}

impl ExecutionStatus {
    fn tag(&self) -> u32 {
        match self {
            ExecutionStatus::Executed => 0,
            ExecutionStatus::ContractError(_) => 1,
            ExecutionStatus::InvalidInstruction(_) => 2,
            ExecutionStatus::OutOfResources(_) => 3,
        }
    }
}

/// Execution result record of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTrace {
    /// executed transaction
    pub transaction_id: TransactionId,
    /// outcome
    pub status: ExecutionStatus,
    /// data returned by the called method
    pub return_value: Vec<u8>,
    /// state changes, meaningful only when the execution succeeded
    pub state_changes: Vec<StateChange>,
    /// log lines emitted during execution
    pub logs: Vec<String>,
}

impl TransactionTrace {
    /// Trace of a successful execution
    pub fn executed(
        transaction_id: TransactionId,
        return_value: Vec<u8>,
        state_changes: Vec<StateChange>,
    ) -> Self {
        TransactionTrace {
            transaction_id,
            status: ExecutionStatus::Executed,
            return_value,
            state_changes,
            logs: Vec::new(),
        }
    }

    /// Trace of a failed execution: no state change survives
    pub fn failed(transaction_id: TransactionId, status: ExecutionStatus) -> Self {
        TransactionTrace {
            transaction_id,
            status,
            return_value: Vec::new(),
            state_changes: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// True if the transaction executed successfully
    pub fn is_successful(&self) -> bool {
        matches!(self.status, ExecutionStatus::Executed)
    }
}

/// Serializer for `ExecutionStatus`
#[derive(Default, Clone)]
pub struct ExecutionStatusSerializer {
    u32_serializer: U32VarIntSerializer,
    string_serializer: StringSerializer,
}

impl ExecutionStatusSerializer {
    /// Creates a serializer for `ExecutionStatus`
    pub const fn new() -> Self {
        Self {
            u32_serializer: U32VarIntSerializer::new(),
            string_serializer: StringSerializer::new(),
        }
    }
}

impl Serializer<ExecutionStatus> for ExecutionStatusSerializer {
    fn serialize(
        &self,
        value: &ExecutionStatus,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        self.u32_serializer.serialize(&value.tag(), buffer)?;
        match value {
            ExecutionStatus::Executed => Ok(()),
            ExecutionStatus::ContractError(msg)
            | ExecutionStatus::InvalidInstruction(msg)
            | ExecutionStatus::OutOfResources(msg) => self.string_serializer.serialize(msg, buffer),
        }
    }
}

/// Deserializer for `ExecutionStatus`
#[derive(Clone)]
pub struct ExecutionStatusDeserializer {
    tag_deserializer: U32VarIntDeserializer,
    message_deserializer: StringDeserializer,
}

impl ExecutionStatusDeserializer {
    /// Creates a deserializer for `ExecutionStatus`
    pub const fn new() -> Self {
        Self {
            tag_deserializer: U32VarIntDeserializer::new(Included(0), Included(3)),
            message_deserializer: StringDeserializer::new(Included(0), Included(MAX_MESSAGE_LENGTH)),
        }
    }
}

impl Default for ExecutionStatusDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<ExecutionStatus> for ExecutionStatusDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], ExecutionStatus, E> {
        context(
            "Failed ExecutionStatus deserialization",
            |input: &'a [u8]| -> IResult<&'a [u8], ExecutionStatus, E> {
                let (rest, tag) = self.tag_deserializer.deserialize::<E>(input)?;
                if tag == 0 {
                    return Ok((rest, ExecutionStatus::Executed));
                }
                let (rest, msg) = self.message_deserializer.deserialize::<E>(rest)?;
                let status = match tag {
                    1 => ExecutionStatus::ContractError(msg),
                    2 => ExecutionStatus::InvalidInstruction(msg),
                    3 => ExecutionStatus::OutOfResources(msg),
                    _ => return Err(nom::Err::Error(E::from_error_kind(input, ErrorKind::Switch))),
                };
                Ok((rest, status))
            },
        )(buffer)
    }
}

/// Serializer for `StateChange`
#[derive(Default, Clone)]
pub struct StateChangeSerializer {
    path_serializer: ResourcePathSerializer,
    u32_serializer: U32VarIntSerializer,
    value_serializer: VecU8Serializer,
}

impl StateChangeSerializer {
    /// Creates a serializer for `StateChange`
    pub const fn new() -> Self {
        Self {
            path_serializer: ResourcePathSerializer::new(),
            u32_serializer: U32VarIntSerializer::new(),
            value_serializer: VecU8Serializer::new(),
        }
    }
}

impl Serializer<StateChange> for StateChangeSerializer {
    fn serialize(&self, value: &StateChange, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.path_serializer.serialize(&value.path, buffer)?;
        match &value.value {
            Some(bytes) => {
                self.u32_serializer.serialize(&1, buffer)?;
                self.value_serializer.serialize(bytes, buffer)
            }
            None => self.u32_serializer.serialize(&0, buffer),
        }
    }
}

/// Deserializer for `StateChange`
#[derive(Clone)]
pub struct StateChangeDeserializer {
    path_deserializer: ResourcePathDeserializer,
    presence_deserializer: U32VarIntDeserializer,
    value_deserializer: VecU8Deserializer,
}

impl StateChangeDeserializer {
    /// Creates a deserializer for `StateChange`
    pub const fn new() -> Self {
        Self {
            path_deserializer: ResourcePathDeserializer::new(),
            presence_deserializer: U32VarIntDeserializer::new(Included(0), Included(1)),
            value_deserializer: VecU8Deserializer::new(Included(0), Included(MAX_STATE_VALUE_SIZE)),
        }
    }
}

impl Default for StateChangeDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<StateChange> for StateChangeDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], StateChange, E> {
        context(
            "Failed StateChange deserialization",
            |input: &'a [u8]| -> IResult<&'a [u8], StateChange, E> {
                let (rest, path) = self.path_deserializer.deserialize::<E>(input)?;
                let (rest, presence) = self.presence_deserializer.deserialize::<E>(rest)?;
                if presence == 0 {
                    return Ok((rest, StateChange { path, value: None }));
                }
                let (rest, value) = self.value_deserializer.deserialize::<E>(rest)?;
                Ok((
                    rest,
                    StateChange {
                        path,
                        value: Some(value),
                    },
                ))
            },
        )(buffer)
    }
}

/// Serializer for `TransactionTrace`
#[derive(Default, Clone)]
pub struct TransactionTraceSerializer {
    id_serializer: TransactionIdSerializer,
    status_serializer: ExecutionStatusSerializer,
    bytes_serializer: VecU8Serializer,
    u32_serializer: U32VarIntSerializer,
    change_serializer: StateChangeSerializer,
    string_serializer: StringSerializer,
}

impl TransactionTraceSerializer {
    /// Creates a serializer for `TransactionTrace`
    pub const fn new() -> Self {
        Self {
            id_serializer: TransactionIdSerializer::new(),
            status_serializer: ExecutionStatusSerializer::new(),
            bytes_serializer: VecU8Serializer::new(),
            u32_serializer: U32VarIntSerializer::new(),
            change_serializer: StateChangeSerializer::new(),
            string_serializer: StringSerializer::new(),
        }
    }
}

impl Serializer<TransactionTrace> for TransactionTraceSerializer {
    fn serialize(
        &self,
        value: &TransactionTrace,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        self.id_serializer.serialize(&value.transaction_id, buffer)?;
        self.status_serializer.serialize(&value.status, buffer)?;
        self.bytes_serializer.serialize(&value.return_value, buffer)?;
        let changes_count: u32 = value.state_changes.len().try_into().map_err(|_| {
            SerializeError::NumberTooBig(format!("{} state changes", value.state_changes.len()))
        })?;
        self.u32_serializer.serialize(&changes_count, buffer)?;
        for change in &value.state_changes {
            self.change_serializer.serialize(change, buffer)?;
        }
        let logs_count: u32 = value.logs.len().try_into().map_err(|_| {
            SerializeError::NumberTooBig(format!("{} log lines", value.logs.len()))
        })?;
        self.u32_serializer.serialize(&logs_count, buffer)?;
        for line in &value.logs {
            self.string_serializer.serialize(line, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for `TransactionTrace`
#[derive(Clone)]
pub struct TransactionTraceDeserializer {
    id_deserializer: TransactionIdDeserializer,
    status_deserializer: ExecutionStatusDeserializer,
    return_value_deserializer: VecU8Deserializer,
    changes_count_deserializer: U32VarIntDeserializer,
    change_deserializer: StateChangeDeserializer,
    logs_count_deserializer: U32VarIntDeserializer,
    log_deserializer: StringDeserializer,
}

impl TransactionTraceDeserializer {
    /// Creates a deserializer for `TransactionTrace`
    pub const fn new() -> Self {
        Self {
            id_deserializer: TransactionIdDeserializer::new(),
            status_deserializer: ExecutionStatusDeserializer::new(),
            return_value_deserializer: VecU8Deserializer::new(
                Included(0),
                Included(MAX_STATE_VALUE_SIZE),
            ),
            changes_count_deserializer: U32VarIntDeserializer::new(
                Included(0),
                Included(MAX_STATE_CHANGES_PER_TRACE),
            ),
            change_deserializer: StateChangeDeserializer::new(),
            logs_count_deserializer: U32VarIntDeserializer::new(
                Included(0),
                Included(MAX_LOGS_PER_TRACE),
            ),
            log_deserializer: StringDeserializer::new(Included(0), Included(MAX_MESSAGE_LENGTH)),
        }
    }
}

impl Default for TransactionTraceDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<TransactionTrace> for TransactionTraceDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], TransactionTrace, E> {
        context(
            "Failed TransactionTrace deserialization",
            tuple((
                context("Failed transaction_id deserialization", |input| {
                    self.id_deserializer.deserialize(input)
                }),
                context("Failed status deserialization", |input| {
                    self.status_deserializer.deserialize(input)
                }),
                context("Failed return_value deserialization", |input| {
                    self.return_value_deserializer.deserialize(input)
                }),
                context(
                    "Failed state_changes deserialization",
                    length_count(
                        |input| self.changes_count_deserializer.deserialize(input),
                        |input| self.change_deserializer.deserialize(input),
                    ),
                ),
                context(
                    "Failed logs deserialization",
                    length_count(
                        |input| self.logs_count_deserializer.deserialize(input),
                        |input| self.log_deserializer.deserialize(input),
                    ),
                ),
            )),
        )
        .map(
            |(transaction_id, status, return_value, state_changes, logs)| TransactionTrace {
                transaction_id,
                status,
                return_value,
                state_changes,
                logs,
            },
        )
        .parse(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use parex_serialization::DeserializeError;

    #[test]
    fn test_trace_wire_format() {
        let contract = Address::derive(b"counter");
        let mut trace = TransactionTrace::executed(
            TransactionId::derive(b"tx"),
            vec![4, 2],
            vec![
                StateChange {
                    path: ResourcePath::new(contract, "total"),
                    value: Some(vec![1]),
                },
                StateChange {
                    path: ResourcePath::new(contract, "stale"),
                    value: None,
                },
            ],
        );
        trace.logs.push("incremented total".to_string());

        let mut buffer = Vec::new();
        TransactionTraceSerializer::new()
            .serialize(&trace, &mut buffer)
            .unwrap();
        let (rest, deserialized) = TransactionTraceDeserializer::new()
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(deserialized, trace);
    }

    #[test]
    fn test_failed_trace_has_no_changes() {
        let trace = TransactionTrace::failed(
            TransactionId::derive(b"tx"),
            ExecutionStatus::ContractError("boom".to_string()),
        );
        assert!(!trace.is_successful());
        assert!(trace.state_changes.is_empty());

        let mut buffer = Vec::new();
        TransactionTraceSerializer::new()
            .serialize(&trace, &mut buffer)
            .unwrap();
        buffer.truncate(buffer.len() - 1);
        assert!(TransactionTraceDeserializer::new()
            .deserialize::<DeserializeError>(&buffer)
            .is_err());
    }
}
