// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::config::MAX_WORKER_ID_LENGTH;
use nom::{
    error::{context, ContextError, ParseError},
    IResult, Parser,
};
use parex_serialization::{
    Deserializer, SerializeError, Serializer, StringDeserializer, StringSerializer,
};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

/// Logical name of an execution worker, used for routing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    /// Name of the in-process worker with the given index
    pub fn local(index: usize) -> Self {
        WorkerId(format!("worker{}", index))
    }

    /// Name of a worker hosted by a remote worker node
    pub fn remote(node_name: &str, index: usize) -> Self {
        WorkerId(format!("{}/worker{}", node_name, index))
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(name: String) -> Self {
        WorkerId(name)
    }
}

/// Serializer for `WorkerId`
#[derive(Default, Clone)]
pub struct WorkerIdSerializer {
    string_serializer: StringSerializer,
}

impl WorkerIdSerializer {
    /// Creates a serializer for `WorkerId`
    pub const fn new() -> Self {
        Self {
            string_serializer: StringSerializer::new(),
        }
    }
}

impl Serializer<WorkerId> for WorkerIdSerializer {
    fn serialize(&self, value: &WorkerId, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.string_serializer.serialize(&value.0, buffer)
    }
}

/// Deserializer for `WorkerId`
#[derive(Clone)]
pub struct WorkerIdDeserializer {
    string_deserializer: StringDeserializer,
}

impl WorkerIdDeserializer {
    /// Creates a deserializer for `WorkerId`
    pub const fn new() -> Self {
        Self {
            string_deserializer: StringDeserializer::new(Included(1), Included(MAX_WORKER_ID_LENGTH)),
        }
    }
}

impl Default for WorkerIdDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<WorkerId> for WorkerIdDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], WorkerId, E> {
        context("Failed WorkerId deserialization", |input| {
            self.string_deserializer.deserialize(input)
        })
        .map(WorkerId)
        .parse(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_names() {
        assert_eq!(WorkerId::local(3).as_str(), "worker3");
        assert_eq!(WorkerId::remote("node-b", 0).to_string(), "node-b/worker0");
    }
}
