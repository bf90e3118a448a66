// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::address::{Address, AddressDeserializer, AddressSerializer};
use crate::config::MAX_STATE_KEY_LENGTH;
use nom::{
    error::{context, ContextError, ParseError},
    sequence::tuple,
    IResult, Parser,
};
use parex_serialization::{
    Deserializer, SerializeError, Serializer, StringDeserializer, StringSerializer,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Bound::Included;

/// State key reserved for the account record (nonce) of an address
pub const ACCOUNT_KEY: &str = "@account";

/// Identifier of one addressable unit of contract state
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourcePath {
    /// contract owning the state
    pub contract: Address,
    /// key inside the contract state
    pub key: String,
}

impl ResourcePath {
    /// Path of `key` in the state of `contract`
    pub fn new(contract: Address, key: impl Into<String>) -> Self {
        ResourcePath {
            contract,
            key: key.into(),
        }
    }

    /// Path of the account record of `address`
    pub fn account(address: Address) -> Self {
        ResourcePath::new(address, ACCOUNT_KEY)
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.contract, self.key)
    }
}

/// Read and write sets of a transaction.
///
/// A path present in the write set is never kept in the read set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSet {
    reads: BTreeSet<ResourcePath>,
    writes: BTreeSet<ResourcePath>,
}

impl AccessSet {
    /// Empty access set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read of `path`
    pub fn add_read(&mut self, path: ResourcePath) {
        if !self.writes.contains(&path) {
            self.reads.insert(path);
        }
    }

    /// Record a write of `path`
    pub fn add_write(&mut self, path: ResourcePath) {
        self.reads.remove(&path);
        self.writes.insert(path);
    }

    /// Paths only read
    pub fn reads(&self) -> &BTreeSet<ResourcePath> {
        &self.reads
    }

    /// Paths written
    pub fn writes(&self) -> &BTreeSet<ResourcePath> {
        &self.writes
    }

    /// True if no path is touched at all
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// True if one of the sets writes a path the other one reads or writes
    pub fn conflicts_with(&self, other: &AccessSet) -> bool {
        self.writes
            .iter()
            .any(|path| other.writes.contains(path) || other.reads.contains(path))
            || other.writes.iter().any(|path| self.reads.contains(path))
    }
}

impl From<&FunctionMetadata> for AccessSet {
    fn from(metadata: &FunctionMetadata) -> Self {
        let mut access = AccessSet::new();
        for path in &metadata.writes {
            access.add_write(path.clone());
        }
        for path in &metadata.reads {
            access.add_read(path.clone());
        }
        access
    }
}

/// State resources a transaction may touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceUsage {
    /// the transaction touches exactly these paths
    Paths(AccessSet),
    /// the touched paths are unknown: the transaction may touch the whole state
    WholeState,
}

impl ResourceUsage {
    /// True if the usage touches at least one resource
    pub fn touches_any(&self) -> bool {
        match self {
            ResourceUsage::Paths(access) => !access.is_empty(),
            ResourceUsage::WholeState => true,
        }
    }

    /// True if two transactions with these usages may not run concurrently
    pub fn conflicts_with(&self, other: &ResourceUsage) -> bool {
        match (self, other) {
            (ResourceUsage::WholeState, other) | (other, ResourceUsage::WholeState) => {
                other.touches_any()
            }
            (ResourceUsage::Paths(a), ResourceUsage::Paths(b)) => a.conflicts_with(b),
        }
    }
}

/// Resources declared for a contract function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    /// paths the function may read
    #[serde(default)]
    pub reads: BTreeSet<ResourcePath>,
    /// paths the function may write
    #[serde(default)]
    pub writes: BTreeSet<ResourcePath>,
}

/// Serializer for `ResourcePath`
#[derive(Default, Clone)]
pub struct ResourcePathSerializer {
    address_serializer: AddressSerializer,
    string_serializer: StringSerializer,
}

impl ResourcePathSerializer {
    /// Creates a serializer for `ResourcePath`
    pub const fn new() -> Self {
        Self {
            address_serializer: AddressSerializer::new(),
            string_serializer: StringSerializer::new(),
        }
    }
}

impl Serializer<ResourcePath> for ResourcePathSerializer {
    fn serialize(&self, value: &ResourcePath, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.address_serializer.serialize(&value.contract, buffer)?;
        self.string_serializer.serialize(&value.key, buffer)?;
        Ok(())
    }
}

/// Deserializer for `ResourcePath`
#[derive(Clone)]
pub struct ResourcePathDeserializer {
    address_deserializer: AddressDeserializer,
    key_deserializer: StringDeserializer,
}

impl ResourcePathDeserializer {
    /// Creates a deserializer for `ResourcePath`
    pub const fn new() -> Self {
        Self {
            address_deserializer: AddressDeserializer::new(),
            key_deserializer: StringDeserializer::new(Included(0), Included(MAX_STATE_KEY_LENGTH)),
        }
    }
}

impl Default for ResourcePathDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<ResourcePath> for ResourcePathDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], ResourcePath, E> {
        context(
            "Failed ResourcePath deserialization",
            tuple((
                context("Failed contract deserialization", |input| {
                    self.address_deserializer.deserialize(input)
                }),
                context("Failed key deserialization", |input| {
                    self.key_deserializer.deserialize(input)
                }),
            )),
        )
        .map(|(contract, key)| ResourcePath { contract, key })
        .parse(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(key: &str) -> ResourcePath {
        ResourcePath::new(Address::derive(b"contract"), key)
    }

    #[test]
    fn test_write_dominates_read() {
        let mut access = AccessSet::new();
        access.add_read(path("a"));
        access.add_write(path("a"));
        access.add_read(path("a"));
        assert!(access.reads().is_empty());
        assert_eq!(access.writes().len(), 1);
    }

    #[test]
    fn test_conflicts() {
        let mut reader = AccessSet::new();
        reader.add_read(path("a"));
        let mut other_reader = AccessSet::new();
        other_reader.add_read(path("a"));
        let mut writer = AccessSet::new();
        writer.add_write(path("a"));
        let mut unrelated = AccessSet::new();
        unrelated.add_write(path("b"));

        assert!(!reader.conflicts_with(&other_reader));
        assert!(reader.conflicts_with(&writer));
        assert!(writer.conflicts_with(&reader));
        assert!(writer.conflicts_with(&writer.clone()));
        assert!(!writer.conflicts_with(&unrelated));
    }

    #[test]
    fn test_whole_state_conflicts_with_every_toucher() {
        let mut reader = AccessSet::new();
        reader.add_read(path("a"));
        let touching = ResourceUsage::Paths(reader);
        let untouching = ResourceUsage::Paths(AccessSet::new());
        assert!(ResourceUsage::WholeState.conflicts_with(&touching));
        assert!(touching.conflicts_with(&ResourceUsage::WholeState));
        assert!(ResourceUsage::WholeState.conflicts_with(&ResourceUsage::WholeState));
        assert!(!ResourceUsage::WholeState.conflicts_with(&untouching));
    }
}
