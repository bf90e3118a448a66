// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::address::{Address, AddressDeserializer, AddressSerializer};
use crate::config::{MAX_METHOD_NAME_LENGTH, MAX_PARAMETERS_SIZE};
use crate::error::ModelsError;
use nom::{
    error::{context, ContextError, ParseError},
    sequence::tuple,
    IResult, Parser,
};
use parex_serialization::{
    Deserializer, SerializeError, Serializer, StringDeserializer, StringSerializer,
    U64VarIntDeserializer, U64VarIntSerializer, VecU8Deserializer, VecU8Serializer,
};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

hash_based_id!(
    /// Transaction identifier: hash of the serialized transaction content
    TransactionId,
    TransactionIdSerializer,
    TransactionIdDeserializer,
    'T'
);

/// Content of a transaction: a call of `method` on contract `to`, sent by `from`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContent {
    /// sender account
    pub from: Address,
    /// called contract
    pub to: Address,
    /// called method
    pub method: String,
    /// opaque call arguments
    #[serde(default)]
    pub params: Vec<u8>,
    /// sender nonce at submission time
    #[serde(default)]
    pub nonce: u64,
}

/// A submitted transaction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    /// identifier derived from the content
    pub id: TransactionId,
    /// transaction content
    pub content: TransactionContent,
}

impl Transaction {
    /// Build a transaction, computing its id from the serialized content
    pub fn new(content: TransactionContent) -> Result<Self, ModelsError> {
        let mut buffer = Vec::new();
        TransactionContentSerializer::new().serialize(&content, &mut buffer)?;
        Ok(Transaction {
            id: TransactionId::derive(&buffer),
            content,
        })
    }
}

/// Serializer for `TransactionContent`
#[derive(Default, Clone)]
pub struct TransactionContentSerializer {
    address_serializer: AddressSerializer,
    string_serializer: StringSerializer,
    vec_u8_serializer: VecU8Serializer,
    u64_serializer: U64VarIntSerializer,
}

impl TransactionContentSerializer {
    /// Creates a serializer for `TransactionContent`
    pub const fn new() -> Self {
        Self {
            address_serializer: AddressSerializer::new(),
            string_serializer: StringSerializer::new(),
            vec_u8_serializer: VecU8Serializer::new(),
            u64_serializer: U64VarIntSerializer::new(),
        }
    }
}

impl Serializer<TransactionContent> for TransactionContentSerializer {
    fn serialize(
        &self,
        value: &TransactionContent,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        self.address_serializer.serialize(&value.from, buffer)?;
        self.address_serializer.serialize(&value.to, buffer)?;
        self.string_serializer.serialize(&value.method, buffer)?;
        self.vec_u8_serializer.serialize(&value.params, buffer)?;
        self.u64_serializer.serialize(&value.nonce, buffer)?;
        Ok(())
    }
}

/// Deserializer for `TransactionContent`
#[derive(Clone)]
pub struct TransactionContentDeserializer {
    address_deserializer: AddressDeserializer,
    method_deserializer: StringDeserializer,
    params_deserializer: VecU8Deserializer,
    u64_deserializer: U64VarIntDeserializer,
}

impl TransactionContentDeserializer {
    /// Creates a deserializer for `TransactionContent`
    pub const fn new() -> Self {
        Self {
            address_deserializer: AddressDeserializer::new(),
            method_deserializer: StringDeserializer::new(
                Included(0),
                Included(MAX_METHOD_NAME_LENGTH),
            ),
            params_deserializer: VecU8Deserializer::new(Included(0), Included(MAX_PARAMETERS_SIZE)),
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u64::MAX)),
        }
    }
}

impl Default for TransactionContentDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<TransactionContent> for TransactionContentDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], TransactionContent, E> {
        context(
            "Failed TransactionContent deserialization",
            tuple((
                context("Failed from deserialization", |input| {
                    self.address_deserializer.deserialize(input)
                }),
                context("Failed to deserialization", |input| {
                    self.address_deserializer.deserialize(input)
                }),
                context("Failed method deserialization", |input| {
                    self.method_deserializer.deserialize(input)
                }),
                context("Failed params deserialization", |input| {
                    self.params_deserializer.deserialize(input)
                }),
                context("Failed nonce deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
            )),
        )
        .map(|(from, to, method, params, nonce)| TransactionContent {
            from,
            to,
            method,
            params,
            nonce,
        })
        .parse(buffer)
    }
}

/// Serializer for `Transaction`: only the content goes on the wire
#[derive(Default, Clone)]
pub struct TransactionSerializer {
    content_serializer: TransactionContentSerializer,
}

impl TransactionSerializer {
    /// Creates a serializer for `Transaction`
    pub const fn new() -> Self {
        Self {
            content_serializer: TransactionContentSerializer::new(),
        }
    }
}

impl Serializer<Transaction> for TransactionSerializer {
    fn serialize(&self, value: &Transaction, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.content_serializer.serialize(&value.content, buffer)
    }
}

/// Deserializer for `Transaction`, recomputing the id from the consumed bytes
#[derive(Default, Clone)]
pub struct TransactionDeserializer {
    content_deserializer: TransactionContentDeserializer,
}

impl TransactionDeserializer {
    /// Creates a deserializer for `Transaction`
    pub const fn new() -> Self {
        Self {
            content_deserializer: TransactionContentDeserializer::new(),
        }
    }
}

impl Deserializer<Transaction> for TransactionDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Transaction, E> {
        let (rest, content) = context("Failed Transaction deserialization", |input| {
            self.content_deserializer.deserialize::<E>(input)
        })(buffer)?;
        let consumed = &buffer[..buffer.len() - rest.len()];
        Ok((
            rest,
            Transaction {
                id: TransactionId::derive(consumed),
                content,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parex_serialization::DeserializeError;

    fn content(nonce: u64) -> TransactionContent {
        TransactionContent {
            from: Address::derive(b"alice"),
            to: Address::derive(b"counter"),
            method: "increment:total".to_string(),
            params: vec![1, 2, 3],
            nonce,
        }
    }

    #[test]
    fn test_id_depends_on_content() {
        let first = Transaction::new(content(0)).unwrap();
        let same = Transaction::new(content(0)).unwrap();
        let next = Transaction::new(content(1)).unwrap();
        assert_eq!(first.id, same.id);
        assert_ne!(first.id, next.id);
    }

    #[test]
    fn test_deserialized_transaction_keeps_its_id() {
        let transaction = Transaction::new(content(7)).unwrap();
        let mut buffer = Vec::new();
        TransactionSerializer::new()
            .serialize(&transaction, &mut buffer)
            .unwrap();
        buffer.extend([0xff, 0xff]);
        let (rest, deserialized) = TransactionDeserializer::new()
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert_eq!(rest, &[0xff, 0xff]);
        assert_eq!(deserialized, transaction);
    }
}
