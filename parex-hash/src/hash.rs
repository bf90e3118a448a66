// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::ParexHashError;
use crate::settings::HASH_SIZE_BYTES;
use nom::{
    error::{context, ContextError, ErrorKind, ParseError},
    IResult,
};
use parex_serialization::{Deserializer, SerializeError, Serializer};
use std::{convert::TryInto, str::FromStr};

/// Hash wrapper, the underlying hash type is blake3
#[derive(Eq, PartialEq, Copy, Clone, Hash)]
pub struct Hash(blake3::Hash);

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_bytes().cmp(other.to_bytes())
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl Hash {
    /// Compute a hash from data.
    ///
    /// # Example
    ///  ```
    /// # use parex_hash::Hash;
    /// let hash = Hash::compute_from(&"hello world".as_bytes());
    /// ```
    pub fn compute_from(data: &[u8]) -> Self {
        Hash(blake3::hash(data))
    }

    /// Serialize a Hash using `bs58` encoding with checksum.
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    /// Serialize a Hash as bytes
    pub fn to_bytes(&self) -> &[u8; HASH_SIZE_BYTES] {
        self.0.as_bytes()
    }

    /// Convert into bytes
    pub fn into_bytes(self) -> [u8; HASH_SIZE_BYTES] {
        *self.0.as_bytes()
    }

    /// Deserialize using `bs58` encoding with checksum.
    ///
    /// # Example
    ///  ```
    /// # use parex_hash::Hash;
    /// let hash = Hash::compute_from(&"hello world".as_bytes());
    /// let serialized: String = hash.to_bs58_check();
    /// let deserialized: Hash = Hash::from_bs58_check(&serialized).unwrap();
    /// assert_eq!(hash, deserialized);
    /// ```
    pub fn from_bs58_check(data: &str) -> Result<Hash, ParexHashError> {
        let decoded_bs58_check = bs58::decode(data)
            .with_check(None)
            .into_vec()
            .map_err(|err| ParexHashError::ParsingError(format!("{}", err)))?;
        let bytes: &[u8; HASH_SIZE_BYTES] = decoded_bs58_check
            .as_slice()
            .try_into()
            .map_err(|err| ParexHashError::ParsingError(format!("{}", err)))?;
        Ok(Hash::from_bytes(bytes))
    }

    /// Deserialize a Hash from bytes
    pub fn from_bytes(data: &[u8; HASH_SIZE_BYTES]) -> Hash {
        Hash(blake3::Hash::from(*data))
    }
}

/// Serializer for `Hash`
#[derive(Default, Clone)]
pub struct HashSerializer;

impl HashSerializer {
    /// Creates a serializer for `Hash`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<Hash> for HashSerializer {
    fn serialize(&self, value: &Hash, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend(value.to_bytes());
        Ok(())
    }
}

/// Deserializer for `Hash`
#[derive(Default, Clone)]
pub struct HashDeserializer;

impl HashDeserializer {
    /// Creates a deserializer for `Hash`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<Hash> for HashDeserializer {
    /// ```
    /// use parex_serialization::{Serializer, Deserializer, DeserializeError};
    /// use parex_hash::{Hash, HashDeserializer, HashSerializer};
    ///
    /// let hash = Hash::compute_from(&"hello world".as_bytes());
    /// let mut serialized = Vec::new();
    /// HashSerializer::new().serialize(&hash, &mut serialized).unwrap();
    /// let (rest, deserialized) = HashDeserializer::new().deserialize::<DeserializeError>(&serialized).unwrap();
    /// assert!(rest.is_empty());
    /// assert_eq!(deserialized, hash);
    /// ```
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Hash, E> {
        context("Failed hash deserialization", |input: &'a [u8]| -> IResult<&'a [u8], Hash, E> {
            if input.len() < HASH_SIZE_BYTES {
                return Err(nom::Err::Error(E::from_error_kind(input, ErrorKind::Eof)));
            }
            let (bytes, rest) = input.split_at(HASH_SIZE_BYTES);
            let bytes: &[u8; HASH_SIZE_BYTES] = bytes
                .try_into()
                .map_err(|_| nom::Err::Error(E::from_error_kind(input, ErrorKind::LengthValue)))?;
            Ok((rest, Hash::from_bytes(bytes)))
        })(buffer)
    }
}

impl ::serde::Serialize for Hash {
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(&self.to_bs58_check())
        } else {
            s.serialize_bytes(self.to_bytes())
        }
    }
}

impl<'de> ::serde::Deserialize<'de> for Hash {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<Hash, D::Error> {
        if d.is_human_readable() {
            struct Base58CheckVisitor;

            impl<'de> ::serde::de::Visitor<'de> for Base58CheckVisitor {
                type Value = Hash;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("an ASCII base58check string")
                }

                fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    if let Ok(v_str) = std::str::from_utf8(v) {
                        Hash::from_bs58_check(v_str).map_err(E::custom)
                    } else {
                        Err(E::invalid_value(::serde::de::Unexpected::Bytes(v), &self))
                    }
                }

                fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Hash::from_bs58_check(v).map_err(E::custom)
                }
            }
            d.deserialize_str(Base58CheckVisitor)
        } else {
            struct BytesVisitor;

            impl<'de> ::serde::de::Visitor<'de> for BytesVisitor {
                type Value = Hash;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("a bytestring")
                }

                fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Ok(Hash::from_bytes(v.try_into().map_err(E::custom)?))
                }
            }

            d.deserialize_bytes(BytesVisitor)
        }
    }
}

impl FromStr for Hash {
    type Err = ParexHashError;
    /// Deserialize a hash from its base58-check text form.
    /// ```
    /// # use parex_hash::Hash;
    /// # use std::str::FromStr;
    /// let hash = Hash::compute_from(&"hello world".as_bytes());
    /// let deserialized: Hash = Hash::from_str(&hash.to_bs58_check()).unwrap();
    /// assert_eq!(hash, deserialized);
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_bs58_check(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> Hash {
        Hash::compute_from("hello world".as_bytes())
    }

    #[test]
    fn test_serde_json() {
        let hash = example();
        let serialized = serde_json::to_string(&hash).unwrap();
        let deserialized = serde_json::from_str(&serialized).unwrap();
        assert_eq!(hash, deserialized)
    }

    #[test]
    fn test_hash_is_blake3() {
        let data = "abc".as_bytes();
        let hash = Hash::compute_from(data);
        assert_eq!(hash.to_bytes(), blake3::hash(data).as_bytes());
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let mut text = example().to_bs58_check();
        let last = text.pop().unwrap();
        text.push(if last == '1' { '2' } else { '1' });
        assert!(matches!(
            Hash::from_bs58_check(&text),
            Err(ParexHashError::ParsingError(_))
        ));
    }
}
