// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Binary (de)serialization primitives shared by every parex crate.
//!
//! Serializers append to a caller-provided buffer, deserializers are nom parsers
//! generic over the error type so that callers pick how much context they keep.

use displaydoc::Display;
use nom::error::{context, ContextError, ErrorKind, ParseError};
use nom::IResult;
use std::fmt;
use std::ops::{Bound, RangeBounds};
use thiserror::Error;

#[non_exhaustive]
#[derive(Display, Error, Debug, Clone)]
pub enum SerializeError {
    /// Number {0} is too big to be serialized
    NumberTooBig(String),
    /// Length {0} exceeds the serializable maximum
    LengthTooBig(String),
    /// General error {0}
    GeneralError(String),
}

/// Parse error keeping the stack of contexts that were traversed when parsing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializeError<'a> {
    errors: Vec<(&'a [u8], DeserializeErrorKind)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeserializeErrorKind {
    Nom(ErrorKind),
    Context(&'static str),
}

impl<'a> ParseError<&'a [u8]> for DeserializeError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        DeserializeError {
            errors: vec![(input, DeserializeErrorKind::Nom(kind))],
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, DeserializeErrorKind::Nom(kind)));
        other
    }
}

impl<'a> ContextError<&'a [u8]> for DeserializeError<'a> {
    fn add_context(input: &'a [u8], ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, DeserializeErrorKind::Context(ctx)));
        other
    }
}

impl<'a> fmt::Display for DeserializeError<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // outermost context first
        let contexts: Vec<&str> = self
            .errors
            .iter()
            .rev()
            .filter_map(|(_, kind)| match kind {
                DeserializeErrorKind::Context(ctx) => Some(*ctx),
                DeserializeErrorKind::Nom(_) => None,
            })
            .collect();
        if contexts.is_empty() {
            if let Some((input, DeserializeErrorKind::Nom(kind))) = self.errors.first() {
                return write!(f, "{:?} with {} bytes left", kind, input.len());
            }
            return write!(f, "unknown deserialization error");
        }
        write!(f, "{}", contexts.join(" / "))
    }
}

/// Trait implemented by every binary deserializer
pub trait Deserializer<T> {
    /// Parse a `T` from the start of `buffer`, returning the unparsed rest
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], T, E>;
}

/// Trait implemented by every binary serializer
pub trait Serializer<T> {
    /// Append the binary representation of `value` to `buffer`
    fn serialize(&self, value: &T, buffer: &mut Vec<u8>) -> Result<(), SerializeError>;
}

macro_rules! gen_varint {
    ($($type:ident, $ser:ident, $de:ident, $buffer_fn:ident);* $(;)?) => {
        $(
            #[doc = concat!("Serializer for `", stringify!($type), "` as an unsigned varint")]
            #[derive(Debug, Clone, Default)]
            pub struct $ser;

            impl $ser {
                #[doc = concat!("Creates a new `", stringify!($ser), "`")]
                pub const fn new() -> Self {
                    Self
                }
            }

            impl Serializer<$type> for $ser {
                fn serialize(&self, value: &$type, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
                    buffer.extend_from_slice(unsigned_varint::encode::$type(
                        *value,
                        &mut unsigned_varint::encode::$buffer_fn(),
                    ));
                    Ok(())
                }
            }

            #[doc = concat!("Deserializer for `", stringify!($type), "` unsigned varints constrained to a range")]
            #[derive(Debug, Clone)]
            pub struct $de {
                range: (Bound<$type>, Bound<$type>),
            }

            impl $de {
                #[doc = concat!("Creates a new `", stringify!($de), "` accepting values within the given bounds")]
                pub const fn new(min: Bound<$type>, max: Bound<$type>) -> Self {
                    Self { range: (min, max) }
                }
            }

            impl Deserializer<$type> for $de {
                fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
                    &self,
                    buffer: &'a [u8],
                ) -> IResult<&'a [u8], $type, E> {
                    context(concat!("Failed ", stringify!($type), " deserialization"), |input: &'a [u8]| -> IResult<&'a [u8], $type, E> {
                        let (value, rest) = unsigned_varint::decode::$type(input).map_err(|_| {
                            nom::Err::Error(E::from_error_kind(input, ErrorKind::Fail))
                        })?;
                        if !self.range.contains(&value) {
                            return Err(nom::Err::Error(E::from_error_kind(
                                input,
                                ErrorKind::Verify,
                            )));
                        }
                        Ok((rest, value))
                    })(buffer)
                }
            }
        )*
    };
}

gen_varint! {
    u32, U32VarIntSerializer, U32VarIntDeserializer, u32_buffer;
    u64, U64VarIntSerializer, U64VarIntDeserializer, u64_buffer;
}

/// Serializer for byte vectors, prefixed by their length as a varint
#[derive(Debug, Clone, Default)]
pub struct VecU8Serializer {
    len_serializer: U64VarIntSerializer,
}

impl VecU8Serializer {
    /// Creates a new `VecU8Serializer`
    pub const fn new() -> Self {
        Self {
            len_serializer: U64VarIntSerializer::new(),
        }
    }
}

impl Serializer<Vec<u8>> for VecU8Serializer {
    fn serialize(&self, value: &Vec<u8>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let len: u64 = value.len().try_into().map_err(|_| {
            SerializeError::LengthTooBig(format!("byte vector of length {}", value.len()))
        })?;
        self.len_serializer.serialize(&len, buffer)?;
        buffer.extend_from_slice(value);
        Ok(())
    }
}

/// Deserializer for length-prefixed byte vectors
#[derive(Debug, Clone)]
pub struct VecU8Deserializer {
    len_deserializer: U64VarIntDeserializer,
}

impl VecU8Deserializer {
    /// Creates a new `VecU8Deserializer` accepting lengths within the given bounds
    pub const fn new(min_length: Bound<u64>, max_length: Bound<u64>) -> Self {
        Self {
            len_deserializer: U64VarIntDeserializer::new(min_length, max_length),
        }
    }
}

impl Deserializer<Vec<u8>> for VecU8Deserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<u8>, E> {
        context("Failed Vec<u8> deserialization", |input: &'a [u8]| -> IResult<&'a [u8], Vec<u8>, E> {
            let (rest, len) = self.len_deserializer.deserialize::<E>(input)?;
            let len = usize::try_from(len).map_err(|_| {
                nom::Err::Error(E::from_error_kind(input, ErrorKind::TooLarge))
            })?;
            if rest.len() < len {
                return Err(nom::Err::Error(E::from_error_kind(
                    rest,
                    ErrorKind::Eof,
                )));
            }
            let (bytes, rest) = rest.split_at(len);
            Ok((rest, bytes.to_vec()))
        })(buffer)
    }
}

/// Serializer for UTF-8 strings, prefixed by their byte length
#[derive(Debug, Clone, Default)]
pub struct StringSerializer {
    len_serializer: U32VarIntSerializer,
}

impl StringSerializer {
    /// Creates a new `StringSerializer`
    pub const fn new() -> Self {
        Self {
            len_serializer: U32VarIntSerializer::new(),
        }
    }
}

impl Serializer<String> for StringSerializer {
    fn serialize(&self, value: &String, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let len: u32 = value.len().try_into().map_err(|_| {
            SerializeError::LengthTooBig(format!("string of length {}", value.len()))
        })?;
        self.len_serializer.serialize(&len, buffer)?;
        buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }
}

/// Deserializer for length-prefixed UTF-8 strings
#[derive(Debug, Clone)]
pub struct StringDeserializer {
    len_deserializer: U32VarIntDeserializer,
}

impl StringDeserializer {
    /// Creates a new `StringDeserializer` accepting byte lengths within the given bounds
    pub const fn new(min_length: Bound<u32>, max_length: Bound<u32>) -> Self {
        Self {
            len_deserializer: U32VarIntDeserializer::new(min_length, max_length),
        }
    }
}

impl Deserializer<String> for StringDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], String, E> {
        context("Failed String deserialization", |input: &'a [u8]| -> IResult<&'a [u8], String, E> {
            let (rest, len) = self.len_deserializer.deserialize::<E>(input)?;
            let len = len as usize;
            if rest.len() < len {
                return Err(nom::Err::Error(E::from_error_kind(
                    rest,
                    ErrorKind::Eof,
                )));
            }
            let (bytes, rest) = rest.split_at(len);
            let value = std::str::from_utf8(bytes).map_err(|_| {
                nom::Err::Error(E::from_error_kind(bytes, ErrorKind::Char))
            })?;
            Ok((rest, value.to_owned()))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound::Included;

    #[test]
    fn test_varint_range_is_enforced() {
        let mut buffer = Vec::new();
        U64VarIntSerializer::new().serialize(&300, &mut buffer).unwrap();
        let (rest, value) = U64VarIntDeserializer::new(Included(0), Included(300))
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(value, 300);

        let err = U64VarIntDeserializer::new(Included(0), Included(299))
            .deserialize::<DeserializeError>(&buffer)
            .unwrap_err();
        match err {
            nom::Err::Error(e) => assert_eq!(e.to_string(), "Failed u64 deserialization"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_truncated_bytes_are_rejected() {
        let mut buffer = Vec::new();
        VecU8Serializer::new()
            .serialize(&vec![1, 2, 3, 4], &mut buffer)
            .unwrap();
        buffer.pop();
        assert!(VecU8Deserializer::new(Included(0), Included(16))
            .deserialize::<DeserializeError>(&buffer)
            .is_err());
    }

    #[test]
    fn test_string_keeps_trailing_data() {
        let mut buffer = Vec::new();
        StringSerializer::new()
            .serialize(&"increment:counter".to_string(), &mut buffer)
            .unwrap();
        buffer.push(42);
        let (rest, value) = StringDeserializer::new(Included(0), Included(255))
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert_eq!(value, "increment:counter");
        assert_eq!(rest, &[42]);
    }
}
