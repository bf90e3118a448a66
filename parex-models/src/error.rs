// Copyright (c) 2022 MASSA LABS <info@massa.net>

use displaydoc::Display;
use parex_hash::ParexHashError;
use parex_serialization::SerializeError;
use thiserror::Error;

/// models error
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone)]
pub enum ModelsError {
    /// hashing error: {0}
    HashError(#[from] ParexHashError),
    /// serialization error: {0}
    SerializationError(#[from] SerializeError),
    /// deserialization error: {0}
    DeserializeError(String),
    /// id parsing error: {0}
    IdParseError(String),
}
