// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Hashing facilities: a fixed-size blake3 digest with a base58-check text form.

pub use error::ParexHashError;
pub use hash::{Hash, HashDeserializer, HashSerializer};
pub use settings::HASH_SIZE_BYTES;

mod error;
mod hash;
mod settings;
