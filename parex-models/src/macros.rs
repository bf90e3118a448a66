// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// Generates a hash-backed identifier with a one-character text prefix,
/// along with its binary serializer and deserializer.
macro_rules! hash_based_id {
    ($(#[$meta:meta])* $name:ident, $serializer:ident, $deserializer:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            serde_with::SerializeDisplay,
            serde_with::DeserializeFromStr,
        )]
        pub struct $name(pub parex_hash::Hash);

        impl $name {
            /// Text prefix of this identifier
            pub const PREFIX: char = $prefix;

            /// Identifier derived from the hash of arbitrary data
            pub fn derive(data: &[u8]) -> Self {
                $name(parex_hash::Hash::compute_from(data))
            }

            /// Underlying hash
            pub fn get_hash(&self) -> &parex_hash::Hash {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", Self::PREFIX, self.0.to_bs58_check())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::ModelsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut chars = s.chars();
                match chars.next() {
                    Some(prefix) if prefix == Self::PREFIX => {
                        let hash = parex_hash::Hash::from_bs58_check(chars.as_str())?;
                        Ok($name(hash))
                    }
                    _ => Err($crate::error::ModelsError::IdParseError(format!(
                        "{} must start with '{}'",
                        stringify!($name),
                        Self::PREFIX
                    ))),
                }
            }
        }

        #[doc = concat!("Serializer for `", stringify!($name), "`")]
        #[derive(Default, Clone)]
        pub struct $serializer {
            hash_serializer: parex_hash::HashSerializer,
        }

        impl $serializer {
            #[doc = concat!("Creates a serializer for `", stringify!($name), "`")]
            pub const fn new() -> Self {
                Self {
                    hash_serializer: parex_hash::HashSerializer::new(),
                }
            }
        }

        impl parex_serialization::Serializer<$name> for $serializer {
            fn serialize(
                &self,
                value: &$name,
                buffer: &mut Vec<u8>,
            ) -> Result<(), parex_serialization::SerializeError> {
                parex_serialization::Serializer::serialize(&self.hash_serializer, &value.0, buffer)
            }
        }

        #[doc = concat!("Deserializer for `", stringify!($name), "`")]
        #[derive(Default, Clone)]
        pub struct $deserializer {
            hash_deserializer: parex_hash::HashDeserializer,
        }

        impl $deserializer {
            #[doc = concat!("Creates a deserializer for `", stringify!($name), "`")]
            pub const fn new() -> Self {
                Self {
                    hash_deserializer: parex_hash::HashDeserializer::new(),
                }
            }
        }

        impl parex_serialization::Deserializer<$name> for $deserializer {
            fn deserialize<
                'a,
                E: nom::error::ParseError<&'a [u8]> + nom::error::ContextError<&'a [u8]>,
            >(
                &self,
                buffer: &'a [u8],
            ) -> nom::IResult<&'a [u8], $name, E> {
                use nom::Parser;
                nom::error::context(
                    concat!("Failed ", stringify!($name), " deserialization"),
                    |input| parex_serialization::Deserializer::deserialize(&self.hash_deserializer, input),
                )
                .map($name)
                .parse(buffer)
            }
        }
    };
}
