// Copyright (c) 2022 MASSA LABS <info@massa.net>

hash_based_id!(
    /// Address of an account or a smart contract
    Address,
    AddressSerializer,
    AddressDeserializer,
    'A'
);

#[cfg(test)]
mod tests {
    use super::*;
    use parex_serialization::{DeserializeError, Deserializer, Serializer};
    use std::str::FromStr;

    #[test]
    fn test_address_text_form() {
        let address = Address::derive(b"alice");
        let text = address.to_string();
        assert!(text.starts_with('A'));
        assert_eq!(Address::from_str(&text).unwrap(), address);
        assert!(Address::from_str(&text[1..]).is_err());
    }

    #[test]
    fn test_address_binary_form() {
        let address = Address::derive(b"counter-contract");
        let mut buffer = Vec::new();
        AddressSerializer::new()
            .serialize(&address, &mut buffer)
            .unwrap();
        let (rest, deserialized) = AddressDeserializer::new()
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(deserialized, address);
    }
}
