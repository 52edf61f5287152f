use crate::error::TypesError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;

/// Opaque bytes that travel through JSON as a standard base64 string.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, TypesError> {
        STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(|e| TypesError::InvalidBase64(e.to_string()))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Binary {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Binary {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&[u8]> for Binary {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Binary {
    fn from(data: [u8; N]) -> Self {
        Self(data.to_vec())
    }
}

impl From<Binary> for Vec<u8> {
    fn from(binary: Binary) -> Self {
        binary.0
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl fmt::Debug for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binary({})", hex::encode(&self.0))
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Binary::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_base64_string() {
        let data = Binary::from([0xF0, 0x0B, 0xAA]);
        assert_eq!(serde_json::to_string(&data).unwrap(), r#""8Auq""#);
    }

    #[test]
    fn test_deserializes_base64_string() {
        let data: Binary = serde_json::from_str(r#""8Auq""#).unwrap();
        assert_eq!(data.as_slice(), &[0xF0, 0x0B, 0xAA]);
    }

    #[test]
    fn test_rejects_byte_array() {
        assert!(serde_json::from_str::<Binary>("[240,11,170]").is_err());
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let err = Binary::from_base64("not base64!").unwrap_err();
        assert!(matches!(err, TypesError::InvalidBase64(_)));
    }

    #[test]
    fn test_empty() {
        let data: Binary = serde_json::from_str(r#""""#).unwrap();
        assert!(data.is_empty());
        assert_eq!(data.to_string(), "");
    }
}
