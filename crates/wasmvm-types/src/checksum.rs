use crate::error::TypesError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 32-byte content hash of a contract binary (blake3 digest).
///
/// The checksum is the only key into both the code store and the module cache.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    pub const LEN: usize = 32;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash contract bytecode
    pub fn generate(wasm: &[u8]) -> Self {
        Self(*blake3::hash(wasm).as_bytes())
    }

    /// Create from a byte slice, rejecting anything that is not exactly 32 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != Self::LEN {
            return Err(TypesError::InvalidChecksumLength {
                expected: Self::LEN,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Convert to hex string (no prefix, used for file names)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self)
    }
}

impl FromStr for Checksum {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        Self::from_hex(s)
    }
}

impl TryFrom<&[u8]> for Checksum {
    type Error = TypesError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(value)
    }
}

impl From<[u8; 32]> for Checksum {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_hex().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Checksum::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_generate() {
        let a = Checksum::generate(b"\0asm");
        let b = Checksum::generate(b"\0asm");
        assert_eq!(a, b);
        assert_ne!(a, Checksum::generate(b"\0asm\x01"));
    }

    #[test]
    fn test_checksum_rejects_short_slice() {
        let err = Checksum::from_slice(&[1, 2, 3, 4]).unwrap_err();
        assert_eq!(err.to_string(), "Checksum not of length 32");
    }

    #[test]
    fn test_checksum_rejects_long_slice() {
        assert!(Checksum::try_from(&[0u8; 33][..]).is_err());
    }

    #[test]
    fn test_checksum_hex_roundtrip() {
        let checksum = Checksum::generate(b"contract");
        let parsed: Checksum = checksum.to_string().parse().unwrap();
        assert_eq!(checksum, parsed);

        let prefixed: Checksum = format!("0x{}", checksum.to_hex()).parse().unwrap();
        assert_eq!(checksum, prefixed);
    }

    #[test]
    fn test_checksum_serde() {
        let checksum = Checksum::generate(b"contract");
        let json = serde_json::to_string(&checksum).unwrap();
        assert_eq!(json, format!("\"{}\"", checksum.to_hex()));
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checksum);
    }

    proptest! {
        #[test]
        fn prop_only_32_bytes_accepted(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let parsed = Checksum::from_slice(&bytes);
            prop_assert_eq!(parsed.is_ok(), bytes.len() == 32);
        }
    }
}
