use thiserror::Error;

/// Errors that can occur in type operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    #[error("Checksum not of length {expected}")]
    InvalidChecksumLength { expected: usize, actual: usize },

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(i32),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<hex::FromHexError> for TypesError {
    fn from(e: hex::FromHexError) -> Self {
        TypesError::InvalidHex(e.to_string())
    }
}

impl From<serde_json::Error> for TypesError {
    fn from(e: serde_json::Error) -> Self {
        TypesError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_length_message() {
        let err = TypesError::InvalidChecksumLength { expected: 32, actual: 4 };
        assert_eq!(err.to_string(), "Checksum not of length 32");
    }
}
