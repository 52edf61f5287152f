use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of a contract entry point, as serialized by the contract.
///
/// Encoded as `{"ok": ...}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractResult<T> {
    Ok(T),
    #[serde(rename = "error")]
    Err(String),
}

impl<T> ContractResult<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            ContractResult::Ok(value) => Ok(value),
            ContractResult::Err(msg) => Err(msg),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ContractResult::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

impl<T, E: ToString> From<Result<T, E>> for ContractResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ContractResult::Ok(value),
            Err(e) => ContractResult::Err(e.to_string()),
        }
    }
}

/// Result of a chain query at the system level.
///
/// A `SystemError` means the query could not be dispatched at all, as opposed
/// to a contract-level error inside a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemResult<T> {
    Ok(T),
    #[serde(rename = "error")]
    Err(SystemError),
}

impl<T> SystemResult<T> {
    pub fn into_result(self) -> Result<T, SystemError> {
        match self {
            SystemResult::Ok(value) => Ok(value),
            SystemResult::Err(e) => Err(e),
        }
    }
}

/// Errors a querier reports back to the calling contract.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemError {
    #[error("Cannot parse request: {error} in: {request}")]
    InvalidRequest { error: String, request: String },

    #[error("Cannot parse response: {error} in: {response}")]
    InvalidResponse { error: String, response: String },

    #[error("No such contract: {addr}")]
    NoSuchContract { addr: String },

    #[error("Unsupported query type: {kind}")]
    UnsupportedRequest { kind: String },

    #[error("Unknown system error")]
    Unknown {},
}
