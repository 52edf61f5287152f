use crate::backend::BackendError;
use thiserror::Error;
use wasmvm_storage::StorageError;
use wasmvm_types::{Checksum, TypesError};

/// Machine-readable classification of a [`VmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input detected before the engine ran
    Validation,
    /// Well-formed identifier without backing data
    NotFound,
    /// Gas budget exhausted mid-execution
    OutOfGas,
    /// A host callback (storage, api, querier) failed
    Callback,
    /// Unrecoverable failure inside the engine; the call is aborted
    EngineFatal,
}

/// Errors that can occur during VM operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error("{0}")]
    InvalidChecksum(#[from] TypesError),

    #[error("Invalid WASM module: {0}")]
    InvalidWasm(String),

    #[error("Code size exceeded: {size} > {limit}")]
    CodeSizeExceeded { size: usize, limit: usize },

    #[error("Unsupported capabilities: {0}")]
    UnsupportedCapabilities(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Code not found: {0}")]
    CodeNotFound(Checksum),

    #[error("Out of gas: used {used}, limit {limit}")]
    OutOfGas { used: u64, limit: u64 },

    #[error("Backend error: {0}")]
    Backend(BackendError),

    #[error("Write access denied: {0}")]
    WriteAccessDenied(String),

    #[error("Invalid host function input: {0}")]
    InvalidHostInput(String),

    #[error("Dynamic link failed: {0}")]
    DynamicLink(String),

    #[error("Contract aborted: {0}")]
    Aborted(String),

    #[error("Trap: {0}")]
    Trap(String),

    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

pub type VmResult<T> = Result<T, VmError>;

impl VmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::InvalidChecksum(_)
            | VmError::InvalidWasm(_)
            | VmError::CodeSizeExceeded { .. }
            | VmError::UnsupportedCapabilities(_)
            | VmError::InvalidArgument(_)
            | VmError::FunctionNotFound(_) => ErrorKind::Validation,
            VmError::CodeNotFound(_) => ErrorKind::NotFound,
            VmError::OutOfGas { .. } => ErrorKind::OutOfGas,
            VmError::Backend(BackendError::OutOfGas {}) => ErrorKind::OutOfGas,
            VmError::Backend(_)
            | VmError::WriteAccessDenied(_)
            | VmError::InvalidHostInput(_)
            | VmError::DynamicLink(_) => ErrorKind::Callback,
            VmError::Aborted(_)
            | VmError::Trap(_)
            | VmError::Instantiation(_)
            | VmError::Cache(_) => ErrorKind::EngineFatal,
        }
    }

    pub fn is_out_of_gas(&self) -> bool {
        self.kind() == ErrorKind::OutOfGas
    }
}

impl From<BackendError> for VmError {
    fn from(e: BackendError) -> Self {
        VmError::Backend(e)
    }
}

impl From<StorageError> for VmError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(checksum) => VmError::CodeNotFound(checksum),
            other => VmError::Cache(other.to_string()),
        }
    }
}

impl From<wasmi::Error> for VmError {
    fn from(e: wasmi::Error) -> Self {
        VmError::Trap(e.to_string())
    }
}

impl From<serde_json::Error> for VmError {
    fn from(e: serde_json::Error) -> Self {
        VmError::InvalidArgument(e.to_string())
    }
}
