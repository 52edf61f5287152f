//! wasmvm Storage - Durable, file-per-checksum storage of contract bytecode.

pub mod code_store;
pub mod error;

pub use code_store::CodeStore;
pub use error::StorageError;
