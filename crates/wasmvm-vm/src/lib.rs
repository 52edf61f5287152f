//! wasmvm VM - Module cache and host callback layer for WASM smart contracts.
//!
//! This crate provides:
//! - A content-addressed module cache with pinned and memory-budgeted tiers
//! - Gas metering shared between wasm execution and host callbacks
//! - Storage, API and querier gateways contracts call into mid-execution
//! - The `VM` facade implementing the contract lifecycle
//! - Dynamic links from one contract into the callable points of another
//! - Mock backends for host-binding tests

pub mod backend;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod gas_metering;
pub mod gateway;
pub mod telemetry;
pub mod testing;
pub mod vm;

pub use backend::{
    Api, Backend, BackendError, BackendResult, ContractEnv, DynBackend, GasInfo, Querier, Storage,
};
pub use cache::{CacheOptions, CachedModule, ModuleCache};
pub use config::VmConfig;
pub use engine::dynamic_link::{CallablePointProperty, FunctionSignature, FunctionType, ValType};
pub use engine::static_analysis::MAX_WASM_SIZE;
pub use engine::EntryPoint;
pub use error::{ErrorKind, VmError, VmResult};
pub use gas_metering::{GasMeter, GasReport, GasSchedule, GasTracker};
pub use telemetry::init_telemetry;
pub use vm::{CallOutput, CallParams, CallableOutput, VM};

pub use wasmvm_types::{Checksum, Metrics, PinnedMetrics, Size};
