//! wasmvm Types - Value types shared between the contract host and the engine.
//!
//! This crate provides the plain data types that cross the host/engine boundary:
//! - Checksums (32-byte, blake3 digests of contract bytecode)
//! - `Binary`, opaque bytes carried as base64 in JSON
//! - Cache metrics and memory sizes
//! - Block/contract environment and message info handed to contracts
//! - Contract responses, sub-messages, events and attributes
//! - Chain queries and their results

pub mod binary;
pub mod checksum;
pub mod error;
pub mod size;
pub mod metrics;
pub mod env;
pub mod coin;
pub mod results;
pub mod response;
pub mod query;
pub mod order;
pub mod analysis;

pub use binary::Binary;
pub use checksum::Checksum;
pub use error::TypesError;
pub use size::Size;
pub use metrics::{Metrics, PerModuleMetrics, PinnedMetrics};
pub use env::{BlockInfo, ContractInfo, Env, MessageInfo, TransactionInfo};
pub use coin::{coins, Coin};
pub use results::{ContractResult, SystemError, SystemResult};
pub use response::{
    Attribute, BankMsg, CosmosMsg, Event, Reply, ReplyOn, Response, SubMsg, SubMsgResponse, WasmMsg,
};
pub use query::{
    AllBalanceResponse, BalanceResponse, BankQuery, BondedDenomResponse, QueryRequest,
    StakingQuery, Validator, ValidatorResponse, ValidatorsResponse, WasmQuery,
};
pub use order::{Order, Record};
pub use analysis::AnalysisReport;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Binary, Checksum, Size, Metrics, PinnedMetrics,
        Env, BlockInfo, ContractInfo, MessageInfo, Coin,
        ContractResult, SystemResult, SystemError,
        Response, SubMsg, CosmosMsg, BankMsg, Event, Attribute,
        QueryRequest, BankQuery, WasmQuery, StakingQuery,
        Order, Record, AnalysisReport, TypesError,
    };
}
