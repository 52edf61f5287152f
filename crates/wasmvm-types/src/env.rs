use crate::coin::Coin;
use serde::{Deserialize, Serialize};

/// Chain environment handed to every contract entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    pub block: BlockInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionInfo>,
    pub contract: ContractInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    /// Block time in nanoseconds since the unix epoch
    pub time: u64,
    pub chain_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    /// Position of the transaction in the block
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub address: String,
}

/// Information about the sender of an `instantiate` or `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub sender: String,
    /// Funds sent along with the message
    #[serde(default)]
    pub funds: Vec<Coin>,
}
