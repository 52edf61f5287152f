use crate::binary::Binary;
use crate::coin::Coin;
use serde::{Deserialize, Serialize};

/// A query a contract sends to the chain through `query_chain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRequest {
    Bank(BankQuery),
    Custom(serde_json::Value),
    Staking(StakingQuery),
    Wasm(WasmQuery),
}

impl QueryRequest {
    /// Name of the top-level variant, used in logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            QueryRequest::Bank(_) => "bank",
            QueryRequest::Custom(_) => "custom",
            QueryRequest::Staking(_) => "staking",
            QueryRequest::Wasm(_) => "wasm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankQuery {
    Balance { address: String, denom: String },
    AllBalances { address: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingQuery {
    BondedDenom {},
    AllValidators {},
    Validator { address: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasmQuery {
    /// Query another contract's `query` entry point
    Smart {
        contract_addr: String,
        msg: serde_json::Value,
    },
    /// Read a raw key from another contract's storage
    Raw { contract_addr: String, key: Binary },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub amount: Coin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllBalanceResponse {
    pub amount: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondedDenomResponse {
    pub denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: String,
    pub commission: String,
    pub max_commission: String,
    pub max_change_rate: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorsResponse {
    pub validators: Vec<Validator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorResponse {
    pub validator: Option<Validator>,
}
