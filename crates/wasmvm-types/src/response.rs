use crate::binary::Binary;
use crate::coin::Coin;
use crate::results::ContractResult;
use serde::{Deserialize, Serialize};

/// Response returned by a successful `instantiate`, `execute`, `migrate`,
/// `sudo` or `reply` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Messages the host should dispatch after the call
    #[serde(default)]
    pub messages: Vec<SubMsg>,
    /// Attributes of the implicit `wasm` event
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Custom events
    #[serde(default)]
    pub events: Vec<Event>,
    /// Opaque result data
    #[serde(default)]
    pub data: Option<Binary>,
}

/// A message plus the conditions under which its outcome is reported back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMsg {
    pub id: u64,
    pub msg: CosmosMsg,
    #[serde(default)]
    pub gas_limit: Option<u64>,
    #[serde(default)]
    pub reply_on: ReplyOn,
}

impl SubMsg {
    /// A fire-and-forget message
    pub fn new(msg: CosmosMsg) -> Self {
        Self {
            id: 0,
            msg,
            gas_limit: None,
            reply_on: ReplyOn::Never,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOn {
    Always,
    Error,
    Success,
    #[default]
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CosmosMsg {
    Bank(BankMsg),
    Wasm(WasmMsg),
    Custom(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankMsg {
    Send { to_address: String, amount: Vec<Coin> },
    Burn { amount: Vec<Coin> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasmMsg {
    Execute {
        contract_addr: String,
        msg: serde_json::Value,
        #[serde(default)]
        funds: Vec<Coin>,
    },
    Migrate {
        contract_addr: String,
        new_code_id: u64,
        msg: serde_json::Value,
    },
}

/// A key/value pair attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Event {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }
}

/// Message passed to the `reply` entry point once a sub-message finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: u64,
    pub result: ContractResult<SubMsgResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMsgResponse {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub data: Option<Binary>,
}
