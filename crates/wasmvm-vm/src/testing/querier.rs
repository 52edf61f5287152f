use crate::backend::{BackendResult, GasInfo, Querier};
use crate::gateway::querier::QuerierOutput;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use wasmvm_types::{
    AllBalanceResponse, BalanceResponse, BankQuery, BondedDenomResponse, Coin, ContractResult,
    QueryRequest, StakingQuery, SystemError, SystemResult, Validator, ValidatorResponse,
    ValidatorsResponse, WasmQuery,
};

/// Default gas the mock reports as spent per query.
pub const DEFAULT_QUERY_GAS: u64 = 1_000;

type WasmHandler = dyn Fn(&WasmQuery) -> QuerierOutput + Send + Sync;
type CustomHandler = dyn Fn(&serde_json::Value) -> QuerierOutput + Send + Sync;

/// Answers bank and staking queries from fixed data; wasm and custom
/// queries go to optional handlers.
#[derive(Clone)]
pub struct MockQuerier {
    balances: HashMap<String, Vec<Coin>>,
    bonded_denom: String,
    validators: Vec<Validator>,
    wasm_handler: Option<Arc<WasmHandler>>,
    custom_handler: Option<Arc<CustomHandler>>,
    query_gas: u64,
}

impl Default for MockQuerier {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            bonded_denom: "stake".to_string(),
            validators: Vec::new(),
            wasm_handler: None,
            custom_handler: None,
            query_gas: DEFAULT_QUERY_GAS,
        }
    }
}

impl MockQuerier {
    pub fn new(balances: &[(&str, &[Coin])]) -> Self {
        let balances = balances
            .iter()
            .map(|(addr, coins)| (addr.to_string(), coins.to_vec()))
            .collect();
        Self {
            balances,
            ..Default::default()
        }
    }

    pub fn update_balance(&mut self, addr: impl Into<String>, balance: Vec<Coin>) -> Option<Vec<Coin>> {
        self.balances.insert(addr.into(), balance)
    }

    pub fn with_staking(mut self, bonded_denom: &str, validators: &[Validator]) -> Self {
        self.bonded_denom = bonded_denom.to_string();
        self.validators = validators.to_vec();
        self
    }

    pub fn with_wasm_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&WasmQuery) -> QuerierOutput + Send + Sync + 'static,
    {
        self.wasm_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_custom_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&serde_json::Value) -> QuerierOutput + Send + Sync + 'static,
    {
        self.custom_handler = Some(Arc::new(handler));
        self
    }

    /// Gas reported as externally used per query.
    pub fn with_query_gas(mut self, gas: u64) -> Self {
        self.query_gas = gas;
        self
    }

    fn bank(&self, query: &BankQuery) -> QuerierOutput {
        match query {
            BankQuery::Balance { address, denom } => {
                let amount = self
                    .balances
                    .get(address)
                    .and_then(|coins| coins.iter().find(|c| &c.denom == denom))
                    .cloned()
                    .unwrap_or_else(|| Coin::new(0, denom.clone()));
                to_output(&BalanceResponse { amount })
            }
            BankQuery::AllBalances { address } => {
                let amount = self.balances.get(address).cloned().unwrap_or_default();
                to_output(&AllBalanceResponse { amount })
            }
        }
    }

    fn staking(&self, query: &StakingQuery) -> QuerierOutput {
        match query {
            StakingQuery::BondedDenom {} => to_output(&BondedDenomResponse {
                denom: self.bonded_denom.clone(),
            }),
            StakingQuery::AllValidators {} => to_output(&ValidatorsResponse {
                validators: self.validators.clone(),
            }),
            StakingQuery::Validator { address } => to_output(&ValidatorResponse {
                validator: self.validators.iter().find(|v| &v.address == address).cloned(),
            }),
        }
    }
}

fn to_output<T: Serialize>(response: &T) -> QuerierOutput {
    match serde_json::to_value(response) {
        Ok(value) => SystemResult::Ok(ContractResult::Ok(value)),
        Err(e) => SystemResult::Err(SystemError::InvalidResponse {
            error: e.to_string(),
            response: String::new(),
        }),
    }
}

impl Querier for MockQuerier {
    fn query(&self, request: &QueryRequest, _gas_limit: u64) -> BackendResult<QuerierOutput> {
        let output = match request {
            QueryRequest::Bank(query) => self.bank(query),
            QueryRequest::Staking(query) => self.staking(query),
            QueryRequest::Wasm(query) => match &self.wasm_handler {
                Some(handler) => handler(query),
                None => {
                    let addr = match query {
                        WasmQuery::Smart { contract_addr, .. }
                        | WasmQuery::Raw { contract_addr, .. } => contract_addr.clone(),
                    };
                    SystemResult::Err(SystemError::NoSuchContract { addr })
                }
            },
            QueryRequest::Custom(value) => match &self.custom_handler {
                Some(handler) => handler(value),
                None => SystemResult::Err(SystemError::UnsupportedRequest {
                    kind: "custom".to_string(),
                }),
            },
        };
        (Ok(output), GasInfo::with_externally_used(self.query_gas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_value(output: QuerierOutput) -> serde_json::Value {
        output.into_result().unwrap().into_result().unwrap()
    }

    #[test]
    fn test_balance_defaults_to_zero() {
        let querier = MockQuerier::new(&[("alice", &[Coin::new(5, "ATOM")])]);
        let request = QueryRequest::Bank(BankQuery::Balance {
            address: "alice".to_string(),
            denom: "BTC".to_string(),
        });
        let (output, gas) = querier.query(&request, u64::MAX);
        assert_eq!(ok_value(output.unwrap()), json!({"amount": {"denom": "BTC", "amount": "0"}}));
        assert_eq!(gas.externally_used, DEFAULT_QUERY_GAS);
    }

    #[test]
    fn test_update_balance() {
        let mut querier = MockQuerier::default();
        assert!(querier.update_balance("bob", vec![Coin::new(1, "x")]).is_none());
        let request = QueryRequest::Bank(BankQuery::AllBalances {
            address: "bob".to_string(),
        });
        let value = ok_value(querier.query(&request, 0).0.unwrap());
        assert_eq!(value, json!({"amount": [{"denom": "x", "amount": "1"}]}));
    }

    #[test]
    fn test_staking() {
        let validator = Validator {
            address: "val1".to_string(),
            commission: "0.05".to_string(),
            max_commission: "0.1".to_string(),
            max_change_rate: "0.02".to_string(),
        };
        let querier = MockQuerier::default().with_staking("ustake", &[validator]);

        let denom = ok_value(
            querier
                .query(&QueryRequest::Staking(StakingQuery::BondedDenom {}), 0)
                .0
                .unwrap(),
        );
        assert_eq!(denom, json!({"denom": "ustake"}));

        let missing = ok_value(
            querier
                .query(
                    &QueryRequest::Staking(StakingQuery::Validator {
                        address: "nope".to_string(),
                    }),
                    0,
                )
                .0
                .unwrap(),
        );
        assert_eq!(missing, json!({"validator": null}));
    }

    #[test]
    fn test_wasm_handler() {
        let request = QueryRequest::Wasm(WasmQuery::Smart {
            contract_addr: "other".to_string(),
            msg: json!({"verifier": {}}),
        });

        let plain = MockQuerier::default();
        assert_eq!(
            plain.query(&request, 0).0.unwrap(),
            SystemResult::Err(SystemError::NoSuchContract {
                addr: "other".to_string()
            })
        );

        let handled = MockQuerier::default()
            .with_wasm_handler(|_| SystemResult::Ok(ContractResult::Ok(json!({"verifier": "fred"}))));
        assert_eq!(
            ok_value(handled.query(&request, 0).0.unwrap()),
            json!({"verifier": "fred"})
        );
    }

    #[test]
    fn test_custom_handler() {
        let querier = MockQuerier::default()
            .with_custom_handler(|value| SystemResult::Ok(ContractResult::Ok(value.clone())));
        let value = ok_value(querier.query(&QueryRequest::Custom(json!({"ping": 1})), 0).0.unwrap());
        assert_eq!(value, json!({"ping": 1}));
    }
}
