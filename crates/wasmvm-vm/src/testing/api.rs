use super::{MockQuerier, MockStorage};
use crate::backend::{Api, BackendError, BackendResult, ContractEnv, DynBackend, GasInfo};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use wasmvm_types::{Checksum, Env};

pub const MOCK_CANONICALIZE_COST: u64 = 55;
pub const MOCK_HUMANIZE_COST: u64 = 44;
/// Gas reported for resolving a linked contract
pub const MOCK_CONTRACT_ENV_COST: u64 = 100;

const MIN_ADDRESS_LENGTH: usize = 3;
const MAX_ADDRESS_LENGTH: usize = 64;

/// Address conversion without a real encoding.
///
/// Addresses are normalized to lower case and the canonical form is the
/// reversed byte string, so converting back and forth is lossless.
///
/// Contracts registered with [`MockApi::register_contract`] can be reached
/// through dynamic links; clones share the registry.
#[derive(Clone, Default)]
pub struct MockApi {
    fail: bool,
    contracts: Arc<RwLock<HashMap<String, MockContract>>>,
}

#[derive(Clone)]
struct MockContract {
    env: Env,
    checksum: Checksum,
    storage: MockStorage,
    querier: MockQuerier,
}

impl fmt::Debug for MockApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockApi")
            .field("fail", &self.fail)
            .field("contracts", &self.contracts.read().len())
            .finish()
    }
}

impl MockApi {
    /// An api whose every call fails with a user error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Make the contract at `env.contract.address` reachable through dynamic
    /// links, running `checksum` against `storage`.
    pub fn register_contract(&self, env: Env, checksum: Checksum, storage: MockStorage, querier: MockQuerier) {
        let address = env.contract.address.clone();
        self.contracts.write().insert(
            address,
            MockContract {
                env,
                checksum,
                storage,
                querier,
            },
        );
    }

    fn check_length(len: usize, what: &str) -> Result<(), BackendError> {
        if len == 0 {
            return Err(BackendError::user_err(format!("Invalid input: {} empty", what)));
        }
        if len < MIN_ADDRESS_LENGTH {
            return Err(BackendError::user_err(format!("Invalid input: {} too short", what)));
        }
        if len > MAX_ADDRESS_LENGTH {
            return Err(BackendError::user_err(format!("Invalid input: {} too long", what)));
        }
        Ok(())
    }
}

impl Api for MockApi {
    fn addr_canonicalize(&self, human: &str) -> BackendResult<Vec<u8>> {
        let gas = GasInfo::with_cost(MOCK_CANONICALIZE_COST);
        if self.fail {
            return (Err(BackendError::user_err("Mock API configured to fail")), gas);
        }
        if let Err(e) = Self::check_length(human.len(), "human address") {
            return (Err(e), gas);
        }

        let canonical = human.to_lowercase().bytes().rev().collect();
        (Ok(canonical), gas)
    }

    fn addr_humanize(&self, canonical: &[u8]) -> BackendResult<String> {
        let gas = GasInfo::with_cost(MOCK_HUMANIZE_COST);
        if self.fail {
            return (Err(BackendError::user_err("Mock API configured to fail")), gas);
        }
        if let Err(e) = Self::check_length(canonical.len(), "canonical address") {
            return (Err(e), gas);
        }

        let bytes: Vec<u8> = canonical.iter().rev().copied().collect();
        match String::from_utf8(bytes) {
            Ok(human) => (Ok(human), gas),
            Err(_) => (
                Err(BackendError::user_err("Invalid input: canonical address not utf-8")),
                gas,
            ),
        }
    }

    fn get_contract_env(&self, contract_addr: &str, _input_size: u64) -> BackendResult<ContractEnv> {
        let gas = GasInfo::with_cost(MOCK_CONTRACT_ENV_COST);
        let contracts = self.contracts.read();
        let contract = match contracts.get(contract_addr) {
            Some(contract) => contract.clone(),
            None => {
                return (
                    Err(BackendError::user_err(format!("Contract {} not found", contract_addr))),
                    gas,
                )
            }
        };
        let contract_env = ContractEnv {
            env: contract.env,
            checksum: contract.checksum,
            backend: DynBackend::boxed(self.clone(), contract.storage, contract.querier),
        };
        (Ok(contract_env), gas)
    }
}
