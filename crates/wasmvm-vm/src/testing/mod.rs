//! In-memory backends for exercising the VM without a chain.
//!
//! The mocks are cheap handles: cloning one shares its state, so a test can
//! pass a clone into a call and inspect the original afterwards.

mod api;
mod env;
mod querier;
mod storage;

pub use api::{MockApi, MOCK_CANONICALIZE_COST, MOCK_CONTRACT_ENV_COST, MOCK_HUMANIZE_COST};
pub use env::{mock_env, mock_info, MOCK_CONTRACT_ADDR};
pub use querier::{MockQuerier, DEFAULT_QUERY_GAS};
pub use storage::{MockStorage, GAS_COST_LAST_ITERATION, GAS_COST_RANGE};

use crate::backend::Backend;
use wasmvm_types::Coin;

pub type MockBackend = Backend<MockApi, MockStorage, MockQuerier>;

/// Backend with an empty store and `contract_balance` owned by the mock contract.
pub fn mock_backend(contract_balance: &[Coin]) -> MockBackend {
    Backend::new(
        MockApi::default(),
        MockStorage::new(),
        MockQuerier::new(&[(MOCK_CONTRACT_ADDR, contract_balance)]),
    )
}
