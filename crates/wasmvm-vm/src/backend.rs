//! Capability interfaces the host implements for one lifecycle call.
//!
//! Every operation reports the gas it used alongside its result, so the
//! caller can meter the work even when the operation failed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasmvm_types::{Checksum, ContractResult, Env, Order, QueryRequest, Record, SystemResult};

/// Gas reported by a host operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasInfo {
    /// Gas to charge to the running contract
    pub cost: u64,
    /// Gas the host already spent elsewhere (e.g. in a nested contract call)
    pub externally_used: u64,
}

impl GasInfo {
    pub fn new(cost: u64, externally_used: u64) -> Self {
        Self { cost, externally_used }
    }

    pub fn with_cost(cost: u64) -> Self {
        Self::new(cost, 0)
    }

    pub fn with_externally_used(externally_used: u64) -> Self {
        Self::new(0, externally_used)
    }

    pub fn free() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.cost.saturating_add(self.externally_used)
    }
}

impl std::ops::AddAssign for GasInfo {
    fn add_assign(&mut self, other: Self) {
        self.cost = self.cost.saturating_add(other.cost);
        self.externally_used = self.externally_used.saturating_add(other.externally_used);
    }
}

/// Result of a host operation plus the gas it used.
pub type BackendResult<T> = (Result<T, BackendError>, GasInfo);

/// Errors a host backend reports to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendError {
    #[error("Panic in host backend: {msg}")]
    ForeignPanic { msg: String },

    #[error("Bad argument: {msg}")]
    BadArgument { msg: String },

    #[error("Iterator with ID {id} does not exist")]
    IteratorDoesNotExist { id: u32 },

    #[error("Ran out of gas during call into backend")]
    OutOfGas {},

    /// Expected failure caused by contract input, e.g. an invalid address
    #[error("User error during call into backend: {msg}")]
    UserErr { msg: String },

    #[error("Unknown error during call into backend: {msg}")]
    Unknown { msg: String },
}

impl BackendError {
    pub fn foreign_panic(msg: impl Into<String>) -> Self {
        BackendError::ForeignPanic { msg: msg.into() }
    }

    pub fn bad_argument(msg: impl Into<String>) -> Self {
        BackendError::BadArgument { msg: msg.into() }
    }

    pub fn user_err(msg: impl Into<String>) -> Self {
        BackendError::UserErr { msg: msg.into() }
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        BackendError::Unknown { msg: msg.into() }
    }
}

/// Key/value store of one contract.
///
/// Iterators are identified by ids handed out by [`Storage::scan`]; an id is
/// only meaningful to the store that created it.
pub trait Storage {
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>>;

    fn set(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()>;

    fn remove(&mut self, key: &[u8]) -> BackendResult<()>;

    /// Open an iterator over `[start, end)`; `None` bounds are open-ended.
    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> BackendResult<u32>;

    /// Next record of an iterator, `None` once exhausted.
    fn next(&mut self, iterator_id: u32) -> BackendResult<Option<Record>>;

    /// Release an iterator. Unknown ids are ignored.
    fn close_iterator(&mut self, iterator_id: u32);
}

/// Address conversion and contract lookup provided by the chain.
pub trait Api {
    fn addr_canonicalize(&self, human: &str) -> BackendResult<Vec<u8>>;

    fn addr_humanize(&self, canonical: &[u8]) -> BackendResult<String>;

    /// Everything needed to run a callable point of the contract at
    /// `contract_addr`. `input_size` is the byte length of the arguments the
    /// caller passes along.
    ///
    /// Hosts without dynamic linking keep the default, which rejects the call.
    fn get_contract_env(&self, contract_addr: &str, input_size: u64) -> BackendResult<ContractEnv> {
        let _ = input_size;
        (
            Err(BackendError::unknown(format!(
                "Dynamic link to {} is not supported by this host",
                contract_addr
            ))),
            GasInfo::free(),
        )
    }
}

/// Chain state queries.
pub trait Querier {
    /// Answer `request`. `gas_limit` is the gas still available to the caller;
    /// reporting more than that fails the call with out-of-gas.
    fn query(
        &self,
        request: &QueryRequest,
        gas_limit: u64,
    ) -> BackendResult<SystemResult<ContractResult<serde_json::Value>>>;
}

/// The host objects bound to one lifecycle call.
pub struct Backend<A, S, Q> {
    pub api: A,
    pub storage: S,
    pub querier: Q,
}

impl<A, S, Q> Backend<A, S, Q>
where
    A: Api,
    S: Storage,
    Q: Querier,
{
    pub fn new(api: A, storage: S, querier: Q) -> Self {
        Self { api, storage, querier }
    }
}

/// Backend with its capabilities behind trait objects, used for contracts
/// reached through a dynamic link.
pub type DynBackend = Backend<Box<dyn Api>, Box<dyn Storage>, Box<dyn Querier>>;

impl DynBackend {
    pub fn boxed<A, S, Q>(api: A, storage: S, querier: Q) -> Self
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        Backend::new(Box::new(api), Box::new(storage), Box::new(querier))
    }
}

/// A contract resolved by [`Api::get_contract_env`].
pub struct ContractEnv {
    /// Environment the callee sees as its first argument
    pub env: Env,
    pub checksum: Checksum,
    pub backend: DynBackend,
}

impl<T: Api + ?Sized> Api for Box<T> {
    fn addr_canonicalize(&self, human: &str) -> BackendResult<Vec<u8>> {
        (**self).addr_canonicalize(human)
    }

    fn addr_humanize(&self, canonical: &[u8]) -> BackendResult<String> {
        (**self).addr_humanize(canonical)
    }

    fn get_contract_env(&self, contract_addr: &str, input_size: u64) -> BackendResult<ContractEnv> {
        (**self).get_contract_env(contract_addr, input_size)
    }
}

impl<T: Storage + ?Sized> Storage for Box<T> {
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &[u8]) -> BackendResult<()> {
        (**self).remove(key)
    }

    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> BackendResult<u32> {
        (**self).scan(start, end, order)
    }

    fn next(&mut self, iterator_id: u32) -> BackendResult<Option<Record>> {
        (**self).next(iterator_id)
    }

    fn close_iterator(&mut self, iterator_id: u32) {
        (**self).close_iterator(iterator_id)
    }
}

impl<T: Querier + ?Sized> Querier for Box<T> {
    fn query(
        &self,
        request: &QueryRequest,
        gas_limit: u64,
    ) -> BackendResult<SystemResult<ContractResult<serde_json::Value>>> {
        (**self).query(request, gas_limit)
    }
}
