use super::dynamic_link::{LinkContext, LinkRequest};
use crate::backend::{Api, Backend, Querier, Storage};
use crate::error::VmError;
use crate::gas_metering::GasSchedule;
use crate::gateway::{ApiGateway, QuerierGateway, StorageGateway};
use wasmi::{StoreLimits, StoreLimitsBuilder};
use wasmvm_types::{Attribute, Event};

/// Per-call state the host functions operate on.
pub struct Environment<A: Api, S: Storage, Q: Querier> {
    pub(crate) api: ApiGateway<A>,
    pub(crate) storage: StorageGateway<S>,
    pub(crate) querier: QuerierGateway<Q>,
    pub(crate) schedule: GasSchedule,
    /// Fuel the call was started with
    pub(crate) budget: u64,
    pub(crate) read_only: bool,
    pub(crate) print_debug: bool,
    /// Error raised by a host function, reported instead of the engine's trap
    pub(crate) pending_error: Option<VmError>,
    pub(crate) events: Vec<Event>,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) limits: StoreLimits,
    /// Where dynamically linked contracts are resolved; `None` disables linking
    pub(crate) link: Option<LinkContext>,
    /// Gas linked callees reported as spent outside their engines
    pub(crate) linked_externally_used: u64,
    /// Dynamic call waiting for the suspended contract
    pub(crate) pending_link: Option<LinkRequest>,
}

impl<A: Api, S: Storage, Q: Querier> Environment<A, S, Q> {
    pub fn new(
        backend: Backend<A, S, Q>,
        schedule: GasSchedule,
        budget: u64,
        read_only: bool,
        print_debug: bool,
        memory_limit: usize,
    ) -> Self {
        Self {
            api: ApiGateway::new(backend.api, schedule),
            storage: StorageGateway::new(backend.storage, schedule, read_only),
            querier: QuerierGateway::new(backend.querier, schedule),
            schedule,
            budget,
            read_only,
            print_debug,
            pending_error: None,
            events: Vec::new(),
            attributes: Vec::new(),
            limits: StoreLimitsBuilder::new().memory_size(memory_limit).build(),
            link: None,
            linked_externally_used: 0,
            pending_link: None,
        }
    }

    pub fn with_link(mut self, link: Option<LinkContext>) -> Self {
        self.link = link;
        self
    }

    /// Gas the host reported as spent outside the engine, across all gateways
    pub fn externally_used(&self) -> u64 {
        self.api
            .externally_used()
            .saturating_add(self.storage.externally_used())
            .saturating_add(self.querier.externally_used())
            .saturating_add(self.linked_externally_used)
    }

    /// Switch write permission for the rest of the call.
    pub(crate) fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
        self.storage.set_read_only(read_only);
    }

    pub(crate) fn check_writable(&self, op: &str) -> Result<(), VmError> {
        if self.read_only {
            return Err(VmError::WriteAccessDenied(op.to_string()));
        }
        Ok(())
    }
}
