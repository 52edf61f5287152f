//! The VM facade: contract lifecycle operations over one module cache.

use crate::backend::{Api, Backend, Querier, Storage};
use crate::cache::ModuleCache;
use crate::config::VmConfig;
use crate::engine::dynamic_link::{self, FunctionSignature, LinkContext};
use crate::engine::instance::{self, CallRequest, CallTrace, CallableRequest};
use crate::engine::EntryPoint;
use crate::error::{VmError, VmResult};
use crate::gas_metering::{GasMeter, GasReport, GasSchedule};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use wasmvm_types::{
    AnalysisReport, Attribute, Checksum, ContractResult, Env, Event, MessageInfo, Metrics,
    PinnedMetrics, Size,
};

/// Per-call execution parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallParams {
    pub gas_limit: u64,
    pub print_debug: bool,
}

impl CallParams {
    pub fn new(gas_limit: u64) -> Self {
        Self {
            gas_limit,
            print_debug: false,
        }
    }
}

/// Result of a successful lifecycle call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutput {
    /// Raw `ContractResult` JSON returned by the contract
    pub data: Vec<u8>,
    /// Events emitted through host functions, outside the contract response
    pub events: Vec<Event>,
    /// Attributes emitted through host functions, outside the contract response
    pub attributes: Vec<Attribute>,
    pub gas_report: GasReport,
}

impl CallOutput {
    /// Decode `data` as a contract result carrying `T`.
    pub fn contract_result<T: DeserializeOwned>(&self) -> VmResult<ContractResult<T>> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// Result of a successful callable point call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallableOutput {
    /// Region returned by the callable point, if it returns one
    pub data: Option<Vec<u8>>,
    /// Events emitted by a read-write callee; always empty for read-only calls
    pub events: Vec<Event>,
    pub attributes: Vec<Attribute>,
    pub gas_report: GasReport,
}

/// Contract VM bound to one data directory.
pub struct VM {
    cache: Arc<ModuleCache>,
    schedule: GasSchedule,
    instance_memory_limit: Size,
    print_debug: bool,
}

impl VM {
    pub fn new(config: VmConfig) -> VmResult<Self> {
        config
            .validate()
            .map_err(|e| VmError::InvalidArgument(e.to_string()))?;
        let cache = Arc::new(ModuleCache::new(config.cache_options())?);

        Ok(Self {
            cache,
            schedule: GasSchedule::default(),
            instance_memory_limit: config.instance_memory_limit(),
            print_debug: config.print_debug,
        })
    }

    /// Replace the cost table used for host operations.
    pub fn with_gas_schedule(mut self, schedule: GasSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn gas_schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    /// Release every cached module and close the VM.
    pub fn cleanup(self) {
        self.cache.release_all();
    }

    /// Validate and store contract code, returning its checksum.
    pub fn create(&self, wasm: &[u8]) -> VmResult<Checksum> {
        self.cache.save_wasm(wasm)
    }

    pub fn get_code(&self, checksum: &[u8]) -> VmResult<Vec<u8>> {
        let checksum = Checksum::from_slice(checksum)?;
        self.cache.load_wasm(&checksum)
    }

    pub fn pin(&self, checksum: &[u8]) -> VmResult<()> {
        let checksum = Checksum::from_slice(checksum)?;
        self.cache.pin(&checksum)
    }

    pub fn unpin(&self, checksum: &[u8]) -> VmResult<()> {
        let checksum = Checksum::from_slice(checksum)?;
        self.cache.unpin(&checksum)
    }

    pub fn get_metrics(&self) -> Metrics {
        self.cache.metrics()
    }

    pub fn get_pinned_metrics(&self) -> PinnedMetrics {
        self.cache.pinned_metrics()
    }

    pub fn analyze_code(&self, checksum: &[u8]) -> VmResult<AnalysisReport> {
        let checksum = Checksum::from_slice(checksum)?;
        self.cache.analyze(&checksum)
    }

    pub fn remove_code(&self, checksum: &[u8]) -> VmResult<()> {
        let checksum = Checksum::from_slice(checksum)?;
        self.cache.remove_wasm(&checksum)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn instantiate<A, S, Q>(
        &self,
        checksum: &[u8],
        env: &Env,
        info: &MessageInfo,
        msg: &[u8],
        backend: Backend<A, S, Q>,
        gas: &mut dyn GasMeter,
        params: CallParams,
    ) -> VmResult<CallOutput>
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        let args = vec![to_json(env)?, to_json(info)?, msg.to_vec()];
        self.call(EntryPoint::Instantiate, checksum, env, args, backend, gas, params)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn execute<A, S, Q>(
        &self,
        checksum: &[u8],
        env: &Env,
        info: &MessageInfo,
        msg: &[u8],
        backend: Backend<A, S, Q>,
        gas: &mut dyn GasMeter,
        params: CallParams,
    ) -> VmResult<CallOutput>
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        let args = vec![to_json(env)?, to_json(info)?, msg.to_vec()];
        self.call(EntryPoint::Execute, checksum, env, args, backend, gas, params)
    }

    pub fn migrate<A, S, Q>(
        &self,
        checksum: &[u8],
        env: &Env,
        msg: &[u8],
        backend: Backend<A, S, Q>,
        gas: &mut dyn GasMeter,
        params: CallParams,
    ) -> VmResult<CallOutput>
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        let args = vec![to_json(env)?, msg.to_vec()];
        self.call(EntryPoint::Migrate, checksum, env, args, backend, gas, params)
    }

    pub fn sudo<A, S, Q>(
        &self,
        checksum: &[u8],
        env: &Env,
        msg: &[u8],
        backend: Backend<A, S, Q>,
        gas: &mut dyn GasMeter,
        params: CallParams,
    ) -> VmResult<CallOutput>
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        let args = vec![to_json(env)?, msg.to_vec()];
        self.call(EntryPoint::Sudo, checksum, env, args, backend, gas, params)
    }

    /// Deliver a sub-message reply; `msg` is a serialized `Reply`.
    pub fn reply<A, S, Q>(
        &self,
        checksum: &[u8],
        env: &Env,
        msg: &[u8],
        backend: Backend<A, S, Q>,
        gas: &mut dyn GasMeter,
        params: CallParams,
    ) -> VmResult<CallOutput>
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        let args = vec![to_json(env)?, msg.to_vec()];
        self.call(EntryPoint::Reply, checksum, env, args, backend, gas, params)
    }

    /// Read-only call; storage writes and event emission are rejected.
    pub fn query<A, S, Q>(
        &self,
        checksum: &[u8],
        env: &Env,
        msg: &[u8],
        backend: Backend<A, S, Q>,
        gas: &mut dyn GasMeter,
        params: CallParams,
    ) -> VmResult<CallOutput>
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        let args = vec![to_json(env)?, msg.to_vec()];
        self.call(EntryPoint::Query, checksum, env, args, backend, gas, params)
    }

    /// Call a callable point of a contract on behalf of the contracts in
    /// `callstack`, outermost first. `env` is the callee's environment and
    /// is passed to the point ahead of `args`.
    #[allow(clippy::too_many_arguments)]
    pub fn call_callable_point<A, S, Q>(
        &self,
        name: &str,
        checksum: &[u8],
        is_readonly: bool,
        callstack: &[String],
        env: &Env,
        args: &[Vec<u8>],
        backend: Backend<A, S, Q>,
        gas: &mut dyn GasMeter,
        params: CallParams,
    ) -> VmResult<CallableOutput>
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        let checksum = Checksum::from_slice(checksum)?;
        let span = tracing::info_span!("callable_point_call", point = name, %checksum);
        let _enter = span.enter();

        let address = &env.contract.address;
        if callstack.iter().any(|caller| caller == address) {
            return Err(VmError::DynamicLink(
                "A contract can only be called once per one call stack.".to_string(),
            ));
        }

        let cached = self.cache.resolve(&checksum)?;
        let budget = params.gas_limit.min(gas.remaining());

        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(to_json(env)?);
        call_args.extend(args.iter().cloned());

        let request = CallableRequest {
            name: name.to_string(),
            args: call_args,
            read_only: is_readonly,
            budget,
            print_debug: params.print_debug || self.print_debug,
            memory_limit: self.instance_memory_limit.bytes(),
            schedule: self.schedule,
            link: Some(self.link_context(address, callstack.to_vec())),
        };
        let (result, trace) =
            instance::call_callable_point(self.cache.engine(), &cached.module, backend, request);

        gas.consume(trace.gas_used)?;
        let gas_report = gas_report(budget, &trace);

        match result {
            Ok(data) => {
                tracing::debug!(gas_used = gas_report.used(), "Callable point call finished");
                let (events, attributes) = if is_readonly {
                    (Vec::new(), Vec::new())
                } else {
                    (trace.events, trace.attributes)
                };
                Ok(CallableOutput {
                    data,
                    events,
                    attributes,
                    gas_report,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, kind = ?err.kind(), gas_used = gas_report.used(), "Callable point call failed");
                Err(err)
            }
        }
    }

    /// Check that stored code implements `interface`, a JSON list of
    /// function signatures. Returns a description of what is missing, or
    /// `None` when the code implements all of it.
    pub fn validate_dynamic_link_interface(&self, checksum: &[u8], interface: &[u8]) -> VmResult<Option<String>> {
        let checksum = Checksum::from_slice(checksum)?;
        let interface: Vec<FunctionSignature> = serde_json::from_slice(interface)?;
        let cached = self.cache.resolve(&checksum)?;
        Ok(dynamic_link::validate_interface(&cached.module, &interface))
    }

    fn link_context(&self, address: &str, callstack: Vec<String>) -> LinkContext {
        LinkContext::new(
            Arc::clone(&self.cache),
            address.to_string(),
            callstack,
            self.instance_memory_limit.bytes(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn call<A, S, Q>(
        &self,
        entry: EntryPoint,
        checksum: &[u8],
        env: &Env,
        args: Vec<Vec<u8>>,
        backend: Backend<A, S, Q>,
        gas: &mut dyn GasMeter,
        params: CallParams,
    ) -> VmResult<CallOutput>
    where
        A: Api + 'static,
        S: Storage + 'static,
        Q: Querier + 'static,
    {
        let checksum = Checksum::from_slice(checksum)?;
        let span = tracing::info_span!("contract_call", entry = entry.name(), %checksum);
        let _enter = span.enter();

        let cached = self.cache.resolve(&checksum)?;
        let budget = params.gas_limit.min(gas.remaining());

        let request = CallRequest {
            entry,
            args,
            budget,
            print_debug: params.print_debug || self.print_debug,
            memory_limit: self.instance_memory_limit.bytes(),
            schedule: self.schedule,
            link: Some(self.link_context(&env.contract.address, Vec::new())),
        };
        let (result, trace) =
            instance::call_entry_point(self.cache.engine(), &cached.module, backend, request);

        // Fuel never exceeds the budget, which never exceeds what the meter has left
        gas.consume(trace.gas_used)?;
        let gas_report = gas_report(budget, &trace);

        match result {
            Ok(data) => {
                tracing::debug!(gas_used = gas_report.used(), events = trace.events.len(), "Contract call finished");
                Ok(CallOutput {
                    data,
                    events: trace.events,
                    attributes: trace.attributes,
                    gas_report,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, kind = ?err.kind(), gas_used = gas_report.used(), "Contract call failed");
                Err(err)
            }
        }
    }
}

fn gas_report(budget: u64, trace: &CallTrace) -> GasReport {
    GasReport {
        limit: budget,
        remaining: budget.saturating_sub(trace.gas_used),
        used_externally: trace.externally_used,
        used_internally: trace.gas_used.saturating_sub(trace.externally_used),
    }
}

fn to_json<T: Serialize>(value: &T) -> VmResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gas_metering::GasTracker;
    use crate::testing::{mock_backend, mock_env};
    use tempfile::TempDir;

    const QUERY_ONLY: &str = r#"(module
        (memory (export "memory") 1)
        (global $heap (mut i32) (i32.const 1024))
        (func (export "allocate") (param $size i32) (result i32)
          (local $region i32)
          (local.set $region (global.get $heap))
          (i32.store (local.get $region) (i32.add (local.get $region) (i32.const 12)))
          (i32.store offset=4 (local.get $region) (local.get $size))
          (i32.store offset=8 (local.get $region) (i32.const 0))
          (global.set $heap (i32.add (global.get $heap) (i32.add (local.get $size) (i32.const 12))))
          (local.get $region))
        (func (export "deallocate") (param i32))
        (func (export "query") (param $env i32) (param $msg i32) (result i32)
          (local.get $msg)))"#;

    fn vm(dir: &TempDir) -> VM {
        VM::new(VmConfig::with_data_dir(dir.path())).unwrap()
    }

    #[test]
    fn test_checksum_length_is_validated() {
        let dir = TempDir::new().unwrap();
        let vm = vm(&dir);
        for err in [
            vm.pin(&[1, 2, 3, 4]).unwrap_err(),
            vm.unpin(&[1, 2, 3, 4]).unwrap_err(),
            vm.get_code(&[1, 2, 3, 4]).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(err.to_string(), "Checksum not of length 32");
        }
    }

    #[test]
    fn test_query_round_trip() {
        let dir = TempDir::new().unwrap();
        let vm = vm(&dir);
        let wasm = wat::parse_str(QUERY_ONLY).unwrap();
        let checksum = vm.create(&wasm).unwrap();
        assert_eq!(vm.get_code(checksum.as_bytes()).unwrap(), wasm);

        let mut gas = GasTracker::with_default_schedule(1_000_000);
        let out = vm
            .query(
                checksum.as_bytes(),
                &mock_env(),
                br#"{"ok":"pong"}"#,
                mock_backend(&[]),
                &mut gas,
                CallParams::new(500_000),
            )
            .unwrap();

        assert_eq!(out.contract_result::<String>().unwrap(), ContractResult::Ok("pong".to_string()));
        assert_eq!(out.gas_report.limit, 500_000);
        assert_eq!(gas.consumed(), out.gas_report.used());
        assert_eq!(out.gas_report.used_externally, 0);
    }

    #[test]
    fn test_budget_bounded_by_meter() {
        let dir = TempDir::new().unwrap();
        let vm = vm(&dir);
        let checksum = vm.create(&wat::parse_str(QUERY_ONLY).unwrap()).unwrap();

        let mut gas = GasTracker::with_default_schedule(200_000);
        gas.consume(150_000).unwrap();
        let out = vm
            .query(
                checksum.as_bytes(),
                &mock_env(),
                b"{}",
                mock_backend(&[]),
                &mut gas,
                CallParams::new(1_000_000),
            )
            .unwrap();
        assert_eq!(out.gas_report.limit, 50_000);
    }

    #[test]
    fn test_missing_entry_point_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let vm = vm(&dir);
        let checksum = vm.create(&wat::parse_str(QUERY_ONLY).unwrap()).unwrap();

        let mut gas = GasTracker::with_default_schedule(1_000_000);
        let err = vm
            .sudo(
                checksum.as_bytes(),
                &mock_env(),
                b"{}",
                mock_backend(&[]),
                &mut gas,
                CallParams::new(1_000_000),
            )
            .unwrap_err();
        assert_eq!(err, VmError::FunctionNotFound("sudo".to_string()));
    }
}
