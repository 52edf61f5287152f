//! Calls from one contract into the callable points of another.
//!
//! A contract reaches another contract by importing a function from a module
//! named `dynamiclinked_<label>`. Every parameter of such an import is a
//! region pointer: the first holds the callee address, the rest are handed
//! to the callee after its env. The callee runs on its own instance with the
//! backend the host resolves for the address, and its gas is charged to the
//! caller.

use super::environment::Environment;
use super::imports::{finish, link_error, memory, metered, utf8, Ctx, MAX_LENGTH_ADDRESS};
use super::instance::{self, CallableRequest};
use super::memory::read_region;
use crate::backend::{Api, ContractEnv, Querier, Storage};
use crate::cache::ModuleCache;
use crate::error::{VmError, VmResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use wasmi::core::{HostError, Trap, ValueType};
use wasmi::{ExternType, FuncType, Linker, Module, Store, Value};

/// Import module prefix marking a dynamically linked contract
pub const DYNAMIC_LINK_PREFIX: &str = "dynamiclinked_";
/// Export returning the JSON table of a contract's callable points
pub const CALLABLE_POINTS_PROPERTIES_EXPORT: &str = "_get_callable_points_properties";
/// Max total length of the arguments passed through one dynamic link
pub const MAX_LENGTH_DYNAMIC_ARGS: usize = 64 * 1024 * 1024;

pub fn is_dynamic_link_module(module: &str) -> bool {
    module.starts_with(DYNAMIC_LINK_PREFIX)
}

/// Where a running contract is in the chain of dynamic calls.
#[derive(Clone)]
pub struct LinkContext {
    pub cache: Arc<ModuleCache>,
    /// Address of the running contract
    pub address: String,
    /// Addresses of the contracts waiting on this one, outermost first
    pub callstack: Vec<String>,
    pub memory_limit: usize,
}

impl fmt::Debug for LinkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkContext")
            .field("address", &self.address)
            .field("callstack", &self.callstack)
            .finish()
    }
}

impl LinkContext {
    pub fn new(cache: Arc<ModuleCache>, address: String, callstack: Vec<String>, memory_limit: usize) -> Self {
        Self {
            cache,
            address,
            callstack,
            memory_limit,
        }
    }

    /// A contract appears at most once per call stack.
    pub fn check_callee(&self, callee: &str) -> VmResult<()> {
        if callee == self.address || self.callstack.iter().any(|a| a == callee) {
            return Err(VmError::DynamicLink(
                "A contract can only be called once per one call stack.".to_string(),
            ));
        }
        Ok(())
    }

    /// Context of `callee` when called from the running contract.
    pub fn descend(&self, callee: &str) -> Self {
        let mut callstack = self.callstack.clone();
        callstack.push(self.address.clone());
        Self {
            cache: Arc::clone(&self.cache),
            address: callee.to_string(),
            callstack,
            memory_limit: self.memory_limit,
        }
    }
}

/// How a contract declares one of its exports to other contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallablePointProperty {
    pub is_read_only: bool,
    pub is_callable: bool,
}

/// Wasm value types as they appear in an interface description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl From<ValType> for ValueType {
    fn from(ty: ValType) -> Self {
        match ty {
            ValType::I32 => ValueType::I32,
            ValType::I64 => ValueType::I64,
            ValType::F32 => ValueType::F32,
            ValType::F64 => ValueType::F64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

/// One function a contract must export to implement an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub ty: FunctionType,
}

impl FunctionSignature {
    fn matches(&self, ty: &FuncType) -> bool {
        let params: Vec<ValueType> = self.ty.params.iter().copied().map(Into::into).collect();
        let results: Vec<ValueType> = self.ty.results.iter().copied().map(Into::into).collect();
        ty.params() == params.as_slice() && ty.results() == results.as_slice()
    }
}

/// Check that `module` exports every function of `interface` with the same
/// signature. Returns a message naming the offenders, `None` when all match.
pub fn validate_interface(module: &Module, interface: &[FunctionSignature]) -> Option<String> {
    let missing: Vec<&str> = interface
        .iter()
        .filter(|signature| match module.get_export(&signature.name) {
            Some(ExternType::Func(ty)) => !signature.matches(&ty),
            _ => true,
        })
        .map(|signature| signature.name.as_str())
        .collect();

    if missing.is_empty() {
        None
    } else {
        Some(format!(
            "following functions are not implemented: {}",
            missing.join(", ")
        ))
    }
}

/// Dynamic imports take the address region plus argument regions and return
/// at most one region.
pub fn check_import_signature(name: &str, ty: &FuncType) -> VmResult<()> {
    let all_i32 = ty.params().iter().chain(ty.results()).all(|t| *t == ValueType::I32);
    if !all_i32 || ty.params().is_empty() || ty.results().len() > 1 {
        return Err(VmError::InvalidWasm(format!(
            "Dynamically linked import \"{}\" must take an address region and return at most one region",
            name
        )));
    }
    Ok(())
}

/// A dynamic call recorded by the host function, run once the caller is
/// suspended.
pub(crate) struct LinkRequest {
    address: String,
    point: String,
    args: Vec<Vec<u8>>,
    contract: ContractEnv,
    link: LinkContext,
    returns_value: bool,
}

impl LinkRequest {
    pub(crate) fn returns_value(&self) -> bool {
        self.returns_value
    }
}

/// Host error suspending the caller while its link request runs.
#[derive(Debug, thiserror::Error)]
#[error("Contract suspended for a dynamic link")]
struct Suspended;

impl HostError for Suspended {}

/// Define a host function for every dynamically linked import of `module`.
pub fn define_imports<A, S, Q>(linker: &mut Linker<Environment<A, S, Q>>, module: &Module) -> VmResult<()>
where
    A: Api + 'static,
    S: Storage + 'static,
    Q: Querier + 'static,
{
    let mut defined = HashSet::new();
    for import in module.imports() {
        if !is_dynamic_link_module(import.module()) {
            continue;
        }
        let ty = match import.ty() {
            ExternType::Func(ty) => ty.clone(),
            _ => continue,
        };
        if !defined.insert((import.module(), import.name())) {
            continue;
        }
        check_import_signature(import.name(), &ty)?;

        let point = import.name().to_string();
        let returns_value = !ty.results().is_empty();
        linker
            .func_new(
                import.module(),
                import.name(),
                ty,
                move |mut caller: Ctx<'_, A, S, Q>, params: &[Value], _results: &mut [Value]| {
                    let result = request_link(&mut caller, &point, params, returns_value);
                    finish(&mut caller, result)?;
                    Err(Trap::from(Suspended))
                },
            )
            .map_err(link_error)?;
    }
    Ok(())
}

fn region_ptr(value: &Value) -> VmResult<u32> {
    match value {
        Value::I32(ptr) => Ok(*ptr as u32),
        _ => Err(VmError::InvalidHostInput(
            "Dynamic link arguments must be region pointers".to_string(),
        )),
    }
}

fn request_link<A: Api, S: Storage, Q: Querier>(
    caller: &mut Ctx<'_, A, S, Q>,
    point: &str,
    params: &[Value],
    returns_value: bool,
) -> VmResult<()> {
    let link = caller.data().link.clone().ok_or_else(|| {
        VmError::DynamicLink("Dynamic linking is not available for this call".to_string())
    })?;
    let ptrs = params.iter().map(region_ptr).collect::<VmResult<Vec<u32>>>()?;
    let (address_ptr, arg_ptrs) = ptrs
        .split_first()
        .ok_or_else(|| VmError::InvalidHostInput("Missing contract address".to_string()))?;

    let memory = memory(caller)?;
    let address = utf8(
        read_region(&memory, &*caller, *address_ptr, MAX_LENGTH_ADDRESS)?,
        "Contract address",
    )?;
    link.check_callee(&address)?;

    let mut args = Vec::with_capacity(arg_ptrs.len());
    let mut input_size = 0usize;
    for ptr in arg_ptrs {
        let arg = read_region(
            &memory,
            &*caller,
            *ptr,
            MAX_LENGTH_DYNAMIC_ARGS.saturating_sub(input_size),
        )?;
        input_size += arg.len();
        args.push(arg);
    }

    let contract = metered(caller, |env, gas| {
        env.api.contract_env(gas, &address, input_size as u64)
    })?;
    caller.data_mut().pending_link = Some(LinkRequest {
        address,
        point: point.to_string(),
        args,
        contract,
        link,
        returns_value,
    });
    Ok(())
}

/// Run a recorded link request on behalf of the suspended caller, charge
/// the callee's gas to it and pass the callee's events on.
pub(crate) fn complete<A, S, Q>(
    store: &mut Store<Environment<A, S, Q>>,
    request: LinkRequest,
) -> VmResult<Option<Vec<u8>>>
where
    A: Api + 'static,
    S: Storage + 'static,
    Q: Querier + 'static,
{
    let LinkRequest {
        address,
        point,
        args,
        contract,
        link,
        ..
    } = request;
    let cached = link.cache.resolve(&contract.checksum)?;

    let mut callee_args = Vec::with_capacity(args.len() + 1);
    callee_args.push(serde_json::to_vec(&contract.env)?);
    callee_args.extend(args);

    let consumed = store.fuel_consumed().unwrap_or(0);
    let env = store.data();
    let read_only = env.read_only;
    let request = CallableRequest {
        name: point.clone(),
        args: callee_args,
        read_only,
        budget: env.budget.saturating_sub(consumed),
        print_debug: env.print_debug,
        memory_limit: link.memory_limit,
        schedule: env.schedule,
        link: Some(link.descend(&address)),
    };
    let _span = tracing::debug_span!("dynamic_link", callee = %address, %point).entered();
    let (result, trace) =
        instance::call_callable_point(link.cache.engine(), &cached.module, contract.backend, request);

    store
        .consume_fuel(trace.gas_used)
        .map_err(|_| VmError::OutOfGas { used: 0, limit: 0 })?;
    let env = store.data_mut();
    env.linked_externally_used = env.linked_externally_used.saturating_add(trace.externally_used);

    let data = result.map_err(|err| match err {
        VmError::OutOfGas { .. } | VmError::DynamicLink(_) => err,
        other => VmError::DynamicLink(format!("{} on {} failed: {}", point, address, other)),
    })?;
    if !read_only {
        env.events.extend(trace.events);
        env.attributes.extend(trace.attributes);
    }
    tracing::debug!(gas_used = trace.gas_used, "Dynamic link finished");
    Ok(data)
}
