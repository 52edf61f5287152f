use super::dynamic_link::{self, CallablePointProperty, LinkContext, CALLABLE_POINTS_PROPERTIES_EXPORT};
use super::environment::Environment;
use super::imports;
use super::memory::{read_region, write_region};
use super::{engine_error, EntryPoint};
use crate::backend::{Api, Backend, Querier, Storage};
use crate::error::{VmError, VmResult};
use crate::gas_metering::GasSchedule;
use std::collections::HashMap;
use wasmi::core::ValueType;
use wasmi::{Engine, Func, FuncType, Instance, Memory, Module, ResumableCall, Store, Value};
use wasmvm_types::{Attribute, Event};

/// Max length of the serialized result an entry point may return
pub const MAX_LENGTH_RESULT: usize = 16 * 1024 * 1024;
/// Max length of the callable point table a contract may return
pub const MAX_LENGTH_PROPERTIES: usize = 64 * 1024;

/// Everything needed to run one entry point on a fresh instance.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub entry: EntryPoint,
    /// Serialized arguments in call order (env, [info,] msg)
    pub args: Vec<Vec<u8>>,
    pub budget: u64,
    pub print_debug: bool,
    pub memory_limit: usize,
    pub schedule: GasSchedule,
    pub link: Option<LinkContext>,
}

/// Everything needed to run one callable point on a fresh instance.
#[derive(Debug, Clone)]
pub struct CallableRequest {
    pub name: String,
    /// Serialized arguments in call order, the callee's env first
    pub args: Vec<Vec<u8>>,
    /// Permission inherited from the caller
    pub read_only: bool,
    pub budget: u64,
    pub print_debug: bool,
    pub memory_limit: usize,
    pub schedule: GasSchedule,
    pub link: Option<LinkContext>,
}

/// What the call spent and emitted, reported even when it failed.
#[derive(Debug, Clone, Default)]
pub struct CallTrace {
    pub gas_used: u64,
    pub externally_used: u64,
    pub events: Vec<Event>,
    pub attributes: Vec<Attribute>,
}

struct Setup {
    budget: u64,
    read_only: bool,
    print_debug: bool,
    memory_limit: usize,
    schedule: GasSchedule,
    link: Option<LinkContext>,
}

type EnvStore<A, S, Q> = Store<Environment<A, S, Q>>;

/// Instantiate `module` against `backend` and invoke one entry point.
pub fn call_entry_point<A, S, Q>(
    engine: &Engine,
    module: &Module,
    backend: Backend<A, S, Q>,
    request: CallRequest,
) -> (VmResult<Vec<u8>>, CallTrace)
where
    A: Api + 'static,
    S: Storage + 'static,
    Q: Querier + 'static,
{
    let entry = request.entry;
    if request.args.len() != entry.arity() {
        let err = VmError::InvalidArgument(format!(
            "{} takes {} arguments, got {}",
            entry.name(),
            entry.arity(),
            request.args.len()
        ));
        return (Err(err), CallTrace::default());
    }

    let setup = Setup {
        budget: request.budget,
        read_only: entry.is_read_only(),
        print_debug: request.print_debug,
        memory_limit: request.memory_limit,
        schedule: request.schedule,
        link: request.link,
    };
    let args = request.args;
    execute(engine, module, backend, setup, |store, instance, memory| {
        let func = instance
            .get_func(&*store, entry.name())
            .filter(|func| is_entry_signature(&func.ty(&*store), args.len()))
            .ok_or_else(|| VmError::FunctionNotFound(entry.name().to_string()))?;

        let mut params = Vec::with_capacity(args.len());
        for arg in &args {
            params.push(Value::I32(write_arg(instance, memory, store, arg)? as i32));
        }
        let mut results = [Value::I32(0)];
        invoke(store, instance, memory, func, &params, &mut results)?;

        let result_ptr = match results {
            [Value::I32(ptr)] => ptr as u32,
            _ => return Err(VmError::FunctionNotFound(entry.name().to_string())),
        };
        let data = read_region(memory, &*store, result_ptr, MAX_LENGTH_RESULT)?;
        deallocate(instance, store, result_ptr)?;
        Ok(data)
    })
}

/// Region pointers in, one region pointer out.
fn is_entry_signature(ty: &FuncType, arity: usize) -> bool {
    ty.params().len() == arity
        && ty.params().iter().all(|p| *p == ValueType::I32)
        && ty.results() == [ValueType::I32]
}

/// Instantiate `module` against `backend` and invoke a callable point.
///
/// The point must be declared callable by the contract. A read-only caller
/// can only reach read-only points; otherwise the instance runs with the
/// permission the point declares. Returns the point's result region, if it
/// has one.
pub fn call_callable_point<A, S, Q>(
    engine: &Engine,
    module: &Module,
    backend: Backend<A, S, Q>,
    request: CallableRequest,
) -> (VmResult<Option<Vec<u8>>>, CallTrace)
where
    A: Api + 'static,
    S: Storage + 'static,
    Q: Querier + 'static,
{
    let setup = Setup {
        budget: request.budget,
        read_only: request.read_only,
        print_debug: request.print_debug,
        memory_limit: request.memory_limit,
        schedule: request.schedule,
        link: request.link,
    };
    let (name, args, caller_read_only) = (request.name, request.args, request.read_only);
    execute(engine, module, backend, setup, |store, instance, memory| {
        let properties = callable_points(instance, memory, store)?;
        let property = properties
            .get(&name)
            .ok_or_else(|| VmError::DynamicLink(format!("{} is not a callable point", name)))?;
        if !property.is_callable {
            return Err(VmError::DynamicLink(format!("{} is not callable", name)));
        }
        if caller_read_only && !property.is_read_only {
            return Err(VmError::DynamicLink(
                "It is not possible to inherit from read-only permission to read-write permission"
                    .to_string(),
            ));
        }
        store.data_mut().set_read_only(property.is_read_only);

        let func = instance
            .get_func(&*store, &name)
            .ok_or_else(|| VmError::FunctionNotFound(name.clone()))?;
        let ty = func.ty(&*store);
        if ty.params().len() != args.len() {
            return Err(VmError::InvalidArgument(format!(
                "{} takes {} arguments, got {}",
                name,
                ty.params().len(),
                args.len()
            )));
        }
        if ty.results().len() > 1 {
            return Err(VmError::DynamicLink(format!("{} returns more than one value", name)));
        }

        let mut params = Vec::with_capacity(args.len());
        for arg in &args {
            let ptr = write_arg(instance, memory, store, arg)?;
            params.push(Value::I32(ptr as i32));
        }
        let mut results = vec![Value::I32(0); ty.results().len()];
        invoke(store, instance, memory, func, &params, &mut results)?;

        match results.first() {
            None => Ok(None),
            Some(Value::I32(ptr)) => {
                let ptr = *ptr as u32;
                let data = read_region(memory, &*store, ptr, MAX_LENGTH_RESULT)?;
                deallocate(instance, store, ptr)?;
                Ok(Some(data))
            }
            Some(_) => Err(VmError::DynamicLink(format!("{} must return a region pointer", name))),
        }
    })
}

/// Run `body` on a fresh instance and collect what the call spent and emitted.
fn execute<A, S, Q, T>(
    engine: &Engine,
    module: &Module,
    backend: Backend<A, S, Q>,
    setup: Setup,
    body: impl FnOnce(&mut EnvStore<A, S, Q>, &Instance, &Memory) -> VmResult<T>,
) -> (VmResult<T>, CallTrace)
where
    A: Api + 'static,
    S: Storage + 'static,
    Q: Querier + 'static,
{
    let budget = setup.budget;
    let env = Environment::new(
        backend,
        setup.schedule,
        budget,
        setup.read_only,
        setup.print_debug,
        setup.memory_limit,
    )
    .with_link(setup.link);
    let mut store = Store::new(engine, env);
    store.limiter(|env| &mut env.limits);

    let result = match instantiate(engine, module, &mut store, budget) {
        Ok((instance, memory)) => body(&mut store, &instance, &memory),
        Err(err) => Err(err),
    };
    let consumed = store.fuel_consumed().unwrap_or(0).min(budget);

    let env = store.data_mut();
    let result = match result {
        Ok(data) => Ok(data),
        Err(engine_err) => Err(env.pending_error.take().unwrap_or(engine_err)),
    };
    env.storage.close_all();

    let (result, gas_used) = match result {
        Err(err) if err.is_out_of_gas() => (
            Err(VmError::OutOfGas {
                used: budget,
                limit: budget,
            }),
            budget,
        ),
        other => (other, consumed),
    };

    let trace = CallTrace {
        gas_used,
        externally_used: env.externally_used(),
        events: std::mem::take(&mut env.events),
        attributes: std::mem::take(&mut env.attributes),
    };
    (result, trace)
}

/// Call `func`, serving the dynamic link requests it makes on the way.
///
/// A linked contract is never run from inside a host function: the host
/// function records the request and suspends the caller, the callee runs
/// here and the caller resumes with the callee's result.
fn invoke<A, S, Q>(
    store: &mut EnvStore<A, S, Q>,
    instance: &Instance,
    memory: &Memory,
    func: Func,
    params: &[Value],
    results: &mut [Value],
) -> VmResult<()>
where
    A: Api + 'static,
    S: Storage + 'static,
    Q: Querier + 'static,
{
    let mut call = func
        .call_resumable(&mut *store, params, results)
        .map_err(engine_error)?;
    while let ResumableCall::Resumable(invocation) = call {
        let request = match store.data_mut().pending_link.take() {
            Some(request) => request,
            None => return Err(VmError::Trap(invocation.host_error().to_string())),
        };
        let returns_value = request.returns_value();
        let data = dynamic_link::complete(store, request)?;

        let outputs = match (returns_value, data) {
            (true, Some(data)) => vec![Value::I32(write_arg(instance, memory, store, &data)? as i32)],
            (true, None) => {
                return Err(VmError::DynamicLink(
                    "Callable point returned no value where one was expected".to_string(),
                ))
            }
            (false, _) => Vec::new(),
        };
        call = invocation
            .resume(&mut *store, &outputs, results)
            .map_err(engine_error)?;
    }
    Ok(())
}

fn instantiate<A, S, Q>(
    engine: &Engine,
    module: &Module,
    store: &mut EnvStore<A, S, Q>,
    budget: u64,
) -> VmResult<(Instance, Memory)>
where
    A: Api + 'static,
    S: Storage + 'static,
    Q: Querier + 'static,
{
    store
        .add_fuel(budget)
        .map_err(|e| VmError::Instantiation(format!("Cannot set gas budget: {}", e)))?;

    let mut linker = imports::linker::<A, S, Q>(engine)?;
    dynamic_link::define_imports(&mut linker, module)?;
    let instance = linker
        .instantiate(&mut *store, module)
        .and_then(|pre| pre.start(&mut *store))
        .map_err(|e| match engine_error(e) {
            VmError::Trap(msg) => VmError::Instantiation(msg),
            other => other,
        })?;

    let memory = instance
        .get_memory(&*store, "memory")
        .ok_or_else(|| VmError::FunctionNotFound("memory".to_string()))?;
    Ok((instance, memory))
}

/// Callable points the contract declares, keyed by export name.
fn callable_points<A, S, Q>(
    instance: &Instance,
    memory: &Memory,
    store: &mut EnvStore<A, S, Q>,
) -> VmResult<HashMap<String, CallablePointProperty>>
where
    A: Api,
    S: Storage,
    Q: Querier,
{
    let ptr = instance
        .get_typed_func::<(), u32>(&*store, CALLABLE_POINTS_PROPERTIES_EXPORT)
        .map_err(|_| VmError::DynamicLink("Contract does not declare callable points".to_string()))?
        .call(&mut *store, ())
        .map_err(|e| engine_error(e.into()))?;
    let raw = read_region(memory, &*store, ptr, MAX_LENGTH_PROPERTIES)?;
    deallocate(instance, store, ptr)?;
    serde_json::from_slice(&raw)
        .map_err(|e| VmError::DynamicLink(format!("Invalid callable point properties: {}", e)))
}

fn write_arg<A, S, Q>(
    instance: &Instance,
    memory: &Memory,
    store: &mut EnvStore<A, S, Q>,
    data: &[u8],
) -> VmResult<u32>
where
    A: Api,
    S: Storage,
    Q: Querier,
{
    let length = u32::try_from(data.len())
        .map_err(|_| VmError::InvalidArgument("Argument exceeds 4 GiB".to_string()))?;
    let region_ptr = instance
        .get_typed_func::<u32, u32>(&*store, "allocate")
        .map_err(|_| VmError::FunctionNotFound("allocate".to_string()))?
        .call(&mut *store, length)
        .map_err(|e| engine_error(e.into()))?;
    write_region(memory, &mut *store, region_ptr, data)?;
    Ok(region_ptr)
}

fn deallocate<A, S, Q>(instance: &Instance, store: &mut EnvStore<A, S, Q>, ptr: u32) -> VmResult<()>
where
    A: Api,
    S: Storage,
    Q: Querier,
{
    instance
        .get_typed_func::<u32, ()>(&*store, "deallocate")
        .map_err(|_| VmError::FunctionNotFound("deallocate".to_string()))?
        .call(&mut *store, ptr)
        .map_err(|e| engine_error(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{compile, new_engine};
    use crate::testing::mock_backend;

    /// Echoes the msg argument back and writes it to storage under "k".
    const ECHO: &str = r#"
    (module
      (import "env" "db_write" (func $db_write (param i32 i32)))
      (memory (export "memory") 2)
      (global $heap (mut i32) (i32.const 1024))
      (data (i32.const 16) "k")
      (data (i32.const 32) "\10\00\00\00\01\00\00\00\01\00\00\00")
      (func $allocate (export "allocate") (param $size i32) (result i32)
        (local $region i32)
        (local.set $region (global.get $heap))
        (i32.store (local.get $region) (i32.add (local.get $region) (i32.const 12)))
        (i32.store offset=4 (local.get $region) (local.get $size))
        (i32.store offset=8 (local.get $region) (i32.const 0))
        (global.set $heap (i32.add (global.get $heap) (i32.add (local.get $size) (i32.const 12))))
        (local.get $region))
      (func (export "deallocate") (param i32))
      (func (export "query") (param $env i32) (param $msg i32) (result i32)
        (local.get $msg))
      (func (export "sudo") (param $env i32) (param $msg i32) (result i32)
        (call $db_write (i32.const 32) (local.get $msg))
        (local.get $msg))
    )"#;

    fn request(entry: EntryPoint, budget: u64) -> CallRequest {
        CallRequest {
            entry,
            args: vec![b"{}".to_vec(), b"hello".to_vec()],
            budget,
            print_debug: false,
            memory_limit: 16 * 1024 * 1024,
            schedule: GasSchedule::default(),
            link: None,
        }
    }

    #[test]
    fn test_query_echoes_message() {
        let engine = new_engine();
        let module = compile(&engine, &wat::parse_str(ECHO).unwrap()).unwrap();
        let backend = mock_backend(&[]);

        let (result, trace) = call_entry_point(&engine, &module, backend, request(EntryPoint::Query, 1_000_000));
        assert_eq!(result.unwrap(), b"hello");
        assert!(trace.gas_used > 0);
        assert!(trace.gas_used < 1_000_000);
    }

    #[test]
    fn test_sudo_writes_storage() {
        let engine = new_engine();
        let module = compile(&engine, &wat::parse_str(ECHO).unwrap()).unwrap();
        let backend = mock_backend(&[]);
        let storage = backend.storage.clone();

        let (result, trace) = call_entry_point(&engine, &module, backend, request(EntryPoint::Sudo, 1_000_000));
        assert_eq!(result.unwrap(), b"hello");
        assert_eq!(storage.raw_get(b"k"), Some(b"hello".to_vec()));
        assert!(trace.gas_used >= GasSchedule::default().db_write);
    }

    #[test]
    fn test_out_of_gas_reports_full_budget() {
        let engine = new_engine();
        let module = compile(&engine, &wat::parse_str(ECHO).unwrap()).unwrap();
        let backend = mock_backend(&[]);
        let storage = backend.storage.clone();

        let (result, trace) = call_entry_point(&engine, &module, backend, request(EntryPoint::Sudo, 1_500));
        assert_eq!(result.unwrap_err(), VmError::OutOfGas { used: 1_500, limit: 1_500 });
        assert_eq!(trace.gas_used, 1_500);
        assert_eq!(storage.raw_get(b"k"), None);
    }

    #[test]
    fn test_missing_entry_point() {
        let engine = new_engine();
        let module = compile(&engine, &wat::parse_str(ECHO).unwrap()).unwrap();
        let backend = mock_backend(&[]);

        let (result, _) = call_entry_point(&engine, &module, backend, request(EntryPoint::Reply, 1_000_000));
        assert_eq!(result.unwrap_err(), VmError::FunctionNotFound("reply".to_string()));
    }

    #[test]
    fn test_wrong_argument_count() {
        let engine = new_engine();
        let module = compile(&engine, &wat::parse_str(ECHO).unwrap()).unwrap();
        let backend = mock_backend(&[]);

        let mut req = request(EntryPoint::Execute, 1_000_000);
        req.args.truncate(1);
        let (result, _) = call_entry_point(&engine, &module, backend, req);
        assert!(matches!(result, Err(VmError::InvalidArgument(_))));
    }
}
