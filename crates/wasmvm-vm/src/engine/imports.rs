//! Host functions imported by contracts from the `env` module.
//!
//! Every function reads its arguments out of contract memory, runs the
//! matching gateway operation under gas metering and writes results back
//! through the contract's `allocate` export. A failing host function records
//! its error in the environment and traps, so the caller can report the
//! typed error rather than the engine's trap message.

use super::engine_error;
use super::environment::Environment;
use super::memory::{maybe_read_region, read_region, write_region};
use crate::backend::{Api, Querier, Storage};
use crate::error::{VmError, VmResult};
use crate::gas_metering::GasTracker;
use wasmi::core::Trap;
use wasmi::{Caller, Engine, Extern, Linker, Memory};
use wasmvm_types::{Attribute, Event, Order};

/// Max key length for db_write/db_read/db_remove/db_scan
pub const MAX_LENGTH_DB_KEY: usize = 64 * 1024;
/// Max value length for db_write
pub const MAX_LENGTH_DB_VALUE: usize = 128 * 1024;
/// Max length of a human readable or canonical address
pub const MAX_LENGTH_ADDRESS: usize = 256;
/// Max length of a serialized chain query
pub const MAX_LENGTH_QUERY_CHAIN_REQUEST: usize = 64 * 1024;
/// Max length of a debug message
pub const MAX_LENGTH_DEBUG: usize = 2 * 1024;
/// Max length of an abort message
pub const MAX_LENGTH_ABORT: usize = 2 * 1024;
/// Max length of serialized events/attributes handed to the side channel
pub const MAX_LENGTH_EVENT_VALUES: usize = 100 * 1024;

/// Names a contract may import from the `env` module.
pub const SUPPORTED_IMPORTS: &[&str] = &[
    "db_read",
    "db_write",
    "db_remove",
    "db_scan",
    "db_next",
    "addr_validate",
    "addr_canonicalize",
    "addr_humanize",
    "query_chain",
    "debug",
    "abort",
    "add_attribute",
    "add_attributes",
    "add_event",
    "add_events",
];

pub const IMPORT_MODULE: &str = "env";

pub(super) type Ctx<'a, A, S, Q> = Caller<'a, Environment<A, S, Q>>;

pub(super) fn memory<T>(caller: &Caller<'_, T>) -> VmResult<Memory> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| VmError::InvalidHostInput("Contract does not export memory".to_string()))
}

/// Run a gateway operation against the fuel left in the store and burn
/// whatever gas it consumed.
pub(super) fn metered<A, S, Q, T>(
    caller: &mut Ctx<'_, A, S, Q>,
    op: impl FnOnce(&mut Environment<A, S, Q>, &mut GasTracker) -> VmResult<T>,
) -> VmResult<T>
where
    A: Api,
    S: Storage,
    Q: Querier,
{
    let consumed = caller.fuel_consumed().unwrap_or(0);
    let (budget, schedule) = {
        let env = caller.data();
        (env.budget, env.schedule)
    };

    let mut gas = GasTracker::resume(budget, consumed, schedule);
    let result = op(caller.data_mut(), &mut gas);

    let exhausted = matches!(&result, Err(e) if e.is_out_of_gas());
    let delta = gas.used().saturating_sub(consumed);
    if delta > 0 && !exhausted {
        caller.consume_fuel(delta).map_err(|_| VmError::OutOfGas {
            used: budget,
            limit: budget,
        })?;
    }
    result
}

/// Copy `data` into a fresh region allocated by the contract.
pub(super) fn write_to_contract<A, S, Q>(caller: &mut Ctx<'_, A, S, Q>, data: &[u8]) -> VmResult<u32>
where
    A: Api,
    S: Storage,
    Q: Querier,
{
    let length = u32::try_from(data.len())
        .map_err(|_| VmError::InvalidHostInput("Data exceeds 4 GiB".to_string()))?;
    let allocate = caller
        .get_export("allocate")
        .and_then(Extern::into_func)
        .ok_or_else(|| VmError::FunctionNotFound("allocate".to_string()))?
        .typed::<u32, u32>(&*caller)
        .map_err(|e| VmError::InvalidWasm(e.to_string()))?;
    let region_ptr = allocate
        .call(&mut *caller, length)
        .map_err(|e| engine_error(e.into()))?;

    let memory = memory(caller)?;
    write_region(&memory, &mut *caller, region_ptr, data)?;
    Ok(region_ptr)
}

/// Turn a failed host operation into a trap, remembering the typed error.
pub(super) fn finish<A, S, Q, T>(caller: &mut Ctx<'_, A, S, Q>, result: VmResult<T>) -> Result<T, Trap>
where
    A: Api,
    S: Storage,
    Q: Querier,
{
    result.map_err(|err| {
        tracing::debug!(error = %err, "Host function failed");
        let trap = Trap::new(err.to_string());
        caller.data_mut().pending_error = Some(err);
        trap
    })
}

pub(super) fn utf8(bytes: Vec<u8>, what: &str) -> VmResult<String> {
    String::from_utf8(bytes).map_err(|_| VmError::InvalidHostInput(format!("{} is not valid UTF-8", what)))
}

fn do_db_read<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, key_ptr: u32) -> VmResult<u32> {
    let memory = memory(caller)?;
    let key = read_region(&memory, &*caller, key_ptr, MAX_LENGTH_DB_KEY)?;
    let value = metered(caller, |env, gas| env.storage.get(gas, &key))?;
    match value {
        Some(value) => write_to_contract(caller, &value),
        None => Ok(0),
    }
}

fn do_db_write<A: Api, S: Storage, Q: Querier>(
    caller: &mut Ctx<'_, A, S, Q>,
    key_ptr: u32,
    value_ptr: u32,
) -> VmResult<()> {
    caller.data().check_writable("db_write")?;
    let memory = memory(caller)?;
    let key = read_region(&memory, &*caller, key_ptr, MAX_LENGTH_DB_KEY)?;
    let value = read_region(&memory, &*caller, value_ptr, MAX_LENGTH_DB_VALUE)?;
    metered(caller, |env, gas| env.storage.set(gas, &key, &value))
}

fn do_db_remove<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, key_ptr: u32) -> VmResult<()> {
    caller.data().check_writable("db_remove")?;
    let memory = memory(caller)?;
    let key = read_region(&memory, &*caller, key_ptr, MAX_LENGTH_DB_KEY)?;
    metered(caller, |env, gas| env.storage.remove(gas, &key))
}

fn do_db_scan<A: Api, S: Storage, Q: Querier>(
    caller: &mut Ctx<'_, A, S, Q>,
    start_ptr: u32,
    end_ptr: u32,
    order: i32,
) -> VmResult<u32> {
    let memory = memory(caller)?;
    let start = maybe_read_region(&memory, &*caller, start_ptr, MAX_LENGTH_DB_KEY)?;
    let end = maybe_read_region(&memory, &*caller, end_ptr, MAX_LENGTH_DB_KEY)?;
    let order = Order::try_from(order).map_err(|e| VmError::InvalidHostInput(e.to_string()))?;
    metered(caller, |env, gas| {
        env.storage.scan(gas, start.as_deref(), end.as_deref(), order)
    })
}

/// Records are encoded as `key || value || key_len (u32, big endian)`;
/// an exhausted iterator yields an empty region.
fn do_db_next<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, iterator_id: u32) -> VmResult<u32> {
    let record = metered(caller, |env, gas| env.storage.next(gas, iterator_id))?;
    let out = match record {
        Some((key, value)) => {
            let key_len = key.len() as u32;
            let mut out = key;
            out.extend_from_slice(&value);
            out.extend_from_slice(&key_len.to_be_bytes());
            out
        }
        None => Vec::new(),
    };
    write_to_contract(caller, &out)
}

fn do_addr_validate<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, source_ptr: u32) -> VmResult<u32> {
    let memory = memory(caller)?;
    let source = read_region(&memory, &*caller, source_ptr, MAX_LENGTH_ADDRESS)?;
    let human = match String::from_utf8(source) {
        Ok(human) => human,
        Err(_) => return write_to_contract(caller, b"Input is not valid UTF-8"),
    };

    match metered(caller, |env, gas| env.api.validate(gas, &human))? {
        Ok(()) => Ok(0),
        Err(msg) => write_to_contract(caller, msg.as_bytes()),
    }
}

fn do_addr_canonicalize<A: Api, S: Storage, Q: Querier>(
    caller: &mut Ctx<'_, A, S, Q>,
    source_ptr: u32,
    destination_ptr: u32,
) -> VmResult<u32> {
    let memory = memory(caller)?;
    let source = read_region(&memory, &*caller, source_ptr, MAX_LENGTH_ADDRESS)?;
    let human = match String::from_utf8(source) {
        Ok(human) => human,
        Err(_) => return write_to_contract(caller, b"Input is not valid UTF-8"),
    };

    match metered(caller, |env, gas| env.api.canonicalize(gas, &human))? {
        Ok(canonical) => {
            write_region(&memory, &mut *caller, destination_ptr, &canonical)?;
            Ok(0)
        }
        Err(msg) => write_to_contract(caller, msg.as_bytes()),
    }
}

fn do_addr_humanize<A: Api, S: Storage, Q: Querier>(
    caller: &mut Ctx<'_, A, S, Q>,
    source_ptr: u32,
    destination_ptr: u32,
) -> VmResult<u32> {
    let memory = memory(caller)?;
    let canonical = read_region(&memory, &*caller, source_ptr, MAX_LENGTH_ADDRESS)?;

    match metered(caller, |env, gas| env.api.humanize(gas, &canonical))? {
        Ok(human) => {
            write_region(&memory, &mut *caller, destination_ptr, human.as_bytes())?;
            Ok(0)
        }
        Err(msg) => write_to_contract(caller, msg.as_bytes()),
    }
}

fn do_query_chain<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, request_ptr: u32) -> VmResult<u32> {
    let memory = memory(caller)?;
    let request = read_region(&memory, &*caller, request_ptr, MAX_LENGTH_QUERY_CHAIN_REQUEST)?;
    let output = metered(caller, |env, gas| env.querier.query_raw(gas, &request))?;
    let serialized = serde_json::to_vec(&output)
        .map_err(|e| VmError::InvalidHostInput(format!("Cannot serialize query result: {}", e)))?;
    write_to_contract(caller, &serialized)
}

fn do_debug<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, source_ptr: u32) -> VmResult<()> {
    let memory = memory(caller)?;
    let message = read_region(&memory, &*caller, source_ptr, MAX_LENGTH_DEBUG)?;
    metered(caller, |env, gas| {
        gas.charge_with_bytes(env.schedule.debug, env.schedule.event_per_byte, message.len())
    })?;

    if caller.data().print_debug {
        tracing::info!(
            target: "wasmvm::contract",
            message = %String::from_utf8_lossy(&message),
            "Contract debug"
        );
    }
    Ok(())
}

fn do_abort<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, source_ptr: u32) -> VmResult<()> {
    let memory = memory(caller)?;
    let message = read_region(&memory, &*caller, source_ptr, MAX_LENGTH_ABORT)?;
    Err(VmError::Aborted(String::from_utf8_lossy(&message).into_owned()))
}

fn push_attributes<A: Api, S: Storage, Q: Querier>(
    caller: &mut Ctx<'_, A, S, Q>,
    attributes: Vec<Attribute>,
    raw_len: usize,
) -> VmResult<()> {
    if attributes.iter().any(|a| a.key.trim().is_empty()) {
        return Err(VmError::InvalidHostInput("Empty attribute key".to_string()));
    }
    metered(caller, |env, gas| {
        let base = env.schedule.attribute.saturating_mul(attributes.len() as u64);
        gas.charge_with_bytes(base, env.schedule.event_per_byte, raw_len)?;
        env.attributes.extend(attributes);
        Ok(())
    })
}

fn push_events<A: Api, S: Storage, Q: Querier>(
    caller: &mut Ctx<'_, A, S, Q>,
    events: Vec<Event>,
    raw_len: usize,
) -> VmResult<()> {
    if events.iter().any(|e| e.ty.trim().is_empty()) {
        return Err(VmError::InvalidHostInput("Empty event type".to_string()));
    }
    metered(caller, |env, gas| {
        let base = env.schedule.event.saturating_mul(events.len() as u64);
        gas.charge_with_bytes(base, env.schedule.event_per_byte, raw_len)?;
        env.events.extend(events);
        Ok(())
    })
}

fn do_add_attribute<A: Api, S: Storage, Q: Querier>(
    caller: &mut Ctx<'_, A, S, Q>,
    key_ptr: u32,
    value_ptr: u32,
) -> VmResult<()> {
    caller.data().check_writable("add_attribute")?;
    let memory = memory(caller)?;
    let key = utf8(read_region(&memory, &*caller, key_ptr, MAX_LENGTH_EVENT_VALUES)?, "Attribute key")?;
    let value = utf8(read_region(&memory, &*caller, value_ptr, MAX_LENGTH_EVENT_VALUES)?, "Attribute value")?;
    let raw_len = key.len() + value.len();
    push_attributes(caller, vec![Attribute { key, value }], raw_len)
}

fn do_add_attributes<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, json_ptr: u32) -> VmResult<()> {
    caller.data().check_writable("add_attributes")?;
    let memory = memory(caller)?;
    let raw = read_region(&memory, &*caller, json_ptr, MAX_LENGTH_EVENT_VALUES)?;
    let attributes: Vec<Attribute> = serde_json::from_slice(&raw)
        .map_err(|e| VmError::InvalidHostInput(format!("Invalid attributes: {}", e)))?;
    push_attributes(caller, attributes, raw.len())
}

fn do_add_event<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, json_ptr: u32) -> VmResult<()> {
    caller.data().check_writable("add_event")?;
    let memory = memory(caller)?;
    let raw = read_region(&memory, &*caller, json_ptr, MAX_LENGTH_EVENT_VALUES)?;
    let event: Event = serde_json::from_slice(&raw)
        .map_err(|e| VmError::InvalidHostInput(format!("Invalid event: {}", e)))?;
    push_events(caller, vec![event], raw.len())
}

fn do_add_events<A: Api, S: Storage, Q: Querier>(caller: &mut Ctx<'_, A, S, Q>, json_ptr: u32) -> VmResult<()> {
    caller.data().check_writable("add_events")?;
    let memory = memory(caller)?;
    let raw = read_region(&memory, &*caller, json_ptr, MAX_LENGTH_EVENT_VALUES)?;
    let events: Vec<Event> = serde_json::from_slice(&raw)
        .map_err(|e| VmError::InvalidHostInput(format!("Invalid events: {}", e)))?;
    push_events(caller, events, raw.len())
}

pub(super) fn link_error(e: impl std::fmt::Display) -> VmError {
    VmError::Instantiation(format!("Cannot register host function: {}", e))
}

/// Build a linker exposing every supported host function.
pub fn linker<A, S, Q>(engine: &Engine) -> VmResult<Linker<Environment<A, S, Q>>>
where
    A: Api + 'static,
    S: Storage + 'static,
    Q: Querier + 'static,
{
    let mut linker = Linker::new(engine);

    linker
        .func_wrap(IMPORT_MODULE, "db_read", |mut caller: Ctx<'_, A, S, Q>, key_ptr: u32| {
            let result = do_db_read(&mut caller, key_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "db_write",
            |mut caller: Ctx<'_, A, S, Q>, key_ptr: u32, value_ptr: u32| {
                let result = do_db_write(&mut caller, key_ptr, value_ptr);
                finish(&mut caller, result)
            },
        )
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "db_remove", |mut caller: Ctx<'_, A, S, Q>, key_ptr: u32| {
            let result = do_db_remove(&mut caller, key_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "db_scan",
            |mut caller: Ctx<'_, A, S, Q>, start_ptr: u32, end_ptr: u32, order: i32| {
                let result = do_db_scan(&mut caller, start_ptr, end_ptr, order);
                finish(&mut caller, result)
            },
        )
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "db_next", |mut caller: Ctx<'_, A, S, Q>, iterator_id: u32| {
            let result = do_db_next(&mut caller, iterator_id);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "addr_validate", |mut caller: Ctx<'_, A, S, Q>, source_ptr: u32| {
            let result = do_addr_validate(&mut caller, source_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "addr_canonicalize",
            |mut caller: Ctx<'_, A, S, Q>, source_ptr: u32, destination_ptr: u32| {
                let result = do_addr_canonicalize(&mut caller, source_ptr, destination_ptr);
                finish(&mut caller, result)
            },
        )
        .map_err(link_error)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "addr_humanize",
            |mut caller: Ctx<'_, A, S, Q>, source_ptr: u32, destination_ptr: u32| {
                let result = do_addr_humanize(&mut caller, source_ptr, destination_ptr);
                finish(&mut caller, result)
            },
        )
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "query_chain", |mut caller: Ctx<'_, A, S, Q>, request_ptr: u32| {
            let result = do_query_chain(&mut caller, request_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "debug", |mut caller: Ctx<'_, A, S, Q>, source_ptr: u32| {
            let result = do_debug(&mut caller, source_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "abort", |mut caller: Ctx<'_, A, S, Q>, source_ptr: u32| {
            let result = do_abort(&mut caller, source_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(
            IMPORT_MODULE,
            "add_attribute",
            |mut caller: Ctx<'_, A, S, Q>, key_ptr: u32, value_ptr: u32| {
                let result = do_add_attribute(&mut caller, key_ptr, value_ptr);
                finish(&mut caller, result)
            },
        )
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "add_attributes", |mut caller: Ctx<'_, A, S, Q>, json_ptr: u32| {
            let result = do_add_attributes(&mut caller, json_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "add_event", |mut caller: Ctx<'_, A, S, Q>, json_ptr: u32| {
            let result = do_add_event(&mut caller, json_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;
    linker
        .func_wrap(IMPORT_MODULE, "add_events", |mut caller: Ctx<'_, A, S, Q>, json_ptr: u32| {
            let result = do_add_events(&mut caller, json_ptr);
            finish(&mut caller, result)
        })
        .map_err(link_error)?;

    Ok(linker)
}
