//! Binding to the wasmi interpreter: compilation, host imports and calls
//! into contract entry points.

pub mod dynamic_link;
pub mod environment;
pub mod imports;
pub mod instance;
pub mod memory;
pub mod static_analysis;

pub use environment::Environment;
pub use memory::Region;

use crate::error::{VmError, VmResult};
use wasmi::core::TrapCode;
use wasmi::{Config, Engine, Module};

/// Create an engine with fuel metering enabled.
pub fn new_engine() -> Engine {
    let mut config = Config::default();
    config.consume_fuel(true);
    Engine::new(&config)
}

/// Compile bytecode, rejecting anything the engine cannot validate.
pub fn compile(engine: &Engine, wasm: &[u8]) -> VmResult<Module> {
    Module::new(engine, wasm).map_err(|e| VmError::InvalidWasm(e.to_string()))
}

/// Translate an engine error; fuel exhaustion becomes out-of-gas with the
/// amounts filled in by the caller that knows the budget.
pub(crate) fn engine_error(err: wasmi::Error) -> VmError {
    match &err {
        wasmi::Error::Trap(trap) if matches!(trap.trap_code(), Some(TrapCode::OutOfFuel)) => {
            VmError::OutOfGas { used: 0, limit: 0 }
        }
        _ => VmError::Trap(err.to_string()),
    }
}

/// Contract entry points a lifecycle call can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Instantiate,
    Execute,
    Query,
    Migrate,
    Sudo,
    Reply,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 6] = [
        EntryPoint::Instantiate,
        EntryPoint::Execute,
        EntryPoint::Query,
        EntryPoint::Migrate,
        EntryPoint::Sudo,
        EntryPoint::Reply,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::Instantiate => "instantiate",
            EntryPoint::Execute => "execute",
            EntryPoint::Query => "query",
            EntryPoint::Migrate => "migrate",
            EntryPoint::Sudo => "sudo",
            EntryPoint::Reply => "reply",
        }
    }

    /// Number of region pointers the entry point takes: env, [info,] msg
    pub fn arity(&self) -> usize {
        match self {
            EntryPoint::Instantiate | EntryPoint::Execute => 3,
            _ => 2,
        }
    }

    /// Queries must not change state or emit events.
    pub fn is_read_only(&self) -> bool {
        matches!(self, EntryPoint::Query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_points() {
        assert_eq!(EntryPoint::Instantiate.arity(), 3);
        assert_eq!(EntryPoint::Reply.arity(), 2);
        assert!(EntryPoint::Query.is_read_only());
        assert!(!EntryPoint::Sudo.is_read_only());
        assert_eq!(EntryPoint::ALL.len(), 6);
    }

    #[test]
    fn test_compile_rejects_garbage() {
        let engine = new_engine();
        assert!(matches!(
            compile(&engine, b"not wasm"),
            Err(VmError::InvalidWasm(_))
        ));
    }

    #[test]
    fn test_fuel_exhaustion_is_out_of_gas() {
        let engine = new_engine();
        let wasm = wat::parse_str(r#"(module (func (export "spin") (loop br 0)))"#).unwrap();
        let module = compile(&engine, &wasm).unwrap();
        let mut store = wasmi::Store::new(&engine, ());
        store.add_fuel(1_000).unwrap();
        let instance = wasmi::Linker::<()>::new(&engine)
            .instantiate(&mut store, &module)
            .unwrap()
            .start(&mut store)
            .unwrap();
        let spin = instance.get_func(&store, "spin").unwrap();
        let err = spin.call(&mut store, &[], &mut []).unwrap_err();
        assert!(matches!(engine_error(err), VmError::OutOfGas { .. }));
    }

    #[test]
    fn test_compile_minimal_module() {
        let engine = new_engine();
        let wasm = wat::parse_str("(module)").unwrap();
        assert!(compile(&engine, &wasm).is_ok());
    }
}
