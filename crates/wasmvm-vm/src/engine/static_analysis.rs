//! Checks run on bytecode before it is accepted into the code store.

use super::dynamic_link::{self, is_dynamic_link_module};
use super::imports::{IMPORT_MODULE, SUPPORTED_IMPORTS};
use crate::error::{VmError, VmResult};
use std::collections::{BTreeSet, HashSet};
use wasmi::{ExternType, Module};
use wasmvm_types::AnalysisReport;

/// Largest bytecode accepted by `create`
pub const MAX_WASM_SIZE: usize = 3 * 1024 * 1024;

/// Exports every contract needs for the host to pass data in and out
pub const REQUIRED_EXPORTS: &[&str] = &["allocate", "deallocate"];

pub const ENTRY_POINTS: &[&str] = &["instantiate", "execute", "query", "migrate", "sudo", "reply"];

pub const IBC_ENTRY_POINTS: &[&str] = &[
    "ibc_channel_open",
    "ibc_channel_connect",
    "ibc_channel_close",
    "ibc_packet_receive",
    "ibc_packet_ack",
    "ibc_packet_timeout",
];

/// Prefix of exports a contract uses to declare a needed host capability
pub const CAPABILITY_EXPORT_PREFIX: &str = "requires_";

/// Parse a comma separated capability list, ignoring blanks.
pub fn capabilities_from_csv(csv: &str) -> HashSet<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn check_size(wasm: &[u8]) -> VmResult<()> {
    if wasm.len() > MAX_WASM_SIZE {
        return Err(VmError::CodeSizeExceeded {
            size: wasm.len(),
            limit: MAX_WASM_SIZE,
        });
    }
    Ok(())
}

/// Validate the shape of a compiled contract against what the host supports.
pub fn check_wasm(module: &Module, available: &HashSet<String>) -> VmResult<()> {
    check_memory(module)?;
    check_required_exports(module)?;
    check_entry_points(module)?;
    check_imports(module)?;
    check_capabilities(module, available)
}

fn func_exports(module: &Module) -> BTreeSet<String> {
    module
        .exports()
        .filter(|e| matches!(e.ty(), ExternType::Func(_)))
        .map(|e| e.name().to_string())
        .collect()
}

fn check_memory(module: &Module) -> VmResult<()> {
    let exported = module
        .exports()
        .any(|e| e.name() == "memory" && matches!(e.ty(), ExternType::Memory(_)));
    if !exported {
        return Err(VmError::InvalidWasm(
            "Wasm contract doesn't have a memory section".to_string(),
        ));
    }
    Ok(())
}

fn check_required_exports(module: &Module) -> VmResult<()> {
    let exports = func_exports(module);
    let missing: Vec<&str> = REQUIRED_EXPORTS
        .iter()
        .copied()
        .filter(|name| !exports.contains(*name))
        .collect();
    if !missing.is_empty() {
        return Err(VmError::InvalidWasm(format!(
            "Wasm contract doesn't have required export: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn check_entry_points(module: &Module) -> VmResult<()> {
    let exports = func_exports(module);
    if !ENTRY_POINTS.iter().any(|name| exports.contains(*name)) {
        return Err(VmError::InvalidWasm(
            "Wasm contract doesn't export any entry point".to_string(),
        ));
    }
    Ok(())
}

fn check_imports(module: &Module) -> VmResult<()> {
    for import in module.imports() {
        let name = format!("{}.{}", import.module(), import.name());
        let ty = match import.ty() {
            ExternType::Func(ty) => ty,
            _ => {
                return Err(VmError::InvalidWasm(format!(
                    "Wasm contract import \"{}\" is not a function",
                    name
                )))
            }
        };
        if is_dynamic_link_module(import.module()) {
            dynamic_link::check_import_signature(&name, ty)?;
            continue;
        }
        if import.module() != IMPORT_MODULE || !SUPPORTED_IMPORTS.contains(&import.name()) {
            return Err(VmError::InvalidWasm(format!(
                "Wasm contract requires unsupported import: \"{}\"",
                name
            )));
        }
    }
    Ok(())
}

/// Capabilities declared through `requires_<capability>` exports.
pub fn required_capabilities(module: &Module) -> BTreeSet<String> {
    module
        .exports()
        .filter_map(|e| e.name().strip_prefix(CAPABILITY_EXPORT_PREFIX).map(str::to_string))
        .filter(|c| !c.is_empty())
        .collect()
}

fn check_capabilities(module: &Module, available: &HashSet<String>) -> VmResult<()> {
    let missing: Vec<String> = required_capabilities(module)
        .into_iter()
        .filter(|c| !available.contains(c))
        .collect();
    if !missing.is_empty() {
        return Err(VmError::UnsupportedCapabilities(missing.join(", ")));
    }
    Ok(())
}

pub fn analyze(module: &Module) -> AnalysisReport {
    let exports = func_exports(module);
    AnalysisReport {
        has_ibc_entry_points: IBC_ENTRY_POINTS.iter().all(|name| exports.contains(*name)),
        entry_points: ENTRY_POINTS
            .iter()
            .filter(|name| exports.contains(**name))
            .map(|name| name.to_string())
            .collect(),
        required_capabilities: required_capabilities(module),
    }
}
