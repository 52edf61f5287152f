//! Callback gateways: the host operations a running contract can reach.
//!
//! Each gateway owns the host object for one call, meters every operation
//! against the call's gas budget and turns host failures (including panics)
//! into typed errors instead of unwinding into the engine.

pub mod api;
pub mod querier;
pub mod storage;

pub use api::ApiGateway;
pub use querier::QuerierGateway;
pub use storage::StorageGateway;

use crate::backend::{BackendError, BackendResult, GasInfo};
use crate::error::{VmError, VmResult};
use crate::gas_metering::GasMeter;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run a host operation, converting a panic into `BackendError::ForeignPanic`.
pub(crate) fn guarded<T>(op: impl FnOnce() -> BackendResult<T>) -> BackendResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            tracing::error!(%msg, "Host backend panicked");
            (Err(BackendError::foreign_panic(msg)), GasInfo::free())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Burn the rest of the budget and report out-of-gas.
pub(crate) fn exhaust(gas: &mut dyn GasMeter) -> VmError {
    let limit = gas.limit();
    let _ = gas.consume(u64::MAX);
    VmError::OutOfGas { used: limit, limit }
}

/// Charge the gas a backend reported and track what it spent externally.
pub(crate) fn settle(
    gas: &mut dyn GasMeter,
    info: GasInfo,
    externally_used: &mut u64,
) -> VmResult<()> {
    *externally_used = externally_used.saturating_add(info.externally_used);
    if info.total() > gas.remaining() {
        return Err(exhaust(gas));
    }
    gas.consume(info.total())
}

/// Map a backend failure that is not meant for contract logic.
pub(crate) fn backend_failure(gas: &mut dyn GasMeter, err: BackendError) -> VmError {
    match err {
        BackendError::OutOfGas {} => exhaust(gas),
        other => VmError::Backend(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas_metering::GasTracker;

    #[test]
    fn test_guarded_catches_panic() {
        let (result, gas): BackendResult<()> = guarded(|| panic!("host exploded"));
        assert_eq!(
            result,
            Err(BackendError::ForeignPanic {
                msg: "host exploded".to_string()
            })
        );
        assert_eq!(gas, GasInfo::free());
    }

    #[test]
    fn test_guarded_passes_result() {
        let (result, gas) = guarded(|| (Ok(7u8), GasInfo::with_cost(3)));
        assert_eq!(result, Ok(7));
        assert_eq!(gas.cost, 3);
    }

    #[test]
    fn test_settle_over_budget() {
        let mut tracker = GasTracker::with_default_schedule(100);
        let mut external = 0;
        let err = settle(&mut tracker, GasInfo::new(50, 60), &mut external).unwrap_err();
        assert!(err.is_out_of_gas());
        assert_eq!(tracker.used(), 100);
        assert_eq!(external, 60);
    }

    #[test]
    fn test_backend_failure_mapping() {
        let mut tracker = GasTracker::with_default_schedule(100);
        assert!(backend_failure(&mut tracker, BackendError::OutOfGas {}).is_out_of_gas());
        assert_eq!(
            backend_failure(&mut tracker, BackendError::unknown("io")),
            VmError::Backend(BackendError::unknown("io"))
        );
    }
}
