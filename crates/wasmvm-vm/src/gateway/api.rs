use super::{backend_failure, guarded, settle};
use crate::backend::{Api, BackendError, ContractEnv};
use crate::error::{VmError, VmResult};
use crate::gas_metering::{GasMeter, GasSchedule};

/// Outcome of an address operation: the inner `Err` is handed back to the
/// contract as a catchable error message, the outer one aborts the call.
pub type AddrResult<T> = VmResult<Result<T, String>>;

/// Address conversion exposed to a contract for one call.
pub struct ApiGateway<A: Api> {
    api: A,
    schedule: GasSchedule,
    externally_used: u64,
}

impl<A: Api> ApiGateway<A> {
    pub fn new(api: A, schedule: GasSchedule) -> Self {
        Self {
            api,
            schedule,
            externally_used: 0,
        }
    }

    pub fn externally_used(&self) -> u64 {
        self.externally_used
    }

    pub fn canonicalize(&mut self, gas: &mut dyn GasMeter, human: &str) -> AddrResult<Vec<u8>> {
        gas.consume(self.schedule.addr_canonicalize)?;
        let (result, info) = guarded(|| self.api.addr_canonicalize(human));
        settle(gas, info, &mut self.externally_used)?;
        user_result(gas, result)
    }

    pub fn humanize(&mut self, gas: &mut dyn GasMeter, canonical: &[u8]) -> AddrResult<String> {
        gas.consume(self.schedule.addr_humanize)?;
        let (result, info) = guarded(|| self.api.addr_humanize(canonical));
        settle(gas, info, &mut self.externally_used)?;
        user_result(gas, result)
    }

    /// Check that `human` is a valid address in its normalized form.
    pub fn validate(&mut self, gas: &mut dyn GasMeter, human: &str) -> AddrResult<()> {
        gas.consume(self.schedule.addr_validate)?;
        let canonical = match self.canonicalize(gas, human)? {
            Ok(canonical) => canonical,
            Err(msg) => return Ok(Err(msg)),
        };
        let normalized = match self.humanize(gas, &canonical)? {
            Ok(normalized) => normalized,
            Err(msg) => return Ok(Err(msg)),
        };
        if normalized != human {
            return Ok(Err("Address is not normalized".to_string()));
        }
        Ok(Ok(()))
    }

    /// Resolve the contract behind a dynamic link, charging the base call
    /// cost plus `input_size` bytes of arguments.
    pub fn contract_env(
        &mut self,
        gas: &mut dyn GasMeter,
        contract_addr: &str,
        input_size: u64,
    ) -> VmResult<ContractEnv> {
        let cost = input_size
            .saturating_mul(self.schedule.contract_call_per_byte)
            .saturating_add(self.schedule.contract_call);
        gas.consume(cost)?;
        let (result, info) = guarded(|| self.api.get_contract_env(contract_addr, input_size));
        settle(gas, info, &mut self.externally_used)?;
        match result {
            Ok(contract) => Ok(contract),
            Err(BackendError::UserErr { msg }) => Err(VmError::DynamicLink(msg)),
            Err(other) => Err(backend_failure(gas, other)),
        }
    }
}

fn user_result<T>(gas: &mut dyn GasMeter, result: Result<T, BackendError>) -> AddrResult<T> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(BackendError::UserErr { msg }) => Ok(Err(msg)),
        Err(other) => Err(backend_failure(gas, other)),
    }
}
