use super::{backend_failure, guarded, settle};
use crate::backend::Querier;
use crate::error::VmResult;
use crate::gas_metering::{GasMeter, GasSchedule};
use wasmvm_types::{ContractResult, QueryRequest, SystemError, SystemResult};

pub type QuerierOutput = SystemResult<ContractResult<serde_json::Value>>;

/// Chain queries exposed to a contract for one call.
pub struct QuerierGateway<Q: Querier> {
    querier: Q,
    schedule: GasSchedule,
    externally_used: u64,
}

impl<Q: Querier> QuerierGateway<Q> {
    pub fn new(querier: Q, schedule: GasSchedule) -> Self {
        Self {
            querier,
            schedule,
            externally_used: 0,
        }
    }

    pub fn externally_used(&self) -> u64 {
        self.externally_used
    }

    /// Parse and dispatch a serialized query.
    ///
    /// Malformed or unsupported requests come back as a `SystemError` for the
    /// contract to handle; the querier is given the remaining budget as its
    /// limit and exceeding it aborts the call.
    pub fn query_raw(&mut self, gas: &mut dyn GasMeter, request: &[u8]) -> VmResult<QuerierOutput> {
        gas.consume(
            (request.len() as u64)
                .saturating_mul(self.schedule.query_per_byte)
                .saturating_add(self.schedule.query_chain),
        )?;

        let request: QueryRequest = match serde_json::from_slice(request) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected malformed query");
                return Ok(SystemResult::Err(SystemError::InvalidRequest {
                    error: e.to_string(),
                    request: String::from_utf8_lossy(request).into_owned(),
                }));
            }
        };

        let gas_limit = gas.remaining();
        let (result, info) = guarded(|| self.querier.query(&request, gas_limit));
        settle(gas, info, &mut self.externally_used)?;
        let output = result.map_err(|e| backend_failure(gas, e))?;

        tracing::trace!(kind = request.kind(), "Query answered");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas_metering::GasTracker;
    use crate::testing::MockQuerier;
    use wasmvm_types::{AllBalanceResponse, Coin};

    fn gateway(querier: MockQuerier) -> QuerierGateway<MockQuerier> {
        QuerierGateway::new(querier, GasSchedule::default())
    }

    #[test]
    fn test_bank_all_balances() {
        let querier = MockQuerier::new(&[("contract", &[Coin::new(250, "ATOM")])]);
        let mut gw = gateway(querier);
        let mut gas = GasTracker::with_default_schedule(1_000_000);

        let output = gw
            .query_raw(&mut gas, br#"{"bank":{"all_balances":{"address":"contract"}}}"#)
            .unwrap();
        let value = output.into_result().unwrap().into_result().unwrap();
        let balances: AllBalanceResponse = serde_json::from_value(value).unwrap();
        assert_eq!(balances.amount, vec![Coin::new(250, "ATOM")]);
        assert!(gw.externally_used() > 0);
    }

    #[test]
    fn test_malformed_request_is_system_error() {
        let mut gw = gateway(MockQuerier::default());
        let mut gas = GasTracker::with_default_schedule(1_000_000);

        let output = gw.query_raw(&mut gas, b"{\"nonsense\":1}").unwrap();
        assert!(matches!(
            output,
            SystemResult::Err(SystemError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_unsupported_custom_query() {
        let mut gw = gateway(MockQuerier::default());
        let mut gas = GasTracker::with_default_schedule(1_000_000);

        let output = gw.query_raw(&mut gas, br#"{"custom":{"ping":{}}}"#).unwrap();
        assert_eq!(
            output,
            SystemResult::Err(SystemError::UnsupportedRequest {
                kind: "custom".to_string()
            })
        );
    }

    #[test]
    fn test_query_respects_remaining_gas() {
        let querier = MockQuerier::default().with_query_gas(50_000);
        let mut gw = gateway(querier);
        let mut gas = GasTracker::with_default_schedule(20_000);

        let err = gw
            .query_raw(&mut gas, br#"{"bank":{"all_balances":{"address":"x"}}}"#)
            .unwrap_err();
        assert!(err.is_out_of_gas());
        assert_eq!(gas.used(), 20_000);
    }
}
