use crate::error::{VmError, VmResult};

/// Gas schedule for host operations invoked by a contract.
///
/// Costs are in the same unit as engine fuel: one unit per executed wasm
/// instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSchedule {
    // Storage
    pub db_read: u64,                // 1,000
    pub db_write: u64,               // 2,000
    pub db_remove: u64,              // 1,000
    pub db_scan: u64,                // 1,000
    pub db_next: u64,                // 500
    pub storage_per_byte: u64,       // 1

    // Api
    pub addr_validate: u64,          // 400
    pub addr_canonicalize: u64,      // 400
    pub addr_humanize: u64,          // 400

    // Querier
    pub query_chain: u64,            // 1,000
    pub query_per_byte: u64,         // 1

    // Side channel
    pub debug: u64,                  // 100
    pub event: u64,                  // 500
    pub attribute: u64,              // 200
    pub event_per_byte: u64,         // 1

    // Dynamic link
    pub contract_call: u64,          // 10,000
    pub contract_call_per_byte: u64, // 1
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            // Storage
            db_read: 1_000,
            db_write: 2_000,
            db_remove: 1_000,
            db_scan: 1_000,
            db_next: 500,
            storage_per_byte: 1,

            // Api
            addr_validate: 400,
            addr_canonicalize: 400,
            addr_humanize: 400,

            // Querier
            query_chain: 1_000,
            query_per_byte: 1,

            // Side channel
            debug: 100,
            event: 500,
            attribute: 200,
            event_per_byte: 1,

            // Dynamic link
            contract_call: 10_000,
            contract_call_per_byte: 1,
        }
    }
}

/// Gas accounting as seen by the host.
///
/// The host supplies a meter to every lifecycle call; the call draws its
/// budget from `remaining()` and charges what it used via `consume`.
pub trait GasMeter {
    /// Consume gas, failing once the limit would be exceeded.
    fn consume(&mut self, amount: u64) -> VmResult<()>;

    fn remaining(&self) -> u64;

    fn consumed(&self) -> u64;

    fn limit(&self) -> u64;
}

/// Gas tracking during execution.
///
/// Running out of gas is terminal: the tracker pins `used` at the limit so
/// the aborted call reports exactly its budget.
#[derive(Debug, Clone)]
pub struct GasTracker {
    /// Gas limit for this execution
    limit: u64,
    /// Gas already used
    used: u64,
    /// Gas schedule
    schedule: GasSchedule,
}

impl GasTracker {
    /// Create a new gas tracker.
    pub fn new(limit: u64, schedule: GasSchedule) -> Self {
        Self {
            limit,
            used: 0,
            schedule,
        }
    }

    /// Create with default schedule.
    pub fn with_default_schedule(limit: u64) -> Self {
        Self::new(limit, GasSchedule::default())
    }

    /// Continue tracking a budget of which `used` is already spent.
    pub fn resume(limit: u64, used: u64, schedule: GasSchedule) -> Self {
        Self {
            limit,
            used: used.min(limit),
            schedule,
        }
    }

    /// Get gas limit.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Get gas used.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Get remaining gas.
    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used == self.limit
    }

    /// Charge gas.
    pub fn charge(&mut self, amount: u64) -> VmResult<()> {
        match self.used.checked_add(amount) {
            Some(new_used) if new_used <= self.limit => {
                self.used = new_used;
                Ok(())
            }
            _ => {
                self.used = self.limit;
                Err(VmError::OutOfGas {
                    used: self.limit,
                    limit: self.limit,
                })
            }
        }
    }

    /// Charge a base cost plus a per-byte cost.
    pub fn charge_with_bytes(&mut self, base: u64, per_byte: u64, bytes: usize) -> VmResult<()> {
        let cost = (bytes as u64)
            .saturating_mul(per_byte)
            .saturating_add(base);
        self.charge(cost)
    }

    /// Get gas schedule.
    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }
}

impl GasMeter for GasTracker {
    fn consume(&mut self, amount: u64) -> VmResult<()> {
        self.charge(amount)
    }

    fn remaining(&self) -> u64 {
        GasTracker::remaining(self)
    }

    fn consumed(&self) -> u64 {
        self.used
    }

    fn limit(&self) -> u64 {
        self.limit
    }
}

/// Gas usage of one finished call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasReport {
    /// Budget the call ran with
    pub limit: u64,
    /// Budget left when the call returned
    pub remaining: u64,
    /// Gas the host reported as spent outside the engine (nested queries)
    pub used_externally: u64,
    /// Gas spent by wasm execution and metered host operations
    pub used_internally: u64,
}

impl GasReport {
    pub fn used(&self) -> u64 {
        self.limit - self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_tracker() {
        let mut tracker = GasTracker::with_default_schedule(100_000);
        assert_eq!(tracker.limit(), 100_000);
        assert_eq!(tracker.remaining(), 100_000);

        tracker.charge(10_000).unwrap();
        assert_eq!(tracker.used(), 10_000);
        assert_eq!(tracker.remaining(), 90_000);
    }

    #[test]
    fn test_gas_tracker_out_of_gas_pins_used_at_limit() {
        let mut tracker = GasTracker::with_default_schedule(1_000);
        tracker.charge(400).unwrap();

        let err = tracker.charge(10_000).unwrap_err();
        assert_eq!(err, VmError::OutOfGas { used: 1_000, limit: 1_000 });
        assert_eq!(tracker.used(), 1_000);
        assert!(tracker.is_exhausted());
    }

    #[test]
    fn test_charge_exactly_to_limit() {
        let mut tracker = GasTracker::with_default_schedule(500);
        tracker.charge(500).unwrap();
        assert_eq!(tracker.remaining(), 0);
        assert!(tracker.charge(1).is_err());
    }

    #[test]
    fn test_charge_overflow() {
        let mut tracker = GasTracker::with_default_schedule(u64::MAX);
        tracker.charge(10).unwrap();
        assert!(tracker.charge(u64::MAX).is_err());
    }

    #[test]
    fn test_resume() {
        let mut tracker = GasTracker::resume(1_000, 900, GasSchedule::default());
        assert_eq!(tracker.remaining(), 100);
        assert!(tracker.charge(200).is_err());

        let clamped = GasTracker::resume(10, 50, GasSchedule::default());
        assert_eq!(clamped.used(), 10);
    }

    #[test]
    fn test_charge_with_bytes() {
        let mut tracker = GasTracker::with_default_schedule(100_000);
        let schedule = *tracker.schedule();
        tracker
            .charge_with_bytes(schedule.db_write, schedule.storage_per_byte, 30)
            .unwrap();
        assert_eq!(tracker.used(), 2_030);
    }

    #[test]
    fn test_gas_meter_trait() {
        let mut tracker = GasTracker::with_default_schedule(50);
        let meter: &mut dyn GasMeter = &mut tracker;
        meter.consume(20).unwrap();
        assert_eq!(meter.consumed(), 20);
        assert_eq!(meter.remaining(), 30);
        assert_eq!(meter.limit(), 50);
    }

    #[test]
    fn test_gas_report_used() {
        let report = GasReport {
            limit: 100,
            remaining: 30,
            used_externally: 10,
            used_internally: 60,
        };
        assert_eq!(report.used(), 70);
    }
}
