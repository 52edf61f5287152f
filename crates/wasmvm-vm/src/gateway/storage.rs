use super::{backend_failure, guarded, settle};
use crate::backend::{BackendError, Storage};
use crate::error::{VmError, VmResult};
use crate::gas_metering::{GasMeter, GasSchedule};
use std::collections::BTreeSet;
use wasmvm_types::{Order, Record};

/// Storage operations exposed to a contract for one call.
///
/// Iterators opened through the gateway are only valid until the gateway is
/// dropped at the end of the call; ids the gateway did not hand out are rejected.
pub struct StorageGateway<S: Storage> {
    storage: S,
    schedule: GasSchedule,
    read_only: bool,
    iterators: BTreeSet<u32>,
    externally_used: u64,
}

impl<S: Storage> StorageGateway<S> {
    pub fn new(storage: S, schedule: GasSchedule, read_only: bool) -> Self {
        Self {
            storage,
            schedule,
            read_only,
            iterators: BTreeSet::new(),
            externally_used: 0,
        }
    }

    pub fn externally_used(&self) -> u64 {
        self.externally_used
    }

    pub(crate) fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn open_iterators(&self) -> usize {
        self.iterators.len()
    }

    fn check_writable(&self, op: &str) -> VmResult<()> {
        if self.read_only {
            return Err(VmError::WriteAccessDenied(op.to_string()));
        }
        Ok(())
    }

    pub fn get(&mut self, gas: &mut dyn GasMeter, key: &[u8]) -> VmResult<Option<Vec<u8>>> {
        gas.consume(self.schedule.db_read)?;
        let (result, info) = guarded(|| self.storage.get(key));
        settle(gas, info, &mut self.externally_used)?;
        let value = result.map_err(|e| backend_failure(gas, e))?;

        let read = key.len() + value.as_ref().map_or(0, Vec::len);
        gas.consume((read as u64).saturating_mul(self.schedule.storage_per_byte))?;
        Ok(value)
    }

    pub fn set(&mut self, gas: &mut dyn GasMeter, key: &[u8], value: &[u8]) -> VmResult<()> {
        self.check_writable("db_write")?;
        let bytes = (key.len() + value.len()) as u64;
        gas.consume(
            bytes
                .saturating_mul(self.schedule.storage_per_byte)
                .saturating_add(self.schedule.db_write),
        )?;
        let (result, info) = guarded(|| self.storage.set(key, value));
        settle(gas, info, &mut self.externally_used)?;
        result.map_err(|e| backend_failure(gas, e))
    }

    pub fn remove(&mut self, gas: &mut dyn GasMeter, key: &[u8]) -> VmResult<()> {
        self.check_writable("db_remove")?;
        gas.consume(self.schedule.db_remove)?;
        let (result, info) = guarded(|| self.storage.remove(key));
        settle(gas, info, &mut self.externally_used)?;
        result.map_err(|e| backend_failure(gas, e))
    }

    pub fn scan(
        &mut self,
        gas: &mut dyn GasMeter,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> VmResult<u32> {
        gas.consume(self.schedule.db_scan)?;
        let (result, info) = guarded(|| self.storage.scan(start, end, order));
        settle(gas, info, &mut self.externally_used)?;
        let id = result.map_err(|e| backend_failure(gas, e))?;
        self.iterators.insert(id);
        tracing::trace!(iterator_id = id, ?order, "Opened iterator");
        Ok(id)
    }

    pub fn next(&mut self, gas: &mut dyn GasMeter, iterator_id: u32) -> VmResult<Option<Record>> {
        if !self.iterators.contains(&iterator_id) {
            return Err(VmError::Backend(BackendError::IteratorDoesNotExist {
                id: iterator_id,
            }));
        }
        gas.consume(self.schedule.db_next)?;
        let (result, info) = guarded(|| self.storage.next(iterator_id));
        settle(gas, info, &mut self.externally_used)?;
        let record = result.map_err(|e| backend_failure(gas, e))?;

        if let Some((key, value)) = &record {
            let bytes = (key.len() + value.len()) as u64;
            gas.consume(bytes.saturating_mul(self.schedule.storage_per_byte))?;
        }
        Ok(record)
    }

    /// Release every iterator opened during this call.
    pub fn close_all(&mut self) {
        for id in std::mem::take(&mut self.iterators) {
            let storage = &mut self.storage;
            // A panicking close must not abort teardown of the remaining iterators
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                storage.close_iterator(id)
            }));
        }
    }
}

impl<S: Storage> Drop for StorageGateway<S> {
    fn drop(&mut self) {
        self.close_all();
    }
}
