use crate::backend::{BackendError, BackendResult, GasInfo, Storage};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use wasmvm_types::{Order, Record};

/// Gas reported for opening an iterator.
pub const GAS_COST_RANGE: u64 = 11;
/// Gas reported for stepping past the last record of an iterator.
pub const GAS_COST_LAST_ITERATION: u64 = 37;

#[derive(Default)]
struct Inner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    iterators: HashMap<u32, std::vec::IntoIter<Record>>,
    next_iterator_id: u32,
}

/// In-memory key/value store.
///
/// Iterators capture a snapshot of their range when opened.
#[derive(Clone, Default)]
pub struct MockStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }

    /// Number of iterators that are open and not yet closed.
    pub fn iterator_count(&self) -> usize {
        self.inner.read().iterators.len()
    }

    /// Read a value without going through the gas-metered interface.
    pub fn raw_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read().data.get(key).cloned()
    }

    pub fn raw_set(&self, key: &[u8], value: &[u8]) {
        self.inner.write().data.insert(key.to_vec(), value.to_vec());
    }
}

impl Storage for MockStorage {
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        (Ok(self.raw_get(key)), GasInfo::free())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        self.raw_set(key, value);
        (Ok(()), GasInfo::free())
    }

    fn remove(&mut self, key: &[u8]) -> BackendResult<()> {
        self.inner.write().data.remove(key);
        (Ok(()), GasInfo::free())
    }

    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> BackendResult<u32> {
        let gas = GasInfo::with_externally_used(GAS_COST_RANGE);
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return (
                    Err(BackendError::bad_argument("start must not be greater than end")),
                    gas,
                );
            }
        }

        let mut inner = self.inner.write();
        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
        let mut records: Vec<Record> = inner
            .data
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if order == Order::Descending {
            records.reverse();
        }

        inner.next_iterator_id += 1;
        let id = inner.next_iterator_id;
        inner.iterators.insert(id, records.into_iter());
        (Ok(id), gas)
    }

    fn next(&mut self, iterator_id: u32) -> BackendResult<Option<Record>> {
        let mut inner = self.inner.write();
        let Some(iter) = inner.iterators.get_mut(&iterator_id) else {
            return (
                Err(BackendError::IteratorDoesNotExist { id: iterator_id }),
                GasInfo::free(),
            );
        };
        match iter.next() {
            Some(record) => (Ok(Some(record)), GasInfo::free()),
            None => (Ok(None), GasInfo::with_externally_used(GAS_COST_LAST_ITERATION)),
        }
    }

    fn close_iterator(&mut self, iterator_id: u32) {
        self.inner.write().iterators.remove(&iterator_id);
    }
}
