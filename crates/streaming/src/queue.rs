use std::collections::BTreeSet;

use foundation::Address;
use runtime::work_queue::{WorkQueue, WorkQueueFull};

/// Queries sent and still awaiting a response, oldest first.
///
/// The wire carries no per-array address tag: the n-th response belongs to
/// the n-th query. This is a thin wrapper over `runtime::WorkQueue` that adds
/// a membership index so traversal can skip addresses already in flight.
#[derive(Debug)]
pub struct OutstandingQueries {
    inner: WorkQueue<Address>,
    pending: BTreeSet<Address>,
}

impl OutstandingQueries {
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            inner: WorkQueue::with_max_len(max_outstanding),
            pending: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.inner.remaining_capacity()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.pending.contains(address)
    }

    /// Appends `address`. Returns `Ok(false)` if it is already outstanding.
    pub fn try_submit(&mut self, address: Address) -> Result<bool, WorkQueueFull> {
        if self.pending.contains(&address) {
            return Ok(false);
        }
        self.inner.try_push(address).map_err(|(full, _)| full)?;
        self.pending.insert(address);
        Ok(true)
    }

    /// Removes the query the next response answers.
    pub fn pop_next(&mut self) -> Option<Address> {
        let address = self.inner.pop_front()?;
        self.pending.remove(&address);
        Some(address)
    }
}
