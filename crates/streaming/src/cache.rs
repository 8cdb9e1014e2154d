use std::collections::{BTreeMap, VecDeque};

use foundation::Address;
use runtime::work_queue::WorkQueueFull;
use tracing::debug;

use crate::queue::OutstandingQueries;
use crate::residency::CellState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    AlreadyPopulated(Address),
    AlreadyEmpty(Address),
    QueueFull(WorkQueueFull),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::AlreadyPopulated(address) => {
                write!(f, "address already populated: {address}")
            }
            CacheError::AlreadyEmpty(address) => {
                write!(f, "address already resolved as empty: {address}")
            }
            CacheError::QueueFull(full) => write!(f, "{full}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::QueueFull(full) => Some(full),
            _ => None,
        }
    }
}

/// Per-session knowledge about addresses, plus the FIFO of queries in flight.
///
/// Notes on determinism:
/// - Entries are keyed by the address value in a `BTreeMap`.
/// - Eviction is FIFO by population order, not LRU.
#[derive(Debug)]
pub struct SessionCache {
    entries: BTreeMap<Address, CellState>,
    populated: VecDeque<Address>,
    outstanding: OutstandingQueries,
    max_cells: usize,
}

impl SessionCache {
    pub fn new(max_cells: usize, max_outstanding: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            populated: VecDeque::new(),
            outstanding: OutstandingQueries::new(max_outstanding),
            max_cells,
        }
    }

    pub fn lookup(&self, address: &Address) -> CellState {
        self.entries.get(address).copied().unwrap_or_default()
    }

    /// Number of populated cells currently rendered.
    pub fn populated_len(&self) -> usize {
        self.populated.len()
    }

    pub fn empty_len(&self) -> usize {
        self.entries.len() - self.populated.len()
    }

    pub fn mark_empty(&mut self, address: Address) -> Result<(), CacheError> {
        match self.lookup(&address) {
            CellState::Populated => Err(CacheError::AlreadyPopulated(address)),
            _ => {
                self.entries.insert(address, CellState::Empty);
                Ok(())
            }
        }
    }

    /// Records `address` as rendered and returns whatever had to be evicted
    /// to stay within `max_cells`, oldest first.
    pub fn mark_populated(&mut self, address: Address) -> Result<Vec<Address>, CacheError> {
        match self.lookup(&address) {
            CellState::Populated => return Err(CacheError::AlreadyPopulated(address)),
            CellState::Empty => return Err(CacheError::AlreadyEmpty(address)),
            CellState::Unknown => {}
        }
        self.entries.insert(address, CellState::Populated);
        self.populated.push_back(address);
        Ok(self.evict_oldest(self.max_cells))
    }

    /// Evicts the oldest populated cells until at most `bound` remain.
    ///
    /// Evicted addresses become `Unknown` again and may be re-requested.
    pub fn evict_oldest(&mut self, bound: usize) -> Vec<Address> {
        let mut evicted = Vec::new();
        while self.populated.len() > bound {
            let Some(address) = self.populated.pop_front() else {
                break;
            };
            self.entries.remove(&address);
            debug!(%address, "evicted cell");
            evicted.push(address);
        }
        evicted
    }

    pub fn is_outstanding(&self, address: &Address) -> bool {
        self.outstanding.contains(address)
    }

    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    /// Queries that can still be sent before backpressure kicks in.
    pub fn remaining_capacity(&self) -> usize {
        self.outstanding.remaining_capacity()
    }

    /// Records a query about to be sent. Returns `Ok(false)` if it is already in flight.
    pub fn enqueue(&mut self, address: Address) -> Result<bool, CacheError> {
        self.outstanding
            .try_submit(address)
            .map_err(CacheError::QueueFull)
    }

    /// The address the next arriving response belongs to.
    pub fn next_outstanding(&mut self) -> Option<Address> {
        self.outstanding.pop_next()
    }
}
