//! Viewpoint-driven walk of the address tree.
//!
//! The walk is depth first over a single working address: a digit is pushed
//! to descend and popped to backtrack. `next_digit[i]` holds the next child
//! to try at relative level `i`, so the pending expansions are plain data and
//! the walk never recurses.
//!
//! Query candidates come out in walk order. That order becomes the order the
//! queries are sent in, and therefore the order responses are matched in.

use foundation::{
    Address, AddressError, MAX_DIGITS, Viewpoint, distance, distance_threshold,
    enough_detail_with_bias, max_digit_value,
};

use crate::cache::SessionCache;
use crate::config::StreamingConfig;
use crate::protocol::ServerParams;
use crate::residency::CellState;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TraversalParams {
    /// Deepest address that may be produced.
    pub max_depth: usize,
    /// Addresses at or above this depth are always expanded.
    pub unconditional_depth: usize,
    pub space_param: u32,
    pub detail_bias: f64,
}

impl TraversalParams {
    pub fn new(server: ServerParams, config: &StreamingConfig) -> Self {
        Self {
            max_depth: (server.space_param as usize).min(MAX_DIGITS),
            unconditional_depth: config.unconditional_depth,
            space_param: server.space_param,
            detail_bias: config.detail_bias,
        }
    }
}

/// What the walk does at one address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visit {
    /// Descend into every child.
    Expand,
    /// Fetch this address; do not descend.
    Query,
    /// Neither fetch nor descend.
    Prune,
}

pub struct Traversal<'a> {
    cache: &'a SessionCache,
    viewpoint: Viewpoint,
    threshold: f64,
    params: TraversalParams,
}

impl<'a> Traversal<'a> {
    pub fn new(cache: &'a SessionCache, viewpoint: Viewpoint, params: TraversalParams) -> Self {
        Self {
            cache,
            viewpoint,
            threshold: distance_threshold(viewpoint.radius()),
            params,
        }
    }

    /// Decides what to do at `address`, in order: known-empty subtrees are
    /// pruned; the top levels always expand; far cells are culled; cells
    /// with enough detail are queried unless already known or in flight;
    /// everything else expands while the depth budget allows.
    pub fn visit(&self, address: &Address) -> Visit {
        let depth = address.size();
        let state = self.cache.lookup(address);
        // Ahead of the unconditional band: nothing below an empty cell has data.
        if state == CellState::Empty {
            return Visit::Prune;
        }

        if depth <= self.params.unconditional_depth {
            return self.expand_if_allowed(depth);
        }

        let dist = distance(address.center_cartesian(), self.viewpoint.position());
        if dist > self.threshold {
            return Visit::Prune;
        }

        if enough_detail_with_bias(dist, self.params.space_param, depth, self.params.detail_bias) {
            if state == CellState::Populated || self.cache.is_outstanding(address) {
                return Visit::Prune;
            }
            return Visit::Query;
        }

        self.expand_if_allowed(depth)
    }

    fn expand_if_allowed(&self, depth: usize) -> Visit {
        if depth < self.params.max_depth {
            Visit::Expand
        } else {
            Visit::Prune
        }
    }

    /// Collects up to `limit` query candidates below `seed`, in walk order.
    pub fn run(&self, seed: Address, limit: usize) -> Result<Vec<Address>, AddressError> {
        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }

        match self.visit(&seed) {
            Visit::Query => {
                out.push(seed);
                return Ok(out);
            }
            Visit::Prune => return Ok(out),
            Visit::Expand => {}
        }

        let base = seed.size();
        let mut address = seed;
        let mut next_digit: Vec<u8> = vec![0];

        while !next_digit.is_empty() {
            debug_assert_eq!(address.size(), base + next_digit.len() - 1);
            let digit = next_digit.last_mut().expect("next_digit is non-empty");

            if *digit >= max_digit_value(address.size()) {
                next_digit.pop();
                if !next_digit.is_empty() {
                    address.pop();
                }
                continue;
            }

            let child = *digit;
            *digit += 1;
            address.push(child)?;

            match self.visit(&address) {
                Visit::Expand => next_digit.push(0),
                Visit::Query => {
                    out.push(address);
                    address.pop();
                    if out.len() >= limit {
                        break;
                    }
                }
                Visit::Prune => {
                    address.pop();
                }
            }
        }

        Ok(out)
    }
}
