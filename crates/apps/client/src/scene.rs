use std::collections::BTreeMap;

use foundation::Address;
use streaming::{Cell, Renderer};
use tracing::{debug, info};

/// Headless renderer: keeps per-cell point counts and logs changes.
#[derive(Debug, Default)]
pub struct LogScene {
    cells: BTreeMap<Address, usize>,
    points: usize,
}

impl LogScene {
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn point_count(&self) -> usize {
        self.points
    }
}

impl Renderer for LogScene {
    fn add_cell(&mut self, cell: Cell) {
        let count = cell.len();
        if let Some(first) = cell.positions.first() {
            debug!(address = %cell.address, x = first[0], y = first[1], z = first[2], "first point");
        }
        if let Some(old) = self.cells.insert(cell.address, count) {
            self.points -= old;
        }
        self.points += count;
        info!(address = %cell.address, points = count, total = self.points, "cell added");
    }

    fn remove_cell(&mut self, address: &Address) {
        if let Some(count) = self.cells.remove(address) {
            self.points -= count;
            info!(%address, total = self.points, "cell removed");
        }
    }
}
