//! Host emulation of the CUDA execution model.
//!
//! The plane maps onto a 2-D grid of thread blocks, one block per tile of
//! `block` points. Every block runs as one rayon task: its threads first
//! fill the shared IJ tiles cooperatively, meet at a barrier, then compute.
//! Arguments no stage ever writes are read through the read-only path
//! unless the multistage lists them in its bypass set.

use crate::grid::Grid;
use crate::storage::Layout;

use super::{tile_plane, Backend, BackendKind};
use crate::exec::iterate::Block;

pub struct Cuda {
    block: [usize; 2],
}

impl Cuda {
    pub fn new(block: [usize; 2]) -> Self {
        Self {
            block: [block[0].max(1), block[1].max(1)],
        }
    }

    pub fn block(&self) -> [usize; 2] {
        self.block
    }

    /// Number of thread blocks along i.
    pub fn n_i_pes(&self, grid: &Grid) -> usize {
        grid.i().len().div_ceil(self.block[0])
    }

    /// Number of thread blocks along j.
    pub fn n_j_pes(&self, grid: &Grid) -> usize {
        grid.j().len().div_ceil(self.block[1])
    }
}

impl Backend for Cuda {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cuda
    }

    fn partition(&self, grid: &Grid) -> Vec<Block> {
        tile_plane(grid, self.block)
    }

    fn parallel(&self) -> bool {
        true
    }

    fn read_only_path(&self) -> bool {
        true
    }

    fn synchronizes_blocks(&self) -> bool {
        true
    }

    fn layout(&self) -> Layout {
        Layout::I_CONTIGUOUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_elements() {
        let grid = Grid::from_sizes(70, 9, 4).unwrap();
        let cuda = Cuda::new([32, 8]);
        assert_eq!(cuda.n_i_pes(&grid), 3);
        assert_eq!(cuda.n_j_pes(&grid), 2);
        assert_eq!(cuda.partition(&grid).len(), 6);
        assert!(cuda.read_only_path());
        assert!(cuda.synchronizes_blocks());
        assert_eq!(cuda.layout(), Layout::I_CONTIGUOUS);
    }

    #[test]
    fn test_zero_block_is_clamped() {
        let grid = Grid::from_sizes(3, 2, 1).unwrap();
        let cuda = Cuda::new([0, 0]);
        assert_eq!(cuda.block(), [1, 1]);
        assert_eq!(cuda.n_i_pes(&grid), 3);
        assert_eq!(cuda.n_j_pes(&grid), 2);
        assert_eq!(cuda.partition(&grid).len(), 6);
    }
}
