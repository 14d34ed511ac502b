use crate::grid::Grid;

use super::{tile_plane, Backend, BackendKind};
use crate::exec::iterate::Block;

/// One block covering the whole plane, run on the calling thread.
pub struct HostNaive;

impl Backend for HostNaive {
    fn name(&self) -> &'static str {
        "host-naive"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::HostNaive
    }

    fn partition(&self, grid: &Grid) -> Vec<Block> {
        tile_plane(grid, [usize::MAX, usize::MAX])
    }

    fn parallel(&self) -> bool {
        false
    }
}

/// IJ blocks distributed over the worker pool.
pub struct HostBlock {
    block: [usize; 2],
}

impl HostBlock {
    pub fn new(block: [usize; 2]) -> Self {
        Self {
            block: [block[0].max(1), block[1].max(1)],
        }
    }
}

impl Backend for HostBlock {
    fn name(&self) -> &'static str {
        "host-block"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::HostBlock
    }

    fn partition(&self, grid: &Grid) -> Vec<Block> {
        tile_plane(grid, self.block)
    }

    fn parallel(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naive_single_block() {
        let grid = Grid::with_halo(4, 4, 2, 2).unwrap();
        let blocks = HostNaive.partition(&grid);
        assert_eq!(blocks, vec![Block { i: (2, 5), j: (2, 5) }]);
        assert!(!HostNaive.parallel());
    }

    #[test]
    fn test_block_partition() {
        let grid = Grid::from_sizes(16, 16, 1).unwrap();
        let backend = HostBlock::new([8, 8]);
        assert_eq!(backend.partition(&grid).len(), 4);
        assert!(backend.parallel());
        assert!(!backend.read_only_path());
    }

    #[test]
    fn test_zero_block_is_clamped() {
        let grid = Grid::from_sizes(2, 3, 1).unwrap();
        assert_eq!(HostBlock::new([0, 4]).partition(&grid).len(), 2);
    }
}
