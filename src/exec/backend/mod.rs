//! Execution backends.
//!
//! A backend decides how the horizontal plane is split into blocks, whether
//! blocks run concurrently, and which access paths the iterate domain may
//! use. The sweep itself (`iterate::run_block`) is shared.

mod cuda;
mod host;

pub use cuda::Cuda;
pub use host::{HostBlock, HostNaive};

use std::fmt;

use crate::grid::Grid;
use crate::storage::Layout;

use super::iterate::Block;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    HostNaive,
    HostBlock,
    Cuda,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "host-naive" | "naive" | "host" => Some(BackendKind::HostNaive),
            "host-block" | "block" => Some(BackendKind::HostBlock),
            "cuda" | "gpu" => Some(BackendKind::Cuda),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::HostNaive => "host-naive",
            BackendKind::HostBlock => "host-block",
            BackendKind::Cuda => "cuda",
        }
    }

    /// Default block size (i, j).
    pub fn default_block(&self) -> [usize; 2] {
        match self {
            BackendKind::HostNaive => [usize::MAX, usize::MAX],
            BackendKind::HostBlock => [8, 8],
            BackendKind::Cuda => [32, 8],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend selection plus its tuning knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub block: [usize; 2],
    /// Worker threads; `None` uses rayon's default.
    pub threads: Option<usize>,
}

impl BackendConfig {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            block: kind.default_block(),
            threads: None,
        }
    }

    pub fn with_block(mut self, block: [usize; 2]) -> Self {
        self.block = [block[0].max(1), block[1].max(1)];
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads.max(1));
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(BackendKind::HostNaive)
    }
}

/// How a computation is executed.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> BackendKind;

    /// Split the horizontal compute region into blocks.
    fn partition(&self, grid: &Grid) -> Vec<Block>;

    /// Run blocks on the worker pool.
    fn parallel(&self) -> bool;

    /// Serve never-written arguments through the read-only path.
    fn read_only_path(&self) -> bool {
        false
    }

    /// Count a block barrier after cooperative fills and between stages.
    fn synchronizes_blocks(&self) -> bool {
        false
    }

    /// Layout of the temporaries this backend allocates.
    fn layout(&self) -> Layout {
        Layout::K_CONTIGUOUS
    }
}

/// Create the backend described by `config`.
pub fn create_backend(config: &BackendConfig) -> Box<dyn Backend> {
    match config.kind {
        BackendKind::HostNaive => Box::new(HostNaive),
        BackendKind::HostBlock => Box::new(HostBlock::new(config.block)),
        BackendKind::Cuda => Box::new(Cuda::new(config.block)),
    }
}

/// Tile the compute region into blocks of at most `block` points per axis,
/// i-major.
pub(crate) fn tile_plane(grid: &Grid, block: [usize; 2]) -> Vec<Block> {
    let (gi, gj) = (grid.i(), grid.j());
    let axis = |begin: usize, end: usize, size: usize| -> Vec<(usize, usize)> {
        let size = size.max(1);
        let mut out = Vec::new();
        let mut start = begin;
        loop {
            let stop = start.saturating_add(size - 1).min(end);
            out.push((start, stop));
            if stop == end {
                break;
            }
            start = stop + 1;
        }
        out
    };
    let mut blocks = Vec::new();
    for i in axis(gi.begin, gi.end, block[0]) {
        for j in axis(gj.begin, gj.end, block[1]) {
            blocks.push(Block { i, j });
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(BackendKind::parse("host"), Some(BackendKind::HostNaive));
        assert_eq!(BackendKind::parse("block"), Some(BackendKind::HostBlock));
        assert_eq!(BackendKind::parse("gpu"), Some(BackendKind::Cuda));
        assert_eq!(BackendKind::parse("mic"), None);
    }

    #[test]
    fn test_create_backend() {
        for kind in [BackendKind::HostNaive, BackendKind::HostBlock, BackendKind::Cuda] {
            let backend = create_backend(&BackendConfig::new(kind));
            assert_eq!(backend.kind(), kind);
            assert_eq!(backend.name(), kind.as_str());
        }
    }

    #[test]
    fn test_tile_plane_covers_region() {
        let grid = Grid::with_halo(10, 5, 3, 1).unwrap();
        let blocks = tile_plane(&grid, [4, 8]);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], Block { i: (1, 4), j: (1, 5) });
        assert_eq!(blocks[2], Block { i: (9, 10), j: (1, 5) });
        let points: usize = blocks.iter().map(|b| b.ni() * b.nj()).sum();
        assert_eq!(points, 50);
    }

    #[test]
    fn test_unbounded_block_is_whole_plane() {
        let grid = Grid::from_sizes(7, 3, 2).unwrap();
        let blocks = tile_plane(&grid, BackendKind::HostNaive.default_block());
        assert_eq!(blocks, vec![Block { i: (0, 6), j: (0, 2) }]);
    }
}
