//! Cache tiles owned by one iterate domain.

use crate::storage::Float;

/// A dense (i, j, k) box with per-point dirty flags.
///
/// IJ caches use one level and are retargeted at every k; IJK caches span
/// every level the multistage touches.
pub(crate) struct PlaneTile<T> {
    origin: [isize; 3],
    dims: [usize; 3],
    values: Vec<T>,
    dirty: Vec<bool>,
}

impl<T: Float> PlaneTile<T> {
    pub(crate) fn new(origin: [isize; 3], dims: [usize; 3]) -> Self {
        let size = dims.iter().product();
        Self {
            origin,
            dims,
            values: vec![T::default(); size],
            dirty: vec![false; size],
        }
    }

    #[inline]
    fn index(&self, i: isize, j: isize, k: isize) -> usize {
        let di = i - self.origin[0];
        let dj = j - self.origin[1];
        let dk = k - self.origin[2];
        assert!(
            di >= 0
                && dj >= 0
                && dk >= 0
                && (di as usize) < self.dims[0]
                && (dj as usize) < self.dims[1]
                && (dk as usize) < self.dims[2],
            "access ({}, {}, {}) outside cache tile at {:?} of {:?}",
            i,
            j,
            k,
            self.origin,
            self.dims
        );
        ((dk as usize) * self.dims[1] + dj as usize) * self.dims[0] + di as usize
    }

    #[inline]
    pub(crate) fn get(&self, i: isize, j: isize, k: isize) -> T {
        self.values[self.index(i, j, k)]
    }

    /// Store a computed value.
    #[inline]
    pub(crate) fn set(&mut self, i: isize, j: isize, k: isize, value: T) {
        let idx = self.index(i, j, k);
        self.values[idx] = value;
        self.dirty[idx] = true;
    }

    /// Store a value loaded from memory.
    #[inline]
    pub(crate) fn load(&mut self, i: isize, j: isize, k: isize, value: T) {
        let idx = self.index(i, j, k);
        self.values[idx] = value;
        self.dirty[idx] = false;
    }

    #[inline]
    pub(crate) fn is_dirty(&self, i: isize, j: isize, k: isize) -> bool {
        self.dirty[self.index(i, j, k)]
    }

    /// Move a single-level tile to level `k` and forget what it held.
    pub(crate) fn retarget(&mut self, k: isize) {
        self.origin[2] = k;
        self.dirty.iter_mut().for_each(|d| *d = false);
    }

    pub(crate) fn origin(&self) -> [isize; 3] {
        self.origin
    }

    pub(crate) fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Every (i, j) of the tile.
    pub(crate) fn columns(&self) -> impl Iterator<Item = (isize, isize)> {
        let [i0, j0, _] = self.origin;
        let [ni, nj, _] = self.dims;
        (0..ni as isize).flat_map(move |di| (0..nj as isize).map(move |dj| (i0 + di, j0 + dj)))
    }

    /// Every level of the tile.
    pub(crate) fn levels(&self) -> std::ops::Range<isize> {
        self.origin[2]..self.origin[2] + self.dims[2] as isize
    }
}

/// Per-column ring of vertical levels for K caches.
///
/// Slot of level `k` is `k mod depth`; the window is contiguous and never
/// deeper than the ring, so live levels never collide.
pub(crate) struct ColumnRing<T> {
    origin: [isize; 2],
    dims: [usize; 2],
    depth: usize,
    levels: Vec<Option<isize>>,
    values: Vec<T>,
    dirty: Vec<bool>,
}

impl<T: Float> ColumnRing<T> {
    pub(crate) fn new(origin: [isize; 2], dims: [usize; 2], depth: usize) -> Self {
        let depth = depth.max(1);
        let size = dims[0] * dims[1] * depth;
        Self {
            origin,
            dims,
            depth,
            levels: vec![None; depth],
            values: vec![T::default(); size],
            dirty: vec![false; size],
        }
    }

    #[inline]
    fn slot(&self, k: isize) -> usize {
        k.rem_euclid(self.depth as isize) as usize
    }

    #[inline]
    fn index(&self, i: isize, j: isize, k: isize) -> usize {
        let slot = self.slot(k);
        assert!(
            self.levels[slot] == Some(k),
            "level {} is outside the k cache window",
            k
        );
        let di = i - self.origin[0];
        let dj = j - self.origin[1];
        assert!(
            di >= 0 && dj >= 0 && (di as usize) < self.dims[0] && (dj as usize) < self.dims[1],
            "column ({}, {}) outside k cache tile",
            i,
            j
        );
        (slot * self.dims[1] + dj as usize) * self.dims[0] + di as usize
    }

    /// The levels currently held.
    pub(crate) fn window(&self) -> Vec<isize> {
        let mut held: Vec<isize> = self.levels.iter().flatten().copied().collect();
        held.sort_unstable();
        held
    }

    pub(crate) fn holds(&self, k: isize) -> bool {
        self.levels[self.slot(k)] == Some(k)
    }

    /// Claim the slot of level `k`. The previous occupant must have been
    /// retired by the caller.
    pub(crate) fn claim(&mut self, k: isize) {
        let slot = self.slot(k);
        self.levels[slot] = Some(k);
        let plane = self.dims[0] * self.dims[1];
        self.dirty[slot * plane..(slot + 1) * plane]
            .iter_mut()
            .for_each(|d| *d = false);
    }

    pub(crate) fn release(&mut self, k: isize) {
        let slot = self.slot(k);
        if self.levels[slot] == Some(k) {
            self.levels[slot] = None;
        }
    }

    #[inline]
    pub(crate) fn get(&self, i: isize, j: isize, k: isize) -> T {
        self.values[self.index(i, j, k)]
    }

    #[inline]
    pub(crate) fn set(&mut self, i: isize, j: isize, k: isize, value: T) {
        let idx = self.index(i, j, k);
        self.values[idx] = value;
        self.dirty[idx] = true;
    }

    #[inline]
    pub(crate) fn load(&mut self, i: isize, j: isize, k: isize, value: T) {
        let idx = self.index(i, j, k);
        self.values[idx] = value;
        self.dirty[idx] = false;
    }

    #[inline]
    pub(crate) fn is_dirty(&self, i: isize, j: isize, k: isize) -> bool {
        self.dirty[self.index(i, j, k)]
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = (isize, isize)> {
        let [i0, j0] = self.origin;
        let [ni, nj] = self.dims;
        (0..ni as isize).flat_map(move |di| (0..nj as isize).map(move |dj| (i0 + di, j0 + dj)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_tile_indexing() {
        let mut tile: PlaneTile<f64> = PlaneTile::new([-1, -1, 0], [4, 4, 1]);
        tile.set(-1, 2, 0, 3.0);
        assert_eq!(tile.get(-1, 2, 0), 3.0);
        assert!(tile.is_dirty(-1, 2, 0));
        tile.load(0, 0, 0, 1.0);
        assert!(!tile.is_dirty(0, 0, 0));
        assert_eq!(tile.columns().count(), 16);
    }

    #[test]
    fn test_plane_tile_retarget() {
        let mut tile: PlaneTile<f64> = PlaneTile::new([0, 0, 0], [2, 2, 1]);
        tile.set(1, 1, 0, 2.0);
        tile.retarget(5);
        assert!(!tile.is_dirty(1, 1, 5));
        assert_eq!(tile.levels(), 5..6);
    }

    #[test]
    #[should_panic(expected = "outside cache tile")]
    fn test_plane_tile_bounds() {
        let tile: PlaneTile<f64> = PlaneTile::new([0, 0, 0], [2, 2, 1]);
        tile.get(2, 0, 0);
    }

    #[test]
    fn test_column_ring_window() {
        let mut ring: ColumnRing<f64> = ColumnRing::new([0, 0], [2, 1], 2);
        ring.claim(0);
        ring.claim(1);
        ring.set(1, 0, 1, 4.0);
        assert_eq!(ring.window(), vec![0, 1]);
        ring.release(0);
        ring.claim(2);
        assert_eq!(ring.window(), vec![1, 2]);
        assert_eq!(ring.get(1, 0, 1), 4.0);
        assert!(!ring.holds(0));
        assert!(!ring.is_dirty(1, 0, 2));
    }

    #[test]
    #[should_panic(expected = "outside the k cache window")]
    fn test_column_ring_rejects_stale_level() {
        let mut ring: ColumnRing<f64> = ColumnRing::new([0, 0], [1, 1], 2);
        ring.claim(0);
        ring.get(0, 0, 2);
    }
}
