//! Strided multi-dimensional field storage.
//!
//! Naming convention:
//!
//! - a *data field* is one contiguous chunk of memory addressed by
//!   (i, j, k) through three strides derived from the [`Layout`];
//! - a *snapshot* is one data field of a storage; a storage holds one or
//!   more snapshots (e.g. time levels t, t+1, t+2) sharing a single layout;
//! - a *storage* is the owning container: name, meta data, snapshots.
//!
//! Temporary storages are working buffers allocated by the computation;
//! they index modularly (toroidally) along every axis so accesses in the
//! halo wrap instead of failing.

mod value;

pub use value::Float;

use std::fmt::Write as _;

use crate::diagnostic::Diagnostic;
use crate::span::Span;

/// Stride ordering of the (i, j, k) axes.
///
/// `order[d]` is the position of axis `d` from slowest (0) to fastest (2).
/// `[0, 1, 2]` puts k at stride 1; `[2, 1, 0]` puts i at stride 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Layout([usize; 3]);

impl Layout {
    /// Stride 1 on k (host default).
    pub const K_CONTIGUOUS: Layout = Layout([0, 1, 2]);
    /// Stride 1 on i (accelerator default).
    pub const I_CONTIGUOUS: Layout = Layout([2, 1, 0]);

    pub fn new(order: [usize; 3]) -> Result<Self, Diagnostic> {
        let mut seen = [false; 3];
        for &p in &order {
            if p > 2 || seen[p] {
                return Err(Diagnostic::error(
                    format!("layout {:?} is not a permutation of [0, 1, 2]", order),
                    Span::dummy(),
                ));
            }
            seen[p] = true;
        }
        Ok(Self(order))
    }

    pub fn order(&self) -> [usize; 3] {
        self.0
    }

    /// Position of axis `axis` in the stride ordering (2 = fastest).
    pub fn position(&self, axis: usize) -> usize {
        self.0[axis]
    }
}

impl Default for Layout {
    fn default() -> Self {
        Layout::K_CONTIGUOUS
    }
}

/// Storage meta data: dimensions, layout and derived strides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageInfo {
    dims: [usize; 3],
    layout: Layout,
    strides: [usize; 3],
    size: usize,
}

impl StorageInfo {
    pub fn new(dims: [usize; 3], layout: Layout) -> Result<Self, Diagnostic> {
        if dims.iter().any(|&d| d == 0) {
            return Err(Diagnostic::error(
                format!("storage dimensions {:?} must all be positive", dims),
                Span::dummy(),
            ));
        }
        let mut strides = [1usize; 3];
        for (axis, stride) in strides.iter_mut().enumerate() {
            *stride = (0..3)
                .filter(|&other| layout.position(other) > layout.position(axis))
                .map(|other| dims[other])
                .product();
        }
        Ok(Self {
            dims,
            layout,
            strides,
            size: dims.iter().product(),
        })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Linear index of an in-bounds point. Out-of-bounds is a programmer
    /// error and panics.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        assert!(
            i < self.dims[0] && j < self.dims[1] && k < self.dims[2],
            "index ({}, {}, {}) out of bounds for storage of {:?}",
            i,
            j,
            k,
            self.dims
        );
        i * self.strides[0] + j * self.strides[1] + k * self.strides[2]
    }

    /// Linear index of a signed point, asserted in bounds.
    #[inline]
    pub fn checked_index(&self, i: isize, j: isize, k: isize) -> usize {
        assert!(
            i >= 0 && j >= 0 && k >= 0,
            "index ({}, {}, {}) out of bounds for storage of {:?}",
            i,
            j,
            k,
            self.dims
        );
        self.index(i as usize, j as usize, k as usize)
    }

    /// Linear index with modular wrap on every axis (temporaries).
    #[inline]
    pub fn wrapped_index(&self, i: isize, j: isize, k: isize) -> usize {
        let wrap = |v: isize, d: usize| v.rem_euclid(d as isize) as usize;
        wrap(i, self.dims[0]) * self.strides[0]
            + wrap(j, self.dims[1]) * self.strides[1]
            + wrap(k, self.dims[2]) * self.strides[2]
    }

    /// Signed linear offset of a neighbour displacement.
    #[inline]
    pub fn offset(&self, di: i32, dj: i32, dk: i32) -> isize {
        di as isize * self.strides[0] as isize
            + dj as isize * self.strides[1] as isize
            + dk as isize * self.strides[2] as isize
    }

    /// True if the signed point lies inside the storage.
    pub fn contains(&self, i: isize, j: isize, k: isize) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.dims[0]
            && (j as usize) < self.dims[1]
            && (k as usize) < self.dims[2]
    }
}

/// An owning storage of one or more snapshots of a data field.
#[derive(Clone, Debug)]
pub struct Storage<T: Float> {
    name: String,
    info: StorageInfo,
    temporary: bool,
    fields: Vec<Vec<T>>,
}

impl<T: Float> Storage<T> {
    /// A storage with every point set to `init`.
    pub fn new(name: impl Into<String>, info: StorageInfo, init: T) -> Self {
        Self {
            name: name.into(),
            info,
            temporary: false,
            fields: vec![vec![init; info.size()]],
        }
    }

    /// A storage with the default layout.
    pub fn filled(name: impl Into<String>, dims: [usize; 3], init: T) -> Result<Self, Diagnostic> {
        Ok(Self::new(name, StorageInfo::new(dims, Layout::default())?, init))
    }

    /// A zero-initialised working buffer with modular indexing.
    pub fn temporary(name: impl Into<String>, info: StorageInfo) -> Self {
        Self {
            name: name.into(),
            info,
            temporary: true,
            fields: vec![vec![T::default(); info.size()]],
        }
    }

    /// Extend the storage to `n` snapshots; new snapshots copy snapshot 0.
    pub fn with_snapshots(mut self, n: usize) -> Self {
        let n = n.max(1);
        let first = self.fields[0].clone();
        self.fields.resize(n, first);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> &StorageInfo {
        &self.info
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn n_snapshots(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    fn linear(&self, i: usize, j: usize, k: usize) -> usize {
        if self.temporary {
            self.info.wrapped_index(i as isize, j as isize, k as isize)
        } else {
            self.info.index(i, j, k)
        }
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> T {
        self.fields[0][self.linear(i, j, k)]
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: T) {
        let idx = self.linear(i, j, k);
        self.fields[0][idx] = value;
    }

    pub fn get_snapshot(&self, snapshot: usize, i: usize, j: usize, k: usize) -> T {
        self.fields[snapshot][self.linear(i, j, k)]
    }

    pub fn fill(&mut self, value: T) {
        self.fields[0].iter_mut().for_each(|v| *v = value);
    }

    /// Set every point from a function of its coordinates.
    pub fn fill_with(&mut self, f: impl Fn(usize, usize, usize) -> T) {
        let [ni, nj, nk] = self.info.dims();
        for i in 0..ni {
            for j in 0..nj {
                for k in 0..nk {
                    let idx = self.info.index(i, j, k);
                    self.fields[0][idx] = f(i, j, k);
                }
            }
        }
    }

    /// Set every point of vertical level `k`.
    pub fn fill_level(&mut self, k: usize, value: T) {
        let [ni, nj, _] = self.info.dims();
        for i in 0..ni {
            for j in 0..nj {
                let idx = self.info.index(i, j, k);
                self.fields[0][idx] = value;
            }
        }
    }

    /// Data of snapshot 0.
    pub fn data(&self) -> &[T] {
        &self.fields[0]
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.fields[0]
    }

    pub fn snapshot(&self, n: usize) -> &[T] {
        &self.fields[n]
    }

    /// Insert `field` as snapshot 0, shifting the others back by one and
    /// dropping the oldest.
    pub fn push_back(&mut self, field: Vec<T>) {
        assert_eq!(
            field.len(),
            self.info.size(),
            "snapshot size mismatch for storage '{}'",
            self.name
        );
        self.fields.pop();
        self.fields.insert(0, field);
    }

    /// Push a zero-initialised snapshot to the front.
    pub fn push_back_new(&mut self) {
        self.push_back(vec![T::default(); self.info.size()]);
    }

    /// Cycle the snapshot ring: the oldest snapshot becomes snapshot 0.
    pub fn advance(&mut self) {
        self.fields.rotate_right(1);
    }

    /// Exchange the oldest snapshot with an external field.
    pub fn swap_field(&mut self, field: &mut Vec<T>) {
        let last = self.fields.len() - 1;
        assert_eq!(field.len(), self.info.size());
        std::mem::swap(&mut self.fields[last], field);
    }

    /// Raw pointer to snapshot `n`, for the executor's field views.
    pub(crate) fn field_ptr(&mut self, n: usize) -> *mut T {
        self.fields[n].as_mut_ptr()
    }

    /// Bounded textual preview of snapshot 0: at most 12 samples per axis.
    pub fn preview(&self) -> String {
        const SAMPLES: usize = 12;
        let [ni, nj, nk] = self.info.dims();
        let step = |n: usize| (n / SAMPLES).max(1);
        let mut out = String::new();
        let _ = writeln!(out, "{} ({}x{}x{})", self.name, ni, nj, nk);
        for i in (0..ni).step_by(step(ni)) {
            for j in (0..nj).step_by(step(nj)) {
                for k in (0..nk).step_by(step(nk)) {
                    let _ = write!(out, "[{}] ", self.get(i, j, k));
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_validation() {
        assert!(Layout::new([0, 1, 2]).is_ok());
        assert!(Layout::new([2, 0, 1]).is_ok());
        assert!(Layout::new([0, 0, 1]).is_err());
        assert!(Layout::new([0, 1, 3]).is_err());
    }

    #[test]
    fn test_strides_k_contiguous() {
        let info = StorageInfo::new([4, 5, 6], Layout::K_CONTIGUOUS).unwrap();
        assert_eq!(info.strides(), [30, 6, 1]);
        assert_eq!(info.size(), 120);
        assert_eq!(info.index(1, 2, 3), 30 + 12 + 3);
    }

    #[test]
    fn test_strides_i_contiguous() {
        let info = StorageInfo::new([4, 5, 6], Layout::I_CONTIGUOUS).unwrap();
        assert_eq!(info.strides(), [1, 4, 20]);
        assert_eq!(info.index(1, 2, 3), 1 + 8 + 60);
        assert_eq!(info.offset(1, -1, 1), 1 - 4 + 20);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_bounds_asserts() {
        let info = StorageInfo::new([2, 2, 2], Layout::default()).unwrap();
        info.index(2, 0, 0);
    }

    #[test]
    fn test_wrapped_index() {
        let info = StorageInfo::new([4, 4, 4], Layout::default()).unwrap();
        assert_eq!(info.wrapped_index(-1, 0, 0), info.index(3, 0, 0));
        assert_eq!(info.wrapped_index(4, 5, -2), info.index(0, 1, 2));
    }

    #[test]
    fn test_storage_get_set() {
        let mut s = Storage::filled("rhs", [2, 2, 6], 3.0f64).unwrap();
        s.fill_level(0, 4.0);
        s.set(1, 1, 5, 2.0);
        assert_eq!(s.get(0, 1, 0), 4.0);
        assert_eq!(s.get(1, 1, 5), 2.0);
        assert_eq!(s.get(0, 0, 3), 3.0);
    }

    #[test]
    fn test_temporary_wraps() {
        let info = StorageInfo::new([3, 3, 3], Layout::default()).unwrap();
        let mut t: Storage<f64> = Storage::temporary("tmp", info);
        assert!(t.is_temporary());
        t.set(4, 0, 0, 7.0);
        assert_eq!(t.get(1, 0, 0), 7.0);
    }

    #[test]
    fn test_snapshot_ring() {
        let mut s = Storage::filled("u", [1, 1, 2], 1.0f64).unwrap().with_snapshots(3);
        assert_eq!(s.n_snapshots(), 3);
        s.push_back(vec![2.0, 2.0]);
        assert_eq!(s.snapshot(0), &[2.0, 2.0]);
        assert_eq!(s.snapshot(1), &[1.0, 1.0]);
        assert_eq!(s.n_snapshots(), 3);

        s.push_back_new();
        assert_eq!(s.snapshot(0), &[0.0, 0.0]);
        assert_eq!(s.snapshot(1), &[2.0, 2.0]);
        assert_eq!(s.snapshot(2), &[1.0, 1.0]);

        s.advance();
        assert_eq!(s.snapshot(0), &[1.0, 1.0]);
        assert_eq!(s.snapshot(1), &[0.0, 0.0]);
    }

    #[test]
    fn test_swap_field() {
        let mut s = Storage::filled("u", [1, 1, 1], 1.0f64).unwrap().with_snapshots(2);
        let mut external = vec![9.0];
        s.swap_field(&mut external);
        assert_eq!(s.snapshot(1), &[9.0]);
        assert_eq!(external, vec![1.0]);
    }

    #[test]
    fn test_fill_with_and_preview() {
        let mut s = Storage::filled("x", [2, 2, 2], 0.0f64).unwrap();
        s.fill_with(|i, j, k| (i * 100 + j * 10 + k) as f64);
        assert_eq!(s.get(1, 0, 1), 101.0);
        let text = s.preview();
        assert!(text.starts_with("x (2x2x2)"));
        assert!(text.contains("[111]"));
    }
}
