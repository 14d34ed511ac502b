//! Structured grid: horizontal iteration bounds and vertical splitters.
//!
//! The horizontal plane is described per axis by a [`HorizontalRange`]
//! (halo minus, halo plus, begin, end, total length). The vertical axis
//! is described by a list of splitter values; named intervals are built
//! from [`Level`]s relative to those splitters and resolved to concrete
//! k ranges once per computation.

mod interval;

pub use interval::{Interval, IntervalTable, KRange, Level};

use crate::diagnostic::Diagnostic;
use crate::span::Span;

/// Iteration bounds along one horizontal axis.
///
/// Points `begin..=end` are computed; `minus`/`plus` are the halo widths
/// reserved in front of `begin` and after `end`; `total` is the storage
/// length along the axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HorizontalRange {
    pub minus: usize,
    pub plus: usize,
    pub begin: usize,
    pub end: usize,
    pub total: usize,
}

impl HorizontalRange {
    pub fn new(
        minus: usize,
        plus: usize,
        begin: usize,
        end: usize,
        total: usize,
    ) -> Result<Self, Diagnostic> {
        if total == 0 || begin > end || end >= total {
            return Err(Diagnostic::error(
                format!(
                    "invalid horizontal range: begin {} end {} total {}",
                    begin, end, total
                ),
                Span::dummy(),
            )
            .with_note("expected begin <= end < total".to_string()));
        }
        if minus > begin || end + plus >= total {
            return Err(Diagnostic::error(
                format!(
                    "halo ({}, {}) does not fit around {}..={} in a length of {}",
                    minus, plus, begin, end, total
                ),
                Span::dummy(),
            ));
        }
        Ok(Self {
            minus,
            plus,
            begin,
            end,
            total,
        })
    }

    /// A range of `n` points with the given halo on both sides.
    pub fn with_halo(n: usize, halo: usize) -> Result<Self, Diagnostic> {
        if n == 0 {
            return Err(Diagnostic::error(
                "horizontal range must contain at least one point".to_string(),
                Span::dummy(),
            ));
        }
        Self::new(halo, halo, halo, halo + n - 1, n + 2 * halo)
    }

    /// Number of computed points.
    pub fn len(&self) -> usize {
        self.end - self.begin + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// The iteration space of a computation. Immutable after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    i: HorizontalRange,
    j: HorizontalRange,
    value_list: Vec<usize>,
}

impl Grid {
    /// Build a grid from two horizontal ranges and the vertical splitter
    /// values. Splitters must be non-decreasing; the first and last bound
    /// the vertical compute range.
    pub fn new(
        i: HorizontalRange,
        j: HorizontalRange,
        value_list: Vec<usize>,
    ) -> Result<Self, Diagnostic> {
        if value_list.is_empty() {
            return Err(Diagnostic::error(
                "grid needs at least one vertical splitter".to_string(),
                Span::dummy(),
            ));
        }
        if value_list.windows(2).any(|w| w[0] > w[1]) {
            return Err(Diagnostic::error(
                format!("vertical splitters {:?} are decreasing", value_list),
                Span::dummy(),
            ));
        }
        Ok(Self { i, j, value_list })
    }

    /// Grid of `ni x nj x nk` points without halo, splitters `[0, nk - 1]`.
    pub fn from_sizes(ni: usize, nj: usize, nk: usize) -> Result<Self, Diagnostic> {
        Self::with_halo(ni, nj, nk, 0)
    }

    /// Grid of `ni x nj x nk` computed points with a horizontal halo.
    pub fn with_halo(ni: usize, nj: usize, nk: usize, halo: usize) -> Result<Self, Diagnostic> {
        if nk == 0 {
            return Err(Diagnostic::error(
                "grid has no vertical levels".to_string(),
                Span::dummy(),
            ));
        }
        Self::new(
            HorizontalRange::with_halo(ni, halo)?,
            HorizontalRange::with_halo(nj, halo)?,
            vec![0, nk - 1],
        )
    }

    pub fn i(&self) -> &HorizontalRange {
        &self.i
    }

    pub fn j(&self) -> &HorizontalRange {
        &self.j
    }

    pub fn value_list(&self) -> &[usize] {
        &self.value_list
    }

    /// The vertical compute range: first to last splitter, inclusive.
    pub fn k_range(&self) -> KRange {
        KRange {
            first: self.value_list[0],
            last: self.value_list[self.value_list.len() - 1],
        }
    }

    /// Number of vertical levels a storage must hold for this grid.
    pub fn k_total(&self) -> usize {
        self.k_range().last + 1
    }

    /// Storage dimensions covering the whole grid (halo included).
    pub fn storage_dims(&self) -> [usize; 3] {
        [self.i.total, self.j.total, self.k_total()]
    }
}
