use crate::diagnostic::Diagnostic;
use crate::span::Span;

use super::Grid;

/// A vertical position relative to a splitter.
///
/// `offset` is never zero: positive offsets count levels above the
/// splitter starting at +1 (the level right after it), negative offsets
/// count down starting at -1 (the splitter level itself).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Level {
    pub splitter: usize,
    pub offset: i32,
}

impl Level {
    pub const fn new(splitter: usize, offset: i32) -> Self {
        assert!(offset != 0, "level offset must be non-zero");
        Self { splitter, offset }
    }

    /// Resolve against the grid's splitter values.
    pub fn resolve(&self, value_list: &[usize]) -> Result<i64, Diagnostic> {
        let base = value_list.get(self.splitter).ok_or_else(|| {
            Diagnostic::error(
                format!(
                    "level refers to splitter {} but the grid has {}",
                    self.splitter,
                    value_list.len()
                ),
                Span::dummy(),
            )
        })?;
        let base = *base as i64;
        let offset = self.offset as i64;
        Ok(if offset > 0 {
            base + offset
        } else {
            base + offset + 1
        })
    }
}

/// An inclusive vertical interval between two levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Interval {
    pub from: Level,
    pub to: Level,
}

impl Interval {
    pub const fn new(from: Level, to: Level) -> Self {
        Self { from, to }
    }

    /// Single-level interval.
    pub const fn at(level: Level) -> Self {
        Self {
            from: level,
            to: level,
        }
    }

    /// Resolve to a k range clipped to the grid's vertical compute range.
    ///
    /// `Ok(None)` means the interval is well formed but no level of this
    /// grid falls inside it.
    pub fn resolve(&self, grid: &Grid) -> Result<Option<KRange>, Diagnostic> {
        let from = self.from.resolve(grid.value_list())?;
        let to = self.to.resolve(grid.value_list())?;
        if from > to {
            return Err(Diagnostic::error(
                format!(
                    "empty interval {} (resolves to k {}..={})",
                    self, from, to
                ),
                Span::dummy(),
            ));
        }
        let bounds = grid.k_range();
        let first = from.max(bounds.first as i64);
        let last = to.min(bounds.last as i64);
        if first > last {
            return Ok(None);
        }
        Ok(Some(KRange {
            first: first as usize,
            last: last as usize,
        }))
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[({}, {:+}), ({}, {:+})]",
            self.from.splitter, self.from.offset, self.to.splitter, self.to.offset
        )
    }
}

/// A resolved inclusive k range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KRange {
    pub first: usize,
    pub last: usize,
}

impl KRange {
    pub fn contains(&self, k: usize) -> bool {
        k >= self.first && k <= self.last
    }

    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Static dispatch table from k level to overload index.
///
/// Built once per functor at setup; the executor looks up the overload
/// for the current level instead of testing interval membership per point.
#[derive(Clone, Debug)]
pub struct IntervalTable {
    first_k: usize,
    slots: Vec<Option<usize>>,
    ranges: Vec<Option<KRange>>,
}

impl IntervalTable {
    pub fn build(intervals: &[Interval], grid: &Grid) -> Result<Self, Diagnostic> {
        let bounds = grid.k_range();
        let mut slots = vec![None; bounds.len()];
        let mut ranges = Vec::with_capacity(intervals.len());
        for (index, interval) in intervals.iter().enumerate() {
            let resolved = interval.resolve(grid)?;
            if let Some(range) = resolved {
                for k in range.first..=range.last {
                    let slot = &mut slots[k - bounds.first];
                    if let Some(previous) = *slot {
                        return Err(Diagnostic::error(
                            format!(
                                "overlapping intervals {} and {} at k = {}",
                                intervals[previous], interval, k
                            ),
                            Span::dummy(),
                        )
                        .with_help("each level may select at most one overload".to_string()));
                    }
                    *slot = Some(index);
                }
            }
            ranges.push(resolved);
        }
        Ok(Self {
            first_k: bounds.first,
            slots,
            ranges,
        })
    }

    /// Overload selected at level `k`, if any.
    #[inline]
    pub fn lookup(&self, k: usize) -> Option<usize> {
        k.checked_sub(self.first_k)
            .and_then(|idx| self.slots.get(idx).copied().flatten())
    }

    /// Resolved k range of an overload (`None` if it selects no level).
    pub fn range(&self, overload: usize) -> Option<KRange> {
        self.ranges.get(overload).copied().flatten()
    }

    /// True if no level selects any overload.
    pub fn is_unused(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thomas_intervals() -> (Interval, Interval, Interval) {
        let first = Interval::at(Level::new(0, -1));
        let internal = Interval::new(Level::new(0, 1), Level::new(1, -2));
        let last = Interval::at(Level::new(1, -1));
        (first, internal, last)
    }

    #[test]
    fn test_level_resolution() {
        let values = [0, 5];
        assert_eq!(Level::new(0, -1).resolve(&values).unwrap(), 0);
        assert_eq!(Level::new(0, 1).resolve(&values).unwrap(), 1);
        assert_eq!(Level::new(1, -2).resolve(&values).unwrap(), 4);
        assert_eq!(Level::new(1, -1).resolve(&values).unwrap(), 5);
        assert_eq!(Level::new(1, 1).resolve(&values).unwrap(), 6);
        assert!(Level::new(2, 1).resolve(&values).is_err());
    }

    #[test]
    fn test_interval_resolution_clips_to_grid() {
        let grid = Grid::from_sizes(1, 1, 6).unwrap();
        let axis = Interval::new(Level::new(0, -1), Level::new(1, 1));
        assert_eq!(
            axis.resolve(&grid).unwrap(),
            Some(KRange { first: 0, last: 5 })
        );
        let (first, internal, last) = thomas_intervals();
        assert_eq!(first.resolve(&grid).unwrap(), Some(KRange { first: 0, last: 0 }));
        assert_eq!(
            internal.resolve(&grid).unwrap(),
            Some(KRange { first: 1, last: 4 })
        );
        assert_eq!(last.resolve(&grid).unwrap(), Some(KRange { first: 5, last: 5 }));
    }

    #[test]
    fn test_interval_outside_grid() {
        let grid = Grid::from_sizes(1, 1, 6).unwrap();
        let above = Interval::new(Level::new(1, 2), Level::new(1, 3));
        assert_eq!(above.resolve(&grid).unwrap(), None);
    }

    #[test]
    fn test_empty_interval_rejected() {
        let grid = Grid::from_sizes(1, 1, 6).unwrap();
        let backwards = Interval::new(Level::new(1, -1), Level::new(0, -1));
        assert!(backwards.resolve(&grid).is_err());
    }

    #[test]
    fn test_interval_table_dispatch() {
        let grid = Grid::from_sizes(1, 1, 6).unwrap();
        let (first, internal, last) = thomas_intervals();
        let table = IntervalTable::build(&[internal, last, first], &grid).unwrap();
        assert_eq!(table.lookup(0), Some(2));
        for k in 1..=4 {
            assert_eq!(table.lookup(k), Some(0));
        }
        assert_eq!(table.lookup(5), Some(1));
        assert_eq!(table.lookup(6), None);
        assert_eq!(table.range(1), Some(KRange { first: 5, last: 5 }));
        assert!(!table.is_unused());
    }

    #[test]
    fn test_interval_table_rejects_overlap() {
        let grid = Grid::from_sizes(1, 1, 6).unwrap();
        let (first, internal, _) = thomas_intervals();
        let axis = Interval::new(Level::new(0, -1), Level::new(1, -1));
        let err = IntervalTable::build(&[first, internal, axis], &grid).unwrap_err();
        assert!(err.message.contains("overlapping intervals"));
    }

    #[test]
    fn test_partial_coverage() {
        let grid = Grid::from_sizes(1, 1, 6).unwrap();
        let (first, _, _) = thomas_intervals();
        let table = IntervalTable::build(&[first], &grid).unwrap();
        assert_eq!(table.lookup(0), Some(0));
        assert_eq!(table.lookup(3), None);
    }
}
