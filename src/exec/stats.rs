use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Access counters of one run, merged across workers.
///
/// Cache fills count as memory reads (or read-only reads) and cache
/// flushes as memory writes; `fills`/`flushes` count the same events
/// separately.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessStats {
    pub memory_reads: u64,
    pub memory_writes: u64,
    pub cache_reads: u64,
    pub cache_writes: u64,
    pub readonly_reads: u64,
    pub fills: u64,
    pub flushes: u64,
    pub points: u64,
    pub barriers: u64,
}

impl AccessStats {
    /// Reads served from memory by either path.
    pub fn total_memory_reads(&self) -> u64 {
        self.memory_reads + self.readonly_reads
    }
}

impl AddAssign for AccessStats {
    fn add_assign(&mut self, rhs: Self) {
        self.memory_reads += rhs.memory_reads;
        self.memory_writes += rhs.memory_writes;
        self.cache_reads += rhs.cache_reads;
        self.cache_writes += rhs.cache_writes;
        self.readonly_reads += rhs.readonly_reads;
        self.fills += rhs.fills;
        self.flushes += rhs.flushes;
        self.points += rhs.points;
        self.barriers += rhs.barriers;
    }
}

impl Add for AccessStats {
    type Output = AccessStats;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sum for AccessStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(AccessStats::default(), Add::add)
    }
}

impl fmt::Display for AccessStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "points          {:>12}", self.points)?;
        writeln!(f, "memory reads    {:>12}", self.memory_reads)?;
        writeln!(f, "memory writes   {:>12}", self.memory_writes)?;
        writeln!(f, "read-only reads {:>12}", self.readonly_reads)?;
        writeln!(f, "cache reads     {:>12}", self.cache_reads)?;
        writeln!(f, "cache writes    {:>12}", self.cache_writes)?;
        writeln!(f, "cache fills     {:>12}", self.fills)?;
        writeln!(f, "cache flushes   {:>12}", self.flushes)?;
        write!(f, "barriers        {:>12}", self.barriers)
    }
}
