//! Field comparison with a relative/absolute tolerance.
//!
//! Two values agree when their absolute difference, or their difference
//! relative to the larger magnitude, is below the precision. Points within
//! `halos[axis] = [low, high]` of each storage edge are skipped.

use std::fmt;

use log::debug;

use crate::diagnostic::Diagnostic;
use crate::span::Span;
use crate::storage::{Float, Storage};

/// At most this many mismatching points are kept in a report.
const MAX_RECORDED: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mismatch {
    pub point: [usize; 3],
    pub expected: f64,
    pub actual: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    pub checked: usize,
    pub failed: usize,
    pub max_error: f64,
    /// The first mismatches in (i, j, k) order.
    pub mismatches: Vec<Mismatch>,
}

impl Report {
    pub fn is_ok(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(
                f,
                "{} points agree (max error {:.3e})",
                self.checked, self.max_error
            );
        }
        writeln!(
            f,
            "{} of {} points differ (max error {:.3e})",
            self.failed, self.checked, self.max_error
        )?;
        for m in &self.mismatches {
            writeln!(
                f,
                "  ({}, {}, {}): expected {}, got {}",
                m.point[0], m.point[1], m.point[2], m.expected, m.actual
            )?;
        }
        if self.failed > self.mismatches.len() {
            writeln!(f, "  ... {} more", self.failed - self.mismatches.len())?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verifier {
    precision: f64,
    halos: [[usize; 2]; 3],
}

impl Verifier {
    pub fn new(precision: f64) -> Self {
        Self {
            precision,
            halos: [[0, 0]; 3],
        }
    }

    /// The default precision of the value type.
    pub fn for_type<T: Float>() -> Self {
        Self::new(T::TOLERANCE)
    }

    pub fn with_halos(mut self, halos: [[usize; 2]; 3]) -> Self {
        self.halos = halos;
        self
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    pub fn halos(&self) -> [[usize; 2]; 3] {
        self.halos
    }

    pub fn agree(&self, expected: f64, actual: f64) -> bool {
        let diff = (expected - actual).abs();
        if diff < self.precision {
            return true;
        }
        diff / expected.abs().max(actual.abs()) < self.precision
    }

    /// Compare `actual` against a reference storage of the same shape.
    pub fn verify<T: Float>(&self, expected: &Storage<T>, actual: &Storage<T>) -> Result<Report, Diagnostic> {
        let (de, da) = (expected.info().dims(), actual.info().dims());
        if de != da {
            return Err(Diagnostic::error(
                format!(
                    "cannot compare '{}' {:?} with '{}' {:?}",
                    actual.name(),
                    da,
                    expected.name(),
                    de
                ),
                Span::dummy(),
            ));
        }
        Ok(self.verify_with(actual, |i, j, k| expected.get(i, j, k)))
    }

    /// Compare every point against one value.
    pub fn verify_value<T: Float>(&self, actual: &Storage<T>, expected: T) -> Report {
        self.verify_with(actual, |_, _, _| expected)
    }

    /// Compare against a reference function of the point.
    pub fn verify_with<T: Float>(&self, actual: &Storage<T>, expected: impl Fn(usize, usize, usize) -> T) -> Report {
        let dims = actual.info().dims();
        let mut bounds = [(0, 0); 3];
        for axis in 0..3 {
            let [low, high] = self.halos[axis];
            bounds[axis] = (low, dims[axis].saturating_sub(high));
        }

        let mut report = Report::default();
        for i in bounds[0].0..bounds[0].1 {
            for j in bounds[1].0..bounds[1].1 {
                for k in bounds[2].0..bounds[2].1 {
                    let e = expected(i, j, k).to_f64();
                    let a = actual.get(i, j, k).to_f64();
                    report.checked += 1;
                    let err = (e - a).abs();
                    if err > report.max_error || err.is_nan() {
                        report.max_error = err;
                    }
                    if !self.agree(e, a) {
                        report.failed += 1;
                        if report.mismatches.len() < MAX_RECORDED {
                            report.mismatches.push(Mismatch {
                                point: [i, j, k],
                                expected: e,
                                actual: a,
                            });
                        }
                    }
                }
            }
        }
        debug!(
            "verified '{}': {} points, {} failed",
            actual.name(),
            report.checked,
            report.failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agree_absolute_and_relative() {
        let v = Verifier::new(1e-6);
        assert!(v.agree(1.0, 1.0 + 1e-8));
        assert!(v.agree(1e9, 1e9 + 1.0));
        assert!(!v.agree(1.0, 1.1));
        assert!(!v.agree(0.0, f64::NAN));
    }

    #[test]
    fn test_verify_value_with_halos() {
        let mut s = Storage::filled("out", [4, 4, 2], 1.0f64).unwrap();
        s.set(0, 0, 0, 5.0);
        let all = Verifier::new(1e-12).verify_value(&s, 1.0);
        assert_eq!(all.checked, 32);
        assert_eq!(all.failed, 1);
        assert_eq!(all.mismatches[0].point, [0, 0, 0]);
        assert_eq!(all.max_error, 4.0);

        let inner = Verifier::new(1e-12)
            .with_halos([[1, 1], [1, 1], [0, 0]])
            .verify_value(&s, 1.0);
        assert_eq!(inner.checked, 8);
        assert!(inner.is_ok());
    }

    #[test]
    fn test_verify_storages() {
        let a = Storage::filled("a", [2, 2, 2], 3.0f32).unwrap();
        let b = Storage::filled("b", [2, 2, 2], 3.0f32).unwrap();
        let c = Storage::filled("c", [2, 2, 3], 3.0f32).unwrap();
        let v = Verifier::for_type::<f32>();
        assert!(v.verify(&a, &b).unwrap().is_ok());
        assert!(v.verify(&a, &c).is_err());
    }

    #[test]
    fn test_report_display() {
        let mut s = Storage::filled("out", [2, 1, 1], 0.0f64).unwrap();
        s.set(1, 0, 0, 2.0);
        let report = Verifier::new(1e-9).verify_value(&s, 0.0);
        let text = report.to_string();
        assert!(text.starts_with("1 of 2 points differ"));
        assert!(text.contains("(1, 0, 0): expected 0, got 2"));
    }
}
