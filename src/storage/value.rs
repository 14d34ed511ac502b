use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Floating point value type of a storage.
///
/// Implemented for `f32` and `f64`. All storages and stages of one
/// computation share the same value type, so a mismatch is a compile error.
pub trait Float:
    Copy
    + Send
    + Sync
    + Default
    + PartialEq
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// C type name used by generated kernels.
    const C_TYPE: &'static str;
    /// Default verification tolerance for this precision.
    const TOLERANCE: f64;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
    fn abs(self) -> Self;
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
}

macro_rules! impl_float {
    ($t:ty, $c:literal, $tol:expr) => {
        impl Float for $t {
            const C_TYPE: &'static str = $c;
            const TOLERANCE: f64 = $tol;

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline]
            fn abs(self) -> Self {
                <$t>::abs(self)
            }
            #[inline]
            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }
            #[inline]
            fn exp(self) -> Self {
                <$t>::exp(self)
            }
            #[inline]
            fn min(self, other: Self) -> Self {
                <$t>::min(self, other)
            }
            #[inline]
            fn max(self, other: Self) -> Self {
                <$t>::max(self, other)
            }
        }
    };
}

impl_float!(f32, "float", 1e-6);
impl_float!(f64, "double", 1e-12);
