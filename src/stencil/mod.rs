//! Stencil functors: parameters, accessors, expression bodies.
//!
//! A functor declares its parameters (name, intent, horizontal extent) and
//! one body per vertical interval. A body is either a list of assignments
//! over [`Expr`] trees, compiled to a flat program at setup, or a native
//! closure evaluated point by point on the host.

mod expr;
mod functor;
pub mod parse;

pub use expr::{abs, exp, max, min, sqrt, Assign, BinOp, Expr, UnOp};
pub use functor::{Body, Functor, NativeFn, Overload};

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    In,
    InOut,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::In => write!(f, "in"),
            Intent::InOut => write!(f, "inout"),
        }
    }
}

/// The neighbourhood a parameter is accessed with.
///
/// All six widths are non-negative: `iminus` is how far the access reaches
/// towards smaller i, `iplus` towards larger i, and so on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub iminus: i32,
    pub iplus: i32,
    pub jminus: i32,
    pub jplus: i32,
    pub kminus: i32,
    pub kplus: i32,
}

impl Extent {
    pub const ZERO: Extent = Extent {
        iminus: 0,
        iplus: 0,
        jminus: 0,
        jplus: 0,
        kminus: 0,
        kplus: 0,
    };

    pub const fn new(iminus: i32, iplus: i32, jminus: i32, jplus: i32, kminus: i32, kplus: i32) -> Self {
        Self {
            iminus,
            iplus,
            jminus,
            jplus,
            kminus,
            kplus,
        }
    }

    pub const fn horizontal(iminus: i32, iplus: i32, jminus: i32, jplus: i32) -> Self {
        Self::new(iminus, iplus, jminus, jplus, 0, 0)
    }

    /// The smallest extent containing a single offset.
    pub fn from_offset(offset: [i32; 3]) -> Self {
        Self::new(
            (-offset[0]).max(0),
            offset[0].max(0),
            (-offset[1]).max(0),
            offset[1].max(0),
            (-offset[2]).max(0),
            offset[2].max(0),
        )
    }

    pub fn union(self, other: Extent) -> Extent {
        Extent::new(
            self.iminus.max(other.iminus),
            self.iplus.max(other.iplus),
            self.jminus.max(other.jminus),
            self.jplus.max(other.jplus),
            self.kminus.max(other.kminus),
            self.kplus.max(other.kplus),
        )
    }

    /// Minkowski sum: the reach of `other` applied at every point of `self`.
    pub fn grow(self, other: Extent) -> Extent {
        Extent::new(
            self.iminus + other.iminus,
            self.iplus + other.iplus,
            self.jminus + other.jminus,
            self.jplus + other.jplus,
            self.kminus + other.kminus,
            self.kplus + other.kplus,
        )
    }

    pub fn covers(&self, offset: [i32; 3]) -> bool {
        -offset[0] <= self.iminus
            && offset[0] <= self.iplus
            && -offset[1] <= self.jminus
            && offset[1] <= self.jplus
            && -offset[2] <= self.kminus
            && offset[2] <= self.kplus
    }

    pub fn covers_horizontal(&self, offset: [i32; 3]) -> bool {
        self.covers([offset[0], offset[1], 0])
    }

    /// The same extent with the vertical widths dropped.
    pub fn horizontal_part(self) -> Extent {
        Extent::horizontal(self.iminus, self.iplus, self.jminus, self.jplus)
    }

    pub fn is_zero(&self) -> bool {
        *self == Extent::ZERO
    }

    pub fn is_horizontally_zero(&self) -> bool {
        self.horizontal_part().is_zero()
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}, {}, {}]",
            self.iminus, self.iplus, self.jminus, self.jplus, self.kminus, self.kplus
        )
    }
}

/// One accessor slot of a functor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub intent: Intent,
    pub extent: Extent,
}

impl Param {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            intent: Intent::In,
            extent: Extent::ZERO,
        }
    }

    pub fn inout(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            intent: Intent::InOut,
            extent: Extent::ZERO,
        }
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = extent;
        self
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.intent, self.name)?;
        if !self.extent.is_zero() {
            write!(
                f,
                " [{}, {}, {}, {}]",
                self.extent.iminus, self.extent.iplus, self.extent.jminus, self.extent.jplus
            )?;
        }
        Ok(())
    }
}

/// A reference to a parameter at a relative offset, optionally into an
/// older snapshot of the bound storage.
///
/// ```
/// use gridstencil::stencil::Accessor;
///
/// const SUP: Accessor = Accessor::new(3);
/// let below = SUP.k(-1);
/// assert_eq!(below.offset, [0, 0, -1]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Accessor {
    pub param: usize,
    pub offset: [i32; 3],
    pub snapshot: usize,
}

impl Accessor {
    pub const fn new(param: usize) -> Self {
        Self {
            param,
            offset: [0, 0, 0],
            snapshot: 0,
        }
    }

    pub const fn at(self, di: i32, dj: i32, dk: i32) -> Self {
        Self {
            offset: [di, dj, dk],
            ..self
        }
    }

    pub const fn i(self, d: i32) -> Self {
        Self {
            offset: [d, self.offset[1], self.offset[2]],
            ..self
        }
    }

    pub const fn j(self, d: i32) -> Self {
        Self {
            offset: [self.offset[0], d, self.offset[2]],
            ..self
        }
    }

    pub const fn k(self, d: i32) -> Self {
        Self {
            offset: [self.offset[0], self.offset[1], d],
            ..self
        }
    }

    pub const fn snapshot(self, n: usize) -> Self {
        Self { snapshot: n, ..self }
    }

    pub fn is_center(&self) -> bool {
        self.offset == [0, 0, 0]
    }
}
