use std::ops::{Add, Div, Mul, Neg, Sub};

use super::Accessor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Min => "min",
            BinOp::Max => "max",
        }
    }

    /// Infix operators print between operands; `min`/`max` print as calls.
    pub fn is_infix(&self) -> bool {
        !matches!(self, BinOp::Min | BinOp::Max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Abs,
    Sqrt,
    Exp,
}

impl UnOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Abs => "abs",
            UnOp::Sqrt => "sqrt",
            UnOp::Exp => "exp",
        }
    }
}

/// A stencil expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(f64),
    Load(Accessor),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn unary(op: UnOp, operand: impl Into<Expr>) -> Expr {
        Expr::Unary(op, Box::new(operand.into()))
    }

    pub fn binary(op: BinOp, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(op, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// Visit every accessor load, left to right.
    pub fn for_each_load(&self, f: &mut impl FnMut(&Accessor)) {
        match self {
            Expr::Const(_) => {}
            Expr::Load(acc) => f(acc),
            Expr::Unary(_, operand) => operand.for_each_load(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.for_each_load(f);
                rhs.for_each_load(f);
            }
        }
    }

    pub fn loads(&self) -> Vec<Accessor> {
        let mut out = Vec::new();
        self.for_each_load(&mut |acc| out.push(*acc));
        out
    }

    /// Maximum operand stack depth needed to evaluate this tree in postfix
    /// order.
    pub fn stack_depth(&self) -> usize {
        match self {
            Expr::Const(_) | Expr::Load(_) => 1,
            Expr::Unary(_, operand) => operand.stack_depth(),
            Expr::Binary(_, lhs, rhs) => lhs.stack_depth().max(rhs.stack_depth() + 1),
        }
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Const(v)
    }
}

impl From<Accessor> for Expr {
    fn from(acc: Accessor) -> Self {
        Expr::Load(acc)
    }
}

pub fn min(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    Expr::binary(BinOp::Min, a, b)
}

pub fn max(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    Expr::binary(BinOp::Max, a, b)
}

pub fn abs(a: impl Into<Expr>) -> Expr {
    Expr::unary(UnOp::Abs, a)
}

pub fn sqrt(a: impl Into<Expr>) -> Expr {
    Expr::unary(UnOp::Sqrt, a)
}

pub fn exp(a: impl Into<Expr>) -> Expr {
    Expr::unary(UnOp::Exp, a)
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;
            fn $method(self, rhs: R) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl<R: Into<Expr>> $trait<R> for Accessor {
            type Output = Expr;
            fn $method(self, rhs: R) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl $trait<Accessor> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Accessor) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }
    };
}

impl_binop!(Add, add, BinOp::Add);
impl_binop!(Sub, sub, BinOp::Sub);
impl_binop!(Mul, mul, BinOp::Mul);
impl_binop!(Div, div, BinOp::Div);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnOp::Neg, self)
    }
}

impl Neg for Accessor {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnOp::Neg, self)
    }
}

/// `target = expr`, evaluated at the current point.
#[derive(Clone, Debug, PartialEq)]
pub struct Assign {
    pub target: Accessor,
    pub expr: Expr,
}

impl Assign {
    pub fn new(target: Accessor, expr: impl Into<Expr>) -> Self {
        Self {
            target,
            expr: expr.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Accessor = Accessor::new(0);
    const B: Accessor = Accessor::new(1);

    #[test]
    fn test_operator_overloading_builds_tree() {
        let e = A / (B - A.k(-1) * 2.0);
        match &e {
            Expr::Binary(BinOp::Div, lhs, rhs) => {
                assert_eq!(**lhs, Expr::Load(A));
                assert!(matches!(**rhs, Expr::Binary(BinOp::Sub, _, _)));
            }
            other => panic!("unexpected tree {:?}", other),
        }
        assert_eq!(e.loads(), vec![A, B, A.k(-1)]);
    }

    #[test]
    fn test_scalar_on_the_left() {
        let e = 1.0 - A;
        assert_eq!(e, Expr::binary(BinOp::Sub, 1.0, A));
        let n = -B;
        assert_eq!(n, Expr::unary(UnOp::Neg, B));
    }

    #[test]
    fn test_functions() {
        let e = max(abs(A), sqrt(B)) + min(exp(A), 0.5);
        assert_eq!(e.loads().len(), 3);
    }

    #[test]
    fn test_stack_depth() {
        assert_eq!(Expr::from(A).stack_depth(), 1);
        assert_eq!((A + B).stack_depth(), 2);
        assert_eq!((A + (B * (A - B))).stack_depth(), 4);
        assert_eq!((((A + B) * A) - B).stack_depth(), 2);
    }
}
