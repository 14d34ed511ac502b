use crate::stencil::{Accessor, Assign, BinOp, Expr, UnOp};
use crate::storage::Float;

/// One instruction of a compiled stage body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KOp<T> {
    Const(T),
    /// Push the value behind accessor slot `n`.
    Load(usize),
    Neg,
    Abs,
    Sqrt,
    Exp,
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    /// Pop and write to param `n` at the current point.
    Store(usize),
}

/// Point access used by compiled and native bodies.
pub(crate) trait PointAccess<T: Float> {
    fn load(&mut self, acc: &Accessor) -> T;
    fn store(&mut self, param: usize, value: T);
    fn position(&self) -> [isize; 3];
}

/// A flat postfix program over deduplicated accessor slots.
#[derive(Clone, Debug, PartialEq)]
pub struct Program<T> {
    ops: Vec<KOp<T>>,
    slots: Vec<Accessor>,
    max_stack: usize,
}

impl<T: Float> Program<T> {
    pub fn compile(assigns: &[Assign]) -> Self {
        let mut program = Program {
            ops: Vec::new(),
            slots: Vec::new(),
            max_stack: 0,
        };
        for assign in assigns {
            program.max_stack = program.max_stack.max(assign.expr.stack_depth());
            program.emit(&assign.expr);
            program.ops.push(KOp::Store(assign.target.param));
        }
        program
    }

    fn slot(&mut self, acc: &Accessor) -> usize {
        match self.slots.iter().position(|s| s == acc) {
            Some(n) => n,
            None => {
                self.slots.push(*acc);
                self.slots.len() - 1
            }
        }
    }

    fn emit(&mut self, expr: &Expr) {
        match expr {
            Expr::Const(v) => self.ops.push(KOp::Const(T::from_f64(*v))),
            Expr::Load(acc) => {
                let slot = self.slot(acc);
                self.ops.push(KOp::Load(slot));
            }
            Expr::Unary(op, operand) => {
                self.emit(operand);
                self.ops.push(match op {
                    UnOp::Neg => KOp::Neg,
                    UnOp::Abs => KOp::Abs,
                    UnOp::Sqrt => KOp::Sqrt,
                    UnOp::Exp => KOp::Exp,
                });
            }
            Expr::Binary(op, lhs, rhs) => {
                self.emit(lhs);
                self.emit(rhs);
                self.ops.push(match op {
                    BinOp::Add => KOp::Add,
                    BinOp::Sub => KOp::Sub,
                    BinOp::Mul => KOp::Mul,
                    BinOp::Div => KOp::Div,
                    BinOp::Min => KOp::Min,
                    BinOp::Max => KOp::Max,
                });
            }
        }
    }

    pub fn ops(&self) -> &[KOp<T>] {
        &self.ops
    }

    pub fn slots(&self) -> &[Accessor] {
        &self.slots
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Evaluate at the access's current point. `stack` is scratch space
    /// reused across points.
    pub(crate) fn run<A: PointAccess<T> + ?Sized>(&self, access: &mut A, stack: &mut Vec<T>) {
        stack.clear();
        for op in &self.ops {
            match *op {
                KOp::Const(v) => stack.push(v),
                KOp::Load(slot) => stack.push(access.load(&self.slots[slot])),
                KOp::Neg => unary(stack, |v| -v),
                KOp::Abs => unary(stack, T::abs),
                KOp::Sqrt => unary(stack, T::sqrt),
                KOp::Exp => unary(stack, T::exp),
                KOp::Add => binary(stack, |a, b| a + b),
                KOp::Sub => binary(stack, |a, b| a - b),
                KOp::Mul => binary(stack, |a, b| a * b),
                KOp::Div => binary(stack, |a, b| a / b),
                KOp::Min => binary(stack, T::min),
                KOp::Max => binary(stack, T::max),
                KOp::Store(param) => {
                    let Some(value) = stack.pop() else {
                        unreachable!("operand stack underflow");
                    };
                    access.store(param, value);
                }
            }
        }
    }
}

#[inline]
fn unary<T: Float>(stack: &mut [T], f: impl Fn(T) -> T) {
    let Some(top) = stack.last_mut() else {
        unreachable!("operand stack underflow");
    };
    *top = f(*top);
}

#[inline]
fn binary<T: Float>(stack: &mut Vec<T>, f: impl Fn(T, T) -> T) {
    let (Some(rhs), Some(lhs)) = (stack.pop(), stack.last_mut()) else {
        unreachable!("operand stack underflow");
    };
    *lhs = f(*lhs, rhs);
}

/// Per-point handle passed to native stage bodies.
pub struct Eval<'e, T: Float> {
    access: &'e mut dyn PointAccess<T>,
    writable: &'e [bool],
}

impl<'e, T: Float> Eval<'e, T> {
    pub(crate) fn new(access: &'e mut dyn PointAccess<T>, writable: &'e [bool]) -> Self {
        Self { access, writable }
    }

    pub fn get(&mut self, acc: Accessor) -> T {
        self.access.load(&acc)
    }

    /// Write `value` to `acc`'s param at the current point.
    pub fn set(&mut self, acc: Accessor, value: T) {
        assert!(
            acc.is_center() && acc.snapshot == 0,
            "native bodies write at the current point of snapshot 0 only"
        );
        assert!(
            self.writable.get(acc.param).copied().unwrap_or(false),
            "param {} is not an inout param",
            acc.param
        );
        self.access.store(acc.param, value);
    }

    /// Absolute (i, j, k) of the current point.
    pub fn position(&self) -> [isize; 3] {
        self.access.position()
    }
}
