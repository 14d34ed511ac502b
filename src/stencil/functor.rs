use std::fmt;
use std::sync::Arc;

use crate::exec::Eval;
use crate::grid::Interval;
use crate::span::Span;
use crate::storage::Float;

use super::{Assign, Param};

/// A host-only stage body evaluated once per point.
pub type NativeFn<T> = Arc<dyn Fn(&mut Eval<'_, T>) + Send + Sync>;

pub enum Body<T: Float> {
    /// Assignments compiled to a flat program at setup.
    Expr(Vec<Assign>),
    /// Host closure; reads every param with its declared extent and writes
    /// every `inout` param at the current point.
    Native(NativeFn<T>),
}

impl<T: Float> Clone for Body<T> {
    fn clone(&self) -> Self {
        match self {
            Body::Expr(assigns) => Body::Expr(assigns.clone()),
            Body::Native(f) => Body::Native(Arc::clone(f)),
        }
    }
}

impl<T: Float> fmt::Debug for Body<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Expr(assigns) => f.debug_tuple("Expr").field(assigns).finish(),
            Body::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// One interval-specific body of a functor.
#[derive(Clone, Debug)]
pub struct Overload<T: Float> {
    pub interval: Interval,
    pub body: Body<T>,
    pub span: Span,
}

/// A stencil functor: parameters plus per-interval bodies.
#[derive(Clone, Debug)]
pub struct Functor<T: Float> {
    name: String,
    params: Vec<Param>,
    overloads: Vec<Overload<T>>,
    span: Span,
}

impl<T: Float> Functor<T> {
    pub fn new(name: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            name: name.into(),
            params,
            overloads: Vec::new(),
            span: Span::dummy(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Add an expression overload for `interval`.
    pub fn overload(mut self, interval: Interval, body: Vec<Assign>) -> Self {
        self.push_overload(Overload {
            interval,
            body: Body::Expr(body),
            span: Span::dummy(),
        });
        self
    }

    /// Add a native overload for `interval`.
    pub fn native<F>(mut self, interval: Interval, f: F) -> Self
    where
        F: Fn(&mut Eval<'_, T>) + Send + Sync + 'static,
    {
        self.push_overload(Overload {
            interval,
            body: Body::Native(Arc::new(f)),
            span: Span::dummy(),
        });
        self
    }

    pub fn push_overload(&mut self, overload: Overload<T>) {
        self.overloads.push(overload);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn overloads(&self) -> &[Overload<T>] {
        &self.overloads
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn intervals(&self) -> Vec<Interval> {
        self.overloads.iter().map(|o| o.interval).collect()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Level;
    use crate::stencil::Accessor;

    #[test]
    fn test_functor_builder() {
        const OUT: Accessor = Accessor::new(0);
        const IN: Accessor = Accessor::new(1);
        let full = Interval::new(Level::new(0, -1), Level::new(1, -1));
        let f: Functor<f64> = Functor::new("copy", vec![Param::inout("out"), Param::input("in")])
            .overload(full, vec![Assign::new(OUT, IN)])
            .native(Interval::at(Level::new(1, 1)), |_eval| {});
        assert_eq!(f.name(), "copy");
        assert_eq!(f.overloads().len(), 2);
        assert_eq!(f.param_index("in"), Some(1));
        assert_eq!(f.intervals()[0], full);
        assert!(format!("{:?}", f.overloads()[1].body).contains("Native"));
    }
}
