//! Composition: stages, multistages and cache declarations.
//!
//! A stage binds a functor's parameters to placeholders. A multistage is
//! an ordered list of stages sharing one vertical execution order, plus the
//! caches and the read-only bypass set that apply while it runs.

mod cache;

pub use cache::{cache, define_caches, Cache, CachePolicy, CacheScope};

use std::fmt;
use std::sync::Arc;

use crate::domain::Placeholder;
use crate::span::Span;
use crate::stencil::Functor;
use crate::storage::Float;

/// Vertical execution order of a multistage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionOrder {
    /// k ascending; a level may read levels below it written earlier.
    Forward,
    /// k descending.
    Backward,
    /// Levels are independent.
    Parallel,
}

impl ExecutionOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "forward" => Some(ExecutionOrder::Forward),
            "backward" => Some(ExecutionOrder::Backward),
            "parallel" => Some(ExecutionOrder::Parallel),
            _ => None,
        }
    }

    /// The levels `first..=last` in execution order.
    pub fn levels(&self, first: usize, last: usize) -> Box<dyn Iterator<Item = usize>> {
        match self {
            ExecutionOrder::Backward => Box::new((first..=last).rev()),
            ExecutionOrder::Forward | ExecutionOrder::Parallel => Box::new(first..=last),
        }
    }
}

impl fmt::Display for ExecutionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOrder::Forward => write!(f, "forward"),
            ExecutionOrder::Backward => write!(f, "backward"),
            ExecutionOrder::Parallel => write!(f, "parallel"),
        }
    }
}

/// A functor applied to a list of placeholders (one per parameter).
#[derive(Clone, Debug)]
pub struct Stage<T: Float> {
    pub functor: Arc<Functor<T>>,
    pub args: Vec<Placeholder>,
    pub span: Span,
}

impl<T: Float> Stage<T> {
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn name(&self) -> &str {
        self.functor.name()
    }
}

pub fn make_stage<T: Float>(functor: impl Into<Arc<Functor<T>>>, args: &[&Placeholder]) -> Stage<T> {
    Stage {
        functor: functor.into(),
        args: args.iter().map(|&p| p.clone()).collect(),
        span: Span::dummy(),
    }
}

#[derive(Clone, Debug)]
pub struct Multistage<T: Float> {
    pub order: ExecutionOrder,
    pub stages: Vec<Stage<T>>,
    pub caches: Vec<Cache>,
    pub bypass: Vec<Placeholder>,
    pub span: Span,
}

impl<T: Float> Multistage<T> {
    pub fn with_caches(mut self, caches: Vec<Cache>) -> Self {
        self.caches = caches;
        self
    }

    /// Arguments excluded from the read-only fast path.
    pub fn with_bypass(mut self, bypass: &[&Placeholder]) -> Self {
        self.bypass = bypass.iter().map(|&p| p.clone()).collect();
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

pub fn make_multistage<T: Float>(order: ExecutionOrder, stages: Vec<Stage<T>>) -> Multistage<T> {
    Multistage {
        order,
        stages,
        caches: Vec::new(),
        bypass: Vec::new(),
        span: Span::dummy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::stencil::Param;

    #[test]
    fn test_levels_in_order() {
        let fwd: Vec<_> = ExecutionOrder::Forward.levels(1, 3).collect();
        let bwd: Vec<_> = ExecutionOrder::Backward.levels(1, 3).collect();
        assert_eq!(fwd, vec![1, 2, 3]);
        assert_eq!(bwd, vec![3, 2, 1]);
    }

    #[test]
    fn test_make_multistage() {
        let mut domain: Domain<f64> = Domain::new();
        let a = domain.arg("a").unwrap();
        let b = domain.arg("b").unwrap();
        let copy: Functor<f64> = Functor::new("copy", vec![Param::inout("out"), Param::input("in")]);
        let ms = make_multistage(ExecutionOrder::Parallel, vec![make_stage(copy, &[&a, &b])])
            .with_caches(cache(CacheScope::IJ, CachePolicy::Fill, &[&b]))
            .with_bypass(&[&b]);
        assert_eq!(ms.stages[0].args, vec![a, b.clone()]);
        assert_eq!(ms.stages[0].name(), "copy");
        assert_eq!(ms.caches.len(), 1);
        assert_eq!(ms.bypass, vec![b]);
    }
}
