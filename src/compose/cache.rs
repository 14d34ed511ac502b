use std::fmt;

use crate::domain::Placeholder;
use crate::span::Span;

/// Which part of the iteration space a cache tile holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// The block (plus halo) at the current level.
    IJ,
    /// A ring window of levels around the current k, per column.
    K,
    /// The block (plus halo) across every level.
    IJK,
}

/// How a cache tile is synchronised with the bound storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// Preload from memory; writes go to both the tile and memory.
    Fill,
    /// No preload; written points are stored back when the tile retires.
    Flush,
    /// Never touches memory. Temporaries only.
    Local,
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheScope::IJ => write!(f, "ij"),
            CacheScope::K => write!(f, "k"),
            CacheScope::IJK => write!(f, "ijk"),
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::Fill => write!(f, "fill"),
            CachePolicy::Flush => write!(f, "flush"),
            CachePolicy::Local => write!(f, "local"),
        }
    }
}

impl CacheScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ij" | "IJ" => Some(CacheScope::IJ),
            "k" | "K" => Some(CacheScope::K),
            "ijk" | "IJK" => Some(CacheScope::IJK),
            _ => None,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(self, CacheScope::IJ | CacheScope::IJK)
    }
}

impl CachePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fill" => Some(CachePolicy::Fill),
            "flush" => Some(CachePolicy::Flush),
            "local" => Some(CachePolicy::Local),
            _ => None,
        }
    }
}

/// One cached argument of a multistage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cache {
    pub scope: CacheScope,
    pub policy: CachePolicy,
    pub arg: Placeholder,
    pub span: Span,
}

impl Cache {
    pub fn new(scope: CacheScope, policy: CachePolicy, arg: &Placeholder) -> Self {
        Self {
            scope,
            policy,
            arg: arg.clone(),
            span: Span::dummy(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl fmt::Display for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache({}, {}, {})", self.scope, self.policy, self.arg)
    }
}

/// One cache declaration over several arguments, expanded in argument
/// order.
pub fn cache(scope: CacheScope, policy: CachePolicy, args: &[&Placeholder]) -> Vec<Cache> {
    args.iter().map(|arg| Cache::new(scope, policy, arg)).collect()
}

/// Concatenate cache declarations, preserving declaration order.
pub fn define_caches<I>(declarations: I) -> Vec<Cache>
where
    I: IntoIterator<Item = Vec<Cache>>,
{
    declarations.into_iter().flatten().collect()
}
