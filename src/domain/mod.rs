//! Placeholders and the domain that binds them to storages.

use std::fmt;

use crate::diagnostic::Diagnostic;
use crate::span::Span;
use crate::storage::{Float, Storage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaceholderKind {
    /// Bound by the user to a storage before the computation is made ready.
    Storage,
    /// Allocated by the computation at `steady()`; never bound by the user.
    Temporary,
}

/// A named argument slot of a computation. Carries identity only.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Placeholder {
    index: usize,
    name: String,
    kind: PlaceholderKind,
}

impl Placeholder {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PlaceholderKind {
        self.kind
    }

    pub fn is_temporary(&self) -> bool {
        self.kind == PlaceholderKind::Temporary
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The ordered argument list of a computation plus the storage bound to
/// each argument.
#[derive(Debug)]
pub struct Domain<T: Float> {
    args: Vec<Placeholder>,
    storages: Vec<Option<Storage<T>>>,
}

impl<T: Float> Default for Domain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> Domain<T> {
    pub fn new() -> Self {
        Self {
            args: Vec::new(),
            storages: Vec::new(),
        }
    }

    fn declare(&mut self, name: &str, kind: PlaceholderKind) -> Result<Placeholder, Diagnostic> {
        if self.find(name).is_some() {
            return Err(Diagnostic::error(
                format!("argument '{}' is declared twice", name),
                Span::dummy(),
            ));
        }
        let placeholder = Placeholder {
            index: self.args.len(),
            name: name.to_string(),
            kind,
        };
        self.args.push(placeholder.clone());
        self.storages.push(None);
        Ok(placeholder)
    }

    /// Declare a user-bound argument.
    pub fn arg(&mut self, name: &str) -> Result<Placeholder, Diagnostic> {
        self.declare(name, PlaceholderKind::Storage)
    }

    /// Declare a temporary argument.
    pub fn temporary(&mut self, name: &str) -> Result<Placeholder, Diagnostic> {
        self.declare(name, PlaceholderKind::Temporary)
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.args
    }

    pub fn find(&self, name: &str) -> Option<&Placeholder> {
        self.args.iter().find(|p| p.name == name)
    }

    /// True if `placeholder` is one of this domain's arguments.
    pub fn contains(&self, placeholder: &Placeholder) -> bool {
        self.args.get(placeholder.index) == Some(placeholder)
    }

    pub fn bind(&mut self, placeholder: &Placeholder, storage: Storage<T>) -> Result<(), Diagnostic> {
        if !self.contains(placeholder) {
            return Err(Diagnostic::error(
                format!("'{}' is not an argument of this domain", placeholder),
                Span::dummy(),
            ));
        }
        if placeholder.is_temporary() {
            return Err(Diagnostic::error(
                format!("cannot bind a storage to temporary '{}'", placeholder),
                Span::dummy(),
            )
            .with_help("temporaries are allocated by the computation".to_string()));
        }
        let slot = &mut self.storages[placeholder.index];
        if slot.is_some() {
            return Err(Diagnostic::error(
                format!("'{}' is already bound", placeholder),
                Span::dummy(),
            ));
        }
        *slot = Some(storage);
        Ok(())
    }

    /// Bind by argument name.
    pub fn bind_name(&mut self, name: &str, storage: Storage<T>) -> Result<(), Diagnostic> {
        let placeholder = self.find(name).cloned().ok_or_else(|| {
            Diagnostic::error(format!("unknown argument '{}'", name), Span::dummy())
        })?;
        self.bind(&placeholder, storage)
    }

    pub fn is_bound(&self, placeholder: &Placeholder) -> bool {
        self.contains(placeholder) && self.storages[placeholder.index].is_some()
    }

    pub fn storage(&self, placeholder: &Placeholder) -> Option<&Storage<T>> {
        if !self.contains(placeholder) {
            return None;
        }
        self.storages[placeholder.index].as_ref()
    }

    pub fn storage_mut(&mut self, placeholder: &Placeholder) -> Option<&mut Storage<T>> {
        if !self.contains(placeholder) {
            return None;
        }
        self.storages[placeholder.index].as_mut()
    }

    /// Hand a storage back to the caller, leaving the argument unbound.
    pub fn take(&mut self, placeholder: &Placeholder) -> Option<Storage<T>> {
        if !self.contains(placeholder) {
            return None;
        }
        self.storages[placeholder.index].take()
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&Storage<T>> {
        self.storages.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut Storage<T>> {
        self.storages.get_mut(index).and_then(Option::as_mut)
    }

    pub(crate) fn install_temporary(&mut self, index: usize, storage: Storage<T>) {
        self.storages[index] = Some(storage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_bind() {
        let mut domain: Domain<f64> = Domain::new();
        let a = domain.arg("a").unwrap();
        let b = domain.arg("b").unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);

        domain.bind(&a, Storage::filled("a", [2, 2, 2], 1.0).unwrap()).unwrap();
        assert!(domain.is_bound(&a));
        assert!(!domain.is_bound(&b));
        assert_eq!(domain.storage(&a).unwrap().get(1, 1, 1), 1.0);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut domain: Domain<f64> = Domain::new();
        domain.arg("a").unwrap();
        assert!(domain.arg("a").is_err());
        assert!(domain.temporary("a").is_err());
    }

    #[test]
    fn test_bind_temporary_rejected() {
        let mut domain: Domain<f64> = Domain::new();
        let tmp = domain.temporary("tmp").unwrap();
        let err = domain
            .bind(&tmp, Storage::filled("tmp", [1, 1, 1], 0.0).unwrap())
            .unwrap_err();
        assert!(err.message.contains("temporary"));
    }

    #[test]
    fn test_double_bind_rejected() {
        let mut domain: Domain<f64> = Domain::new();
        let a = domain.arg("a").unwrap();
        domain.bind(&a, Storage::filled("a", [1, 1, 1], 0.0).unwrap()).unwrap();
        assert!(domain.bind(&a, Storage::filled("a", [1, 1, 1], 0.0).unwrap()).is_err());
    }

    #[test]
    fn test_foreign_placeholder_rejected() {
        let mut other: Domain<f64> = Domain::new();
        other.arg("x").unwrap();
        let foreign = other.arg("y").unwrap();

        let mut domain: Domain<f64> = Domain::new();
        domain.arg("x").unwrap();
        assert!(domain
            .bind(&foreign, Storage::filled("y", [1, 1, 1], 0.0).unwrap())
            .is_err());
        assert!(domain.bind_name("z", Storage::filled("z", [1, 1, 1], 0.0).unwrap()).is_err());
    }

    #[test]
    fn test_take_returns_storage() {
        let mut domain: Domain<f64> = Domain::new();
        let a = domain.arg("a").unwrap();
        domain.bind_name("a", Storage::filled("a", [1, 1, 1], 5.0).unwrap()).unwrap();
        let s = domain.take(&a).unwrap();
        assert_eq!(s.get(0, 0, 0), 5.0);
        assert!(!domain.is_bound(&a));
    }
}
