use crate::domain::Domain;
use crate::storage::{Float, StorageInfo};

/// Unowned view of one snapshot of a bound storage.
///
/// Workers share views of the same buffer. Concurrent access is sound
/// because setup rejects every multistage in which two blocks could touch
/// the same point while one of them writes it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldView<T> {
    ptr: *mut T,
    info: StorageInfo,
    temporary: bool,
}

// SAFETY: see the type-level comment; blocks write disjoint points.
unsafe impl<T: Send> Send for FieldView<T> {}
unsafe impl<T: Sync> Sync for FieldView<T> {}

impl<T: Float> FieldView<T> {
    #[inline]
    fn linear(&self, i: isize, j: isize, k: isize) -> usize {
        if self.temporary {
            self.info.wrapped_index(i, j, k)
        } else {
            self.info.checked_index(i, j, k)
        }
    }

    #[inline]
    pub(crate) fn read(&self, i: isize, j: isize, k: isize) -> T {
        let idx = self.linear(i, j, k);
        // SAFETY: `linear` asserts idx < info.size(), the buffer length.
        unsafe { self.ptr.add(idx).read() }
    }

    #[inline]
    pub(crate) fn write(&self, i: isize, j: isize, k: isize, value: T) {
        let idx = self.linear(i, j, k);
        // SAFETY: as in `read`.
        unsafe { self.ptr.add(idx).write(value) }
    }

    pub(crate) fn info(&self) -> &StorageInfo {
        &self.info
    }

    /// True if reads at level `k` hit the storage (temporaries wrap).
    pub(crate) fn holds_level(&self, k: isize) -> bool {
        self.temporary || (k >= 0 && (k as usize) < self.info.dims()[2])
    }
}

/// Views of every bound argument of a computation, per snapshot.
///
/// Rebuilt at the start of each run so the pointers always refer to the
/// domain's current buffers.
pub(crate) struct LocalDomain<T> {
    views: Vec<Vec<FieldView<T>>>,
}

impl<T: Float> LocalDomain<T> {
    pub(crate) fn build(domain: &mut Domain<T>) -> Self {
        let n = domain.placeholders().len();
        let mut views = Vec::with_capacity(n);
        for index in 0..n {
            let snapshots = match domain.slot_mut(index) {
                Some(storage) => {
                    let info = *storage.info();
                    let temporary = storage.is_temporary();
                    (0..storage.n_snapshots())
                        .map(|s| FieldView {
                            ptr: storage.field_ptr(s),
                            info,
                            temporary,
                        })
                        .collect()
                }
                None => Vec::new(),
            };
            views.push(snapshots);
        }
        Self { views }
    }

    #[inline]
    pub(crate) fn view(&self, arg: usize, snapshot: usize) -> &FieldView<T> {
        &self.views[arg][snapshot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Layout, Storage};

    #[test]
    fn test_views_read_and_write_through() {
        let mut domain: Domain<f64> = Domain::new();
        let a = domain.arg("a").unwrap();
        domain
            .bind(&a, Storage::filled("a", [2, 2, 2], 1.0).unwrap().with_snapshots(2))
            .unwrap();
        let local = LocalDomain::build(&mut domain);
        let view = local.view(0, 0);
        view.write(1, 1, 1, 5.0);
        assert_eq!(view.read(1, 1, 1), 5.0);
        assert_eq!(local.view(0, 1).read(1, 1, 1), 1.0);
        assert_eq!(domain.storage(&a).unwrap().get(1, 1, 1), 5.0);
    }

    #[test]
    fn test_temporary_view_wraps() {
        let mut domain: Domain<f64> = Domain::new();
        domain.temporary("t").unwrap();
        let info = StorageInfo::new([3, 3, 3], Layout::default()).unwrap();
        domain.install_temporary(0, Storage::temporary("t", info));
        let local = LocalDomain::build(&mut domain);
        let view = local.view(0, 0);
        view.write(-1, 0, 0, 2.0);
        assert_eq!(view.read(2, 0, 0), 2.0);
        assert!(view.holds_level(-4));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_view_bounds_asserted() {
        let mut domain: Domain<f64> = Domain::new();
        let a = domain.arg("a").unwrap();
        domain.bind(&a, Storage::filled("a", [2, 2, 2], 1.0).unwrap()).unwrap();
        let local = LocalDomain::build(&mut domain);
        local.view(0, 0).read(0, -1, 0);
    }
}
