use std::{
    rc::Rc,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// A single-threaded, reference-counted resource with interior mutability.
///
/// `StResource` is the main-thread counterpart of [`MtResource`](super::MtResource).
/// The GPU device and the buffer pool are shared through it: every region arena holds
/// a handle, but only the render thread ever touches them.
///
/// `T` may be unsized so a device can be shared as `StResource<dyn GpuDevice>`.
///
/// # Examples
///
/// ```
/// use voxel_terrain::core::StResource;
///
/// let resource = StResource::new(vec![1, 2, 3]);
/// let clone = resource.clone();
///
/// clone.get_mut().push(4);
/// assert_eq!(resource.get().len(), 4);
/// ```
///
/// # Panics
/// - Panics if a write lock is requested while any other guard is alive on this thread
///
/// # Performance Considerations
/// - Not thread-safe; do not use across thread boundaries
pub struct StResource<T: ?Sized> {
    pub resource: Rc<RwLock<T>>,
}

impl<T> StResource<T> {
    /// Creates a new `StResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Rc::new(RwLock::new(resource)),
        }
    }

    /// Returns a second handle to the same value, typed through `convert`.
    ///
    /// Used to hand a concrete device out as `StResource<dyn GpuDevice>` while the
    /// caller keeps the concrete handle.
    pub fn share_as<U: ?Sized>(
        &self,
        convert: impl FnOnce(Rc<RwLock<T>>) -> Rc<RwLock<U>>,
    ) -> StResource<U> {
        StResource {
            resource: convert(self.resource.clone()),
        }
    }
}

impl<T: ?Sized> StResource<T> {
    /// Returns a read-only guard that allows reading the contained value.
    ///
    /// # Panics
    /// Panics if the lock is poisoned or already held for writing.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap()
    }

    /// Returns a mutable guard that allows modifying the contained value.
    ///
    /// # Panics
    /// Panics if the lock is poisoned or already held.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap()
    }
}

impl<T: ?Sized> Clone for StResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
