use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` provides synchronized access to a value of type `T` that can be shared
/// across threads. It uses an `Arc<RwLock<T>>` internally. The terrain core uses it for
/// state that worker threads and the main thread both touch, most notably the world
/// that build tasks snapshot from.
///
/// `T` may be unsized, so a concrete resource can be handed out as a trait object
/// (see [`MtResource::share_as`]).
///
/// # Examples
///
/// ```
/// use voxel_terrain::core::MtResource;
///
/// let counter = MtResource::new(0);
/// let counter_clone = counter.clone();
///
/// std::thread::spawn(move || {
///     *counter_clone.get_mut() += 1;
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(*counter.get(), 1);
/// ```
///
/// # Performance Considerations
/// - Read operations (`get()`) can occur concurrently
/// - Write operations (`get_mut()`) are exclusive and will block other operations
pub struct MtResource<T: ?Sized + Send + Sync> {
    pub resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync + 'static> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a second handle to the same value, typed through `convert`.
    ///
    /// `convert` is normally an unsizing coercion such as
    /// `|world| world as Arc<RwLock<dyn WorldView>>`.
    pub fn share_as<U: ?Sized + Send + Sync>(
        &self,
        convert: impl FnOnce(Arc<RwLock<T>>) -> Arc<RwLock<U>>,
    ) -> MtResource<U> {
        MtResource {
            resource: convert(self.resource.clone()),
        }
    }
}

impl<T: ?Sized + Send + Sync> MtResource<T> {
    /// Returns a read-only guard that allows reading the contained value.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap()
    }

    /// Returns a mutable guard that allows modifying the contained value.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap()
    }
}

impl<T: ?Sized + Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
