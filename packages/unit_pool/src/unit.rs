use std::any::type_name;
use std::fmt;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::constants::ERR_POISONED_LOCK;
use crate::pool::SyncShared;
use crate::pool_core::PoolSlot;
use crate::{Error, Result, UnitCallbacks, UnitPool};

/// A unit owned by a [`UnitPool`].
///
/// This is a cheap clonable handle; all clones refer to the same unit. It is [`Send`] and
/// [`Sync`] if `T` is, so a unit taken on one thread may be returned from another.
///
/// # Example
///
/// ```rust
/// use std::thread;
///
/// use unit_pool::UnitPool;
///
/// let pool = UnitPool::builder().factory(|| 42_u64).build();
/// let unit = pool.take().unwrap();
///
/// thread::spawn(move || {
///     assert_eq!(*unit, 42);
///     unit.return_to_pool().unwrap();
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(pool.used(), 0);
/// ```
pub struct PooledUnit<T> {
    inner: Arc<UnitInner<T>>,
}

struct UnitInner<T> {
    value: T,
    index: usize,

    // Both flags are only written while the pool lock is held.
    in_pool: AtomicBool,
    attached: AtomicBool,

    source: Weak<SyncShared<T>>,

    listeners: Mutex<Vec<SyncListener>>,
}

type SyncListener = Arc<dyn UnitCallbacks + Send + Sync>;

impl<T> PooledUnit<T> {
    pub(crate) fn new(value: T, index: usize, source: Weak<SyncShared<T>>) -> Self {
        Self {
            inner: Arc::new(UnitInner {
                value,
                index,
                in_pool: AtomicBool::new(false),
                attached: AtomicBool::new(true),
                source,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Whether the unit is currently available in its pool rather than taken.
    #[must_use]
    pub fn is_in_pool(&self) -> bool {
        self.inner.in_pool.load(Ordering::Acquire)
    }

    /// Whether the unit still belongs to a pool.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire) && self.inner.source.strong_count() > 0
    }

    /// The creation index of the unit within its pool. Indexes are never reused by a pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Whether two handles refer to the same unit.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The pool that owns this unit, if it is still attached to one.
    #[must_use]
    pub fn source_pool(&self) -> Option<UnitPool<T>> {
        if !self.inner.attached.load(Ordering::Acquire) {
            return None;
        }

        self.inner.source.upgrade().map(UnitPool::from_shared)
    }

    /// Returns the unit to the pool it was taken from.
    ///
    /// Returning a unit that is already in the pool does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] if the unit no longer has a source pool.
    pub fn return_to_pool(&self) -> Result<()> {
        let pool = self.source_pool().ok_or(Error::Detached)?;
        pool.return_unit(self)
    }

    /// Wraps the unit in a guard that returns it to its pool when the guard is dropped.
    pub fn into_guard(self) -> UnitGuard<T> {
        UnitGuard { unit: Some(self) }
    }

    /// Registers a listener that is told whenever this unit is taken or returned.
    ///
    /// Listeners run on the thread that performs the transition, after the pool's unit hooks
    /// and before the pool's observers.
    pub fn add_listener<L>(&self, listener: Arc<L>)
    where
        L: UnitCallbacks + Send + Sync + 'static,
    {
        self.lock_listeners().push(listener);
    }

    /// Removes the earliest registration of `listener`. Returns `false` if it was not
    /// registered on this unit.
    pub fn remove_listener<L>(&self, listener: &Arc<L>) -> bool
    where
        L: UnitCallbacks + Send + Sync + 'static,
    {
        let mut listeners = self.lock_listeners();

        let Some(position) = listeners
            .iter()
            .position(|registered| ptr::addr_eq(Arc::as_ptr(registered), Arc::as_ptr(listener)))
        else {
            return false;
        };

        listeners.remove(position);
        true
    }

    /// Removes every listener registered on this unit.
    pub fn clear_listeners(&self) {
        self.lock_listeners().clear();
    }

    /// The number of listeners registered on this unit.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    pub(crate) fn notify_taken(&self) {
        let listeners = self.lock_listeners().clone();

        for listener in listeners {
            listener.on_taken();
        }
    }

    pub(crate) fn notify_returned(&self) {
        let listeners = self.lock_listeners().clone();

        for listener in listeners {
            listener.on_returned();
        }
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<SyncListener>> {
        self.inner.listeners.lock().expect(ERR_POISONED_LOCK)
    }

    /// Must be called with the pool lock held so that a concurrent detach cannot interleave.
    pub(crate) fn belongs_to(&self, shared: &Arc<SyncShared<T>>) -> bool {
        self.inner.attached.load(Ordering::Acquire)
            && ptr::eq(self.inner.source.as_ptr(), Arc::as_ptr(shared))
    }
}

impl<T> Clone for PooledUnit<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for PooledUnit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.value
    }
}

impl<T> fmt::Debug for PooledUnit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledUnit")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("index", &self.inner.index)
            .field("in_pool", &self.is_in_pool())
            .field("attached", &self.inner.attached.load(Ordering::Acquire))
            .field("listeners", &self.inner.listeners.try_lock().map(|l| l.len()).ok())
            .finish()
    }
}

impl<T> PoolSlot for PooledUnit<T> {
    fn is_in_pool(&self) -> bool {
        self.inner.in_pool.load(Ordering::Acquire)
    }

    fn set_in_pool(&self, in_pool: bool) {
        self.inner.in_pool.store(in_pool, Ordering::Release);
    }

    fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }

    fn detach(&self) {
        self.inner.attached.store(false, Ordering::Release);
    }
}

/// Returns a [`PooledUnit`] to its pool when dropped.
///
/// Obtained from [`PooledUnit::into_guard()`], [`UnitPool::take_scoped()`] or
/// [`UnitPool::try_take_scoped()`]. Failures to return the unit are logged and otherwise
/// ignored.
pub struct UnitGuard<T> {
    unit: Option<PooledUnit<T>>,
}

impl<T> UnitGuard<T> {
    /// The guarded unit.
    #[must_use]
    pub fn unit(&self) -> &PooledUnit<T> {
        self.unit.as_ref().expect(ERR_GUARD_DISARMED)
    }

    /// Disarms the guard, handing the unit back to the caller without returning it.
    #[must_use]
    pub fn into_inner(mut self) -> PooledUnit<T> {
        self.unit.take().expect(ERR_GUARD_DISARMED)
    }
}

impl<T> Deref for UnitGuard<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.unit()
    }
}

impl<T> Drop for UnitGuard<T> {
    fn drop(&mut self) {
        let Some(unit) = self.unit.take() else {
            return;
        };

        if let Err(error) = unit.return_to_pool() {
            tracing::warn!(%error, index = unit.index(), "guarded unit could not be returned");
        }
    }
}

impl<T> fmt::Debug for UnitGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitGuard").field("unit", &self.unit).finish()
    }
}

const ERR_GUARD_DISARMED: &str = "guard holds its unit until it is dropped or disarmed";
