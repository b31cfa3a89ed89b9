use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::ptr;
use std::rc::{Rc, Weak};

use crate::local_pool::LocalShared;
use crate::pool_core::PoolSlot;
use crate::{Error, LocalUnitPool, Result, UnitCallbacks};

/// A unit owned by a [`LocalUnitPool`].
///
/// This is a cheap clonable handle; all clones refer to the same unit. The pool keeps its own
/// handle to every unit it owns, so the value is shared between the pool and whoever took it.
/// Use interior mutability in `T` if the holder needs to modify the value.
///
/// A unit is either in the pool (available) or taken. Handing it back via
/// [`return_to_pool()`][Self::return_to_pool] or [`LocalUnitPool::return_unit()`] makes it
/// available again; returning it twice is harmless.
///
/// # Example
///
/// ```rust
/// use unit_pool::LocalUnitPool;
///
/// let pool = LocalUnitPool::builder().factory(|| "spark").build();
///
/// let unit = pool.take().unwrap();
/// assert_eq!(*unit, "spark");
/// assert!(!unit.is_in_pool());
///
/// unit.return_to_pool().unwrap();
/// assert!(unit.is_in_pool());
/// ```
pub struct LocalPooledUnit<T> {
    inner: Rc<UnitInner<T>>,
}

struct UnitInner<T> {
    value: T,
    index: usize,
    in_pool: Cell<bool>,
    attached: Cell<bool>,
    source: Weak<LocalShared<T>>,
    listeners: RefCell<Vec<Rc<dyn UnitCallbacks>>>,
}

impl<T> LocalPooledUnit<T> {
    pub(crate) fn new(value: T, index: usize, source: Weak<LocalShared<T>>) -> Self {
        Self {
            inner: Rc::new(UnitInner {
                value,
                index,
                in_pool: Cell::new(false),
                attached: Cell::new(true),
                source,
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Whether the unit is currently available in its pool rather than taken.
    #[must_use]
    pub fn is_in_pool(&self) -> bool {
        self.inner.in_pool.get()
    }

    /// Whether the unit still belongs to a pool.
    ///
    /// Units are detached when their pool is dropped, destroyed, rebuilt or shrunk. A detached
    /// unit keeps its value but can no longer be returned.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.attached.get() && self.inner.source.strong_count() > 0
    }

    /// The creation index of the unit within its pool. Indexes are never reused by a pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Whether two handles refer to the same unit.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The pool that owns this unit, if it is still attached to one.
    #[must_use]
    pub fn source_pool(&self) -> Option<LocalUnitPool<T>> {
        if !self.inner.attached.get() {
            return None;
        }

        self.inner.source.upgrade().map(LocalUnitPool::from_shared)
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
    ///
    /// # Example
    ///
    /// ```rust
    /// use unit_pool::LocalUnitPool;
    ///
    /// let pool = LocalUnitPool::builder().factory(Vec::<u8>::new).build();
    ///
    /// {
    ///     let _buffer = pool.take().unwrap().into_guard();
    ///     assert_eq!(pool.used(), 1);
    /// }
    ///
    /// assert_eq!(pool.used(), 0);
    /// ```
    pub fn into_guard(self) -> LocalUnitGuard<T> {
        LocalUnitGuard { unit: Some(self) }
    }

    /// Registers a listener that is told whenever this unit is taken or returned.
    ///
    /// Listeners run after the pool's unit hooks and before the pool's observers, in
    /// registration order. The same listener may be registered more than once.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// use unit_pool::{LocalUnitPool, UnitCallbacks};
    ///
    /// #[derive(Default)]
    /// struct Sound {
    ///     playing: Cell<bool>,
    /// }
    ///
    /// impl UnitCallbacks for Sound {
    ///     fn on_taken(&self) {
    ///         self.playing.set(true);
    ///     }
    ///
    ///     fn on_returned(&self) {
    ///         self.playing.set(false);
    ///     }
    /// }
    ///
    /// let pool = LocalUnitPool::builder().factory(|| "torch").build();
    /// let sound = Rc::new(Sound::default());
    ///
    /// let torch = pool.take().unwrap();
    /// torch.add_listener(Rc::clone(&sound));
    ///
    /// torch.return_to_pool().unwrap();
    /// assert!(!sound.playing.get());
    ///
    /// let torch = pool.take().unwrap();
    /// assert!(sound.playing.get());
    ///
    /// assert!(torch.remove_listener(&sound));
    /// ```
    pub fn add_listener<L>(&self, listener: Rc<L>)
    where
        L: UnitCallbacks + 'static,
    {
        self.inner.listeners.borrow_mut().push(listener);
    }

    /// Removes the earliest registration of `listener`. Returns `false` if it was not
    /// registered on this unit.
    pub fn remove_listener<L>(&self, listener: &Rc<L>) -> bool
    where
        L: UnitCallbacks + 'static,
    {
        let mut listeners = self.inner.listeners.borrow_mut();

        let Some(position) = listeners
            .iter()
            .position(|registered| ptr::addr_eq(Rc::as_ptr(registered), Rc::as_ptr(listener)))
        else {
            return false;
        };

        listeners.remove(position);
        true
    }

    /// Removes every listener registered on this unit.
    pub fn clear_listeners(&self) {
        self.inner.listeners.borrow_mut().clear();
    }

    /// The number of listeners registered on this unit.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub(crate) fn belongs_to(&self, shared: &Rc<LocalShared<T>>) -> bool {
        self.inner.attached.get() && ptr::eq(self.inner.source.as_ptr(), Rc::as_ptr(shared))
    }

    pub(crate) fn notify_taken(&self) {
        for listener in self.listeners_snapshot() {
            listener.on_taken();
        }
    }

    pub(crate) fn notify_returned(&self) {
        for listener in self.listeners_snapshot() {
            listener.on_returned();
        }
    }

    // Listeners may add or remove listeners on this unit while being called.
    fn listeners_snapshot(&self) -> Vec<Rc<dyn UnitCallbacks>> {
        self.inner.listeners.borrow().clone()
    }
}

impl<T> Clone for LocalPooledUnit<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Deref for LocalPooledUnit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.value
    }
}

impl<T> fmt::Debug for LocalPooledUnit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPooledUnit")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("index", &self.inner.index)
            .field("in_pool", &self.inner.in_pool.get())
            .field("attached", &self.inner.attached.get())
            .field("listeners", &self.inner.listeners.try_borrow().map(|l| l.len()).ok())
            .finish()
    }
}

impl<T> PoolSlot for LocalPooledUnit<T> {
    fn is_in_pool(&self) -> bool {
        self.inner.in_pool.get()
    }

    fn set_in_pool(&self, in_pool: bool) {
        self.inner.in_pool.set(in_pool);
    }

    fn is_attached(&self) -> bool {
        self.inner.attached.get()
    }

    fn detach(&self) {
        self.inner.attached.set(false);
    }
}

/// Returns a [`LocalPooledUnit`] to its pool when dropped.
///
/// Obtained from [`LocalPooledUnit::into_guard()`], [`LocalUnitPool::take_scoped()`] or
/// [`LocalUnitPool::try_take_scoped()`]. The unit is returned on every exit path, including
/// early returns and unwinding.
///
/// If the return fails (for example because the pool was dropped in the meantime), the
/// failure is logged and otherwise ignored.
pub struct LocalUnitGuard<T> {
    unit: Option<LocalPooledUnit<T>>,
}

impl<T> LocalUnitGuard<T> {
    /// The guarded unit.
    #[must_use]
    pub fn unit(&self) -> &LocalPooledUnit<T> {
        self.unit.as_ref().expect(ERR_GUARD_DISARMED)
    }

    /// Disarms the guard, handing the unit back to the caller without returning it.
    #[must_use]
    pub fn into_inner(mut self) -> LocalPooledUnit<T> {
        self.unit.take().expect(ERR_GUARD_DISARMED)
    }
}

impl<T> Deref for LocalUnitGuard<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.unit()
    }
}

impl<T> Drop for LocalUnitGuard<T> {
    fn drop(&mut self) {
        let Some(unit) = self.unit.take() else {
            return;
        };

        if let Err(error) = unit.return_to_pool() {
            tracing::warn!(%error, index = unit.index(), "guarded unit could not be returned");
        }
    }
}

impl<T> fmt::Debug for LocalUnitGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalUnitGuard")
            .field("unit", &self.unit)
            .finish()
    }
}

const ERR_GUARD_DISARMED: &str = "guard holds its unit until it is dropped or disarmed";
