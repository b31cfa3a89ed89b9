use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::callbacks::Hooks;
use crate::constants::ERR_MISSING_FACTORY;
use crate::observers::ObserverList;
use crate::pool_core::PoolCore;
use crate::{
    Error, LocalPooledUnit, LocalUnitGuard, LocalUnitPoolBuilder, OwnershipChecks, PoolEvent,
    Result, Subscription, UnitFactory,
};

pub(crate) type LocalHook<T> = Rc<dyn Fn(&T)>;

type LocalObserver<T> = Rc<dyn Fn(&LocalUnitPool<T>, &LocalPooledUnit<T>)>;

/// A single-threaded pool of reusable units with an optional maximum instance count.
///
/// Units are created on demand by the configured [factory][UnitFactory] and reused in
/// last-in-first-out order: the most recently returned unit is the next one to be taken.
///
/// There are three ways to take a unit, differing only in how they treat the capacity limit:
///
/// * [`take()`][Self::take] fails with [`Error::CapacityExceeded`][crate::Error::CapacityExceeded]
///   if nothing is available and the pool is full.
/// * [`try_take()`][Self::try_take] returns `None` in the same situation.
/// * [`take_aggressive()`][Self::take_aggressive] ignores the limit and grows the pool.
///
/// This type acts as a cloneable handle to a shared pool instance. The pool is destroyed,
/// detaching all its units, when the last handle is dropped.
///
/// # Single-threaded design
///
/// This type performs no synchronization and is neither [`Send`] nor [`Sync`]. For pools
/// shared between threads, use [`UnitPool`][crate::UnitPool] instead.
///
/// # Example
///
/// ```rust
/// use unit_pool::LocalUnitPool;
///
/// let pool = LocalUnitPool::builder()
///     .factory(|| String::from("bullet"))
///     .max_instances(2)
///     .build();
///
/// let first = pool.take().unwrap();
/// let _second = pool.take().unwrap();
/// assert!(pool.try_take().is_none());
///
/// pool.return_unit(&first).unwrap();
/// let reused = pool.take().unwrap();
/// assert!(reused.ptr_eq(&first));
/// ```
pub struct LocalUnitPool<T> {
    shared: Rc<LocalShared<T>>,
}

pub(crate) struct LocalShared<T> {
    state: RefCell<LocalState<T>>,
    taken: RefCell<ObserverList<LocalObserver<T>>>,
    returned: RefCell<ObserverList<LocalObserver<T>>>,
}

struct LocalState<T> {
    core: PoolCore<LocalPooledUnit<T>>,
    factory: Box<dyn UnitFactory<T>>,
    hooks: Hooks<LocalHook<T>>,
    ownership_checks: OwnershipChecks,
}

impl<T> LocalUnitPool<T> {
    /// Returns a builder for creating a [`LocalUnitPool`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use unit_pool::LocalUnitPool;
    ///
    /// let pool = LocalUnitPool::builder()
    ///     .factory(|| 0_u64)
    ///     .pre_instantiate(4)
    ///     .build();
    ///
    /// assert_eq!(pool.len(), 4);
    /// assert_eq!(pool.available(), 4);
    /// ```
    pub fn builder() -> LocalUnitPoolBuilder<T> {
        LocalUnitPoolBuilder::new()
    }

    pub(crate) fn new_inner(builder: LocalUnitPoolBuilder<T>) -> Self {
        let parts = builder.into_parts();
        let factory = parts.factory.expect(ERR_MISSING_FACTORY);

        let pool = Self::from_shared(Rc::new(LocalShared {
            state: RefCell::new(LocalState {
                core: PoolCore::new(parts.max_instances),
                factory,
                hooks: parts.hooks,
                ownership_checks: parts.ownership_checks,
            }),
            taken: RefCell::new(ObserverList::new(PoolEvent::Taken)),
            returned: RefCell::new(ObserverList::new(PoolEvent::Returned)),
        }));

        pool.populate(parts.pre_instantiate, parts.adopted);
        pool
    }

    /// Replaces the configuration and all units of an existing pool, keeping its identity and
    /// its observers. The previous units are detached.
    pub(crate) fn apply(&self, builder: LocalUnitPoolBuilder<T>) {
        let parts = builder.into_parts();

        let detached = {
            let mut state = self.shared.state.borrow_mut();
            let detached = state.core.detach_all();

            state.core.set_max_instances(parts.max_instances);
            state.hooks = parts.hooks;
            state.ownership_checks = parts.ownership_checks;

            if let Some(factory) = parts.factory {
                state.factory = factory;
            }

            detached
        };

        self.populate(parts.pre_instantiate, parts.adopted);

        tracing::debug!(
            item_type = type_name::<T>(),
            detached,
            total = self.len(),
            "pool rebuilt"
        );
    }

    pub(crate) fn from_shared(shared: Rc<LocalShared<T>>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<LocalShared<T>> {
        Rc::downgrade(&self.shared)
    }

    fn populate(&self, pre_instantiate: usize, adopted: Vec<T>) {
        let mut state = self.shared.state.borrow_mut();
        let state = &mut *state;

        for _ in 0..pre_instantiate {
            let value = state.factory.instantiate();
            state.core.add_with(|index| self.wrap(value, index));
        }

        for value in adopted {
            state.core.add_with(|index| self.wrap(value, index));
        }
    }

    fn wrap(&self, value: T, index: usize) -> LocalPooledUnit<T> {
        LocalPooledUnit::new(value, index, self.downgrade())
    }

    /// Whether a unit can be taken without exceeding the maximum instance count.
    ///
    /// This is `true` if a unit is available, if the pool is unbounded or if the pool
    /// has not yet reached its maximum instance count.
    #[must_use]
    pub fn is_can_take(&self) -> bool {
        self.shared.state.borrow().core.is_can_take()
    }

    /// Takes a unit from the pool, creating one if none is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`][crate::Error::CapacityExceeded] if no unit is
    /// available and the pool has reached its maximum instance count.
    pub fn take(&self) -> Result<LocalPooledUnit<T>> {
        self.shared.state.borrow().core.ensure_can_take()?;
        Ok(self.take_aggressive())
    }

    /// Takes a unit from the pool, creating one if none is available.
    ///
    /// Returns `None` if no unit is available and the pool has reached its maximum
    /// instance count.
    #[must_use]
    pub fn try_take(&self) -> Option<LocalPooledUnit<T>> {
        self.take().ok()
    }

    /// Takes a unit from the pool, creating one if none is available, even if that grows the
    /// pool past its maximum instance count.
    ///
    /// Use this where a missing unit would be worse than going over budget.
    pub fn take_aggressive(&self) -> LocalPooledUnit<T> {
        let (unit, hook) = {
            let mut state = self.shared.state.borrow_mut();
            let state = &mut *state;

            let factory = &mut state.factory;
            let unit = state
                .core
                .take_with(|index| self.wrap(factory.instantiate(), index));

            (unit, state.hooks.on_taken.clone())
        };

        tracing::trace!(index = unit.index(), "unit taken");

        if let Some(hook) = hook {
            hook(&*unit);
        }

        unit.notify_taken();
        self.notify(&self.shared.taken, &unit);
        unit
    }

    /// Takes a unit wrapped in a guard that returns it to the pool when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`][crate::Error::CapacityExceeded] under the same
    /// conditions as [`take()`][Self::take].
    pub fn take_scoped(&self) -> Result<LocalUnitGuard<T>> {
        self.take().map(LocalPooledUnit::into_guard)
    }

    /// Takes a unit wrapped in a guard that returns it to the pool when dropped.
    ///
    /// Returns `None` under the same conditions as [`try_take()`][Self::try_take].
    #[must_use]
    pub fn try_take_scoped(&self) -> Option<LocalUnitGuard<T>> {
        self.try_take().map(LocalPooledUnit::into_guard)
    }

    /// Returns a taken unit to the pool, making it the next unit to be taken.
    ///
    /// Returning a unit that is already in the pool does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`][crate::Error::OwnershipViolation] if the unit
    /// was not sourced from this pool and the pool uses [`OwnershipChecks::Strict`]. With
    /// [`OwnershipChecks::Lenient`] such a unit is ignored.
    pub fn return_unit(&self, unit: &LocalPooledUnit<T>) -> Result<()> {
        let hook = {
            let mut state = self.shared.state.borrow_mut();

            if !unit.belongs_to(&self.shared) {
                return match state.ownership_checks {
                    OwnershipChecks::Strict => Err(Error::OwnershipViolation),
                    OwnershipChecks::Lenient => {
                        tracing::warn!(
                            index = unit.index(),
                            "ignoring a unit returned to a pool that does not own it"
                        );
                        Ok(())
                    }
                };
            }

            if !state.core.put_back(unit) {
                return Ok(());
            }

            state.hooks.on_returned.clone()
        };

        tracing::trace!(index = unit.index(), "unit returned");

        if let Some(hook) = hook {
            hook(&**unit);
        }

        unit.notify_returned();
        self.notify(&self.shared.returned, unit);
        Ok(())
    }

    /// The number of units currently taken from the pool.
    #[must_use]
    pub fn used(&self) -> usize {
        self.shared.state.borrow().core.used()
    }

    /// The number of units owned by the pool, whether taken or available.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.borrow().core.len()
    }

    /// Whether the pool owns no units at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of units currently available in the pool.
    #[must_use]
    pub fn available(&self) -> usize {
        self.shared.state.borrow().core.available()
    }

    /// The maximum instance count, or `None` if the pool is unbounded.
    #[must_use]
    pub fn max_instances(&self) -> Option<usize> {
        self.shared.state.borrow().core.max_instances()
    }

    /// Detaches available units, least recently returned first, until the pool owns no more
    /// than `min_instances` units or only taken units remain.
    ///
    /// Taken units are never removed. Returns the number of units removed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use unit_pool::LocalUnitPool;
    ///
    /// let pool = LocalUnitPool::builder()
    ///     .factory(|| [0_u8; 64])
    ///     .pre_instantiate(8)
    ///     .build();
    ///
    /// let _held = pool.take().unwrap();
    ///
    /// assert_eq!(pool.shrink_to(2), 6);
    /// assert_eq!(pool.len(), 2);
    /// assert_eq!(pool.used(), 1);
    /// ```
    pub fn shrink_to(&self, min_instances: usize) -> usize {
        let removed = self.shared.state.borrow_mut().core.shrink_to(min_instances);

        if removed > 0 {
            tracing::debug!(
                item_type = type_name::<T>(),
                removed,
                min_instances,
                "pool shrunk"
            );
        }

        removed
    }

    /// Detaches every unit and empties the pool.
    ///
    /// Units that are still held elsewhere keep their values but can no longer be returned.
    /// The pool itself remains usable and grows again from empty.
    pub fn destroy(&self) {
        let detached = self.shared.state.borrow_mut().core.detach_all();

        tracing::debug!(item_type = type_name::<T>(), detached, "pool destroyed");
    }

    /// Registers an observer that is called after any unit is taken from the pool.
    ///
    /// Observers run after the unit's `on_taken` hook, in registration order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// use unit_pool::LocalUnitPool;
    ///
    /// let pool = LocalUnitPool::builder().factory(|| 0_u32).build();
    ///
    /// let count = Rc::new(Cell::new(0));
    /// let subscription = pool.subscribe_taken({
    ///     let count = Rc::clone(&count);
    ///     move |_pool, _unit| count.set(count.get() + 1)
    /// });
    ///
    /// let _unit = pool.take().unwrap();
    /// assert_eq!(count.get(), 1);
    ///
    /// assert!(pool.unsubscribe(&subscription));
    /// let _unit = pool.take().unwrap();
    /// assert_eq!(count.get(), 1);
    /// ```
    pub fn subscribe_taken<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Self, &LocalPooledUnit<T>) + 'static,
    {
        self.shared.taken.borrow_mut().subscribe(Rc::new(observer))
    }

    /// Registers an observer that is called after any unit is returned to the pool.
    ///
    /// Observers run after the unit's `on_returned` hook, in registration order.
    pub fn subscribe_returned<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Self, &LocalPooledUnit<T>) + 'static,
    {
        self.shared.returned.borrow_mut().subscribe(Rc::new(observer))
    }

    /// Removes an observer. Returns `false` if it was already removed or was registered
    /// on a different pool, in which case the token can still be used with its own pool.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let list = match subscription.event() {
            PoolEvent::Taken => &self.shared.taken,
            PoolEvent::Returned => &self.shared.returned,
        };

        list.borrow_mut().unsubscribe(subscription)
    }

    /// Whether two handles refer to the same pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    fn notify(&self, list: &RefCell<ObserverList<LocalObserver<T>>>, unit: &LocalPooledUnit<T>) {
        let observers = list.borrow().snapshot();

        for observer in observers {
            observer(self, unit);
        }
    }
}

impl<T> Clone for LocalUnitPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for LocalUnitPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("LocalUnitPool");
        debug.field("item_type", &format_args!("{}", type_name::<T>()));

        if let Ok(state) = self.shared.state.try_borrow() {
            debug
                .field("len", &state.core.len())
                .field("available", &state.core.available())
                .field("max_instances", &state.core.max_instances())
                .field("ownership_checks", &state.ownership_checks);
        }

        if let (Ok(taken), Ok(returned)) =
            (self.shared.taken.try_borrow(), self.shared.returned.try_borrow())
        {
            debug
                .field("taken_observers", &taken.len())
                .field("returned_observers", &returned.len());
        }

        debug.finish_non_exhaustive()
    }
}

impl<T> Drop for LocalShared<T> {
    fn drop(&mut self) {
        self.state.get_mut().core.detach_all();
    }
}
