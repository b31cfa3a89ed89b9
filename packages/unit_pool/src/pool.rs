use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::callbacks::Hooks;
use crate::constants::{ERR_MISSING_FACTORY, ERR_POISONED_LOCK};
use crate::observers::ObserverList;
use crate::pool_core::PoolCore;
use crate::{
    Error, OwnershipChecks, PoolEvent, PooledUnit, Result, Subscription, UnitFactory, UnitGuard,
    UnitPoolBuilder,
};

pub(crate) type SyncHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(crate) type SyncFactory<T> = Box<dyn UnitFactory<T> + Send>;

type SyncObserver<T> = Arc<dyn Fn(&UnitPool<T>, &PooledUnit<T>) + Send + Sync>;

/// A thread-safe pool of reusable units with an optional maximum instance count.
///
/// This is the lock-guarded counterpart of [`LocalUnitPool`][crate::LocalUnitPool], with the
/// same operations and the same allocation policy. Every operation acquires a single
/// pool-wide lock for the duration of its state change. The lock is released before unit
/// hooks and observers run, so they may call back into the pool.
///
/// This type acts as a cloneable handle to a shared pool instance. The pool is destroyed,
/// detaching all its units, when the last handle is dropped.
///
/// # Thread safety
///
/// This type is [`Send`] and [`Sync`] as long as `T` is. The factory is invoked while the
/// lock is held and must not call back into the same pool.
///
/// # Example
///
/// ```rust
/// use std::thread;
///
/// use unit_pool::UnitPool;
///
/// let pool = UnitPool::builder()
///     .factory(|| vec![0_u8; 1024])
///     .max_instances(4)
///     .build();
///
/// let workers: Vec<_> = (0..4)
///     .map(|_| {
///         let pool = pool.clone();
///         thread::spawn(move || {
///             let buffer = pool.take_scoped().unwrap();
///             buffer.len()
///         })
///     })
///     .collect();
///
/// for worker in workers {
///     assert_eq!(worker.join().unwrap(), 1024);
/// }
///
/// assert_eq!(pool.used(), 0);
/// assert!(pool.len() <= 4);
/// ```
pub struct UnitPool<T> {
    shared: Arc<SyncShared<T>>,
}

pub(crate) struct SyncShared<T> {
    state: Mutex<SyncState<T>>,
    taken: Mutex<ObserverList<SyncObserver<T>>>,
    returned: Mutex<ObserverList<SyncObserver<T>>>,
}

struct SyncState<T> {
    core: PoolCore<PooledUnit<T>>,
    factory: SyncFactory<T>,
    hooks: Hooks<SyncHook<T>>,
    ownership_checks: OwnershipChecks,
}

impl<T> UnitPool<T> {
    /// Returns a builder for creating a [`UnitPool`].
    pub fn builder() -> UnitPoolBuilder<T> {
        UnitPoolBuilder::new()
    }

    pub(crate) fn new_inner(builder: UnitPoolBuilder<T>) -> Self {
        let parts = builder.into_parts();
        let factory = parts.factory.expect(ERR_MISSING_FACTORY);

        let pool = Self::from_shared(Arc::new(SyncShared {
            state: Mutex::new(SyncState {
                core: PoolCore::new(parts.max_instances),
                factory,
                hooks: parts.hooks,
                ownership_checks: parts.ownership_checks,
            }),
            taken: Mutex::new(ObserverList::new(PoolEvent::Taken)),
            returned: Mutex::new(ObserverList::new(PoolEvent::Returned)),
        }));

        {
            let mut state = pool.lock_state();
            pool.populate(&mut state, parts.pre_instantiate, parts.adopted);
        }

        pool
    }

    pub(crate) fn apply(&self, builder: UnitPoolBuilder<T>) {
        let parts = builder.into_parts();

        let (detached, total) = {
            let mut state = self.lock_state();
            let detached = state.core.detach_all();

            state.core.set_max_instances(parts.max_instances);
            state.hooks = parts.hooks;
            state.ownership_checks = parts.ownership_checks;

            if let Some(factory) = parts.factory {
                state.factory = factory;
            }

            self.populate(&mut state, parts.pre_instantiate, parts.adopted);
            (detached, state.core.len())
        };

        tracing::debug!(item_type = type_name::<T>(), detached, total, "pool rebuilt");
    }

    pub(crate) fn from_shared(shared: Arc<SyncShared<T>>) -> Self {
        Self { shared }
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState<T>> {
        self.shared.state.lock().expect(ERR_POISONED_LOCK)
    }

    fn populate(&self, state: &mut SyncState<T>, pre_instantiate: usize, adopted: Vec<T>) {
        for _ in 0..pre_instantiate {
            let value = state.factory.instantiate();
            state.core.add_with(|index| self.wrap(value, index));
        }

        for value in adopted {
            state.core.add_with(|index| self.wrap(value, index));
        }
    }

    fn wrap(&self, value: T, index: usize) -> PooledUnit<T> {
        PooledUnit::new(value, index, Arc::downgrade(&self.shared))
    }

    /// Whether a unit can be taken without exceeding the maximum instance count.
    ///
    /// Another thread may change the answer before the caller acts on it. Use
    /// [`try_take()`][Self::try_take] to check and take in one step.
    #[must_use]
    pub fn is_can_take(&self) -> bool {
        self.lock_state().core.is_can_take()
    }

    /// Takes a unit from the pool, creating one if none is available.
    ///
    /// The capacity check and the take happen under the same lock acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if no unit is available and the pool has reached
    /// its maximum instance count.
    pub fn take(&self) -> Result<PooledUnit<T>> {
        let (unit, hook) = {
            let mut state = self.lock_state();
            state.core.ensure_can_take()?;
            self.take_locked(&mut state)
        };

        self.after_take(&unit, hook);
        Ok(unit)
    }

    /// Takes a unit from the pool, creating one if none is available.
    ///
    /// Returns `None` if no unit is available and the pool has reached its maximum
    /// instance count.
    #[must_use]
    pub fn try_take(&self) -> Option<PooledUnit<T>> {
        self.take().ok()
    }

    /// Takes a unit from the pool, creating one if none is available, even if that grows the
    /// pool past its maximum instance count.
    pub fn take_aggressive(&self) -> PooledUnit<T> {
        let (unit, hook) = self.take_locked(&mut self.lock_state());

        self.after_take(&unit, hook);
        unit
    }

    /// Takes a unit wrapped in a guard that returns it to the pool when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] under the same conditions as
    /// [`take()`][Self::take].
    pub fn take_scoped(&self) -> Result<UnitGuard<T>> {
        self.take().map(PooledUnit::into_guard)
    }

    /// Takes a unit wrapped in a guard that returns it to the pool when dropped.
    ///
    /// Returns `None` under the same conditions as [`try_take()`][Self::try_take].
    #[must_use]
    pub fn try_take_scoped(&self) -> Option<UnitGuard<T>> {
        self.try_take().map(PooledUnit::into_guard)
    }

    fn take_locked(&self, state: &mut SyncState<T>) -> (PooledUnit<T>, Option<SyncHook<T>>) {
        let factory = &mut state.factory;
        let unit = state
            .core
            .take_with(|index| self.wrap(factory.instantiate(), index));

        (unit, state.hooks.on_taken.clone())
    }

    fn after_take(&self, unit: &PooledUnit<T>, hook: Option<SyncHook<T>>) {
        tracing::trace!(index = unit.index(), "unit taken");

        if let Some(hook) = hook {
            hook(&**unit);
        }

        unit.notify_taken();
        self.notify(&self.shared.taken, unit);
    }

    /// Returns a taken unit to the pool, making it the next unit to be taken.
    ///
    /// Returning a unit that is already in the pool does nothing, also when two threads
    /// return the same unit concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if the unit was not sourced from this pool and
    /// the pool uses [`OwnershipChecks::Strict`]. With [`OwnershipChecks::Lenient`] such a
    /// unit is ignored.
    pub fn return_unit(&self, unit: &PooledUnit<T>) -> Result<()> {
        let hook = {
            let mut state = self.lock_state();

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
        self.lock_state().core.used()
    }

    /// The number of units owned by the pool, whether taken or available.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().core.len()
    }

    /// Whether the pool owns no units at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of units currently available in the pool.
    #[must_use]
    pub fn available(&self) -> usize {
        self.lock_state().core.available()
    }

    /// The maximum instance count, or `None` if the pool is unbounded.
    #[must_use]
    pub fn max_instances(&self) -> Option<usize> {
        self.lock_state().core.max_instances()
    }

    /// Detaches available units, least recently returned first, until the pool owns no more
    /// than `min_instances` units or only taken units remain. Returns the number removed.
    pub fn shrink_to(&self, min_instances: usize) -> usize {
        let removed = self.lock_state().core.shrink_to(min_instances);

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

    /// Detaches every unit and empties the pool. The pool remains usable.
    pub fn destroy(&self) {
        let detached = self.lock_state().core.detach_all();

        tracing::debug!(item_type = type_name::<T>(), detached, "pool destroyed");
    }

    /// Registers an observer that is called after any unit is taken from the pool.
    ///
    /// Observers run on the thread that took the unit, after the unit's `on_taken` hook.
    pub fn subscribe_taken<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Self, &PooledUnit<T>) + Send + Sync + 'static,
    {
        self.shared
            .taken
            .lock()
            .expect(ERR_POISONED_LOCK)
            .subscribe(Arc::new(observer))
    }

    /// Registers an observer that is called after any unit is returned to the pool.
    ///
    /// Observers run on the thread that returned the unit, after the unit's `on_returned`
    /// hook.
    pub fn subscribe_returned<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Self, &PooledUnit<T>) + Send + Sync + 'static,
    {
        self.shared
            .returned
            .lock()
            .expect(ERR_POISONED_LOCK)
            .subscribe(Arc::new(observer))
    }

    /// Removes an observer. Returns `false` if it was already removed or was registered
    /// on a different pool, in which case the token can still be used with its own pool.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let list = match subscription.event() {
            PoolEvent::Taken => &self.shared.taken,
            PoolEvent::Returned => &self.shared.returned,
        };

        list.lock()
            .expect(ERR_POISONED_LOCK)
            .unsubscribe(subscription)
    }

    /// Whether two handles refer to the same pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn notify(&self, list: &Mutex<ObserverList<SyncObserver<T>>>, unit: &PooledUnit<T>) {
        let observers = list.lock().expect(ERR_POISONED_LOCK).snapshot();

        for observer in observers {
            observer(self, unit);
        }
    }
}

impl<T> Clone for UnitPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for UnitPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("UnitPool");
        debug.field("item_type", &format_args!("{}", type_name::<T>()));

        if let Ok(state) = self.shared.state.try_lock() {
            debug
                .field("len", &state.core.len())
                .field("available", &state.core.available())
                .field("max_instances", &state.core.max_instances())
                .field("ownership_checks", &state.ownership_checks);
        }

        if let (Ok(taken), Ok(returned)) =
            (self.shared.taken.try_lock(), self.shared.returned.try_lock())
        {
            debug
                .field("taken_observers", &taken.len())
                .field("returned_observers", &returned.len());
        }

        debug.finish_non_exhaustive()
    }
}

impl<T> Drop for SyncShared<T> {
    fn drop(&mut self) {
        // A poisoned lock still holds units that must not remain attached.
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        state.core.detach_all();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, Mutex as StdMutex};
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{MockUnitFactory, UnitCallbacks};

    assert_impl_all!(UnitPool<String>: Send, Sync);
    assert_not_impl_any!(UnitPool<std::rc::Rc<u8>>: Send, Sync);

    fn counting_pool(max_instances: usize) -> UnitPool<usize> {
        let next = AtomicUsize::new(0);
        UnitPool::builder()
            .factory(move || next.fetch_add(1, Ordering::Relaxed))
            .max_instances(max_instances)
            .build()
    }

    #[test]
    fn full_pool_rejects_strict_take_but_not_aggressive_take() {
        let pool = counting_pool(2);
        let _a = pool.take().unwrap();
        let _b = pool.take().unwrap();

        assert!(matches!(
            pool.take(),
            Err(Error::CapacityExceeded { max_instances: 2 })
        ));
        assert!(pool.try_take().is_none());

        let _c = pool.take_aggressive();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.used(), 3);
    }

    #[test]
    fn returned_units_are_reused_last_in_first_out() {
        let pool = counting_pool(10);
        let a = pool.take().unwrap();
        let b = pool.take().unwrap();

        a.return_to_pool().unwrap();
        b.return_to_pool().unwrap();

        assert!(pool.take().unwrap().ptr_eq(&b));
    }

    #[test]
    fn strict_checks_reject_foreign_units() {
        let pool = UnitPool::builder()
            .factory(|| 0_u8)
            .ownership_checks(OwnershipChecks::Strict)
            .build();
        let other = UnitPool::builder().factory(|| 0_u8).build();

        let foreign = other.take().unwrap();

        assert!(matches!(
            pool.return_unit(&foreign),
            Err(Error::OwnershipViolation)
        ));
    }

    #[test]
    fn lenient_checks_ignore_foreign_units() {
        let pool = UnitPool::builder()
            .factory(|| 0_u8)
            .ownership_checks(OwnershipChecks::Lenient)
            .build();
        let other = UnitPool::builder().factory(|| 0_u8).build();

        let foreign = other.take().unwrap();

        pool.return_unit(&foreign).unwrap();
        assert_eq!(pool.available(), 0);
        assert!(!foreign.is_in_pool());
    }

    #[test]
    fn pre_instantiate_invokes_factory_eagerly() {
        let mut factory = MockUnitFactory::<u32>::new();
        factory.expect_instantiate().times(2).returning(|| 1);

        let pool = UnitPool::builder()
            .factory(factory)
            .pre_instantiate(2)
            .build();

        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn hooks_and_observers_fire_in_order() {
        struct Logged {
            log: Arc<StdMutex<Vec<&'static str>>>,
        }

        impl UnitCallbacks for Logged {
            fn on_taken(&self) {
                self.log.lock().unwrap().push("hook taken");
            }

            fn on_returned(&self) {
                self.log.lock().unwrap().push("hook returned");
            }
        }

        let log = Arc::new(StdMutex::new(Vec::new()));

        let pool = UnitPool::builder()
            .factory({
                let log = Arc::clone(&log);
                move || Logged {
                    log: Arc::clone(&log),
                }
            })
            .unit_callbacks()
            .build();

        let _taken = pool.subscribe_taken({
            let log = Arc::clone(&log);
            move |_, _| log.lock().unwrap().push("observer taken")
        });
        let _returned = pool.subscribe_returned({
            let log = Arc::clone(&log);
            move |_, _| log.lock().unwrap().push("observer returned")
        });

        let unit = pool.take().unwrap();
        unit.return_to_pool().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "hook taken",
                "observer taken",
                "hook returned",
                "observer returned"
            ]
        );
    }

    #[test]
    fn observers_may_reenter_the_pool() {
        let pool = counting_pool(10);
        let _subscription = pool.subscribe_taken(|pool, unit| {
            pool.return_unit(unit).unwrap();
        });

        let unit = pool.take().unwrap();

        assert!(unit.is_in_pool());
    }

    #[test]
    fn concurrent_takes_respect_capacity() {
        const THREADS: usize = 8;

        let pool = counting_pool(3);
        let barrier = Arc::new(Barrier::new(THREADS));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let pool = pool.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    pool.try_take()
                })
            })
            .collect();

        let taken: Vec<_> = workers
            .into_iter()
            .filter_map(|worker| worker.join().unwrap())
            .collect();

        assert_eq!(taken.len(), 3);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.used(), 3);
    }

    #[test]
    fn concurrent_double_return_is_idempotent() {
        let pool = counting_pool(10);
        let unit = pool.take().unwrap();
        let returned = Arc::new(AtomicUsize::new(0));

        let _subscription = pool.subscribe_returned({
            let returned = Arc::clone(&returned);
            move |_, _| {
                returned.fetch_add(1, Ordering::Relaxed);
            }
        });

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let unit = unit.clone();
                thread::spawn(move || unit.return_to_pool().unwrap())
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(returned.load(Ordering::Relaxed), 1);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn shrink_and_destroy_detach_units() {
        let pool = counting_pool(10);
        let held = pool.take().unwrap();
        let spare = pool.take().unwrap();
        spare.return_to_pool().unwrap();

        assert_eq!(pool.shrink_to(0), 1);
        assert!(!spare.is_attached());
        assert!(held.is_attached());

        pool.destroy();
        assert!(pool.is_empty());
        assert!(matches!(held.return_to_pool(), Err(Error::Detached)));
    }

    #[test]
    fn rebuild_replaces_units() {
        let pool = counting_pool(1);
        let old = pool.take().unwrap();

        UnitPool::builder()
            .pre_instantiate(2)
            .max_instances_infinite()
            .rebuild(&pool);

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.max_instances(), None);
        assert!(!old.is_attached());
    }

    #[test]
    fn mistaken_unsubscribe_keeps_token_usable() {
        let pool = counting_pool(4);
        let other = counting_pool(4);
        let calls = Arc::new(AtomicUsize::new(0));

        let subscription = other.subscribe_returned({
            let calls = Arc::clone(&calls);
            move |_, _| {
                calls.fetch_add(1, Ordering::Relaxed);
            }
        });

        assert!(!pool.unsubscribe(&subscription));
        other.take().unwrap().return_to_pool().unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        assert!(other.unsubscribe(&subscription));
        other.take().unwrap().return_to_pool().unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
