use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use foldhash::{HashMap, HashMapExt};

use crate::local_pool::LocalShared;
use crate::{LocalPooledUnit, LocalUnitPool, LocalUnitPoolBuilder, Result, Subscription};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_REF_ID: AtomicU64 = AtomicU64::new(0);

/// Supplies the configuration of the pool behind a [`PoolRef`].
///
/// Any `Fn() -> LocalUnitPoolBuilder<T>` closure is a provider.
#[cfg_attr(test, mockall::automock)]
pub trait PoolProvider<T: 'static> {
    /// Returns a builder for a new pool. Called once per scope that resolves the reference.
    fn create_builder(&self) -> LocalUnitPoolBuilder<T>;
}

impl<T: 'static, F> PoolProvider<T> for F
where
    F: Fn() -> LocalUnitPoolBuilder<T>,
{
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn create_builder(&self) -> LocalUnitPoolBuilder<T> {
        self()
    }
}

/// The context that owns the pools created by [`PoolRef`]s, such as a scene or a session.
///
/// A scope holds at most one pool per reference and is the only owner of those pools.
/// Tearing the scope down destroys all of its pools, after which references resolve to fresh
/// ones. Dropping the scope tears it down.
///
/// # Example
///
/// ```rust
/// use unit_pool::{LocalUnitPool, PoolRef, PoolScope};
///
/// let bullets = PoolRef::new(|| LocalUnitPool::builder().factory(|| [0.0_f32; 2]));
/// let scene = PoolScope::new();
///
/// let bullet = bullets.take(&scene).unwrap();
/// assert_eq!(bullets.used(&scene), 1);
///
/// scene.teardown();
/// assert!(!bullet.is_attached());
/// assert_eq!(bullets.used(&scene), 0);
/// ```
pub struct PoolScope {
    id: u64,

    // Bumped on teardown so that memoized resolutions go stale.
    generation: Cell<u64>,

    pools: RefCell<HashMap<u64, Rc<dyn ScopedPool>>>,
}

/// Type-erased view of a pool held by a scope.
trait ScopedPool {
    fn destroy(&self);

    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> ScopedPool for LocalUnitPool<T> {
    fn destroy(&self) {
        Self::destroy(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl PoolScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            generation: Cell::new(0),
            pools: RefCell::new(HashMap::new()),
        }
    }

    /// The number of pools currently held by the scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.borrow().len()
    }

    /// Whether the scope holds no pools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.borrow().is_empty()
    }

    /// Whether the scope holds a pool for the given reference.
    #[must_use]
    pub fn contains<T: 'static>(&self, pool_ref: &PoolRef<T>) -> bool {
        self.pools.borrow().contains_key(&pool_ref.inner.id)
    }

    /// Destroys every pool held by the scope. The scope stays usable.
    pub fn teardown(&self) {
        let pools = mem::take(&mut *self.pools.borrow_mut());

        self.generation.set(
            self.generation
                .get()
                .checked_add(1)
                .expect("scope generation cannot overflow"),
        );

        tracing::debug!(scope = self.id, pools = pools.len(), "scope torn down");

        // Borrow released above; destroying a pool never calls back into the scope.
        for pool in pools.into_values() {
            pool.destroy();
        }
    }

    fn find<T: 'static>(&self, ref_id: u64) -> Option<LocalUnitPool<T>> {
        let pools = self.pools.borrow();
        let pool = pools.get(&ref_id)?;

        Some(
            pool.as_any()
                .downcast_ref::<LocalUnitPool<T>>()
                .expect("a reference id is only ever registered with one item type")
                .clone(),
        )
    }

    fn register<T: 'static>(&self, ref_id: u64, pool: LocalUnitPool<T>) {
        self.pools.borrow_mut().insert(ref_id, Rc::new(pool));
    }
}

impl Drop for PoolScope {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Default for PoolScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PoolScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolScope")
            .field("id", &self.id)
            .field("generation", &self.generation.get())
            .field("pools", &self.pools.try_borrow().map(|pools| pools.len()).ok())
            .finish()
    }
}

/// A lazily resolved reference to a [`LocalUnitPool`] that lives in a [`PoolScope`].
///
/// The pool is built from the provider the first time the reference is used with a scope.
/// Every operation resolves first, so observers subscribed before the first take already
/// see it. Clones share their identity and resolve to the same pool.
pub struct PoolRef<T: 'static> {
    inner: Rc<RefInner<T>>,
}

struct RefInner<T: 'static> {
    id: u64,
    provider: Box<dyn PoolProvider<T>>,
    resolved: RefCell<Option<Resolved<T>>>,
}

// Weak so that only the scope keeps its pools alive.
struct Resolved<T> {
    scope_id: u64,
    generation: u64,
    pool: Weak<LocalShared<T>>,
}

impl<T: 'static> PoolRef<T> {
    /// Creates a reference whose pools are configured by `provider`.
    #[must_use]
    pub fn new<P>(provider: P) -> Self
    where
        P: PoolProvider<T> + 'static,
    {
        Self {
            inner: Rc::new(RefInner {
                id: NEXT_REF_ID.fetch_add(1, Ordering::Relaxed),
                provider: Box::new(provider),
                resolved: RefCell::new(None),
            }),
        }
    }

    /// Returns the pool for this reference in `scope`, creating and registering it if the
    /// scope does not hold one yet.
    #[must_use]
    pub fn resolve(&self, scope: &PoolScope) -> LocalUnitPool<T> {
        let generation = scope.generation.get();

        if let Some(resolved) = &*self.inner.resolved.borrow() {
            if resolved.scope_id == scope.id && resolved.generation == generation {
                if let Some(shared) = resolved.pool.upgrade() {
                    return LocalUnitPool::from_shared(shared);
                }
            }
        }

        let pool = scope.find::<T>(self.inner.id).unwrap_or_else(|| {
            let pool = self.inner.provider.create_builder().build();
            scope.register(self.inner.id, pool.clone());

            tracing::debug!(
                item_type = type_name::<T>(),
                scope = scope.id,
                reference = self.inner.id,
                "scoped pool created"
            );

            pool
        });

        *self.inner.resolved.borrow_mut() = Some(Resolved {
            scope_id: scope.id,
            generation,
            pool: pool.downgrade(),
        });

        pool
    }

    /// See [`LocalUnitPool::is_can_take()`].
    #[must_use]
    pub fn is_can_take(&self, scope: &PoolScope) -> bool {
        self.resolve(scope).is_can_take()
    }

    /// See [`LocalUnitPool::take()`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`][crate::Error::CapacityExceeded] if the resolved
    /// pool is full.
    pub fn take(&self, scope: &PoolScope) -> Result<LocalPooledUnit<T>> {
        self.resolve(scope).take()
    }

    /// See [`LocalUnitPool::try_take()`].
    #[must_use]
    pub fn try_take(&self, scope: &PoolScope) -> Option<LocalPooledUnit<T>> {
        self.resolve(scope).try_take()
    }

    /// See [`LocalUnitPool::take_aggressive()`].
    pub fn take_aggressive(&self, scope: &PoolScope) -> LocalPooledUnit<T> {
        self.resolve(scope).take_aggressive()
    }

    /// See [`LocalUnitPool::return_unit()`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`][crate::Error::OwnershipViolation] if the unit
    /// does not belong to the resolved pool and that pool uses strict ownership checks.
    pub fn return_unit(&self, scope: &PoolScope, unit: &LocalPooledUnit<T>) -> Result<()> {
        self.resolve(scope).return_unit(unit)
    }

    /// See [`LocalUnitPool::used()`].
    #[must_use]
    pub fn used(&self, scope: &PoolScope) -> usize {
        self.resolve(scope).used()
    }

    /// See [`LocalUnitPool::subscribe_taken()`].
    pub fn subscribe_taken<F>(&self, scope: &PoolScope, observer: F) -> Subscription
    where
        F: Fn(&LocalUnitPool<T>, &LocalPooledUnit<T>) + 'static,
    {
        self.resolve(scope).subscribe_taken(observer)
    }

    /// See [`LocalUnitPool::subscribe_returned()`].
    pub fn subscribe_returned<F>(&self, scope: &PoolScope, observer: F) -> Subscription
    where
        F: Fn(&LocalUnitPool<T>, &LocalPooledUnit<T>) + 'static,
    {
        self.resolve(scope).subscribe_returned(observer)
    }

    /// See [`LocalUnitPool::unsubscribe()`].
    pub fn unsubscribe(&self, scope: &PoolScope, subscription: &Subscription) -> bool {
        self.resolve(scope).unsubscribe(subscription)
    }
}

impl<T: 'static> Clone for PoolRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for PoolRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRef")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::Error;

    assert_not_impl_any!(PoolScope: Send, Sync);
    assert_not_impl_any!(PoolRef<u8>: Send, Sync);

    fn provider_expecting(times: usize) -> MockPoolProvider<u32> {
        let mut provider = MockPoolProvider::new();
        provider
            .expect_create_builder()
            .times(times)
            .returning(|| LocalUnitPool::builder().factory(|| 7_u32).max_instances(2));
        provider
    }

    #[test]
    fn resolves_lazily_and_once_per_scope() {
        let pool_ref = PoolRef::new(provider_expecting(1));
        let scope = PoolScope::new();

        assert!(!scope.contains(&pool_ref));

        let first = pool_ref.resolve(&scope);
        let second = pool_ref.resolve(&scope);

        assert!(first.ptr_eq(&second));
        assert!(scope.contains(&pool_ref));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn clones_share_the_scoped_pool() {
        let pool_ref = PoolRef::new(provider_expecting(1));
        let clone = pool_ref.clone();
        let scope = PoolScope::new();

        let unit = pool_ref.take(&scope).unwrap();

        assert_eq!(clone.used(&scope), 1);
        clone.return_unit(&scope, &unit).unwrap();
        assert_eq!(pool_ref.used(&scope), 0);
    }

    #[test]
    fn each_scope_gets_its_own_pool() {
        let pool_ref = PoolRef::new(provider_expecting(2));
        let menu = PoolScope::new();
        let level = PoolScope::new();

        let _unit = pool_ref.take(&level).unwrap();

        assert_eq!(pool_ref.used(&level), 1);
        assert_eq!(pool_ref.used(&menu), 0);

        // Switching back must not rebuild the pool for the first scope.
        assert_eq!(pool_ref.used(&level), 1);
    }

    #[test]
    fn teardown_forces_a_fresh_pool() {
        let pool_ref = PoolRef::new(provider_expecting(2));
        let scope = PoolScope::new();

        let before = pool_ref.resolve(&scope);
        let unit = pool_ref.take(&scope).unwrap();

        scope.teardown();

        assert!(scope.is_empty());
        assert!(before.is_empty());
        assert!(!unit.is_attached());

        let after = pool_ref.resolve(&scope);
        assert!(!after.ptr_eq(&before));
        assert_eq!(after.used(), 0);
    }

    #[test]
    fn dropping_the_scope_destroys_its_pools() {
        let pool_ref = PoolRef::new(provider_expecting(2));
        let scope = PoolScope::new();

        let unit = pool_ref.take(&scope).unwrap();
        drop(scope);

        assert!(!unit.is_attached());
        assert!(unit.source_pool().is_none());
        assert!(matches!(unit.return_to_pool(), Err(Error::Detached)));

        let next = PoolScope::new();
        assert_eq!(pool_ref.used(&next), 0);
    }

    #[test]
    fn memo_does_not_keep_the_pool_alive() {
        let pool_ref = PoolRef::new(provider_expecting(1));
        let scope = PoolScope::new();

        let unit = pool_ref.take(&scope).unwrap();
        scope.teardown();

        assert!(unit.source_pool().is_none());
    }

    #[test]
    fn subscription_before_first_take_sees_it() {
        let pool_ref = PoolRef::new(|| LocalUnitPool::builder().factory(|| 0_u8));
        let scope = PoolScope::new();
        let taken = Rc::new(Cell::new(0));

        let subscription = pool_ref.subscribe_taken(&scope, {
            let taken = Rc::clone(&taken);
            move |_, _| taken.set(taken.get() + 1)
        });

        let _unit = pool_ref.take(&scope).unwrap();
        assert_eq!(taken.get(), 1);

        assert!(pool_ref.unsubscribe(&scope, &subscription));
        let _another = pool_ref.take(&scope).unwrap();
        assert_eq!(taken.get(), 1);
    }

    #[test]
    fn forwarders_respect_capacity() {
        let pool_ref = PoolRef::new(provider_expecting(1));
        let scope = PoolScope::new();

        let _a = pool_ref.take(&scope).unwrap();
        let _b = pool_ref.take(&scope).unwrap();

        assert!(!pool_ref.is_can_take(&scope));
        assert!(pool_ref.try_take(&scope).is_none());
        assert!(matches!(
            pool_ref.take(&scope),
            Err(Error::CapacityExceeded { max_instances: 2 })
        ));

        let extra = pool_ref.take_aggressive(&scope);
        assert_eq!(*extra, 7);
        assert_eq!(pool_ref.used(&scope), 3);
    }

    #[test]
    fn foreign_unit_is_rejected_under_strict_checks() {
        let pool_ref = PoolRef::new(|| {
            LocalUnitPool::builder()
                .factory(|| 0_u8)
                .ownership_checks(crate::OwnershipChecks::Strict)
        });
        let scope = PoolScope::new();
        let other = LocalUnitPool::builder().factory(|| 0_u8).build();

        let foreign = other.take().unwrap();

        assert!(matches!(
            pool_ref.return_unit(&scope, &foreign),
            Err(Error::OwnershipViolation)
        ));
    }

    #[test]
    fn returned_observer_is_attached_to_resolved_pool() {
        let pool_ref = PoolRef::new(|| LocalUnitPool::builder().factory(|| 0_u8));
        let scope = PoolScope::new();
        let returned = Rc::new(Cell::new(false));

        let _subscription = pool_ref.subscribe_returned(&scope, {
            let returned = Rc::clone(&returned);
            move |_, _| returned.set(true)
        });

        pool_ref.take(&scope).unwrap().return_to_pool().unwrap();

        assert!(returned.get());
    }
}
