use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::pool::{SyncFactory, SyncHook};
use crate::pool_core::PoolParts;
use crate::{OwnershipChecks, UnitCallbacks, UnitFactory, UnitPool};

/// Builder for creating an instance of [`UnitPool`].
///
/// Takes the same settings as [`LocalUnitPoolBuilder`][crate::LocalUnitPoolBuilder], with the
/// factory and hooks additionally required to be thread-safe.
///
/// # Examples
///
/// ```
/// use unit_pool::UnitPool;
///
/// let pool = UnitPool::builder()
///     .factory(String::new)
///     .adopt(["first".to_string(), "second".to_string()])
///     .max_instances(4)
///     .build();
///
/// assert_eq!(*pool.take().unwrap(), "second");
/// ```
#[must_use]
pub struct UnitPoolBuilder<T> {
    parts: SyncParts<T>,
}

pub(crate) type SyncParts<T> = PoolParts<T, SyncFactory<T>, SyncHook<T>>;

impl<T> fmt::Debug for UnitPoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitPoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("has_factory", &self.parts.factory.is_some())
            .field("pre_instantiate", &self.parts.pre_instantiate)
            .field("adopted", &self.parts.adopted.len())
            .field("max_instances", &self.parts.max_instances)
            .field("ownership_checks", &self.parts.ownership_checks)
            .finish_non_exhaustive()
    }
}

impl<T> UnitPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            parts: PoolParts::default(),
        }
    }

    /// Sets the factory that creates the value of every new unit.
    ///
    /// The factory runs with the pool lock held.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: UnitFactory<T> + Send + 'static,
    {
        self.parts.factory = Some(Box::new(factory));
        self
    }

    /// Creates `count` units up front, all of them initially available.
    pub fn pre_instantiate(mut self, count: usize) -> Self {
        self.parts.pre_instantiate = count;
        self
    }

    /// Adopts externally created values as available units of the pool.
    ///
    /// The last adopted value is the first one to be taken.
    pub fn adopt<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        self.parts.adopted.extend(values);
        self
    }

    /// Adopts one externally created value as an available unit of the pool.
    pub fn adopt_one(mut self, value: T) -> Self {
        self.parts.adopted.push(value);
        self
    }

    /// Limits the number of units the pool will create for `take()` and `try_take()`.
    pub fn max_instances(mut self, max_instances: usize) -> Self {
        self.parts.max_instances = Some(max_instances);
        self
    }

    /// Removes any limit on the number of units. This is the default.
    pub fn max_instances_infinite(mut self) -> Self {
        self.parts.max_instances = None;
        self
    }

    /// Sets how the pool reacts to units returned to it that it does not own.
    pub fn ownership_checks(mut self, ownership_checks: OwnershipChecks) -> Self {
        self.parts.ownership_checks = ownership_checks;
        self
    }

    /// Sets a hook that runs every time a unit is taken, on the taking thread.
    pub fn on_taken<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.parts.hooks.on_taken = Some(Arc::new(hook));
        self
    }

    /// Sets a hook that runs every time a unit is returned, on the returning thread.
    pub fn on_returned<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.parts.hooks.on_returned = Some(Arc::new(hook));
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if no [factory][Self::factory] was set.
    #[must_use]
    pub fn build(self) -> UnitPool<T> {
        UnitPool::new_inner(self)
    }

    /// Applies the configuration to an existing pool, detaching all of its current units.
    ///
    /// The factory is replaced only if one was set on this builder. Observers are kept.
    pub fn rebuild(self, pool: &UnitPool<T>) {
        pool.apply(self);
    }

    pub(crate) fn into_parts(self) -> SyncParts<T> {
        self.parts
    }
}

impl<T: UnitCallbacks + 'static> UnitPoolBuilder<T> {
    /// Runs the [`UnitCallbacks`] hooks of the pooled values on every transition.
    ///
    /// This replaces any hooks set via [`on_taken()`][Self::on_taken] or
    /// [`on_returned()`][Self::on_returned].
    pub fn unit_callbacks(self) -> Self {
        self.on_taken(T::on_taken).on_returned(T::on_returned)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(UnitPoolBuilder<String>: Send);

    #[test]
    fn adopted_units_follow_pre_instantiated_ones() {
        let pool = UnitPool::builder()
            .factory(|| "made")
            .pre_instantiate(1)
            .adopt_one("adopted")
            .build();

        let first = pool.take().unwrap();
        let second = pool.take().unwrap();

        assert_eq!(*first, "adopted");
        assert_eq!(first.index(), 1);
        assert_eq!(*second, "made");
        assert_eq!(second.index(), 0);
    }

    #[test]
    fn closure_hooks_run_on_transitions() {
        let taken = Arc::new(AtomicUsize::new(0));

        let pool = UnitPool::builder()
            .factory(|| 0_u8)
            .on_taken({
                let taken = Arc::clone(&taken);
                move |_| {
                    taken.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        drop(pool.take_scoped().unwrap());
        drop(pool.take_scoped().unwrap());

        assert_eq!(taken.load(Ordering::Relaxed), 2);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    #[should_panic]
    fn build_without_factory_panics() {
        let _pool = UnitPool::<u8>::builder().build();
    }
}
