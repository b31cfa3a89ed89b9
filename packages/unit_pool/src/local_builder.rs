use std::any::type_name;
use std::fmt;
use std::rc::Rc;

use crate::pool_core::PoolParts;
use crate::local_pool::LocalHook;
use crate::{LocalUnitPool, OwnershipChecks, UnitCallbacks, UnitFactory};

/// Builder for creating an instance of [`LocalUnitPool`].
///
/// A factory is required; everything else is optional. By default the pool starts empty,
/// is unbounded and uses the [default ownership checks][OwnershipChecks::default].
///
/// # Examples
///
/// ```
/// use unit_pool::{LocalUnitPool, OwnershipChecks};
///
/// let pool = LocalUnitPool::builder()
///     .factory(|| vec![0_u8; 16])
///     .pre_instantiate(2)
///     .max_instances(8)
///     .ownership_checks(OwnershipChecks::Strict)
///     .build();
///
/// assert_eq!(pool.len(), 2);
/// assert_eq!(pool.max_instances(), Some(8));
/// ```
#[must_use]
pub struct LocalUnitPoolBuilder<T> {
    parts: PoolParts<T, Box<dyn UnitFactory<T>>, LocalHook<T>>,
}

pub(crate) type LocalParts<T> = PoolParts<T, Box<dyn UnitFactory<T>>, LocalHook<T>>;

impl<T> fmt::Debug for LocalUnitPoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalUnitPoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("has_factory", &self.parts.factory.is_some())
            .field("pre_instantiate", &self.parts.pre_instantiate)
            .field("adopted", &self.parts.adopted.len())
            .field("max_instances", &self.parts.max_instances)
            .field("ownership_checks", &self.parts.ownership_checks)
            .finish_non_exhaustive()
    }
}

impl<T> LocalUnitPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            parts: PoolParts::default(),
        }
    }

    /// Sets the factory that creates the value of every new unit.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: UnitFactory<T> + 'static,
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
    /// Adopted units are added after any pre-instantiated ones, so the last adopted value is
    /// the first one to be taken.
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
    ///
    /// Pre-instantiated and adopted units count toward the limit but are never rejected
    /// because of it. `take_aggressive()` ignores the limit.
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

    /// Sets a hook that runs every time a unit is taken, before observers are notified.
    pub fn on_taken<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        self.parts.hooks.on_taken = Some(Rc::new(hook));
        self
    }

    /// Sets a hook that runs every time a unit is returned, before observers are notified.
    pub fn on_returned<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        self.parts.hooks.on_returned = Some(Rc::new(hook));
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if no [factory][Self::factory] was set.
    #[must_use]
    pub fn build(self) -> LocalUnitPool<T> {
        LocalUnitPool::new_inner(self)
    }

    /// Applies the configuration to an existing pool.
    ///
    /// All units of the pool are detached and replaced by the units this builder specifies.
    /// The capacity, ownership checks and hooks are replaced too. The factory is replaced only
    /// if one was set on this builder. The pool keeps its identity and its observers.
    ///
    /// # Example
    ///
    /// ```
    /// use unit_pool::LocalUnitPool;
    ///
    /// let pool = LocalUnitPool::builder().factory(|| 1_u32).build();
    /// let old = pool.take().unwrap();
    ///
    /// LocalUnitPool::builder()
    ///     .factory(|| 2_u32)
    ///     .pre_instantiate(3)
    ///     .rebuild(&pool);
    ///
    /// assert_eq!(pool.len(), 3);
    /// assert!(!old.is_attached());
    /// assert_eq!(*pool.take().unwrap(), 2);
    /// ```
    pub fn rebuild(self, pool: &LocalUnitPool<T>) {
        pool.apply(self);
    }

    pub(crate) fn into_parts(self) -> LocalParts<T> {
        self.parts
    }
}

impl<T: UnitCallbacks + 'static> LocalUnitPoolBuilder<T> {
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
    use super::*;

    #[test]
    fn defaults_are_unbounded_and_empty() {
        let pool = LocalUnitPool::builder().factory(|| 0_u8).build();

        assert!(pool.is_empty());
        assert_eq!(pool.max_instances(), None);
    }

    #[test]
    fn later_capacity_setting_wins() {
        let pool = LocalUnitPool::builder()
            .factory(|| 0_u8)
            .max_instances(3)
            .max_instances_infinite()
            .build();

        assert_eq!(pool.max_instances(), None);
    }

    #[test]
    fn pre_instantiated_units_may_exceed_capacity() {
        let pool = LocalUnitPool::builder()
            .factory(|| 0_u8)
            .pre_instantiate(3)
            .max_instances(1)
            .build();

        assert_eq!(pool.len(), 3);
        for _ in 0..3 {
            pool.take().unwrap();
        }
        assert!(pool.try_take().is_none());
    }

    #[test]
    fn debug_output_names_the_item_type() {
        let builder = LocalUnitPool::builder().factory(|| 0_u16);

        assert!(format!("{builder:?}").contains("u16"));
    }
}
