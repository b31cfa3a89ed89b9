//! The allocation policy shared by both pool flavors.
//!
//! `PoolCore` knows nothing about synchronization, factories or notifications. Each flavor
//! wraps it in its own interior mutability primitive and supplies the unit handles.

use crate::callbacks::Hooks;
use crate::{Error, OwnershipChecks, Result};

/// Everything a builder collects before it is turned into a pool of either flavor.
///
/// `F` is the boxed factory type and `H` the shared hook pointer type of the flavor.
pub(crate) struct PoolParts<T, F, H> {
    pub(crate) factory: Option<F>,
    pub(crate) pre_instantiate: usize,
    pub(crate) adopted: Vec<T>,
    pub(crate) max_instances: Option<usize>,
    pub(crate) ownership_checks: OwnershipChecks,
    pub(crate) hooks: Hooks<H>,
}

impl<T, F, H> Default for PoolParts<T, F, H> {
    fn default() -> Self {
        Self {
            factory: None,
            pre_instantiate: 0,
            adopted: Vec::new(),
            max_instances: None,
            ownership_checks: OwnershipChecks::default(),
            hooks: Hooks::default(),
        }
    }
}

/// Bookkeeping that a pool needs from its unit handles.
///
/// Handles are cheap clones of a shared allocation, so the flags are interior-mutable.
pub(crate) trait PoolSlot: Clone {
    fn is_in_pool(&self) -> bool;

    fn set_in_pool(&self, in_pool: bool);

    fn is_attached(&self) -> bool;

    /// Severs the unit from its pool. A detached unit can never be returned again.
    fn detach(&self);
}

#[derive(Debug)]
pub(crate) struct PoolCore<U> {
    /// Every unit owned by the pool, in creation order.
    all_units: Vec<U>,

    /// Units currently in the pool. Used as a stack: the most recently returned unit is
    /// the first to be taken again.
    available_units: Vec<U>,

    /// `None` means the pool may grow without bound.
    max_instances: Option<usize>,

    /// Creation index for the next unit. Never reused, even after units are detached.
    next_index: usize,
}

impl<U: PoolSlot> PoolCore<U> {
    pub(crate) fn new(max_instances: Option<usize>) -> Self {
        Self {
            all_units: Vec::new(),
            available_units: Vec::new(),
            max_instances,
            next_index: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.all_units.len()
    }

    pub(crate) fn available(&self) -> usize {
        self.available_units.len()
    }

    pub(crate) fn used(&self) -> usize {
        self.all_units
            .len()
            .checked_sub(self.available_units.len())
            .expect("available units are always a subset of all units")
    }

    pub(crate) fn max_instances(&self) -> Option<usize> {
        self.max_instances
    }

    pub(crate) fn set_max_instances(&mut self, max_instances: Option<usize>) {
        self.max_instances = max_instances;
    }

    pub(crate) fn is_can_take(&self) -> bool {
        self.ensure_can_take().is_ok()
    }

    /// Fails if the pool has nothing available and is not allowed to grow.
    pub(crate) fn ensure_can_take(&self) -> Result<()> {
        match self.max_instances {
            Some(max_instances)
                if self.all_units.len() >= max_instances && self.available_units.is_empty() =>
            {
                Err(Error::CapacityExceeded { max_instances })
            }
            _ => Ok(()),
        }
    }

    /// Adds a new available unit, handing `create` the creation index to use for it.
    pub(crate) fn add_with<F>(&mut self, create: F)
    where
        F: FnOnce(usize) -> U,
    {
        let unit = create(self.allocate_index());
        unit.set_in_pool(true);

        self.all_units.push(unit.clone());
        self.available_units.push(unit);
    }

    /// Takes the most recently returned unit, creating exactly one new unit via `create`
    /// if none is available. Capacity is not checked here.
    pub(crate) fn take_with<F>(&mut self, create: F) -> U
    where
        F: FnOnce(usize) -> U,
    {
        let unit = self.available_units.pop().unwrap_or_else(|| {
            let index = self.allocate_index();
            let unit = create(index);
            self.all_units.push(unit.clone());

            tracing::debug!(index, total = self.all_units.len(), "pool grew");

            unit
        });

        unit.set_in_pool(false);
        unit
    }

    /// Puts a taken unit back on top of the available stack.
    ///
    /// Returns `false` without changing anything if the unit is already available.
    /// The caller is responsible for verifying that the unit belongs to this pool.
    pub(crate) fn put_back(&mut self, unit: &U) -> bool {
        if unit.is_in_pool() {
            return false;
        }

        unit.set_in_pool(true);
        self.available_units.push(unit.clone());
        true
    }

    /// Detaches available units, least recently returned first, until the pool holds no
    /// more than `max(min_instances, used)` units. Returns the number of detached units.
    pub(crate) fn shrink_to(&mut self, min_instances: usize) -> usize {
        let target = min_instances.max(self.used());
        let excess = self
            .all_units
            .len()
            .saturating_sub(target)
            .min(self.available_units.len());

        if excess == 0 {
            return 0;
        }

        for unit in self.available_units.drain(..excess) {
            unit.detach();
        }

        self.all_units.retain(PoolSlot::is_attached);
        excess
    }

    /// Detaches every unit and empties the pool. Returns the number of detached units.
    pub(crate) fn detach_all(&mut self) -> usize {
        self.available_units.clear();

        let count = self.all_units.len();
        for unit in self.all_units.drain(..) {
            unit.detach();
        }

        count
    }

    fn allocate_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index = index
            .checked_add(1)
            .expect("unit creation index cannot overflow");
        index
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[derive(Clone, Debug)]
    struct TestSlot {
        index: usize,
        in_pool: Rc<Cell<bool>>,
        attached: Rc<Cell<bool>>,
    }

    impl TestSlot {
        fn new(index: usize) -> Self {
            Self {
                index,
                in_pool: Rc::new(Cell::new(false)),
                attached: Rc::new(Cell::new(true)),
            }
        }
    }

    impl PoolSlot for TestSlot {
        fn is_in_pool(&self) -> bool {
            self.in_pool.get()
        }

        fn set_in_pool(&self, in_pool: bool) {
            self.in_pool.set(in_pool);
        }

        fn is_attached(&self) -> bool {
            self.attached.get()
        }

        fn detach(&self) {
            self.attached.set(false);
        }
    }

    fn assert_consistent(core: &PoolCore<TestSlot>) {
        assert_eq!(core.used(), core.len() - core.available());

        for unit in &core.available_units {
            assert!(unit.is_in_pool());
            assert!(core.all_units.iter().any(|u| u.index == unit.index));
        }

        let taken = core.all_units.iter().filter(|u| !u.is_in_pool()).count();
        assert_eq!(taken, core.used());
    }

    #[test]
    fn take_from_empty_unbounded_grows_by_one() {
        let mut core = PoolCore::new(None);

        let unit = core.take_with(TestSlot::new);

        assert_eq!(unit.index, 0);
        assert!(!unit.is_in_pool());
        assert_eq!(core.len(), 1);
        assert_eq!(core.used(), 1);
        assert_consistent(&core);
    }

    #[test]
    fn take_reuses_most_recently_returned() {
        let mut core = PoolCore::new(None);

        let a = core.take_with(TestSlot::new);
        let b = core.take_with(TestSlot::new);

        assert!(core.put_back(&a));
        assert!(core.put_back(&b));

        let next = core.take_with(|_| panic!("must reuse an available unit"));
        assert_eq!(next.index, b.index);
        assert_consistent(&core);
    }

    #[test]
    fn capacity_is_enforced_only_when_nothing_is_available() {
        let mut core = PoolCore::new(Some(1));
        assert!(core.is_can_take());

        let unit = core.take_with(TestSlot::new);
        assert!(!core.is_can_take());
        assert!(matches!(
            core.ensure_can_take(),
            Err(Error::CapacityExceeded { max_instances: 1 })
        ));

        core.put_back(&unit);
        assert!(core.is_can_take());
    }

    #[test]
    fn zero_capacity_only_serves_added_units() {
        let mut core = PoolCore::new(Some(0));
        assert!(!core.is_can_take());

        core.add_with(TestSlot::new);
        assert!(core.is_can_take());
        assert_consistent(&core);
    }

    #[test]
    fn put_back_is_idempotent() {
        let mut core = PoolCore::new(None);
        let unit = core.take_with(TestSlot::new);

        assert!(core.put_back(&unit));
        assert!(!core.put_back(&unit));

        assert_eq!(core.available(), 1);
        assert_consistent(&core);
    }

    #[test]
    fn shrink_removes_least_recently_returned_first() {
        let mut core = PoolCore::new(None);
        for _ in 0..4 {
            core.add_with(TestSlot::new);
        }

        // Stack bottom to top: 0, 1, 2, 3. Taking pops 3.
        let taken = core.take_with(|_| panic!("must reuse an available unit"));
        assert_eq!(taken.index, 3);

        let removed = core.shrink_to(2);

        assert_eq!(removed, 2);
        assert_eq!(core.len(), 2);
        assert_eq!(core.available(), 1);
        assert_eq!(core.available_units[0].index, 2);
        assert!(taken.is_attached());
        assert_consistent(&core);
    }

    #[test]
    fn shrink_never_removes_taken_units() {
        let mut core = PoolCore::new(None);
        let a = core.take_with(TestSlot::new);
        let b = core.take_with(TestSlot::new);

        assert_eq!(core.shrink_to(0), 0);
        assert_eq!(core.len(), 2);
        assert!(a.is_attached());
        assert!(b.is_attached());
    }

    #[test]
    fn detach_all_empties_pool_and_keeps_counting() {
        let mut core = PoolCore::new(None);
        let unit = core.take_with(TestSlot::new);
        core.add_with(TestSlot::new);

        assert_eq!(core.detach_all(), 2);
        assert_eq!(core.len(), 0);
        assert!(!unit.is_attached());

        let fresh = core.take_with(TestSlot::new);
        assert_eq!(fresh.index, 2);
        assert_consistent(&core);
    }
}
