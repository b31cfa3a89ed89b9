/// Creates the values that a pool wraps into new units.
///
/// Any `FnMut() -> T` closure is a factory, so most callers never implement this trait
/// directly. Implement it when instantiation needs its own state, such as a template that
/// is cloned for every new unit.
///
/// The factory is invoked while the pool is busy and must not call back into the same pool.
///
/// # Examples
///
/// ```
/// use unit_pool::{LocalUnitPool, UnitFactory};
///
/// struct Template {
///     name: &'static str,
///     created: usize,
/// }
///
/// impl UnitFactory<String> for Template {
///     fn instantiate(&mut self) -> String {
///         let name = format!("{}_{}", self.name, self.created);
///         self.created += 1;
///         name
///     }
/// }
///
/// let pool = LocalUnitPool::builder()
///     .factory(Template {
///         name: "spark",
///         created: 0,
///     })
///     .build();
///
/// assert_eq!(*pool.take().unwrap(), "spark_0");
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait UnitFactory<T> {
    /// Creates one new value for the pool.
    fn instantiate(&mut self) -> T;
}

impl<T, F> UnitFactory<T> for F
where
    F: FnMut() -> T,
{
    fn instantiate(&mut self) -> T {
        self()
    }
}

/// Lifecycle hooks that a pooled value may implement to react to its own transitions.
///
/// The hooks only run if the pool was configured with `unit_callbacks()`. Values that do
/// not care about their transitions do not need to implement this trait at all.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
///
/// use unit_pool::{LocalUnitPool, UnitCallbacks};
///
/// #[derive(Default)]
/// struct Effect {
///     active: Cell<bool>,
/// }
///
/// impl UnitCallbacks for Effect {
///     fn on_taken(&self) {
///         self.active.set(true);
///     }
///
///     fn on_returned(&self) {
///         self.active.set(false);
///     }
/// }
///
/// let pool = LocalUnitPool::builder()
///     .factory(Effect::default)
///     .unit_callbacks()
///     .build();
///
/// let effect = pool.take().unwrap();
/// assert!(effect.active.get());
///
/// effect.return_to_pool().unwrap();
/// assert!(!effect.active.get());
/// ```
pub trait UnitCallbacks {
    /// Called after the unit has been taken from the pool, before observers are notified.
    fn on_taken(&self) {}

    /// Called after the unit has been returned to the pool, before observers are notified.
    fn on_returned(&self) {}
}

/// The per-pool pair of transition hooks, shared by both pool flavors.
#[derive(Debug)]
pub(crate) struct Hooks<H> {
    pub(crate) on_taken: Option<H>,
    pub(crate) on_returned: Option<H>,
}

impl<H> Default for Hooks<H> {
    fn default() -> Self {
        Self {
            on_taken: None,
            on_returned: None,
        }
    }
}
